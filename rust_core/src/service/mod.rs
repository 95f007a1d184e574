//! Service Module - the RPC boundary
//!
//! Two services: file splitting and verified chunk storage. Each bounds the
//! number of requests it serves at once; the wire transport is left to the
//! embedding application.

mod chunk_service;
mod protocol;
mod splitter_service;

pub use chunk_service::ChunkStorageService;
pub use protocol::{
    ChunkStoreClient, GetChunkRequest, GetChunkResponse, SplitFileRequest, SplitFileResponse,
    StoreChunkRequest, StoreChunkResponse,
};
pub use splitter_service::FileSplitterService;

use crate::storage::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
