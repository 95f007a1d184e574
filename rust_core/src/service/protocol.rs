//! Request/Response messages for the splitter and chunk storage services

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ServiceError;
use crate::storage::StoreStatus;

/// Split a file into stripes and chunks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitFileRequest {
    /// Full file content
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitFileResponse {
    /// Human-readable outcome
    pub message: String,
}

/// Store one chunk under its claimed hash
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreChunkRequest {
    /// Raw chunk bytes
    pub chunk_data: Vec<u8>,

    /// Hex digest the sender computed
    pub chunk_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreChunkResponse {
    pub status: StoreStatus,
}

/// Fetch a stored chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetChunkRequest {
    pub chunk_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetChunkResponse {
    /// `None` when the chunk is not held
    pub chunk_data: Option<Vec<u8>>,
}

/// Caller side of the chunk storage service.
///
/// The splitter and reconstructor only talk to chunk storage through this
/// trait; an in-process service and a remote transport are interchangeable.
#[async_trait]
pub trait ChunkStoreClient: Send + Sync {
    async fn store_chunk(
        &self,
        request: StoreChunkRequest,
    ) -> Result<StoreChunkResponse, ServiceError>;

    async fn get_chunk(&self, request: GetChunkRequest) -> Result<GetChunkResponse, ServiceError>;
}
