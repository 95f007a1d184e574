//! Storage Module - striping, erasure coding and content-addressed persistence
//!
//! Splits files into fixed-size stripes, encodes each stripe into redundant
//! chunks, stores chunks under their hashes and records the hash tree.

mod chunk_store;
mod erasure;
mod metadata;
mod reconstruct;
mod registry;
mod splitter;

pub use chunk_store::{ChunkBackend, ChunkStore, FsBackend, MemoryBackend, StoreStatus};
pub use erasure::{pad_block, unpad_block, ErasureCodec, ErasureConfig, Shard, MAX_SHARDS};
pub use metadata::{ChunkRecord, FileRecord, MetadataStore, StripeRecord};
pub use reconstruct::Reconstructor;
pub use registry::{FileRegistry, RegisteredFile};
pub use splitter::{
    segment_stripes, ChunkFailure, ChunkFailureReason, SplitReport, Splitter, StripeFailure,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid erasure parameters: {0}")]
    InvalidErasureParams(String),

    #[error("Stripe size must be at least one byte")]
    InvalidStripeSize,

    #[error("Erasure coding error: {0}")]
    ErasureCoding(String),

    #[error("Expected {expected} shard slots, got {got}")]
    ShardCountMismatch { expected: usize, got: usize },

    #[error("Not enough shards available: have {have}, need {need}")]
    InsufficientShards { have: usize, need: usize },

    #[error("Padding inconsistent with recovered data: {0}")]
    PaddingCorrupt(String),

    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    #[error("Integrity check failed: expected {expected}, got {actual}")]
    IntegrityCheckFailed { expected: String, actual: String },

    #[error("Stripe {stripe_index} unrecoverable: {reason}")]
    StripeUnrecoverable { stripe_index: usize, reason: String },

    #[error("Split failed on {} stripe(s): {}", .0.len(), splitter::describe_failures(.0))]
    SplitFailed(Vec<StripeFailure>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}
