//! Splitter - file -> stripes -> chunks
//!
//! Each stripe is zero-padded to the stripe size, erasure-encoded, and every
//! chunk is sent to chunk storage with its hash. The stripe hash covers the
//! padded bytes; the file hash covers the original bytes. Any chunk failure
//! fails the whole split and no metadata document is written.

use super::{
    ErasureCodec, ErasureConfig, FileRecord, FileRegistry, MetadataStore, RegisteredFile, Shard,
    StorageError, StripeRecord,
};
use crate::crypto::ContentHash;
use crate::service::{ChunkStoreClient, StoreChunkRequest};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default bound on a single StoreChunk call
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Cut `content` into `stripe_size` windows, zero-padding the last one.
pub fn segment_stripes(content: &[u8], stripe_size: usize) -> impl Iterator<Item = Cow<'_, [u8]>> {
    content.chunks(stripe_size).map(move |window| {
        if window.len() == stripe_size {
            Cow::Borrowed(window)
        } else {
            let mut padded = window.to_vec();
            padded.resize(stripe_size, 0);
            Cow::Owned(padded)
        }
    })
}

/// Why a chunk was not stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkFailureReason {
    /// Chunk storage answered FAILURE
    Rejected,
    /// Storage or transport error
    Storage(String),
    Timeout,
}

impl fmt::Display for ChunkFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkFailureReason::Rejected => write!(f, "rejected by chunk storage"),
            ChunkFailureReason::Storage(e) => write!(f, "storage error: {}", e),
            ChunkFailureReason::Timeout => write!(f, "timed out"),
        }
    }
}

/// One chunk that was not stored, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkFailure {
    pub chunk_index: usize,
    pub chunk_hash: String,
    pub reason: ChunkFailureReason,
}

/// A stripe with at least one chunk that failed to store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripeFailure {
    pub stripe_index: usize,
    pub stripe_hash: String,
    pub chunks: Vec<ChunkFailure>,
}

impl fmt::Display for StripeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stripe {} [", self.stripe_index)?;
        for (i, chunk) in self.chunks.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "chunk {} {}", chunk.chunk_index, chunk.reason)?;
        }
        write!(f, "]")
    }
}

pub(crate) fn describe_failures(failures: &[StripeFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result of a successful split
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitReport {
    pub file_hash: String,
    pub size: u64,
    pub stripe_count: usize,
    pub chunk_count: usize,
    pub metadata_path: PathBuf,
    /// The metadata document existed before this split
    pub already_stored: bool,
    pub record: FileRecord,
}

/// Splits files into erasure-coded, content-addressed chunks
pub struct Splitter {
    stripe_size: usize,
    codec: ErasureCodec,
    chunk_store: Arc<dyn ChunkStoreClient>,
    metadata: MetadataStore,
    registry: Arc<FileRegistry>,
    store_timeout: Duration,
}

impl Splitter {
    /// Create a new splitter
    pub fn new(
        stripe_size: usize,
        erasure_config: ErasureConfig,
        chunk_store: Arc<dyn ChunkStoreClient>,
        metadata: MetadataStore,
    ) -> Result<Self, StorageError> {
        if stripe_size == 0 {
            return Err(StorageError::InvalidStripeSize);
        }

        Ok(Self {
            stripe_size,
            codec: ErasureCodec::new(erasure_config)?,
            chunk_store,
            metadata,
            registry: Arc::new(FileRegistry::new()),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        })
    }

    /// Set the per-chunk store timeout
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Bytes per stripe before padding and encoding
    pub fn stripe_size(&self) -> usize {
        self.stripe_size
    }

    pub fn erasure_config(&self) -> ErasureConfig {
        self.codec.config()
    }

    /// Files this splitter has stored successfully
    pub fn registry(&self) -> &Arc<FileRegistry> {
        &self.registry
    }

    /// Split, encode and store a file, then persist its metadata
    #[tracing::instrument(skip_all, fields(size = content.len()))]
    pub async fn split_file(&self, content: &[u8]) -> Result<SplitReport, StorageError> {
        let file_hash = ContentHash::hash(content);

        let mut stripes = Vec::new();
        let mut failures = Vec::new();

        for (stripe_index, stripe) in segment_stripes(content, self.stripe_size).enumerate() {
            let stripe_hash = ContentHash::hash(&stripe);
            let shards = self.codec.encode(&stripe)?;

            match self.store_stripe(stripe_index, stripe_hash, shards).await {
                Ok(record) => stripes.push(record),
                Err(failure) => failures.push(failure),
            }
        }

        if !failures.is_empty() {
            tracing::warn!(
                file_hash = %file_hash,
                failed_stripes = failures.len(),
                "split aborted, metadata not written"
            );
            return Err(StorageError::SplitFailed(failures));
        }

        let record = FileRecord::new(file_hash, stripes);
        let (metadata_path, already_stored) = self.metadata.persist(&record).await?;

        let stripe_count = record.stripes.len();
        let chunk_count = record.chunk_count();

        self.registry.register(RegisteredFile {
            file_hash: record.file_hash.clone(),
            size: content.len() as u64,
            stripe_count,
            chunk_count,
            stored_at: chrono::Utc::now(),
        });

        tracing::info!(
            file_hash = %record.file_hash,
            stripes = stripe_count,
            chunks = chunk_count,
            "file split and stored"
        );

        Ok(SplitReport {
            file_hash: record.file_hash.clone(),
            size: content.len() as u64,
            stripe_count,
            chunk_count,
            metadata_path,
            already_stored,
            record,
        })
    }

    /// Store every chunk of one stripe; returns once all calls have settled
    async fn store_stripe(
        &self,
        stripe_index: usize,
        stripe_hash: ContentHash,
        shards: Vec<Shard>,
    ) -> Result<StripeRecord, StripeFailure> {
        let calls = shards.into_iter().map(|shard| {
            let chunk_index = shard.index;
            let chunk_hash = ContentHash::hash(&shard.data);
            let request = StoreChunkRequest {
                chunk_data: shard.data,
                chunk_hash: chunk_hash.to_hex(),
            };

            async move {
                let outcome =
                    tokio::time::timeout(self.store_timeout, self.chunk_store.store_chunk(request))
                        .await;

                let failure = match outcome {
                    Ok(Ok(response)) if response.status.is_success() => None,
                    Ok(Ok(_)) => Some(ChunkFailureReason::Rejected),
                    Ok(Err(e)) => Some(ChunkFailureReason::Storage(e.to_string())),
                    Err(_) => Some(ChunkFailureReason::Timeout),
                };

                (chunk_index, chunk_hash, failure)
            }
        });

        let results = join_all(calls).await;

        let failed: Vec<ChunkFailure> = results
            .iter()
            .filter_map(|(chunk_index, chunk_hash, failure)| {
                failure.clone().map(|reason| ChunkFailure {
                    chunk_index: *chunk_index,
                    chunk_hash: chunk_hash.to_hex(),
                    reason,
                })
            })
            .collect();

        if !failed.is_empty() {
            for chunk in &failed {
                tracing::warn!(
                    stripe = stripe_index,
                    chunk = chunk.chunk_index,
                    reason = %chunk.reason,
                    "chunk not stored"
                );
            }
            return Err(StripeFailure {
                stripe_index,
                stripe_hash: stripe_hash.to_hex(),
                chunks: failed,
            });
        }

        tracing::debug!(stripe = stripe_index, hash = %stripe_hash, "stripe stored");
        Ok(StripeRecord::new(
            stripe_hash,
            results.into_iter().map(|(_, hash, _)| hash),
        ))
    }
}
