//! Chunk store - verified, content-addressed chunk persistence
//!
//! A chunk is written only when its bytes hash to the key the caller claims.
//! Identical content always lands under the identical key, so concurrent
//! duplicate writes are harmless.

use super::StorageError;
use crate::crypto::ContentHash;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Outcome of a store call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StoreStatus {
    Success,
    Failure,
}

impl StoreStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreStatus::Success => "SUCCESS",
            StoreStatus::Failure => "FAILURE",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StoreStatus::Success)
    }
}

/// Raw key/value persistence for chunks, keyed by verified hash
#[async_trait]
pub trait ChunkBackend: Send + Sync {
    /// Write chunk bytes under `hash`
    async fn put(&self, hash: &ContentHash, data: &[u8]) -> Result<(), StorageError>;

    /// Read chunk bytes, `None` if absent
    async fn get(&self, hash: &ContentHash) -> Result<Option<Vec<u8>>, StorageError>;

    /// Check presence
    async fn contains(&self, hash: &ContentHash) -> Result<bool, StorageError>;
}

/// Filesystem backend: one file per chunk, named by its hex digest
#[derive(Debug)]
pub struct FsBackend {
    root: PathBuf,
    tmp_counter: AtomicU64,
}

impl FsBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tmp_counter: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of a chunk file
    pub fn chunk_path(&self, hash: &ContentHash) -> PathBuf {
        self.root.join(hash.to_hex())
    }
}

/// Write aside, then rename, so readers never see a partial chunk
fn write_atomically(
    root: &Path,
    tmp_path: &Path,
    target: &Path,
    data: &[u8],
) -> std::io::Result<()> {
    std::fs::create_dir_all(root)?;

    let result = std::fs::write(tmp_path, data).and_then(|_| std::fs::rename(tmp_path, target));
    if result.is_err() {
        let _ = std::fs::remove_file(tmp_path);
    }
    result
}

#[async_trait]
impl ChunkBackend for FsBackend {
    async fn put(&self, hash: &ContentHash, data: &[u8]) -> Result<(), StorageError> {
        let seq = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let root = self.root.clone();
        let tmp_name = format!(".{}.{}.{}.tmp", hash.to_hex(), std::process::id(), seq);
        let tmp_path = root.join(tmp_name);
        let target = self.chunk_path(hash);
        let data = data.to_vec();

        // Runs to completion even if this future is dropped
        tokio::task::spawn_blocking(move || write_atomically(&root, &tmp_path, &target, &data))
            .await
            .map_err(|e| StorageError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

        Ok(())
    }

    async fn get(&self, hash: &ContentHash) -> Result<Option<Vec<u8>>, StorageError> {
        match tokio::fs::read(self.chunk_path(hash)).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn contains(&self, hash: &ContentHash) -> Result<bool, StorageError> {
        Ok(tokio::fs::try_exists(self.chunk_path(hash)).await?)
    }
}

/// In-memory backend, used for testing
#[derive(Debug, Default)]
pub struct MemoryBackend {
    chunks: RwLock<HashMap<ContentHash, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct chunks held
    pub fn len(&self) -> usize {
        self.chunks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.read().is_empty()
    }

    /// Overwrite stored bytes without verification (test hook for bit rot)
    pub fn corrupt(&self, hash: &ContentHash, data: Vec<u8>) {
        self.chunks.write().insert(*hash, data);
    }

    /// Drop a chunk (test hook for lost shards)
    pub fn forget(&self, hash: &ContentHash) {
        self.chunks.write().remove(hash);
    }
}

#[async_trait]
impl ChunkBackend for MemoryBackend {
    async fn put(&self, hash: &ContentHash, data: &[u8]) -> Result<(), StorageError> {
        self.chunks.write().insert(*hash, data.to_vec());
        Ok(())
    }

    async fn get(&self, hash: &ContentHash) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.chunks.read().get(hash).cloned())
    }

    async fn contains(&self, hash: &ContentHash) -> Result<bool, StorageError> {
        Ok(self.chunks.read().contains_key(hash))
    }
}

/// Verifies claimed hashes and persists chunks through a backend
pub struct ChunkStore<B: ChunkBackend = FsBackend> {
    backend: B,
}

impl ChunkStore<FsBackend> {
    /// Filesystem-backed store rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self::new(FsBackend::new(root))
    }
}

impl<B: ChunkBackend> ChunkStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Store `data` if it hashes to `claimed_hash`.
    ///
    /// The claim must be the exact lowercase hex digest; a mismatch or any
    /// other spelling yields `Failure` with nothing written.
    /// Backend errors propagate so the caller can report them.
    pub async fn store_chunk(
        &self,
        data: &[u8],
        claimed_hash: &str,
    ) -> Result<StoreStatus, StorageError> {
        let actual = ContentHash::hash(data);

        let claimed = match ContentHash::from_hex(claimed_hash) {
            Ok(claimed) => claimed,
            Err(e) => {
                tracing::warn!(
                    claimed = claimed_hash,
                    error = %e,
                    "rejecting chunk with malformed hash"
                );
                return Ok(StoreStatus::Failure);
            }
        };

        if claimed != actual {
            tracing::warn!(
                claimed = claimed_hash,
                actual = %actual,
                "rejecting chunk with mismatched hash"
            );
            return Ok(StoreStatus::Failure);
        }

        self.backend.put(&actual, data).await?;
        tracing::debug!(hash = %actual, size = data.len(), "chunk stored");

        Ok(StoreStatus::Success)
    }

    /// Fetch a chunk and check it still matches its key
    pub async fn retrieve_chunk(&self, hash: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let key = ContentHash::from_hex(hash)
            .map_err(|e| StorageError::InvalidHash(e.to_string()))?;

        let Some(data) = self.backend.get(&key).await? else {
            return Ok(None);
        };

        let actual = ContentHash::hash(&data);
        if actual != key {
            return Err(StorageError::IntegrityCheckFailed {
                expected: key.to_hex(),
                actual: actual.to_hex(),
            });
        }

        Ok(Some(data))
    }

    /// Check presence of a chunk
    pub async fn contains(&self, hash: &str) -> Result<bool, StorageError> {
        let key = ContentHash::from_hex(hash)
            .map_err(|e| StorageError::InvalidHash(e.to_string()))?;
        self.backend.contains(&key).await
    }
}
