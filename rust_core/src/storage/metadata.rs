//! Metadata tree - File -> Stripe -> Chunk hash lineage
//!
//! The document written for a file lists its stripes in file order, each with
//! its chunk hashes in shard order. The file's own hash is not a field of the
//! document; it names the document (`<hash>.json`).

use super::StorageError;
use crate::crypto::ContentHash;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One erasure-coded shard, identified by its hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    #[serde(rename = "chunkHash")]
    pub chunk_hash: String,
}

impl ChunkRecord {
    pub fn new(hash: ContentHash) -> Self {
        Self {
            chunk_hash: hash.to_hex(),
        }
    }
}

/// One padded stripe and the `n` chunks it was encoded into
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripeRecord {
    /// Hash of the zero-padded stripe bytes
    #[serde(rename = "stripeHash")]
    pub stripe_hash: String,

    #[serde(rename = "chunkHashes")]
    pub chunks: Vec<ChunkRecord>,
}

impl StripeRecord {
    pub fn new(hash: ContentHash, chunk_hashes: impl IntoIterator<Item = ContentHash>) -> Self {
        Self {
            stripe_hash: hash.to_hex(),
            chunks: chunk_hashes.into_iter().map(ChunkRecord::new).collect(),
        }
    }

    /// Chunk hashes in shard order
    pub fn chunk_hashes(&self) -> impl Iterator<Item = &str> {
        self.chunks.iter().map(|c| c.chunk_hash.as_str())
    }
}

/// Serialized body of a file's metadata document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct FileDocument {
    #[serde(rename = "stripeHashes")]
    stripes: Vec<StripeRecord>,
}

/// Top-level record: a file and its stripes in file order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Hash of the original, unpadded file bytes
    pub file_hash: String,

    pub stripes: Vec<StripeRecord>,
}

impl FileRecord {
    pub fn new(file_hash: ContentHash, stripes: Vec<StripeRecord>) -> Self {
        Self {
            file_hash: file_hash.to_hex(),
            stripes,
        }
    }

    /// Total number of chunks across all stripes
    pub fn chunk_count(&self) -> usize {
        self.stripes.iter().map(|s| s.chunks.len()).sum()
    }

    /// Render the metadata document
    pub fn to_json(&self) -> Result<String, StorageError> {
        let doc = FileDocument {
            stripes: self.stripes.clone(),
        };
        serde_json::to_string_pretty(&doc).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    /// Parse a metadata document; the hash comes from its filename
    pub fn from_json(file_hash: &str, json: &str) -> Result<Self, StorageError> {
        let doc: FileDocument =
            serde_json::from_str(json).map_err(|e| StorageError::Serialization(e.to_string()))?;

        Ok(Self {
            file_hash: file_hash.to_string(),
            stripes: doc.stripes,
        })
    }
}

/// Write-once store of metadata documents, one per file hash
#[derive(Debug, Clone)]
pub struct MetadataStore {
    root: PathBuf,
}

impl MetadataStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the document for a file hash
    pub fn document_path(&self, file_hash: &str) -> PathBuf {
        self.root.join(format!("{}.json", file_hash))
    }

    /// Persist a record.
    ///
    /// Returns the document path and whether a document was already present;
    /// an existing document is never rewritten.
    pub async fn persist(&self, record: &FileRecord) -> Result<(PathBuf, bool), StorageError> {
        let path = self.document_path(&record.file_hash);

        if tokio::fs::try_exists(&path).await? {
            tracing::debug!(file_hash = %record.file_hash, "metadata document already present");
            return Ok((path, true));
        }

        tokio::fs::create_dir_all(&self.root).await?;

        let json = record.to_json()?;
        let tmp_path = self.root.join(format!("{}.json.tmp", record.file_hash));
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &path).await?;

        tracing::info!(
            file_hash = %record.file_hash,
            stripes = record.stripes.len(),
            "metadata document written"
        );

        Ok((path, false))
    }

    /// Load the record for a file hash
    pub async fn load(&self, file_hash: &str) -> Result<FileRecord, StorageError> {
        let path = self.document_path(file_hash);

        let json = match tokio::fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::FileNotFound(file_hash.to_string()))
            }
            Err(e) => return Err(StorageError::Io(e)),
        };

        FileRecord::from_json(file_hash, &json)
    }
}
