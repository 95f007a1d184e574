//! Registry of files split by this process, keyed by file hash.
//!
//! Safe to share across concurrent split requests.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Summary of one successfully split file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredFile {
    pub file_hash: String,
    pub size: u64,
    pub stripe_count: usize,
    pub chunk_count: usize,
    pub stored_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct FileRegistry {
    files: DashMap<String, RegisteredFile>,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a file; the first registration of a hash wins
    pub fn register(&self, entry: RegisteredFile) -> bool {
        let mut inserted = false;
        self.files.entry(entry.file_hash.clone()).or_insert_with(|| {
            inserted = true;
            entry
        });
        inserted
    }

    /// Look up a file by hash
    pub fn get(&self, file_hash: &str) -> Option<RegisteredFile> {
        self.files.get(file_hash).map(|e| e.value().clone())
    }

    /// Whether a file with this hash has been split
    pub fn contains(&self, file_hash: &str) -> bool {
        self.files.contains_key(file_hash)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Snapshot of all entries
    pub fn list(&self) -> Vec<RegisteredFile> {
        self.files.iter().map(|e| e.value().clone()).collect()
    }
}
