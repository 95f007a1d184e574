//! Content-addressable hashing using SHA-256
//!
//! Digests double as storage keys and integrity checks, so every chunk,
//! stripe and file is addressed by the lowercase hex form of its hash.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use super::CryptoError;

/// Content hash using SHA-256 (32 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hash data and return content hash
    pub fn hash(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Hash text input by its UTF-8 bytes
    pub fn hash_text(text: &str) -> Self {
        Self::hash(text.as_bytes())
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse the canonical form: exactly 64 lowercase hex digits
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        if s.len() != 64 {
            return Err(CryptoError::InvalidHash(format!(
                "expected 64 hex digits, got {}",
                s.len()
            )));
        }
        if !s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(CryptoError::InvalidHash("not lowercase hex".into()));
        }

        let mut arr = [0u8; 32];
        hex::decode_to_slice(s, &mut arr).map_err(|e| CryptoError::InvalidHash(e.to_string()))?;
        Ok(Self(arr))
    }

    /// Verify that data matches this hash
    pub fn verify(&self, data: &[u8]) -> bool {
        Self::hash(data) == *self
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Incremental hasher for large inputs.
///
/// Cloning forks the running state, which lets a caller test several
/// candidate suffixes against one shared prefix.
#[derive(Clone)]
pub struct IncrementalHasher {
    hasher: Sha256,
    bytes_processed: u64,
}

impl IncrementalHasher {
    /// Create a new incremental hasher
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
            bytes_processed: 0,
        }
    }

    /// Update with more data
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.bytes_processed += data.len() as u64;
    }

    /// Finalize and get the content hash
    pub fn finalize(self) -> ContentHash {
        ContentHash(self.hasher.finalize().into())
    }

    /// Get bytes processed so far
    pub fn bytes_processed(&self) -> u64 {
        self.bytes_processed
    }
}

impl Default for IncrementalHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash a reader in chunks (for large files)
pub fn hash_reader_chunked<R: std::io::Read>(
    reader: &mut R,
    chunk_size: usize,
) -> std::io::Result<ContentHash> {
    let mut hasher = IncrementalHasher::new();
    let mut buffer = vec![0u8; chunk_size.max(1)];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize())
}
