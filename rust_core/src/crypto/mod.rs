//! Cryptography Module - content hashing for addressing and integrity
//!
//! Every chunk, stripe and file is identified by its SHA-256 digest.

mod hashing;

pub use hashing::{hash_reader_chunked, ContentHash, IncrementalHasher};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Invalid hash: {0}")]
    InvalidHash(String),
}
