//! StripeStore Core - erasure-coded, content-addressed file storage
//!
//! Files are cut into fixed-size stripes, each stripe is Reed-Solomon encoded
//! into `n` chunks (any `k` recover it), and every chunk, stripe and file is
//! addressed by its SHA-256 digest. Chunks are stored only after their claimed
//! hash is verified, and the File -> Stripe -> Chunk hash tree is written as a
//! JSON document named after the file hash.

pub mod crypto;
pub mod service;
pub mod storage;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use service::{ChunkStorageService, FileSplitterService, SplitFileRequest, SplitFileResponse};
use storage::{
    ChunkStore, ErasureConfig, FileRegistry, MetadataStore, Reconstructor, SplitReport, Splitter,
};

/// Main error type for StripeStore operations
#[derive(Error, Debug)]
pub enum StripeStoreError {
    #[error("Cryptographic error: {0}")]
    Crypto(#[from] crypto::CryptoError),

    #[error("Service error: {0}")]
    Service(#[from] service::ServiceError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StripeStoreError>;

/// Core configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StripeStoreConfig {
    /// Bytes per stripe before erasure coding
    pub stripe_size: usize,

    /// Minimum chunks needed to rebuild a stripe
    pub k: usize,

    /// Chunks produced per stripe
    pub n: usize,

    /// Directory holding chunk files
    pub storage_path: PathBuf,

    /// Directory holding metadata documents
    pub metadata_path: PathBuf,

    /// Bound on a single chunk store or fetch call
    pub store_timeout_ms: u64,

    /// Requests each service handles at once
    pub max_concurrent_requests: usize,
}

impl Default for StripeStoreConfig {
    fn default() -> Self {
        Self {
            stripe_size: 4096 * 3,
            k: 3,
            n: 6,
            storage_path: PathBuf::from("./stripestore_data/chunks"),
            metadata_path: PathBuf::from("./stripestore_data/metadata"),
            store_timeout_ms: 5_000,
            max_concurrent_requests: 10,
        }
    }
}

impl StripeStoreConfig {
    /// Load from a JSON file; omitted fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self =
            serde_json::from_str(&json).map_err(|e| StripeStoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn erasure_config(&self) -> ErasureConfig {
        ErasureConfig::new(self.k, self.n)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.stripe_size == 0 {
            return Err(StripeStoreError::Config("stripe_size must be positive".into()));
        }
        self.erasure_config()
            .validate()
            .map_err(|e| StripeStoreError::Config(e.to_string()))?;
        if self.store_timeout_ms == 0 {
            return Err(StripeStoreError::Config("store_timeout_ms must be positive".into()));
        }
        if self.max_concurrent_requests == 0 {
            return Err(StripeStoreError::Config(
                "max_concurrent_requests must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Install a `tracing` subscriber filtered by `RUST_LOG` (default `info`).
/// Safe to call more than once.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// A local node: chunk storage, splitter and reconstructor wired together
pub struct StripeStore {
    pub config: StripeStoreConfig,
    chunk_service: Arc<ChunkStorageService>,
    splitter_service: FileSplitterService,
    reconstructor: Reconstructor,
}

impl StripeStore {
    /// Open a node over the configured storage and metadata directories
    pub fn open(config: StripeStoreConfig) -> Result<Self> {
        config.validate()?;

        let chunk_service = Arc::new(ChunkStorageService::new(
            ChunkStore::open(&config.storage_path),
            config.max_concurrent_requests,
        ));
        let metadata = MetadataStore::new(&config.metadata_path);

        let splitter = Splitter::new(
            config.stripe_size,
            config.erasure_config(),
            chunk_service.clone(),
            metadata.clone(),
        )?
        .with_store_timeout(config.store_timeout());

        let reconstructor =
            Reconstructor::new(config.erasure_config(), chunk_service.clone(), metadata)?
                .with_fetch_timeout(config.store_timeout());

        tracing::info!(
            stripe_size = config.stripe_size,
            k = config.k,
            n = config.n,
            storage = %config.storage_path.display(),
            "stripe store opened"
        );

        Ok(Self {
            splitter_service: FileSplitterService::new(
                Arc::new(splitter),
                config.max_concurrent_requests,
            ),
            config,
            chunk_service,
            reconstructor,
        })
    }

    pub fn chunk_service(&self) -> &Arc<ChunkStorageService> {
        &self.chunk_service
    }

    pub fn splitter_service(&self) -> &FileSplitterService {
        &self.splitter_service
    }

    /// Files split by this node
    pub fn registry(&self) -> &Arc<FileRegistry> {
        self.splitter_service.splitter().registry()
    }

    /// Split and store a file
    pub async fn split_file(&self, content: Vec<u8>) -> Result<SplitReport> {
        Ok(self.splitter_service.split(SplitFileRequest { content }).await?)
    }

    /// Wire-shaped SplitFile
    pub async fn handle_split_file(&self, request: SplitFileRequest) -> SplitFileResponse {
        self.splitter_service.split_file(request).await
    }

    /// Rebuild a file from its stored chunks
    pub async fn reconstruct_file(&self, file_hash: &str) -> Result<Vec<u8>> {
        Ok(self.reconstructor.reconstruct_file(file_hash).await?)
    }

    pub fn reconstructor(&self) -> &Reconstructor {
        &self.reconstructor
    }
}
