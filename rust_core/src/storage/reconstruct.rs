//! Reconstruction - recover stripes and files from any `k` of `n` chunks
//!
//! Shards are checked against their recorded hashes before decoding, and a
//! recovered stripe must hash to its recorded stripe hash. The metadata
//! document carries no file length, so the zero padding of the final stripe
//! is removed by finding the one length whose digest equals the file hash.

use super::{ErasureCodec, ErasureConfig, MetadataStore, StorageError, StripeRecord};
use crate::crypto::{ContentHash, IncrementalHasher};
use crate::service::{ChunkStoreClient, GetChunkRequest};

use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;

/// Rebuilds stripes and files from stored chunks
pub struct Reconstructor {
    codec: ErasureCodec,
    chunk_store: Arc<dyn ChunkStoreClient>,
    metadata: MetadataStore,
    fetch_timeout: Duration,
}

impl Reconstructor {
    /// Create a reconstructor reading chunks through `chunk_store`
    pub fn new(
        erasure_config: ErasureConfig,
        chunk_store: Arc<dyn ChunkStoreClient>,
        metadata: MetadataStore,
    ) -> Result<Self, StorageError> {
        Ok(Self {
            codec: ErasureCodec::new(erasure_config)?,
            chunk_store,
            metadata,
            fetch_timeout: super::splitter::DEFAULT_STORE_TIMEOUT,
        })
    }

    /// Set the per-chunk fetch timeout
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Recover the padded stripe bytes from shard slots.
    ///
    /// `shards` holds one slot per recorded chunk; a shard that does not
    /// match its recorded hash is treated as missing.
    pub fn reconstruct_stripe(
        &self,
        record: &StripeRecord,
        shards: Vec<Option<Vec<u8>>>,
    ) -> Result<Vec<u8>, StorageError> {
        if shards.len() != record.chunks.len() {
            return Err(StorageError::ShardCountMismatch {
                expected: record.chunks.len(),
                got: shards.len(),
            });
        }

        let verified: Vec<Option<Vec<u8>>> = shards
            .into_iter()
            .zip(record.chunk_hashes())
            .enumerate()
            .map(|(index, (shard, expected))| {
                shard.filter(|data| {
                    let ok = ContentHash::hash(data).to_hex() == expected;
                    if !ok {
                        tracing::warn!(chunk = index, "discarding shard that fails its hash");
                    }
                    ok
                })
            })
            .collect();

        let stripe = self.codec.decode(verified)?;

        let actual = ContentHash::hash(&stripe);
        if actual.to_hex() != record.stripe_hash {
            return Err(StorageError::IntegrityCheckFailed {
                expected: record.stripe_hash.clone(),
                actual: actual.to_hex(),
            });
        }

        Ok(stripe)
    }

    /// Load a file's metadata, fetch its chunks and rebuild the original bytes
    #[tracing::instrument(skip(self))]
    pub async fn reconstruct_file(&self, file_hash: &str) -> Result<Vec<u8>, StorageError> {
        let expected =
            ContentHash::from_hex(file_hash).map_err(|e| StorageError::InvalidHash(e.to_string()))?;
        let record = self.metadata.load(file_hash).await?;

        let mut content = Vec::new();
        let mut last_stripe_len = 0;

        for (stripe_index, stripe) in record.stripes.iter().enumerate() {
            let shards = self.fetch_shards(stripe).await;
            let bytes = self
                .reconstruct_stripe(stripe, shards)
                .map_err(|e| StorageError::StripeUnrecoverable {
                    stripe_index,
                    reason: e.to_string(),
                })?;

            last_stripe_len = bytes.len();
            content.extend_from_slice(&bytes);
        }

        let content = strip_trailing_padding(content, last_stripe_len, &expected)?;
        tracing::info!(file_hash, size = content.len(), "file reconstructed");

        Ok(content)
    }

    /// Fetch a stripe's chunks until `k` of them pass their hash check.
    ///
    /// Calls still in flight at that point are dropped; failures, timeouts
    /// and corrupt replies leave their slot empty.
    async fn fetch_shards(&self, stripe: &StripeRecord) -> Vec<Option<Vec<u8>>> {
        let need = self.codec.config().k;
        let mut shards: Vec<Option<Vec<u8>>> = vec![None; stripe.chunks.len()];
        let mut verified = 0;

        let mut pending: FuturesUnordered<_> = stripe
            .chunk_hashes()
            .enumerate()
            .map(|(index, hash)| {
                let request = GetChunkRequest {
                    chunk_hash: hash.to_string(),
                };
                async move {
                    let fetch = self.chunk_store.get_chunk(request);
                    let data = match tokio::time::timeout(self.fetch_timeout, fetch).await {
                        Ok(Ok(response)) => response.chunk_data,
                        Ok(Err(e)) => {
                            tracing::warn!(chunk = hash, error = %e, "chunk fetch failed");
                            None
                        }
                        Err(_) => {
                            tracing::warn!(chunk = hash, "chunk fetch timed out");
                            None
                        }
                    };
                    (index, hash, data)
                }
            })
            .collect();

        while let Some((index, hash, data)) = pending.next().await {
            let Some(data) = data else {
                continue;
            };
            if ContentHash::hash(&data).to_hex() != hash {
                tracing::warn!(chunk = hash, "fetched chunk fails its hash");
                continue;
            }

            shards[index] = Some(data);
            verified += 1;
            if verified == need {
                break;
            }
        }

        shards
    }
}

/// Trim the zero padding appended to the final stripe.
///
/// The original length lies in `(len - last_stripe_len, len]` and the bytes
/// past it are zeros; the candidate whose digest equals `expected` wins.
fn strip_trailing_padding(
    mut content: Vec<u8>,
    last_stripe_len: usize,
    expected: &ContentHash,
) -> Result<Vec<u8>, StorageError> {
    let integrity_error = |content: &[u8]| StorageError::IntegrityCheckFailed {
        expected: expected.to_hex(),
        actual: ContentHash::hash(content).to_hex(),
    };

    if content.is_empty() {
        return if ContentHash::hash(&content) == *expected {
            Ok(content)
        } else {
            Err(integrity_error(&content))
        };
    }

    let lowest = content.len() - last_stripe_len + 1;
    let last_nonzero = content.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
    let start = lowest.max(last_nonzero);

    let mut hasher = IncrementalHasher::new();
    hasher.update(&content[..start]);

    for len in start..=content.len() {
        if hasher.clone().finalize() == *expected {
            content.truncate(len);
            return Ok(content);
        }
        if len < content.len() {
            hasher.update(&content[len..len + 1]);
        }
    }

    Err(integrity_error(&content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{
        ChunkStorageService, GetChunkResponse, ServiceError, StoreChunkRequest, StoreChunkResponse,
    };
    use crate::storage::{ChunkStore, MemoryBackend, Splitter};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use tempfile::TempDir;

    /// Serves chunks from memory but never answers for the listed hashes
    struct StallingStore {
        inner: Arc<ChunkStorageService<MemoryBackend>>,
        stalled: HashSet<String>,
    }

    #[async_trait]
    impl ChunkStoreClient for StallingStore {
        async fn store_chunk(
            &self,
            request: StoreChunkRequest,
        ) -> Result<StoreChunkResponse, ServiceError> {
            self.inner.store_chunk(request).await
        }

        async fn get_chunk(
            &self,
            request: GetChunkRequest,
        ) -> Result<GetChunkResponse, ServiceError> {
            if self.stalled.contains(&request.chunk_hash) {
                std::future::pending::<()>().await;
            }
            self.inner.get_chunk(request).await
        }
    }

    struct Fixture {
        _temp_dir: TempDir,
        service: Arc<ChunkStorageService<MemoryBackend>>,
        metadata: MetadataStore,
        splitter: Splitter,
        reconstructor: Reconstructor,
    }

    fn fixture(stripe_size: usize, k: usize, n: usize) -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let service = Arc::new(ChunkStorageService::new(
            ChunkStore::new(MemoryBackend::new()),
            8,
        ));
        let metadata = MetadataStore::new(temp_dir.path());
        let config = ErasureConfig::new(k, n);

        let splitter =
            Splitter::new(stripe_size, config, service.clone(), metadata.clone()).unwrap();
        let reconstructor = Reconstructor::new(config, service.clone(), metadata.clone()).unwrap();

        Fixture {
            _temp_dir: temp_dir,
            service,
            metadata,
            splitter,
            reconstructor,
        }
    }

    #[tokio::test]
    async fn test_roundtrip_file() {
        let fx = fixture(64, 3, 5);
        let content: Vec<u8> = (0..1000).map(|i| (i * 7 % 256) as u8).collect();

        let report = fx.splitter.split_file(&content).await.unwrap();
        let rebuilt = fx.reconstructor.reconstruct_file(&report.file_hash).await.unwrap();

        assert_eq!(rebuilt, content);
    }

    #[tokio::test]
    async fn test_trailing_zeros_survive() {
        let fx = fixture(16, 2, 4);
        let mut content = b"ends with zeros".to_vec();
        content.extend_from_slice(&[0u8; 20]);

        let report = fx.splitter.split_file(&content).await.unwrap();
        let rebuilt = fx.reconstructor.reconstruct_file(&report.file_hash).await.unwrap();

        assert_eq!(rebuilt, content);
    }

    #[tokio::test]
    async fn test_exact_multiple_and_empty() {
        let fx = fixture(8, 2, 3);

        let aligned = vec![0xAB; 32];
        let report = fx.splitter.split_file(&aligned).await.unwrap();
        assert_eq!(fx.reconstructor.reconstruct_file(&report.file_hash).await.unwrap(), aligned);

        let report = fx.splitter.split_file(b"").await.unwrap();
        assert!(fx.reconstructor.reconstruct_file(&report.file_hash).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_survives_lost_chunks() {
        let fx = fixture(32, 3, 6);
        let content = b"lose up to three chunks per stripe and still recover".to_vec();

        let report = fx.splitter.split_file(&content).await.unwrap();
        for stripe in &report.record.stripes {
            for hash in stripe.chunk_hashes().take(3) {
                fx.service.store().backend().forget(&ContentHash::from_hex(hash).unwrap());
            }
        }

        let rebuilt = fx.reconstructor.reconstruct_file(&report.file_hash).await.unwrap();
        assert_eq!(rebuilt, content);
    }

    #[tokio::test]
    async fn test_stops_fetching_at_k_shards() {
        let fx = fixture(32, 3, 6);
        let content = b"three answers are enough, the rest may never reply".to_vec();
        let report = fx.splitter.split_file(&content).await.unwrap();

        let stalled = report
            .record
            .stripes
            .iter()
            .flat_map(|stripe| stripe.chunk_hashes().skip(3).map(String::from))
            .collect();
        let client = Arc::new(StallingStore {
            inner: fx.service.clone(),
            stalled,
        });
        let reconstructor =
            Reconstructor::new(ErasureConfig::new(3, 6), client, fx.metadata.clone())
                .unwrap()
                .with_fetch_timeout(Duration::from_secs(3600));

        let rebuilt = tokio::time::timeout(
            Duration::from_secs(10),
            reconstructor.reconstruct_file(&report.file_hash),
        )
        .await
        .expect("reconstruction waited on stalled chunks")
        .unwrap();
        assert_eq!(rebuilt, content);
    }

    #[tokio::test]
    async fn test_too_many_lost_chunks() {
        let fx = fixture(32, 3, 5);
        let report = fx.splitter.split_file(b"short").await.unwrap();

        for hash in report.record.stripes[0].chunk_hashes().skip(2) {
            fx.service.store().backend().forget(&ContentHash::from_hex(hash).unwrap());
        }

        let err = fx.reconstructor.reconstruct_file(&report.file_hash).await.unwrap_err();
        assert!(matches!(err, StorageError::StripeUnrecoverable { stripe_index: 0, .. }));
    }

    #[tokio::test]
    async fn test_corrupt_shard_is_skipped() {
        let fx = fixture(32, 2, 4);
        let content = b"a corrupted shard is just a missing shard".to_vec();
        let report = fx.splitter.split_file(&content).await.unwrap();

        let stripe = &report.record.stripes[0];
        let mut shards: Vec<Option<Vec<u8>>> = Vec::new();
        for hash in stripe.chunk_hashes() {
            shards.push(fx.service.store().retrieve_chunk(hash).await.unwrap());
        }
        if let Some(data) = shards[0].as_mut() {
            data[0] ^= 0xFF;
        }

        let padded = fx.reconstructor.reconstruct_stripe(stripe, shards).unwrap();
        assert_eq!(ContentHash::hash(&padded).to_hex(), stripe.stripe_hash);
    }

    #[test]
    fn test_strip_trailing_padding() {
        let original = b"abc\0".to_vec();
        let mut padded = original.clone();
        padded.resize(8, 0);

        let stripped = strip_trailing_padding(padded, 8, &ContentHash::hash(&original)).unwrap();
        assert_eq!(stripped, original);

        let wrong = strip_trailing_padding(vec![1, 0, 0], 3, &ContentHash::hash(b"zz"));
        assert!(matches!(wrong, Err(StorageError::IntegrityCheckFailed { .. })));
    }
}
