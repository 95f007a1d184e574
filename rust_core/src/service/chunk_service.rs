//! Chunk storage service - serves StoreChunk and GetChunk

use super::protocol::{
    ChunkStoreClient, GetChunkRequest, GetChunkResponse, StoreChunkRequest, StoreChunkResponse,
};
use super::ServiceError;
use crate::storage::{ChunkBackend, ChunkStore, FsBackend};

use async_trait::async_trait;
use tokio::sync::Semaphore;

/// Serves chunk requests with at most `max_concurrent` in flight
pub struct ChunkStorageService<B: ChunkBackend = FsBackend> {
    store: ChunkStore<B>,
    permits: Semaphore,
}

impl<B: ChunkBackend> ChunkStorageService<B> {
    pub fn new(store: ChunkStore<B>, max_concurrent: usize) -> Self {
        Self {
            store,
            permits: Semaphore::new(max_concurrent.max(1)),
        }
    }

    pub fn store(&self) -> &ChunkStore<B> {
        &self.store
    }
}

#[async_trait]
impl<B: ChunkBackend> ChunkStoreClient for ChunkStorageService<B> {
    async fn store_chunk(
        &self,
        request: StoreChunkRequest,
    ) -> Result<StoreChunkResponse, ServiceError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ServiceError::Unavailable("chunk storage service closed".into()))?;

        let status = self
            .store
            .store_chunk(&request.chunk_data, &request.chunk_hash)
            .await?;

        tracing::debug!(hash = %request.chunk_hash, status = status.as_str(), "StoreChunk");
        Ok(StoreChunkResponse { status })
    }

    async fn get_chunk(&self, request: GetChunkRequest) -> Result<GetChunkResponse, ServiceError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ServiceError::Unavailable("chunk storage service closed".into()))?;

        let chunk_data = self.store.retrieve_chunk(&request.chunk_hash).await?;
        Ok(GetChunkResponse { chunk_data })
    }
}
