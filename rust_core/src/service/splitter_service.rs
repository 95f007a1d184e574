//! File splitter service - serves SplitFile

use super::protocol::{SplitFileRequest, SplitFileResponse};
use super::ServiceError;
use crate::storage::{SplitReport, Splitter, StorageError};

use std::sync::Arc;
use tokio::sync::Semaphore;

/// Serves split requests with at most `max_concurrent` in flight.
///
/// Every request accumulates its stripes locally; the only state shared
/// between requests is the splitter's synchronized file registry.
pub struct FileSplitterService {
    splitter: Arc<Splitter>,
    permits: Semaphore,
}

impl FileSplitterService {
    pub fn new(splitter: Arc<Splitter>, max_concurrent: usize) -> Self {
        Self {
            splitter,
            permits: Semaphore::new(max_concurrent.max(1)),
        }
    }

    pub fn splitter(&self) -> &Arc<Splitter> {
        &self.splitter
    }

    /// Typed entry point: the full report or the error with per-stripe detail
    pub async fn split(&self, request: SplitFileRequest) -> Result<SplitReport, ServiceError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ServiceError::Unavailable("splitter service closed".into()))?;

        Ok(self.splitter.split_file(&request.content).await?)
    }

    /// Wire entry point: SplitFile(content) -> { message }
    pub async fn split_file(&self, request: SplitFileRequest) -> SplitFileResponse {
        let size = request.content.len();

        let message = match self.split(request).await {
            Ok(report) => format!("File split and stored successfully: {}", report.file_hash),
            Err(ServiceError::Storage(StorageError::SplitFailed(failures))) => {
                let indexes: Vec<String> =
                    failures.iter().map(|f| f.stripe_index.to_string()).collect();
                tracing::warn!(size, stripes = %indexes.join(","), "SplitFile failed");
                format!(
                    "File split failed for stripe(s) {}: {}",
                    indexes.join(", "),
                    StorageError::SplitFailed(failures)
                )
            }
            Err(e) => {
                tracing::warn!(size, error = %e, "SplitFile failed");
                format!("File split failed: {}", e)
            }
        };

        SplitFileResponse { message }
    }
}
