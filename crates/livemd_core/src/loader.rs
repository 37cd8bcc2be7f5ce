//! Reading the document source with bounded retry.
//!
//! Editors often rewrite files non-atomically (truncate, then write), so a read
//! right after a change notification may hit an empty, missing or half-written
//! file. Failed reads are retried a few times with an increasing delay.

use crate::error::PreviewError;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Source of the raw document text.
#[async_trait::async_trait]
pub trait SourceReader: Send + Sync {
    async fn read(&self, path: &Path) -> std::io::Result<String>;
}

/// Reads the document from the file system.
///
/// Content that is not valid UTF-8 is reported as [`std::io::ErrorKind::InvalidData`]
/// and therefore retried like any other failed read.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsReader;

#[async_trait::async_trait]
impl SourceReader for FsReader {
    async fn read(&self, path: &Path) -> std::io::Result<String> {
        tokio::fs::read_to_string(path).await
    }
}

/// How often and how long to wait before giving up on a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of attempts after the first one.
    pub max_retries: usize,
    /// The delay before retry `n` is `step * n`.
    pub step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            step: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    /// Delay before the given retry (1-indexed).
    pub fn delay_for(&self, retry: usize) -> Duration {
        self.step * retry as u32
    }

    /// Total number of read attempts, including the first one.
    pub fn total_attempts(&self) -> usize {
        self.max_retries + 1
    }
}

/// Loads the document text, retrying transient failures.
#[derive(Clone)]
pub struct DocumentLoader {
    reader: Arc<dyn SourceReader>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for DocumentLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentLoader")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Default for DocumentLoader {
    fn default() -> Self {
        Self::new(Arc::new(FsReader), RetryPolicy::default())
    }
}

impl DocumentLoader {
    pub fn new(reader: Arc<dyn SourceReader>, policy: RetryPolicy) -> Self {
        Self { reader, policy }
    }

    /// Reads the document at `path`.
    ///
    /// The retry delays are timer awaits on the calling task, so the caller
    /// stays responsive to cancellation while waiting.
    pub async fn load(&self, path: &Path) -> Result<String, PreviewError> {
        let mut retry = 0;

        loop {
            match self.reader.read(path).await {
                Ok(text) => {
                    if retry > 0 {
                        tracing::debug!(path = %path.display(), retry, "Read succeeded after retrying");
                    }
                    return Ok(text);
                }
                Err(err) if retry < self.policy.max_retries => {
                    retry += 1;
                    let delay = self.policy.delay_for(retry);
                    tracing::debug!(
                        path = %path.display(),
                        %err,
                        retry,
                        delay_ms = delay.as_millis() as u64,
                        "Failed to read document, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(source) => {
                    tracing::warn!(path = %path.display(), error = %source, "Giving up reading document");
                    return Err(PreviewError::ReadFailed {
                        path: path.to_path_buf(),
                        attempts: retry + 1,
                        source,
                    });
                }
            }
        }
    }
}
