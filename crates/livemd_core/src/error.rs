//! Error types of the preview pipeline.
//!
//! None of these errors is fatal: a failed read turns into an error page, an
//! unreadable image keeps its original reference and an unavailable watcher
//! leaves the document displayed without live reload.

use std::path::PathBuf;

/// Error type for the preview pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    /// The document could not be read, even after retrying.
    #[error("failed to read {path:?} after {attempts} attempts: {source}")]
    ReadFailed {
        path: PathBuf,
        attempts: usize,
        #[source]
        source: std::io::Error,
    },

    /// A local image referenced by the document could not be read.
    #[error("failed to read image {path:?}: {source}")]
    ImageUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No file system watch could be registered for the document.
    #[error("unable to watch {path:?}: {reason}")]
    WatchUnavailable { path: PathBuf, reason: String },
}

impl PreviewError {
    pub(crate) fn watch_unavailable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::WatchUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
