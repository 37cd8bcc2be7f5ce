//! File change detection for one document.
//!
//! The parent directory is watched instead of the file itself: editors that
//! save through a temporary file and a rename replace the inode, which would
//! silently end a watch registered on the file. Events are filtered by file
//! name and forwarded to a tokio channel.
//!
//! The native backend (inotify, FSEvents, ...) is preferred, with a fallback
//! to polling when it is unavailable.

use crate::error::PreviewError;
use notify::event::ModifyKind;
use notify::{Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// What happened to the watched file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Write,
    Delete,
    Rename,
}

impl ChangeKind {
    /// Delete and rename may leave the watch pointing at a stale entry.
    pub fn requires_reattach(&self) -> bool {
        matches!(self, Self::Delete | Self::Rename)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
}

/// Configuration for the file watcher.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Polling interval of the fallback backend.
    pub poll_interval: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
        }
    }
}

fn classify(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Modify(ModifyKind::Name(_)) => Some(ChangeKind::Rename),
        EventKind::Remove(_) => Some(ChangeKind::Delete),
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any => Some(ChangeKind::Write),
        EventKind::Access(_) | EventKind::Other => None,
    }
}

fn event_handler(
    document: PathBuf,
    file_name: OsString,
    tx: UnboundedSender<ChangeEvent>,
) -> impl FnMut(notify::Result<Event>) + Send + 'static {
    move |res: notify::Result<Event>| match res {
        Ok(event) => {
            let is_target_file = event
                .paths
                .iter()
                .any(|p| p.file_name() == Some(file_name.as_os_str()));

            if !is_target_file {
                return;
            }

            if let Some(kind) = classify(&event.kind) {
                tracing::trace!(?kind, path = %document.display(), "File change detected");
                let _ = tx.send(ChangeEvent {
                    kind,
                    path: document.clone(),
                });
            }
        }
        Err(e) => {
            tracing::error!(?e, "File watcher error");
        }
    }
}

/// Watches a single file and reports its changes.
///
/// Dropping the watcher (or calling [`ChangeWatcher::stop`]) releases the
/// backend, after which the event stream ends.
pub struct ChangeWatcher {
    path: PathBuf,
    watch_dir: PathBuf,
    backend: Option<Box<dyn Watcher + Send>>,
}

impl std::fmt::Debug for ChangeWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeWatcher")
            .field("path", &self.path)
            .field("watch_dir", &self.watch_dir)
            .field("active", &self.backend.is_some())
            .finish()
    }
}

impl ChangeWatcher {
    /// Starts watching `path`, returning the watcher and its event stream.
    pub fn watch(
        path: &Path,
        config: &WatcherConfig,
    ) -> Result<(Self, UnboundedReceiver<ChangeEvent>), PreviewError> {
        let file_name = path
            .file_name()
            .ok_or_else(|| PreviewError::watch_unavailable(path, "path has no file name"))?
            .to_os_string();
        let watch_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        // The poll backend accepts a missing directory and then reports nothing.
        if !watch_dir.is_dir() {
            return Err(PreviewError::watch_unavailable(
                path,
                format!("directory {} does not exist", watch_dir.display()),
            ));
        }

        let (tx, rx) = unbounded_channel();

        let native = RecommendedWatcher::new(
            event_handler(path.to_path_buf(), file_name.clone(), tx.clone()),
            notify::Config::default(),
        )
        .and_then(|mut watcher| {
            watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;
            Ok(watcher)
        });

        let backend: Box<dyn Watcher + Send> = match native {
            Ok(watcher) => {
                tracing::debug!(path = %path.display(), "Started native file watcher");
                Box::new(watcher)
            }
            Err(err) => {
                tracing::warn!(
                    ?err,
                    path = %path.display(),
                    "Native file watcher failed, falling back to polling"
                );
                let mut watcher = PollWatcher::new(
                    event_handler(path.to_path_buf(), file_name, tx),
                    notify::Config::default().with_poll_interval(config.poll_interval),
                )
                .map_err(|e| PreviewError::watch_unavailable(path, e))?;
                watcher
                    .watch(&watch_dir, RecursiveMode::NonRecursive)
                    .map_err(|e| PreviewError::watch_unavailable(path, e))?;
                tracing::debug!(
                    path = %path.display(),
                    poll_interval_ms = config.poll_interval.as_millis() as u64,
                    "Started polling file watcher"
                );
                Box::new(watcher)
            }
        };

        Ok((
            Self {
                path: path.to_path_buf(),
                watch_dir,
                backend: Some(backend),
            },
            rx,
        ))
    }

    pub fn is_active(&self) -> bool {
        self.backend.is_some()
    }

    /// Registers the directory watch again.
    ///
    /// Called after the file was deleted or renamed, so that a file recreated
    /// under the same name keeps being observed.
    pub fn reattach(&mut self) -> Result<(), PreviewError> {
        let Some(backend) = self.backend.as_mut() else {
            return Ok(());
        };

        let _ = backend.unwatch(&self.watch_dir);
        backend
            .watch(&self.watch_dir, RecursiveMode::NonRecursive)
            .map_err(|e| PreviewError::watch_unavailable(&self.path, e))?;

        tracing::debug!(path = %self.path.display(), "Re-attached file watcher");

        Ok(())
    }

    /// Stops watching. The event stream ends once the backend shut down.
    pub fn stop(&mut self) {
        if self.backend.take().is_some() {
            tracing::debug!(path = %self.path.display(), "Stopped file watcher");
        }
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind, RenameMode};

    async fn next_event(rx: &mut UnboundedReceiver<ChangeEvent>) -> Option<ChangeEvent> {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .ok()
            .flatten()
    }

    #[test]
    fn test_watcher_config_default() {
        let config = WatcherConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            classify(&EventKind::Modify(ModifyKind::Name(RenameMode::Both))),
            Some(ChangeKind::Rename)
        );
        assert_eq!(
            classify(&EventKind::Remove(RemoveKind::File)),
            Some(ChangeKind::Delete)
        );
        assert_eq!(
            classify(&EventKind::Create(CreateKind::File)),
            Some(ChangeKind::Write)
        );
        assert_eq!(
            classify(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            Some(ChangeKind::Write)
        );
        assert_eq!(
            classify(&EventKind::Access(notify::event::AccessKind::Any)),
            None
        );
        assert!(ChangeKind::Delete.requires_reattach());
        assert!(ChangeKind::Rename.requires_reattach());
        assert!(!ChangeKind::Write.requires_reattach());
    }

    #[tokio::test]
    async fn test_reports_writes_to_target_file_only() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("doc.md");
        std::fs::write(&doc, "# v1").unwrap();

        let (watcher, mut rx) = ChangeWatcher::watch(&doc, &WatcherConfig::default()).unwrap();
        assert!(watcher.is_active());

        std::fs::write(dir.path().join("other.md"), "noise").unwrap();
        std::fs::write(&doc, "# v2").unwrap();

        let event = next_event(&mut rx).await.expect("change event");
        assert_eq!(event.path, doc);
    }

    #[tokio::test]
    async fn test_survives_replace_by_rename() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("doc.md");
        std::fs::write(&doc, "# v1").unwrap();

        let (mut watcher, mut rx) = ChangeWatcher::watch(&doc, &WatcherConfig::default()).unwrap();

        let tmp = dir.path().join("doc.md.tmp");
        std::fs::write(&tmp, "# v2").unwrap();
        std::fs::rename(&tmp, &doc).unwrap();
        assert!(next_event(&mut rx).await.is_some());

        watcher.reattach().unwrap();
        while rx.try_recv().is_ok() {}

        std::fs::write(&doc, "# v3").unwrap();
        assert!(next_event(&mut rx).await.is_some());
    }

    #[tokio::test]
    async fn test_missing_directory_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("later").join("doc.md");

        let err = ChangeWatcher::watch(&doc, &WatcherConfig::default()).unwrap_err();
        assert!(matches!(err, PreviewError::WatchUnavailable { path, .. } if path == doc));
    }

    #[tokio::test]
    async fn test_stop_ends_stream() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("doc.md");
        std::fs::write(&doc, "# v1").unwrap();

        let (mut watcher, mut rx) = ChangeWatcher::watch(&doc, &WatcherConfig::default()).unwrap();
        watcher.stop();
        assert!(!watcher.is_active());
        // Stopping twice is harmless.
        watcher.stop();

        assert_eq!(next_event(&mut rx).await, None);
    }
}
