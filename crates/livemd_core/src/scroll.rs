//! Per-document scroll offsets, persisted across runs.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
struct Inner {
    offsets: BTreeMap<PathBuf, f64>,
    dirty: bool,
}

/// Remembers the last vertical scroll offset of each document.
///
/// The table is shared by all open documents; writes overwrite by key.
/// Nothing is written to disk until [`ScrollStateStore::flush`].
#[derive(Debug, Default)]
pub struct ScrollStateStore {
    /// Backing JSON file, `None` for a store that is never persisted.
    file: Option<PathBuf>,
    inner: Mutex<Inner>,
}

fn sanitize(offset: f64) -> f64 {
    if offset.is_finite() && offset > 0.0 {
        offset
    } else {
        0.0
    }
}

impl ScrollStateStore {
    /// Creates a store that lives in memory only.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens the store backed by `file`, loading the offsets saved there.
    ///
    /// A missing or malformed file results in an empty store.
    pub fn open(file: impl Into<PathBuf>) -> Self {
        let file = file.into();
        let offsets = Self::load(&file);
        Self {
            file: Some(file),
            inner: Mutex::new(Inner {
                offsets,
                dirty: false,
            }),
        }
    }

    fn load(file: &Path) -> BTreeMap<PathBuf, f64> {
        if !file.exists() {
            tracing::debug!(path = %file.display(), "No scroll state file found");
            return BTreeMap::new();
        }

        match std::fs::read_to_string(file) {
            Ok(content) => match serde_json::from_str::<BTreeMap<PathBuf, f64>>(&content) {
                Ok(offsets) => {
                    tracing::debug!(count = offsets.len(), "Loaded scroll state");
                    offsets
                        .into_iter()
                        .map(|(path, offset)| (path, sanitize(offset)))
                        .collect()
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to parse scroll state file");
                    BTreeMap::new()
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read scroll state file");
                BTreeMap::new()
            }
        }
    }

    /// Last known offset of `document`, 0 if never recorded.
    pub fn get(&self, document: &Path) -> f64 {
        self.inner
            .lock()
            .offsets
            .get(document)
            .copied()
            .unwrap_or(0.0)
    }

    /// Records the offset of `document`. Negative and non-finite values are stored as 0.
    pub fn set(&self, document: &Path, offset: f64) {
        let offset = sanitize(offset);
        let mut inner = self.inner.lock();
        let previous = inner.offsets.insert(document.to_path_buf(), offset);
        if previous != Some(offset) {
            inner.dirty = true;
        }
    }

    /// Writes the table to disk if anything changed since the last flush.
    ///
    /// The file is replaced atomically through a temporary sibling.
    pub fn flush(&self) -> std::io::Result<()> {
        let Some(file) = &self.file else {
            return Ok(());
        };

        // Offsets set while writing mark the store dirty again.
        let content = {
            let mut inner = self.inner.lock();
            if !inner.dirty {
                return Ok(());
            }
            let content = serde_json::to_string_pretty(&inner.offsets)?;
            inner.dirty = false;
            content
        };

        if let Err(err) = Self::write(file, content) {
            self.inner.lock().dirty = true;
            return Err(err);
        }

        tracing::debug!(path = %file.display(), "Saved scroll state");

        Ok(())
    }

    fn write(file: &Path, content: String) -> std::io::Result<()> {
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = file.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_offset_is_zero() {
        let store = ScrollStateStore::in_memory();
        assert_eq!(store.get(Path::new("/a.md")), 0.0);
    }

    #[test]
    fn test_set_sanitizes_offsets() {
        let store = ScrollStateStore::in_memory();
        let doc = Path::new("/a.md");

        store.set(doc, 240.0);
        assert_eq!(store.get(doc), 240.0);

        store.set(doc, -5.0);
        assert_eq!(store.get(doc), 0.0);

        store.set(doc, f64::NAN);
        assert_eq!(store.get(doc), 0.0);

        store.set(doc, f64::INFINITY);
        assert_eq!(store.get(doc), 0.0);
    }

    #[test]
    fn test_persist_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("state").join("scroll_state.json");

        let store = ScrollStateStore::open(&file);
        store.set(Path::new("/notes/a.md"), 240.0);
        store.set(Path::new("/notes/b.md"), 12.5);
        store.flush().unwrap();
        assert!(file.exists());
        assert!(!file.with_extension("json.tmp").exists());

        let reloaded = ScrollStateStore::open(&file);
        assert_eq!(reloaded.get(Path::new("/notes/a.md")), 240.0);
        assert_eq!(reloaded.get(Path::new("/notes/b.md")), 12.5);
    }

    #[test]
    fn test_flush_skips_clean_store() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("scroll_state.json");

        let store = ScrollStateStore::open(&file);
        store.flush().unwrap();
        assert!(!file.exists());

        store.set(Path::new("/a.md"), 1.0);
        store.flush().unwrap();
        std::fs::remove_file(&file).unwrap();

        // Setting the same value again is not a change.
        store.set(Path::new("/a.md"), 1.0);
        store.flush().unwrap();
        assert!(!file.exists());
    }

    #[test]
    fn test_failed_flush_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("state");
        std::fs::write(&blocker, "not a directory").unwrap();
        let file = blocker.join("scroll_state.json");

        let store = ScrollStateStore::open(&file);
        store.set(Path::new("/a.md"), 3.0);
        assert!(store.flush().is_err());
        assert!(store.inner.lock().dirty);

        std::fs::remove_file(&blocker).unwrap();
        store.flush().unwrap();
        assert!(!store.inner.lock().dirty);
        assert_eq!(ScrollStateStore::open(&file).get(Path::new("/a.md")), 3.0);
    }

    #[test]
    fn test_malformed_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("scroll_state.json");
        std::fs::write(&file, "not json").unwrap();

        let store = ScrollStateStore::open(&file);
        assert_eq!(store.get(Path::new("/a.md")), 0.0);
    }
}
