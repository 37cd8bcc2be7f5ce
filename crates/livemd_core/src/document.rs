//! Document identity and lifecycle states.
//!
//! A document is identified by its absolute path. [`DocumentState`] is the
//! per-document state machine driven by the orchestrator.

use std::path::{Path, PathBuf};

/// Lowercase file extensions recognized as markdown.
pub const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown", "mdown", "mkdn", "mkd"];

/// Returns `true` if the path has a markdown extension (case-insensitive).
///
/// # Examples
///
/// ```
/// use livemd_core::document::is_markdown_path;
/// use std::path::Path;
///
/// assert!(is_markdown_path(Path::new("README.md")));
/// assert!(is_markdown_path(Path::new("notes.MARKDOWN")));
/// assert!(!is_markdown_path(Path::new("file")));
/// ```
pub fn is_markdown_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            MARKDOWN_EXTENSIONS.iter().any(|e| *e == ext)
        })
        .unwrap_or(false)
}

/// Resolves `path` to the absolute path used as the document key.
///
/// The path is canonicalized when it exists. A missing file is still a valid
/// document (it may appear later), in which case the path is made absolute
/// against the current directory.
pub fn absolute_document_path(path: &Path) -> std::io::Result<PathBuf> {
    match path.canonicalize() {
        Ok(canonical) => Ok(canonical),
        Err(_) if path.is_absolute() => Ok(path.to_path_buf()),
        Err(_) => Ok(std::env::current_dir()?.join(path)),
    }
}

/// Title shown by display sinks for a document.
pub fn display_title(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Per-document render state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DocumentState {
    #[default]
    Idle,
    Loading,
    Rendering,
    Displayed,
    /// The document could not be read; an error page is shown until the next
    /// change event.
    ErrorDisplayed,
}

impl DocumentState {
    /// Whether a page (regular or error page) is currently shown.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Displayed | Self::ErrorDisplayed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_extensions() {
        for ext in MARKDOWN_EXTENSIONS {
            assert!(is_markdown_path(Path::new(&format!("doc.{ext}"))));
        }
        assert!(is_markdown_path(Path::new("/path/to/DOC.Md")));
        assert!(!is_markdown_path(Path::new("/path/to/file.txt")));
        assert!(!is_markdown_path(Path::new("md")));
    }

    #[test]
    fn test_absolute_document_path_for_missing_file() {
        let path = absolute_document_path(Path::new("does-not-exist-yet.md")).unwrap();
        assert!(path.is_absolute());
        assert!(path.ends_with("does-not-exist-yet.md"));
    }

    #[test]
    fn test_display_title() {
        assert_eq!(display_title(Path::new("/notes/todo.md")), "todo.md");
        assert_eq!(display_title(Path::new("/")), "/");
    }

    #[test]
    fn test_settled_states() {
        assert!(DocumentState::Displayed.is_settled());
        assert!(DocumentState::ErrorDisplayed.is_settled());
        assert!(!DocumentState::Loading.is_settled());
        assert!(!DocumentState::Idle.is_settled());
    }
}
