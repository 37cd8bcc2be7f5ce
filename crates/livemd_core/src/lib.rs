//! Live markdown preview pipeline.
//!
//! A document is watched for changes, re-read with bounded retry, rendered to
//! HTML, has its local images inlined, is wrapped into a styled page and is
//! handed to a [`DisplaySink`], keeping the scroll position across reloads.
//!
//! # Modules
//!
//! - [`watcher`] - File change detection
//! - [`loader`] - Reading the document with retry
//! - [`render`] - Markdown to HTML conversion
//! - [`images`] - Inlining of local images as `data:` URLs
//! - [`assets`] - Page template and composition
//! - [`scroll`] - Persisted scroll offsets
//! - [`orchestrator`] - The per-document reload loop

pub mod assets;
pub mod document;
pub mod error;
pub mod images;
pub mod loader;
pub mod orchestrator;
pub mod render;
pub mod scroll;
pub mod sink;
pub mod watcher;

pub use assets::{HtmlPage, PageComposer};
pub use document::{display_title, is_markdown_path, DocumentState};
pub use error::PreviewError;
pub use loader::{DocumentLoader, RetryPolicy, SourceReader};
pub use orchestrator::{DocumentHandle, OrchestratorConfig, RenderOrchestrator};
pub use render::{MarkdownRenderer, RendererKind};
pub use scroll::ScrollStateStore;
pub use sink::DisplaySink;
pub use watcher::{ChangeEvent, ChangeKind, ChangeWatcher, WatcherConfig};

/// Renders `markdown` into a complete page, without watching.
///
/// Local images are resolved against `base_dir`.
pub fn render_page(
    markdown: &str,
    base_dir: &std::path::Path,
    renderer: RendererKind,
) -> HtmlPage {
    let fragment = MarkdownRenderer::new(renderer).render(markdown);
    let fragment = images::inline_images(&fragment, base_dir);
    PageComposer::new().compose(&fragment)
}
