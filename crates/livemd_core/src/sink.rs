//! The display side of the pipeline.

use crate::assets::HtmlPage;
use std::path::Path;

/// Something able to show a rendered page.
///
/// The orchestrator calls these methods from the document task only, one
/// at a time.
#[async_trait::async_trait]
pub trait DisplaySink: Send + Sync {
    /// Replaces the displayed page. `base_url` is the document directory,
    /// for sinks resolving relative references themselves.
    ///
    /// Returns once the page finished loading.
    async fn load_page(&self, page: &HtmlPage, base_url: &Path);

    /// Current vertical scroll offset, `None` if unknown.
    async fn current_scroll_offset(&self) -> Option<f64>;

    async fn scroll_to(&self, offset: f64);
}
