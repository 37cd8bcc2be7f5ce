use livemd_core::render::escape_html;
use livemd_core::{DisplaySink, HtmlPage};
use parking_lot::Mutex;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;

const SHELL_TEMPLATE: &str = include_str!("../assets/shell.html");

/// What the connected browsers should currently show.
#[derive(Debug, Clone, Default)]
pub(crate) struct PreviewState {
    /// Bumped on every page load.
    pub revision: u64,
    pub page: Option<Arc<str>>,
    /// Offset to apply once the page of `revision` finished loading.
    pub scroll_to: Option<f64>,
}

/// Messages sent by the browser shell.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub(crate) enum ClientMessage {
    /// The preview was scrolled to the given vertical offset.
    Scroll(f64),
}

/// Display sink showing pages in the browser.
///
/// The page is served at `/page` and displayed in an iframe of a small shell
/// page, which is notified over a WebSocket whenever a new page is available.
/// The shell applies scroll requests after the iframe finished loading and
/// reports the scroll offset back.
#[derive(Debug)]
pub struct BrowserSink {
    shell: String,
    state_tx: watch::Sender<PreviewState>,
    reported_offset: Mutex<Option<f64>>,
}

impl BrowserSink {
    /// Creates a sink whose browser tab is titled `title`.
    pub fn new(title: &str) -> Self {
        let (state_tx, _) = watch::channel(PreviewState::default());
        Self {
            shell: SHELL_TEMPLATE.replacen("__TITLE__", &escape_html(title), 1),
            state_tx,
            reported_offset: Mutex::new(None),
        }
    }

    pub(crate) fn shell(&self) -> &str {
        &self.shell
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<PreviewState> {
        self.state_tx.subscribe()
    }

    /// The page currently displayed.
    pub fn current_page(&self) -> Option<Arc<str>> {
        self.state_tx.borrow().page.clone()
    }

    pub fn revision(&self) -> u64 {
        self.state_tx.borrow().revision
    }

    /// Handles a text frame received from a browser.
    pub(crate) fn handle_client_message(&self, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::Scroll(offset)) => {
                tracing::trace!(offset, "Browser reported scroll offset");
                *self.reported_offset.lock() = Some(offset);
            }
            Err(err) => {
                tracing::debug!(?err, text, "Ignoring unknown browser message");
            }
        }
    }
}

#[async_trait::async_trait]
impl DisplaySink for BrowserSink {
    async fn load_page(&self, page: &HtmlPage, _base_url: &Path) {
        // Local images are inlined already, the page needs no base url.
        let page: Arc<str> = Arc::from(page.as_str());
        self.state_tx.send_modify(|state| {
            state.revision += 1;
            state.page = Some(page);
            state.scroll_to = None;
        });
        *self.reported_offset.lock() = None;
    }

    async fn current_scroll_offset(&self) -> Option<f64> {
        *self.reported_offset.lock()
    }

    async fn scroll_to(&self, offset: f64) {
        self.state_tx.send_modify(|state| state.scroll_to = Some(offset));
    }
}

/// The message bringing a client shown `last_revision` up to date with `state`.
pub(crate) fn outgoing_message(
    state: &PreviewState,
    last_revision: Option<u64>,
) -> Option<serde_json::Value> {
    state.page.as_ref()?;

    if last_revision != Some(state.revision) {
        Some(serde_json::json!({
          "type": "update_content",
          "data": {
            "revision": state.revision,
            "scroll": state.scroll_to,
          },
        }))
    } else {
        state.scroll_to.map(|offset| {
            serde_json::json!({
              "type": "scroll",
              "data": offset,
            })
        })
    }
}
