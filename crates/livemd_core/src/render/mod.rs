//! Markdown to HTML rendering.
//!
//! Two backends are available:
//! - [`RendererKind::Tree`]: the document is parsed into a [`MarkupNode`] tree
//!   which is walked to produce the HTML fragment.
//! - [`RendererKind::Gfm`]: comrak's HTML output with tables, strikethrough,
//!   autolinks, tag filtering and task lists enabled.

mod gfm;
mod html;
mod tree;

use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub use html::{escape_html, push_escaped, render_nodes};
pub use tree::{parse, ListItem, MarkupNode};

/// Which markdown backend to render with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RendererKind {
    #[default]
    Tree,
    Gfm,
}

impl FromStr for RendererKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tree" => Ok(Self::Tree),
            "gfm" => Ok(Self::Gfm),
            other => Err(format!("unknown renderer `{other}`, expected `tree` or `gfm`")),
        }
    }
}

/// Converts markdown source into a body-only HTML fragment.
///
/// Rendering never fails: unsupported constructs degrade to their text.
///
/// # Example
///
/// ```
/// use livemd_core::render::MarkdownRenderer;
///
/// let html = MarkdownRenderer::default().render("# Hello\n\nWorld");
/// assert_eq!(html, "<h1>Hello</h1>\n<p>World</p>\n");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownRenderer {
    kind: RendererKind,
}

impl MarkdownRenderer {
    pub fn new(kind: RendererKind) -> Self {
        Self { kind }
    }

    pub fn render(&self, markdown: &str) -> String {
        match self.kind {
            RendererKind::Tree => {
                let nodes = parse(markdown);
                render_nodes(&nodes)
            }
            RendererKind::Gfm => gfm::to_html(markdown),
        }
    }
}
