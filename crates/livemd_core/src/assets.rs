//! Embedded page template and the composer filling it.
//!
//! The template carries the stylesheet and the highlight.js hookup; the
//! rendered fragment becomes the body of `<article class="markdown-body">`.

/// HTML template with placeholders for the stylesheet and the content.
pub const PAGE_TEMPLATE: &str = include_str!("../assets/page.html");

/// GitHub-like stylesheet inlined into every page.
pub const GITHUB_CSS: &str = include_str!("../assets/github.css");

const STYLES_PLACEHOLDER: &str = "/*__STYLES_CSS__*/";
const CONTENT_PLACEHOLDER: &str = "<!--__CONTENT__-->";

/// Body of the page shown when the document cannot be read.
pub const ERROR_FRAGMENT: &str =
    "<div class=\"livemd-error\"><h1>Error</h1><p>Could not read file</p></div>\n";

/// A complete HTML document, ready to be handed to a display sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlPage(String);

impl HtmlPage {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for HtmlPage {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for HtmlPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Wraps HTML fragments into the fixed page template.
#[derive(Debug, Clone)]
pub struct PageComposer {
    /// Template with the stylesheet already inlined.
    shell: String,
}

impl Default for PageComposer {
    fn default() -> Self {
        Self {
            shell: PAGE_TEMPLATE.replace(STYLES_PLACEHOLDER, GITHUB_CSS),
        }
    }
}

impl PageComposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the full page around `fragment`.
    ///
    /// The fragment is inserted as-is, it must already be escaped.
    pub fn compose(&self, fragment: &str) -> HtmlPage {
        HtmlPage(self.shell.replacen(CONTENT_PLACEHOLDER, fragment, 1))
    }

    /// The fixed page displayed after a failed read.
    pub fn error_page(&self) -> HtmlPage {
        self.compose(ERROR_FRAGMENT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_placeholders_exist() {
        assert!(PAGE_TEMPLATE.contains("<!DOCTYPE html>"));
        assert!(PAGE_TEMPLATE.contains(STYLES_PLACEHOLDER));
        assert!(PAGE_TEMPLATE.contains(CONTENT_PLACEHOLDER));
        assert!(!GITHUB_CSS.is_empty());
    }

    #[test]
    fn test_compose() {
        let page = PageComposer::new().compose("<h1>Title</h1>\n");
        let html = page.as_str();

        assert!(html.contains("<article class=\"markdown-body\">\n<h1>Title</h1>\n"));
        assert!(html.contains(".markdown-body pre"));
        assert!(html.contains("highlight.js/11.9.0/highlight.min.js"));
        assert!(html.contains("hljs.highlightElement(block)"));
        assert!(!html.contains(STYLES_PLACEHOLDER));
        assert!(!html.contains(CONTENT_PLACEHOLDER));
    }

    #[test]
    fn test_fragment_containing_placeholder_text() {
        // Only the template's own placeholder is substituted.
        let page = PageComposer::new().compose("<p>&lt;!--__CONTENT__--&gt;</p>");
        assert_eq!(page.as_str().matches("__CONTENT__").count(), 1);
    }

    #[test]
    fn test_compose_is_pure() {
        let composer = PageComposer::new();
        assert_eq!(composer.compose("<p>x</p>"), composer.compose("<p>x</p>"));
    }

    #[test]
    fn test_error_page() {
        let page = PageComposer::new().error_page();
        assert!(page.as_str().contains("<h1>Error</h1><p>Could not read file</p>"));
        assert!(page.as_str().contains("markdown-body"));
    }
}
