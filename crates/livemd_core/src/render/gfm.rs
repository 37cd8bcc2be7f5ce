//! GitHub Flavored Markdown rendering through comrak's built-in HTML output.

use comrak::Options;

/// Options with the GFM extensions switched on.
///
/// Raw HTML is passed through, with the tag filter neutralizing the tags
/// GitHub disallows (`<script>`, `<iframe>`, `<style>`, ...).
fn gfm_options() -> Options {
    let mut options = Options::default();

    options.extension.table = true;
    options.extension.strikethrough = true;
    options.extension.autolink = true;
    options.extension.tagfilter = true;
    options.extension.tasklist = true;

    options.render.unsafe_ = true;

    options
}

/// Renders markdown to an HTML fragment with all GFM extensions enabled.
pub fn to_html(markdown: &str) -> String {
    comrak::markdown_to_html(markdown, &gfm_options())
}
