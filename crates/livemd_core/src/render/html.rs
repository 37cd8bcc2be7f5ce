//! HTML generation from the markup node tree.

use super::tree::{ListItem, MarkupNode};

/// Appends `text` to `out` with `&`, `<`, `>`, `"` and `'` escaped.
pub fn push_escaped(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
}

/// Returns `text` with HTML special characters escaped.
///
/// # Example
///
/// ```
/// use livemd_core::render::escape_html;
///
/// assert_eq!(escape_html("<a href='x'>"), "&lt;a href=&#39;x&#39;&gt;");
/// ```
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    push_escaped(&mut out, text);
    out
}

/// Renders a parsed document to an HTML fragment.
pub fn render_nodes(nodes: &[MarkupNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        render_block(node, &mut out);
    }
    out
}

fn render_block(node: &MarkupNode, out: &mut String) {
    match node {
        MarkupNode::Heading { level, children } => {
            out.push_str(&format!("<h{level}>"));
            render_inline_children(children, out);
            out.push_str(&format!("</h{level}>\n"));
        }
        MarkupNode::Paragraph(children) => {
            out.push_str("<p>");
            render_inline_children(children, out);
            out.push_str("</p>\n");
        }
        MarkupNode::UnorderedList(items) => render_list("ul", items, out),
        MarkupNode::OrderedList(items) => render_list("ol", items, out),
        MarkupNode::CodeBlock { language, code } => {
            out.push_str("<pre><code class=\"language-");
            push_escaped(out, language.as_deref().unwrap_or_default());
            out.push_str("\">");
            push_escaped(out, code.trim_end_matches(|c| c == '\n' || c == '\r'));
            out.push_str("</code></pre>\n");
        }
        MarkupNode::BlockQuote(children) => {
            out.push_str("<blockquote>\n");
            for child in children {
                render_block(child, out);
            }
            out.push_str("</blockquote>\n");
        }
        MarkupNode::ThematicBreak => out.push_str("<hr>\n"),
        MarkupNode::Other(children) => {
            for child in children {
                render_block(child, out);
            }
        }
        inline => render_inline(inline, out),
    }
}

/// List items keep their inline content only, nested blocks are flattened.
fn render_list(tag: &str, items: &[ListItem], out: &mut String) {
    out.push_str(&format!("<{tag}>\n"));
    for item in items {
        out.push_str("<li>");
        render_inline_children(&item.children, out);
        out.push_str("</li>\n");
    }
    out.push_str(&format!("</{tag}>\n"));
}

fn render_inline_children(children: &[MarkupNode], out: &mut String) {
    for child in children {
        render_inline(child, out);
    }
}

fn render_inline(node: &MarkupNode, out: &mut String) {
    match node {
        MarkupNode::Text(text) => push_escaped(out, text),
        MarkupNode::Strong(children) => {
            out.push_str("<strong>");
            render_inline_children(children, out);
            out.push_str("</strong>");
        }
        MarkupNode::Emphasis(children) => {
            out.push_str("<em>");
            render_inline_children(children, out);
            out.push_str("</em>");
        }
        MarkupNode::InlineCode(code) => {
            out.push_str("<code>");
            push_escaped(out, code);
            out.push_str("</code>");
        }
        MarkupNode::Link {
            destination,
            children,
        } => {
            out.push_str("<a href=\"");
            push_escaped(out, destination);
            out.push_str("\">");
            render_inline_children(children, out);
            out.push_str("</a>");
        }
        MarkupNode::Image {
            source,
            title,
            children,
        } => {
            out.push_str("<img src=\"");
            push_escaped(out, source);
            out.push_str("\" alt=\"");
            push_escaped(out, &plain_text(children));
            out.push_str("\" title=\"");
            push_escaped(out, title);
            out.push_str("\">");
        }
        MarkupNode::LineBreak => out.push_str("<br>"),
        MarkupNode::SoftBreak => out.push(' '),
        MarkupNode::UnorderedList(items) | MarkupNode::OrderedList(items) => {
            for item in items {
                render_inline_children(&item.children, out);
            }
        }
        other => render_inline_children(other.children(), out),
    }
}

/// Concatenated text content, used for attribute values such as `alt`.
fn plain_text(nodes: &[MarkupNode]) -> String {
    let mut text = String::new();
    for node in nodes {
        match node {
            MarkupNode::Text(t) | MarkupNode::InlineCode(t) => text.push_str(t),
            MarkupNode::SoftBreak | MarkupNode::LineBreak => text.push(' '),
            other => text.push_str(&plain_text(other.children())),
        }
    }
    text
}
