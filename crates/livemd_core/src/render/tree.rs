//! The markup node tree built from the parser's event stream.

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag};

/// A node of the parsed markdown document.
///
/// The set of kinds is closed; everything the renderer has no dedicated
/// output for ends up in [`MarkupNode::Other`] with its children preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupNode {
    Heading {
        level: u8,
        children: Vec<MarkupNode>,
    },
    Paragraph(Vec<MarkupNode>),
    UnorderedList(Vec<ListItem>),
    OrderedList(Vec<ListItem>),
    CodeBlock {
        language: Option<String>,
        code: String,
    },
    BlockQuote(Vec<MarkupNode>),
    ThematicBreak,
    Text(String),
    Strong(Vec<MarkupNode>),
    Emphasis(Vec<MarkupNode>),
    InlineCode(String),
    Link {
        destination: String,
        children: Vec<MarkupNode>,
    },
    Image {
        source: String,
        title: String,
        children: Vec<MarkupNode>,
    },
    LineBreak,
    SoftBreak,
    /// Strikethrough, footnotes, metadata and any kind added by a newer parser.
    Other(Vec<MarkupNode>),
}

/// One item of an ordered or unordered list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListItem {
    pub children: Vec<MarkupNode>,
}

impl MarkupNode {
    /// Child nodes, empty for leaves.
    ///
    /// List items are not nodes themselves, a list has no direct children.
    pub fn children(&self) -> &[MarkupNode] {
        match self {
            Self::Heading { children, .. }
            | Self::Link { children, .. }
            | Self::Image { children, .. }
            | Self::Paragraph(children)
            | Self::BlockQuote(children)
            | Self::Strong(children)
            | Self::Emphasis(children)
            | Self::Other(children) => children,
            Self::UnorderedList(_)
            | Self::OrderedList(_)
            | Self::CodeBlock { .. }
            | Self::ThematicBreak
            | Self::Text(_)
            | Self::InlineCode(_)
            | Self::LineBreak
            | Self::SoftBreak => &[],
        }
    }
}

#[derive(Debug)]
enum FrameKind {
    Paragraph,
    Heading(u8),
    BlockQuote,
    CodeBlock(Option<String>),
    List { ordered: bool },
    Item,
    Emphasis,
    Strong,
    Link { destination: String },
    Image { source: String, title: String },
    Other,
}

#[derive(Debug)]
struct Frame {
    kind: FrameKind,
    children: Vec<MarkupNode>,
    items: Vec<ListItem>,
}

impl Frame {
    fn new(kind: FrameKind) -> Self {
        Self {
            kind,
            children: Vec::new(),
            items: Vec::new(),
        }
    }
}

fn frame_kind(tag: Tag<'_>) -> FrameKind {
    match tag {
        Tag::Paragraph => FrameKind::Paragraph,
        Tag::Heading { level, .. } => FrameKind::Heading(level as u8),
        Tag::BlockQuote => FrameKind::BlockQuote,
        Tag::CodeBlock(CodeBlockKind::Fenced(info)) => FrameKind::CodeBlock(fence_language(&info)),
        Tag::CodeBlock(CodeBlockKind::Indented) => FrameKind::CodeBlock(None),
        Tag::List(start) => FrameKind::List {
            ordered: start.is_some(),
        },
        Tag::Item => FrameKind::Item,
        Tag::Emphasis => FrameKind::Emphasis,
        Tag::Strong => FrameKind::Strong,
        Tag::Link { dest_url, .. } => FrameKind::Link {
            destination: dest_url.into_string(),
        },
        Tag::Image {
            dest_url, title, ..
        } => FrameKind::Image {
            source: dest_url.into_string(),
            title: title.into_string(),
        },
        _ => FrameKind::Other,
    }
}

/// The language is the first word of the fence info string (` ```rust,ignore `).
fn fence_language(info: &str) -> Option<String> {
    info.split(|c: char| c.is_whitespace() || c == ',')
        .find(|word| !word.is_empty())
        .map(str::to_string)
}

fn into_node(frame: Frame) -> MarkupNode {
    let Frame {
        kind,
        children,
        items,
    } = frame;

    match kind {
        FrameKind::Paragraph => MarkupNode::Paragraph(children),
        FrameKind::Heading(level) => MarkupNode::Heading { level, children },
        FrameKind::BlockQuote => MarkupNode::BlockQuote(children),
        FrameKind::CodeBlock(language) => {
            let code = children
                .into_iter()
                .filter_map(|child| match child {
                    MarkupNode::Text(text) => Some(text),
                    _ => None,
                })
                .collect();
            MarkupNode::CodeBlock { language, code }
        }
        FrameKind::List { ordered: true } => MarkupNode::OrderedList(items),
        FrameKind::List { ordered: false } => MarkupNode::UnorderedList(items),
        // Only reachable for an item outside of a list.
        FrameKind::Item => MarkupNode::Other(children),
        FrameKind::Emphasis => MarkupNode::Emphasis(children),
        FrameKind::Strong => MarkupNode::Strong(children),
        FrameKind::Link { destination } => MarkupNode::Link {
            destination,
            children,
        },
        FrameKind::Image { source, title } => MarkupNode::Image {
            source,
            title,
            children,
        },
        FrameKind::Other => MarkupNode::Other(children),
    }
}

/// Parses markdown into a node tree.
///
/// Strikethrough is recognized (and rendered as plain text through the
/// default arm), other GFM syntax stays literal text. Raw HTML is dropped.
pub fn parse(markdown: &str) -> Vec<MarkupNode> {
    let parser = Parser::new_ext(markdown, Options::ENABLE_STRIKETHROUGH);

    let mut root = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();

    fn push(stack: &mut [Frame], root: &mut Vec<MarkupNode>, node: MarkupNode) {
        match stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => root.push(node),
        }
    }

    for event in parser {
        match event {
            Event::Start(tag) => stack.push(Frame::new(frame_kind(tag))),
            Event::End(_) => {
                let Some(frame) = stack.pop() else {
                    continue;
                };
                if matches!(frame.kind, FrameKind::Item) {
                    if let Some(parent) = stack.last_mut() {
                        if matches!(parent.kind, FrameKind::List { .. }) {
                            parent.items.push(ListItem {
                                children: frame.children,
                            });
                            continue;
                        }
                    }
                }
                // Raw HTML blocks and similar leave an empty frame behind.
                if matches!(frame.kind, FrameKind::Other) && frame.children.is_empty() {
                    continue;
                }
                push(&mut stack, &mut root, into_node(frame));
            }
            Event::Text(text) => push(&mut stack, &mut root, MarkupNode::Text(text.into_string())),
            Event::Code(code) => push(
                &mut stack,
                &mut root,
                MarkupNode::InlineCode(code.into_string()),
            ),
            Event::SoftBreak => push(&mut stack, &mut root, MarkupNode::SoftBreak),
            Event::HardBreak => push(&mut stack, &mut root, MarkupNode::LineBreak),
            Event::Rule => push(&mut stack, &mut root, MarkupNode::ThematicBreak),
            _ => {}
        }
    }

    // Unbalanced events never happen with a well-behaved parser, but do not
    // lose content if they do.
    while let Some(frame) = stack.pop() {
        push(&mut stack, &mut root, into_node(frame));
    }

    root
}
