//! Editable document tree.
//!
//! Both readers (Markdown and HTML) produce this tree and both writers
//! (canonical Markdown and rendered HTML) consume it. Inline content is kept
//! normalized: adjacent text is merged, redundant nesting of the same mark is
//! flattened, and empty spans are dropped (see `normalize`).

/// A whole guide body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub blocks: Vec<Block>,
}

impl Document {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Text content of every block, one block per line, markup removed.
    pub fn plain_text(&self) -> String {
        let mut lines = Vec::new();
        for block in &self.blocks {
            match block {
                Block::Paragraph(content)
                | Block::Heading { content, .. }
                | Block::Blockquote(content) => lines.push(plain_text(content)),
                Block::BulletList(items) | Block::OrderedList(items) => {
                    lines.extend(items.iter().map(|item| plain_text(item)));
                }
            }
        }
        lines.join("\n")
    }
}

/// Only the two heading levels the toolbar offers are representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeadingLevel {
    One,
    Two,
}

impl HeadingLevel {
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(Self::One),
            2 => Some(Self::Two),
            _ => None,
        }
    }

    pub fn level(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }

    pub(crate) fn marker(self) -> &'static str {
        match self {
            Self::One => "#",
            Self::Two => "##",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Paragraph(Vec<Inline>),
    Heading {
        level: HeadingLevel,
        content: Vec<Inline>,
    },
    BulletList(Vec<Vec<Inline>>),
    OrderedList(Vec<Vec<Inline>>),
    Blockquote(Vec<Inline>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    Text(String),
    Bold(Vec<Inline>),
    Italic(Vec<Inline>),
    Underline(Vec<Inline>),
    /// Code spans are leaves: their text is taken verbatim.
    Code(String),
    Link {
        href: String,
        children: Vec<Inline>,
    },
    LineBreak,
}

impl Inline {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}

/// Concatenated text of an inline sequence; line breaks become newlines.
pub fn plain_text(nodes: &[Inline]) -> String {
    let mut out = String::new();
    collect_text(nodes, &mut out);
    out
}

fn collect_text(nodes: &[Inline], out: &mut String) {
    for node in nodes {
        match node {
            Inline::Text(text) | Inline::Code(text) => out.push_str(text),
            Inline::Bold(children)
            | Inline::Italic(children)
            | Inline::Underline(children)
            | Inline::Link { children, .. } => collect_text(children, out),
            Inline::LineBreak => out.push('\n'),
        }
    }
}
