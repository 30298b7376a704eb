//! Guide content formats.
//!
//! Guides are stored as canonical Markdown. Editing works on an explicit
//! document tree ([`Document`]); display works on rendered HTML. Older
//! guides stored raw HTML, which is read through a tolerant HTML reader.
//!
//! Every conversion here is total: malformed input degrades to plain text,
//! never to an error or a panic. Canonicalization is idempotent after one
//! pass: `to_canonical(&to_editable(p)) == p` for any `p` that came out of
//! [`to_canonical`].

pub mod ast;
mod html;
mod inline;
mod markdown;
mod normalize;
mod render;

pub use ast::{plain_text, Block, Document, HeadingLevel, Inline};
pub use html::looks_like_html;
pub use render::{is_safe_href, render_html};

/// Reads stored guide content into the editable tree. Content that starts
/// with a known HTML tag is read as legacy HTML.
pub fn to_editable(content: &str) -> Document {
    if looks_like_html(content) {
        html::parse_html(content)
    } else {
        markdown::parse_markdown(content)
    }
}

/// Writes the canonical Markdown form of a document.
pub fn to_canonical(doc: &Document) -> String {
    markdown::write_markdown(doc)
}

/// Converts HTML markup (legacy content or imported markup) to canonical
/// Markdown.
pub fn html_to_canonical(markup: &str) -> String {
    to_canonical(&html::parse_html(markup))
}

/// Canonical form of arbitrary stored content.
pub fn normalize_canonical(content: &str) -> String {
    to_canonical(&to_editable(content))
}

/// Plain-text excerpt of stored content, whitespace collapsed, cut to
/// `max_chars` characters with a trailing `...` when longer.
pub fn summarize(content: &str, max_chars: usize) -> String {
    let text = to_editable(content)
        .plain_text()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text
    }
}
