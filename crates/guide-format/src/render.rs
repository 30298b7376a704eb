use crate::ast::{Block, Document, Inline};
use crate::normalize::normalize_document;

const SAFE_SCHEMES: &[&str] = &["http", "https", "mailto", "tel"];

/// Renders the document as HTML for display.
///
/// Text is escaped. Links open in a new tab without an opener reference;
/// links whose scheme is not on the allow list render as their text.
pub fn render_html(doc: &Document) -> String {
    let doc = normalize_document(doc);
    let mut out = String::new();
    for (i, block) in doc.blocks.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        match block {
            Block::Paragraph(content) => element("p", content, &mut out),
            Block::Heading { level, content } => {
                let tag = format!("h{}", level.level());
                element(&tag, content, &mut out);
            }
            Block::BulletList(items) => list("ul", items, &mut out),
            Block::OrderedList(items) => list("ol", items, &mut out),
            Block::Blockquote(content) => element("blockquote", content, &mut out),
        }
    }
    out
}

/// Relative references and `http`, `https`, `mailto` and `tel` links.
pub fn is_safe_href(href: &str) -> bool {
    // Browsers ignore whitespace and control characters inside a scheme.
    let cleaned: String = href
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect();
    let scheme_end = cleaned.find(|c: char| matches!(c, ':' | '/' | '?' | '#'));
    match scheme_end {
        Some(end) if cleaned[end..].starts_with(':') => {
            let scheme = cleaned[..end].to_ascii_lowercase();
            SAFE_SCHEMES.contains(&scheme.as_str())
        }
        _ => true,
    }
}

fn element(tag: &str, content: &[Inline], out: &mut String) {
    out.push('<');
    out.push_str(tag);
    out.push('>');
    inlines(content, out);
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

fn list(tag: &str, items: &[Vec<Inline>], out: &mut String) {
    out.push('<');
    out.push_str(tag);
    out.push('>');
    for item in items {
        element("li", item, out);
    }
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

fn inlines(nodes: &[Inline], out: &mut String) {
    for node in nodes {
        match node {
            Inline::Text(text) => escape(text, out),
            Inline::Bold(children) => element("strong", children, out),
            Inline::Italic(children) => element("em", children, out),
            Inline::Underline(children) => element("u", children, out),
            Inline::Code(code) => {
                out.push_str("<code>");
                escape(code, out);
                out.push_str("</code>");
            }
            Inline::Link { href, children } if is_safe_href(href) => {
                out.push_str("<a href=\"");
                escape(href, out);
                out.push_str("\" target=\"_blank\" rel=\"noopener noreferrer\">");
                inlines(children, out);
                out.push_str("</a>");
            }
            Inline::Link { children, .. } => inlines(children, out),
            Inline::LineBreak => out.push_str("<br>"),
        }
    }
}

pub(crate) fn escape(text: &str, out: &mut String) {
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
