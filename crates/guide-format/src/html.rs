/// Legacy HTML reader.
///
/// Older guides were stored as HTML. This reads that markup into the
/// document tree with a forgiving recursive-descent parser: unknown tags are
/// transparent, `script`/`style` bodies are dropped, a closing tag for an
/// ancestor closes everything inside it, stray closing tags are ignored, and
/// a `<` that does not start a well-formed tag is literal text.
use regex::Regex;

use crate::ast::{Block, Document, HeadingLevel, Inline};
use crate::normalize::{block_content, normalize_inlines};
use crate::render::is_safe_href;

/// Elements nested deeper than this are read as if their tags were absent.
const MAX_DEPTH: usize = 64;

const VOID_TAGS: &[&str] = &[
    "br", "hr", "img", "input", "meta", "link", "area", "base", "col", "embed", "source", "wbr",
];

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "header", "footer", "main", "aside", "nav", "h1", "h2",
    "h3", "h4", "h5", "h6", "ul", "ol", "li", "blockquote", "pre", "table", "tr", "hr",
];

/// True when the first non-blank character opens a tag the reader knows.
pub fn looks_like_html(text: &str) -> bool {
    let re = Regex::new(
        r"(?i)^\s*<(p|div|section|article|span|h[1-6]|ul|ol|li|blockquote|strong|b|em|i|u|code|a|br)[\s/>]",
    )
    .expect("valid regex");
    re.is_match(text)
}

/// Reads HTML markup into a document.
pub(crate) fn parse_html(markup: &str) -> Document {
    let mut reader = Reader {
        src: markup,
        pos: 0,
    };
    let nodes = reader.children(&[]);
    let mut builder = BlockBuilder::default();
    builder.walk(&nodes);
    builder.flush();
    Document::new(builder.blocks)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Text(String),
    Element {
        name: String,
        href: Option<String>,
        children: Vec<Node>,
    },
}

struct Tag {
    name: String,
    href: Option<String>,
    self_closing: bool,
    len: usize,
}

struct Reader<'a> {
    src: &'a str,
    pos: usize,
}

impl Reader<'_> {
    /// Nodes up to the closing tag of `open.last()`, or up to a closing tag
    /// of any other open ancestor (left unconsumed), or the end of input.
    fn children(&mut self, open: &[String]) -> Vec<Node> {
        let mut nodes = Vec::new();
        let src = self.src;
        while self.pos < src.len() {
            let rest = &src[self.pos..];

            if rest.starts_with("<!--") {
                self.pos += rest.find("-->").map_or(rest.len(), |end| end + 3);
                continue;
            }
            if rest.starts_with("<!") || rest.starts_with("<?") {
                self.pos += rest.find('>').map_or(rest.len(), |end| end + 1);
                continue;
            }
            if rest.starts_with("</") {
                if let Some((name, len)) = close_tag(rest) {
                    if open.last() == Some(&name) {
                        self.pos += len;
                        return nodes;
                    }
                    if open.contains(&name) {
                        return nodes;
                    }
                    self.pos += len;
                    continue;
                }
            } else if rest.starts_with('<') {
                if let Some(tag) = open_tag(rest) {
                    self.pos += tag.len;
                    if tag.name == "script" || tag.name == "style" {
                        self.skip_raw(&tag.name);
                        continue;
                    }
                    if tag.self_closing || VOID_TAGS.contains(&tag.name.as_str()) {
                        nodes.push(Node::Element {
                            name: tag.name,
                            href: tag.href,
                            children: Vec::new(),
                        });
                        continue;
                    }
                    if open.len() >= MAX_DEPTH {
                        continue;
                    }
                    let mut path = open.to_vec();
                    path.push(tag.name.clone());
                    let children = self.children(&path);
                    nodes.push(Node::Element {
                        name: tag.name,
                        href: tag.href,
                        children,
                    });
                    continue;
                }
            }

            // Text up to the next `<`; a malformed `<` is taken literally.
            let skip = if rest.starts_with('<') { 1 } else { 0 };
            let end = rest[skip..].find('<').map_or(rest.len(), |i| i + skip);
            push_text(&mut nodes, decode_entities(&rest[..end]));
            self.pos += end;
        }
        nodes
    }

    fn skip_raw(&mut self, name: &str) {
        let src = self.src;
        let rest = &src[self.pos..];
        let lower = rest.to_ascii_lowercase();
        let closing = format!("</{name}");
        self.pos += match lower.find(&closing) {
            Some(start) => rest[start..].find('>').map_or(rest.len(), |end| start + end + 1),
            None => rest.len(),
        };
    }
}

fn push_text(nodes: &mut Vec<Node>, text: String) {
    if let Some(Node::Text(prev)) = nodes.last_mut() {
        prev.push_str(&text);
    } else {
        nodes.push(Node::Text(text));
    }
}

/// `<name attr="v" ...>` starting at the beginning of `rest`.
fn open_tag(rest: &str) -> Option<Tag> {
    let bytes = rest.as_bytes();
    if !bytes.get(1)?.is_ascii_alphabetic() {
        return None;
    }
    let mut i = 1;
    while i < bytes.len() && bytes[i].is_ascii_alphanumeric() {
        i += 1;
    }
    let name = rest[1..i].to_ascii_lowercase();
    let mut href = None;

    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        match bytes.get(i)? {
            b'>' => {
                return Some(Tag {
                    name,
                    href,
                    self_closing: false,
                    len: i + 1,
                })
            }
            b'/' if bytes.get(i + 1) == Some(&b'>') => {
                return Some(Tag {
                    name,
                    href,
                    self_closing: true,
                    len: i + 2,
                })
            }
            b'<' => return None,
            _ => {}
        }

        let attr_start = i;
        while i < bytes.len()
            && !matches!(bytes[i], b'=' | b'>' | b'/' | b'<')
            && !bytes[i].is_ascii_whitespace()
        {
            i += 1;
        }
        if i == attr_start {
            // lone '/' not followed by '>'
            i += 1;
            continue;
        }
        let attr = rest[attr_start..i].to_ascii_lowercase();
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if bytes.get(i) != Some(&b'=') {
            continue;
        }
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let value = match bytes.get(i)? {
            quote @ (b'"' | b'\'') => {
                let start = i + 1;
                let len = rest[start..].find(*quote as char)?;
                i = start + len + 1;
                &rest[start..start + len]
            }
            _ => {
                let start = i;
                while i < bytes.len() && bytes[i] != b'>' && !bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                &rest[start..i]
            }
        };
        if attr == "href" {
            href = Some(decode_entities(value).trim().to_string());
        }
    }
}

/// `</name>` starting at the beginning of `rest`; returns the name and length.
fn close_tag(rest: &str) -> Option<(String, usize)> {
    let bytes = rest.as_bytes();
    if !bytes.get(2)?.is_ascii_alphabetic() {
        return None;
    }
    let mut i = 2;
    while i < bytes.len() && bytes[i].is_ascii_alphanumeric() {
        i += 1;
    }
    let name = rest[2..i].to_ascii_lowercase();
    let end = rest[i..].find('>')?;
    if rest[i..i + end].contains('<') {
        return None;
    }
    Some((name, i + end + 1))
}

fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| decode_entity(&rest[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        _ => {
            let number = name.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse().ok()?,
            };
            return char::from_u32(code).filter(|c| *c != '\0');
        }
    };
    Some(c)
}

/// Whitespace runs collapse to one space, as a browser would show them.
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

#[derive(Default)]
struct BlockBuilder {
    blocks: Vec<Block>,
    pending: Vec<Inline>,
}

impl BlockBuilder {
    fn flush(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        if let Some(content) = html_block_content(pending) {
            self.blocks.push(Block::Paragraph(content));
        }
    }

    fn walk(&mut self, nodes: &[Node]) {
        for node in nodes {
            let Node::Element { name, children, .. } = node else {
                self.pending.extend(inline_nodes(std::slice::from_ref(node)));
                continue;
            };
            match name.as_str() {
                "h1" | "h2" => {
                    self.flush();
                    let level = if name == "h1" {
                        HeadingLevel::One
                    } else {
                        HeadingLevel::Two
                    };
                    if let Some(content) = html_block_content(inline_nodes(children)) {
                        self.blocks.push(Block::Heading { level, content });
                    }
                }
                "ul" | "ol" => {
                    self.flush();
                    let mut items = Vec::new();
                    collect_items(children, &mut items);
                    if !items.is_empty() {
                        self.blocks.push(if name == "ul" {
                            Block::BulletList(items)
                        } else {
                            Block::OrderedList(items)
                        });
                    }
                }
                "blockquote" => {
                    self.flush();
                    if let Some(content) = html_block_content(inline_nodes(children)) {
                        self.blocks.push(Block::Blockquote(content));
                    }
                }
                "br" => self.pending.push(Inline::LineBreak),
                "strong" | "b" | "em" | "i" | "u" | "code" | "a" => {
                    self.pending.extend(inline_nodes(std::slice::from_ref(node)));
                }
                tag if BLOCK_TAGS.contains(&tag) => {
                    self.flush();
                    self.walk(children);
                    self.flush();
                }
                _ => self.walk(children),
            }
        }
    }
}

/// List items of one `ul`/`ol`; nested lists are flattened into the parent.
fn collect_items(nodes: &[Node], items: &mut Vec<Vec<Inline>>) {
    for node in nodes {
        match node {
            Node::Text(text) if text.trim().is_empty() => {}
            Node::Element { name, children, .. } if name == "li" => {
                let (nested, inline): (Vec<&Node>, Vec<&Node>) = children.iter().partition(
                    |child| matches!(child, Node::Element { name, .. } if name == "ul" || name == "ol"),
                );
                let inline: Vec<Node> = inline.into_iter().cloned().collect();
                if let Some(item) = html_block_content(inline_nodes(&inline)) {
                    items.push(item);
                }
                for list in nested {
                    if let Node::Element { children, .. } = list {
                        collect_items(children, items);
                    }
                }
            }
            Node::Element { name, children, .. } if name == "ul" || name == "ol" => {
                collect_items(children, items);
            }
            other => {
                if let Some(item) = html_block_content(inline_nodes(std::slice::from_ref(other))) {
                    items.push(item);
                }
            }
        }
    }
}

fn inline_nodes(nodes: &[Node]) -> Vec<Inline> {
    let mut out = Vec::new();
    for node in nodes {
        match node {
            Node::Text(text) => out.push(Inline::Text(collapse_whitespace(text))),
            Node::Element {
                name,
                href,
                children,
            } => match name.as_str() {
                "strong" | "b" => out.push(Inline::Bold(inline_nodes(children))),
                "em" | "i" => out.push(Inline::Italic(inline_nodes(children))),
                "u" => out.push(Inline::Underline(inline_nodes(children))),
                "code" => out.push(Inline::Code(collapse_whitespace(&text_content(children)))),
                "br" => out.push(Inline::LineBreak),
                "a" => match href {
                    Some(href) if !href.is_empty() && is_safe_href(href) => out.push(Inline::Link {
                        href: href.clone(),
                        children: inline_nodes(children),
                    }),
                    _ => out.extend(inline_nodes(children)),
                },
                tag if BLOCK_TAGS.contains(&tag) => {
                    out.push(Inline::LineBreak);
                    out.extend(inline_nodes(children));
                    out.push(Inline::LineBreak);
                }
                _ => out.extend(inline_nodes(children)),
            },
        }
    }
    out
}

fn text_content(nodes: &[Node]) -> String {
    let mut out = String::new();
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Element { children, .. } => out.push_str(&text_content(children)),
        }
    }
    out
}

/// Block content read from HTML, with line breaks collapsed to single ones
/// and spaces collapsed across merged text.
fn html_block_content(nodes: Vec<Inline>) -> Option<Vec<Inline>> {
    let content = block_content(nodes)?;
    Some(collapse_breaks(tidy_spaces(content)))
}

fn tidy_spaces(nodes: Vec<Inline>) -> Vec<Inline> {
    let nodes = normalize_inlines(nodes);
    nodes
        .into_iter()
        .map(|node| match node {
            Inline::Text(text) => Inline::Text(collapse_whitespace(&text)),
            Inline::Bold(children) => Inline::Bold(tidy_spaces(children)),
            Inline::Italic(children) => Inline::Italic(tidy_spaces(children)),
            Inline::Underline(children) => Inline::Underline(tidy_spaces(children)),
            Inline::Link { href, children } => Inline::Link {
                href,
                children: tidy_spaces(children),
            },
            other => other,
        })
        .collect()
}

/// Drops spaces around line breaks and repeated breaks (block boundaries
/// inside inline content produce both).
fn collapse_breaks(nodes: Vec<Inline>) -> Vec<Inline> {
    let mut out: Vec<Inline> = Vec::with_capacity(nodes.len());
    for node in nodes {
        match node {
            Inline::LineBreak => {
                if let Some(Inline::Text(text)) = out.last_mut() {
                    let kept = text.trim_end().len();
                    text.truncate(kept);
                    if text.is_empty() {
                        out.pop();
                    }
                }
                if !matches!(out.last(), Some(Inline::LineBreak)) {
                    out.push(Inline::LineBreak);
                }
            }
            Inline::Text(text) if matches!(out.last(), Some(Inline::LineBreak)) => {
                let text = text.trim_start();
                if !text.is_empty() {
                    out.push(Inline::Text(text.to_string()));
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Inline {
        Inline::text(s)
    }

    #[test]
    fn detects_legacy_markup() {
        assert!(looks_like_html("<p>Hello</p>"));
        assert!(looks_like_html("  \n<DIV class=\"x\">"));
        assert!(looks_like_html("<br/>"));
        assert!(!looks_like_html("# Title"));
        assert!(!looks_like_html("a <b>late</b> tag"));
        assert!(!looks_like_html("<notatag>"));
    }

    #[test]
    fn reads_blocks_and_marks() {
        let doc = parse_html(
            "<h1>Title</h1><p>Some <strong>bold</strong> and <em>italic</em>.</p>\
             <ul><li>a</li><li>b<ol><li>c</li></ol></li></ul>\
             <blockquote><p>q</p></blockquote><h3>small</h3>",
        );
        assert_eq!(
            doc.blocks,
            vec![
                Block::Heading {
                    level: HeadingLevel::One,
                    content: vec![text("Title")],
                },
                Block::Paragraph(vec![
                    text("Some "),
                    Inline::Bold(vec![text("bold")]),
                    text(" and "),
                    Inline::Italic(vec![text("italic")]),
                    text("."),
                ]),
                Block::BulletList(vec![vec![text("a")], vec![text("b")], vec![text("c")]]),
                Block::Blockquote(vec![text("q")]),
                Block::Paragraph(vec![text("small")]),
            ]
        );
    }

    #[test]
    fn drops_scripts_and_unsafe_links() {
        let doc = parse_html(
            "<p>x<script>alert('<p>')</script> <a href=\"javascript:alert(1)\">bad</a> \
             <a href='https://ok.dev'>ok</a></p>",
        );
        assert_eq!(
            doc.blocks,
            vec![Block::Paragraph(vec![
                text("x bad "),
                Inline::Link {
                    href: "https://ok.dev".into(),
                    children: vec![text("ok")],
                },
            ])]
        );
    }

    #[test]
    fn tolerates_malformed_markup() {
        let doc = parse_html("<p>a < b &amp; c &bogus; <b>open</p><p>next</i></p><!-- gone -->");
        assert_eq!(
            doc.blocks,
            vec![
                Block::Paragraph(vec![text("a < b & c &bogus; "), Inline::Bold(vec![text("open")])]),
                Block::Paragraph(vec![text("next")]),
            ]
        );
    }

    #[test]
    fn breaks_and_whitespace_collapse() {
        let doc = parse_html("<div>one&nbsp;\n   two<br>  three</div>");
        assert_eq!(
            doc.blocks,
            vec![Block::Paragraph(vec![
                text("one two"),
                Inline::LineBreak,
                text("three"),
            ])]
        );
    }

    #[test]
    fn deep_nesting_is_bounded() {
        let markup = format!("{}deep{}", "<span>".repeat(500), "</span>".repeat(500));
        let doc = parse_html(&markup);
        assert_eq!(doc.blocks, vec![Block::Paragraph(vec![text("deep")])]);
    }
}
