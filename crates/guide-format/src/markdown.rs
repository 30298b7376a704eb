/// Canonical Markdown reader and writer.
///
/// The block grammar is line based:
/// - `# ` / `## ` headings
/// - `- ` / `* ` bullet items and `N. ` ordered items
/// - `> ` blockquote lines (consecutive lines join into one quote)
/// - anything else is paragraph text; a blank line ends the block
///
/// The writer escapes whatever the reader would otherwise misread, so
/// writing a parsed document and parsing it again is stable.
use regex::Regex;

use crate::ast::{Block, Document, HeadingLevel, Inline};
use crate::inline::parse_inlines;
use crate::normalize::{block_content, normalize_document};

/// What a single (trimmed) source line starts.
#[derive(Debug, PartialEq, Eq)]
enum LineClass<'a> {
    Blank,
    Heading(HeadingLevel, &'a str),
    Bullet(&'a str),
    Ordered(&'a str),
    Quote(&'a str),
    Text(&'a str),
}

struct LineRules {
    heading: Regex,
    bullet: Regex,
    ordered: Regex,
    quote: Regex,
}

impl LineRules {
    fn new() -> Self {
        Self {
            heading: Regex::new(r"^(#{1,2})\s+(.*)$").expect("valid regex"),
            bullet: Regex::new(r"^[-*]\s+(.*)$").expect("valid regex"),
            ordered: Regex::new(r"^\d+\.\s+(.*)$").expect("valid regex"),
            quote: Regex::new(r"^>\s?(.*)$").expect("valid regex"),
        }
    }

    fn classify<'a>(&self, line: &'a str) -> LineClass<'a> {
        let line = line.trim();
        if line.is_empty() {
            return LineClass::Blank;
        }
        if let Some(caps) = self.heading.captures(line) {
            let level = if caps[1].len() == 1 {
                HeadingLevel::One
            } else {
                HeadingLevel::Two
            };
            return LineClass::Heading(level, capture(&caps, 2));
        }
        if let Some(caps) = self.bullet.captures(line) {
            return LineClass::Bullet(capture(&caps, 1));
        }
        if let Some(caps) = self.ordered.captures(line) {
            return LineClass::Ordered(capture(&caps, 1));
        }
        if let Some(caps) = self.quote.captures(line) {
            return LineClass::Quote(capture(&caps, 1));
        }
        LineClass::Text(line)
    }
}

fn capture<'a>(caps: &regex::Captures<'a>, group: usize) -> &'a str {
    caps.get(group).map_or("", |m| m.as_str())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    Bullet,
    Ordered,
}

/// Block being accumulated while lines are read.
enum Open<'a> {
    None,
    Paragraph(Vec<&'a str>),
    List(ListKind, Vec<Vec<Inline>>),
    Quote(Vec<&'a str>),
}

impl Open<'_> {
    fn close(&mut self, blocks: &mut Vec<Block>) {
        match std::mem::replace(self, Open::None) {
            Open::None => {}
            Open::Paragraph(lines) => {
                if let Some(content) = block_content(parse_inlines(&lines.join("\n"))) {
                    blocks.push(Block::Paragraph(content));
                }
            }
            Open::List(kind, items) => {
                if !items.is_empty() {
                    blocks.push(match kind {
                        ListKind::Bullet => Block::BulletList(items),
                        ListKind::Ordered => Block::OrderedList(items),
                    });
                }
            }
            Open::Quote(lines) => {
                if let Some(content) = block_content(parse_inlines(&lines.join(" "))) {
                    blocks.push(Block::Blockquote(content));
                }
            }
        }
    }
}

/// Reads canonical Markdown. Never fails: anything unrecognized is text.
pub(crate) fn parse_markdown(text: &str) -> Document {
    let rules = LineRules::new();
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut blocks = Vec::new();
    let mut open = Open::None;

    for line in text.split('\n') {
        match rules.classify(line) {
            LineClass::Blank => open.close(&mut blocks),
            LineClass::Heading(level, rest) => {
                open.close(&mut blocks);
                if let Some(content) = block_content(parse_inlines(rest)) {
                    blocks.push(Block::Heading { level, content });
                }
            }
            LineClass::Bullet(rest) => push_item(&mut open, &mut blocks, ListKind::Bullet, rest),
            LineClass::Ordered(rest) => push_item(&mut open, &mut blocks, ListKind::Ordered, rest),
            LineClass::Quote(rest) => match &mut open {
                Open::Quote(lines) => lines.push(rest),
                _ => {
                    open.close(&mut blocks);
                    open = Open::Quote(vec![rest]);
                }
            },
            LineClass::Text(line) => match &mut open {
                Open::Paragraph(lines) => lines.push(line),
                _ => {
                    open.close(&mut blocks);
                    open = Open::Paragraph(vec![line]);
                }
            },
        }
    }
    open.close(&mut blocks);
    Document::new(blocks)
}

fn push_item<'a>(open: &mut Open<'a>, blocks: &mut Vec<Block>, kind: ListKind, rest: &'a str) {
    let item = block_content(parse_inlines(rest));
    if let Open::List(current, items) = open {
        if *current == kind {
            items.extend(item);
            return;
        }
    }
    open.close(blocks);
    *open = Open::List(kind, item.into_iter().collect());
}

/// Writes the canonical form of `doc`.
pub(crate) fn write_markdown(doc: &Document) -> String {
    let rules = LineRules::new();
    let doc = normalize_document(doc);
    let mut parts = Vec::with_capacity(doc.blocks.len());

    for block in &doc.blocks {
        let part = match block {
            Block::Paragraph(content) => inline_markdown(content, "\n")
                .split('\n')
                .map(|line| escape_block_marker(&rules, line.trim()))
                .collect::<Vec<_>>()
                .join("\n"),
            Block::Heading { level, content } => {
                format!("{} {}", level.marker(), inline_markdown(content, " ").trim())
            }
            Block::BulletList(items) => items
                .iter()
                .map(|item| format!("- {}\n", inline_markdown(item, " ").trim()))
                .collect(),
            Block::OrderedList(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| format!("{}. {}\n", i + 1, inline_markdown(item, " ").trim()))
                .collect(),
            Block::Blockquote(content) => format!("> {}", inline_markdown(content, " ").trim()),
        };
        parts.push(part);
    }

    tidy(&parts.join("\n\n"))
}

/// Inline content as Markdown; `line_break` replaces hard breaks.
fn inline_markdown(nodes: &[Inline], line_break: &str) -> String {
    let mut out = String::new();
    write_inlines(nodes, line_break, &mut out);
    out
}

fn write_inlines(nodes: &[Inline], line_break: &str, out: &mut String) {
    for node in nodes {
        match node {
            Inline::Text(text) => escape_text(text, out),
            Inline::Bold(children) => wrap("**", children, line_break, out),
            Inline::Italic(children) => wrap("*", children, line_break, out),
            Inline::Underline(children) => wrap("_", children, line_break, out),
            Inline::Code(code) => write_code(code, out),
            Inline::Link { href, children } => {
                out.push('[');
                write_inlines(children, line_break, out);
                out.push_str("](");
                out.push_str(&encode_href(href));
                out.push(')');
            }
            Inline::LineBreak => out.push_str(line_break),
        }
    }
}

fn wrap(marker: &str, children: &[Inline], line_break: &str, out: &mut String) {
    out.push_str(marker);
    write_inlines(children, line_break, out);
    out.push_str(marker);
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        if matches!(c, '\\' | '*' | '_' | '`' | '[' | ']') {
            out.push('\\');
        }
        out.push(c);
    }
}

/// Fence one backtick longer than the longest run inside the code.
fn write_code(code: &str, out: &mut String) {
    let mut longest = 0;
    let mut run = 0;
    for c in code.chars() {
        if c == '`' {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    let fence = "`".repeat(longest + 1);
    let pad = code.starts_with('`')
        || code.ends_with('`')
        || (code.starts_with(' ') && code.ends_with(' ') && !code.trim().is_empty());
    out.push_str(&fence);
    if pad {
        out.push(' ');
    }
    out.push_str(code);
    if pad {
        out.push(' ');
    }
    out.push_str(&fence);
}

fn encode_href(href: &str) -> String {
    let mut out = String::with_capacity(href.len());
    for c in href.chars() {
        match c {
            ' ' => out.push_str("%20"),
            ')' => out.push_str("%29"),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}

/// A paragraph line that would read as a heading, list item, quote, or
/// legacy HTML gets a backslash in front of its marker.
fn escape_block_marker(rules: &LineRules, line: &str) -> String {
    match rules.classify(line) {
        LineClass::Ordered(_) => match line.find('.') {
            Some(dot) => format!("{}\\{}", &line[..dot], &line[dot..]),
            None => line.to_string(),
        },
        LineClass::Heading(..) | LineClass::Bullet(_) | LineClass::Quote(_) => {
            format!("\\{line}")
        }
        _ if line.starts_with('<') => format!("\\{line}"),
        _ => line.to_string(),
    }
}

/// Strips trailing whitespace per line, collapses blank runs to a single
/// blank line and drops leading blank lines.
fn tidy(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut newlines = 0;
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            newlines += 1;
        }
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        if !out.is_empty() {
            for _ in 0..newlines.min(2) {
                out.push('\n');
            }
        }
        newlines = 0;
        out.push_str(line);
    }
    if !out.is_empty() && newlines > 0 {
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(text: &str) -> String {
        write_markdown(&parse_markdown(text))
    }

    #[test]
    fn reads_blocks() {
        let doc = parse_markdown("# Title\n\n- a\n* b\n\n1. x\n2. y\n> q1\n> q2\ntext");
        assert_eq!(
            doc.blocks,
            vec![
                Block::Heading {
                    level: HeadingLevel::One,
                    content: vec![Inline::text("Title")],
                },
                Block::BulletList(vec![vec![Inline::text("a")], vec![Inline::text("b")]]),
                Block::OrderedList(vec![vec![Inline::text("x")], vec![Inline::text("y")]]),
                Block::Blockquote(vec![Inline::text("q1 q2")]),
                Block::Paragraph(vec![Inline::text("text")]),
            ]
        );
    }

    #[test]
    fn paragraph_lines_become_breaks() {
        let doc = parse_markdown("one\r\ntwo");
        assert_eq!(
            doc.blocks,
            vec![Block::Paragraph(vec![
                Inline::text("one"),
                Inline::LineBreak,
                Inline::text("two"),
            ])]
        );
    }

    #[test]
    fn third_level_heading_is_text() {
        assert_eq!(roundtrip("### deep"), "### deep");
    }

    #[test]
    fn renumbers_and_terminates_lists() {
        assert_eq!(roundtrip("3. A\n7. B\n9. C"), "1. A\n2. B\n3. C\n");
        assert_eq!(roundtrip("* a\n- b\n\nafter"), "- a\n- b\n\nafter");
    }

    #[test]
    fn collapses_blank_runs_and_trailing_space() {
        assert_eq!(roundtrip("a   \n\n\n\n\nb  "), "a\n\nb");
        assert_eq!(roundtrip("\n\n\n# t"), "# t");
    }

    #[test]
    fn escapes_marker_lookalikes() {
        let doc = Document::new(vec![Block::Paragraph(vec![
            Inline::text("1. not a list"),
            Inline::LineBreak,
            Inline::text("# not a heading"),
            Inline::LineBreak,
            Inline::text("<div> literal *star*"),
        ])]);
        let text = write_markdown(&doc);
        assert_eq!(
            text,
            "1\\. not a list\n\\# not a heading\n\\<div> literal \\*star\\*"
        );
        assert_eq!(parse_markdown(&text), doc);
    }

    #[test]
    fn code_fences_grow_with_content() {
        let doc = Document::new(vec![Block::Paragraph(vec![
            Inline::Code("a`b".into()),
            Inline::text(" "),
            Inline::Code("`".into()),
        ])]);
        let text = write_markdown(&doc);
        assert_eq!(text, "``a`b`` `` ` ``");
        assert_eq!(parse_markdown(&text), doc);
    }

    #[test]
    fn link_hrefs_are_encoded() {
        let doc = Document::new(vec![Block::Paragraph(vec![Inline::Link {
            href: "https://x.dev/a b(1)".into(),
            children: vec![Inline::text("x")],
        }])]);
        assert_eq!(write_markdown(&doc), "[x](https://x.dev/a%20b(1%29)");
    }

    #[test]
    fn heading_breaks_become_spaces() {
        let doc = Document::new(vec![Block::Heading {
            level: HeadingLevel::Two,
            content: vec![Inline::text("a"), Inline::LineBreak, Inline::text("b")],
        }]);
        assert_eq!(write_markdown(&doc), "## a b");
    }
}
