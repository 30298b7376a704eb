use crate::ast::{Block, Document, Inline};

/// Marks already open around the nodes being normalized.
#[derive(Debug, Clone, Copy, Default)]
struct Within {
    bold: bool,
    italic: bool,
    underline: bool,
    link: bool,
}

impl Within {
    fn any(self) -> bool {
        self.bold || self.italic || self.underline || self.link
    }
}

/// Canonical shape for an inline sequence.
///
/// - newlines inside text become `LineBreak` nodes
/// - adjacent text and adjacent identical spans are merged
/// - a mark nested inside the same mark is flattened, links inside links too
/// - empty spans and empty code are dropped
/// - whitespace and line breaks at the edges of a span or link move outside
///   it, so a marker is never followed by whitespace
/// - inside a span a run of line breaks is a single break, since a blank
///   line would end the paragraph between its markers
pub(crate) fn normalize_inlines(nodes: Vec<Inline>) -> Vec<Inline> {
    normalize_in(nodes, Within::default())
}

/// Normalized content with whitespace and line breaks removed at both ends,
/// or `None` when nothing visible remains.
pub(crate) fn block_content(nodes: Vec<Inline>) -> Option<Vec<Inline>> {
    let mut nodes = normalize_inlines(nodes);
    split_leading(&mut nodes);
    split_trailing(&mut nodes);
    if is_blank(&nodes) {
        None
    } else {
        Some(nodes)
    }
}

/// Every block normalized; blank blocks and blank list items are dropped.
pub(crate) fn normalize_document(doc: &Document) -> Document {
    let blocks = doc
        .blocks
        .iter()
        .filter_map(|block| match block {
            Block::Paragraph(content) => block_content(content.clone()).map(Block::Paragraph),
            Block::Heading { level, content } => {
                block_content(content.clone()).map(|content| Block::Heading {
                    level: *level,
                    content,
                })
            }
            Block::Blockquote(content) => block_content(content.clone()).map(Block::Blockquote),
            Block::BulletList(items) => normalize_items(items).map(Block::BulletList),
            Block::OrderedList(items) => normalize_items(items).map(Block::OrderedList),
        })
        .collect();
    Document::new(blocks)
}

fn normalize_items(items: &[Vec<Inline>]) -> Option<Vec<Vec<Inline>>> {
    let items: Vec<Vec<Inline>> = items
        .iter()
        .filter_map(|item| block_content(item.clone()))
        .collect();
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

pub(crate) fn is_blank(nodes: &[Inline]) -> bool {
    nodes.iter().all(|node| match node {
        Inline::LineBreak => true,
        Inline::Text(text) => text.trim().is_empty(),
        _ => false,
    })
}

fn normalize_in(nodes: Vec<Inline>, within: Within) -> Vec<Inline> {
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes {
        match node {
            Inline::Text(text) => {
                for (i, piece) in text.split('\n').enumerate() {
                    if i > 0 {
                        push(&mut out, Inline::LineBreak);
                    }
                    if !piece.is_empty() {
                        push(&mut out, Inline::Text(piece.replace('\r', "")));
                    }
                }
            }
            Inline::Bold(children) => {
                let children = normalize_in(children, Within { bold: true, ..within });
                if within.bold {
                    extend(&mut out, children);
                } else {
                    push_span(&mut out, children, Inline::Bold);
                }
            }
            Inline::Italic(children) => {
                let children = normalize_in(children, Within { italic: true, ..within });
                if within.italic {
                    extend(&mut out, children);
                } else {
                    push_span(&mut out, children, Inline::Italic);
                }
            }
            Inline::Underline(children) => {
                let children = normalize_in(children, Within { underline: true, ..within });
                if within.underline {
                    extend(&mut out, children);
                } else {
                    push_span(&mut out, children, Inline::Underline);
                }
            }
            Inline::Link { href, children } => {
                let children = normalize_in(children, Within { link: true, ..within });
                let href = href.trim().to_string();
                if within.link || href.is_empty() {
                    extend(&mut out, children);
                } else {
                    push_span(&mut out, children, |children| Inline::Link { href, children });
                }
            }
            Inline::Code(text) => {
                let text = text.replace(['\n', '\r'], " ");
                if !text.is_empty() {
                    push(&mut out, Inline::Code(text));
                }
            }
            Inline::LineBreak => push(&mut out, Inline::LineBreak),
        }
    }
    if within.any() {
        collapse_breaks(out)
    } else {
        out
    }
}

/// Drops a break, and the whitespace before it, when the previous line
/// would be blank.
fn collapse_breaks(nodes: Vec<Inline>) -> Vec<Inline> {
    let mut out: Vec<Inline> = Vec::with_capacity(nodes.len());
    for node in nodes {
        if node == Inline::LineBreak {
            let blank_line = match out.as_slice() {
                [.., Inline::LineBreak] => true,
                [.., Inline::LineBreak, Inline::Text(space)] => space.trim().is_empty(),
                _ => false,
            };
            if blank_line {
                if let Some(Inline::Text(_)) = out.last() {
                    out.pop();
                }
                continue;
            }
        }
        out.push(node);
    }
    out
}

fn push_span(
    out: &mut Vec<Inline>,
    mut children: Vec<Inline>,
    wrap: impl FnOnce(Vec<Inline>) -> Inline,
) {
    let leading = split_leading(&mut children);
    let trailing = split_trailing(&mut children);
    extend(out, leading);
    if !children.is_empty() {
        push(out, wrap(children));
    }
    extend(out, trailing);
}

fn extend(out: &mut Vec<Inline>, nodes: Vec<Inline>) {
    for node in nodes {
        push(out, node);
    }
}

fn push(out: &mut Vec<Inline>, node: Inline) {
    let node = match out.last_mut() {
        Some(last) => match merge_into(last, node) {
            Some(node) => node,
            None => return,
        },
        None => node,
    };
    out.push(node);
}

/// Merges `node` into `last` when they are the same kind of span; hands the
/// node back otherwise.
fn merge_into(last: &mut Inline, node: Inline) -> Option<Inline> {
    match (last, node) {
        (Inline::Text(prev), Inline::Text(text)) => {
            prev.push_str(&text);
            None
        }
        (Inline::Code(prev), Inline::Code(text)) => {
            prev.push_str(&text);
            None
        }
        (Inline::Bold(prev), Inline::Bold(children))
        | (Inline::Italic(prev), Inline::Italic(children))
        | (Inline::Underline(prev), Inline::Underline(children)) => {
            extend(prev, children);
            None
        }
        (
            Inline::Link {
                href: prev_href,
                children: prev,
            },
            Inline::Link { href, children },
        ) if *prev_href == href => {
            extend(prev, children);
            None
        }
        (_, node) => Some(node),
    }
}

enum Edge {
    Break,
    Space { split: usize, whole: bool },
    Stop,
}

fn leading_edge(nodes: &[Inline]) -> Edge {
    match nodes.first() {
        Some(Inline::LineBreak) => Edge::Break,
        Some(Inline::Text(text)) => {
            let split = text.len() - text.trim_start().len();
            if split == 0 {
                Edge::Stop
            } else {
                Edge::Space {
                    split,
                    whole: split == text.len(),
                }
            }
        }
        _ => Edge::Stop,
    }
}

fn trailing_edge(nodes: &[Inline]) -> Edge {
    match nodes.last() {
        Some(Inline::LineBreak) => Edge::Break,
        Some(Inline::Text(text)) => {
            let kept = text.trim_end().len();
            if kept == text.len() {
                Edge::Stop
            } else {
                Edge::Space {
                    split: kept,
                    whole: kept == 0,
                }
            }
        }
        _ => Edge::Stop,
    }
}

/// Removes leading whitespace text and line breaks, returning them in order.
fn split_leading(nodes: &mut Vec<Inline>) -> Vec<Inline> {
    let mut hoisted = Vec::new();
    loop {
        match leading_edge(nodes) {
            Edge::Break => hoisted.push(nodes.remove(0)),
            Edge::Space { whole: true, .. } => hoisted.push(nodes.remove(0)),
            Edge::Space { split, whole: false } => {
                if let Some(Inline::Text(text)) = nodes.first_mut() {
                    let space: String = text.drain(..split).collect();
                    hoisted.push(Inline::Text(space));
                }
                break;
            }
            Edge::Stop => break,
        }
    }
    hoisted
}

/// Removes trailing whitespace text and line breaks, returning them in order.
fn split_trailing(nodes: &mut Vec<Inline>) -> Vec<Inline> {
    let mut hoisted = Vec::new();
    loop {
        match trailing_edge(nodes) {
            Edge::Break | Edge::Space { whole: true, .. } => {
                if let Some(node) = nodes.pop() {
                    hoisted.push(node);
                }
            }
            Edge::Space { split, whole: false } => {
                if let Some(Inline::Text(text)) = nodes.last_mut() {
                    hoisted.push(Inline::Text(text.split_off(split)));
                }
                break;
            }
            Edge::Stop => break,
        }
    }
    hoisted.reverse();
    hoisted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Inline {
        Inline::text(s)
    }

    #[test]
    fn merges_adjacent_text_and_spans() {
        let nodes = vec![
            text("a"),
            text("b"),
            Inline::Bold(vec![text("c")]),
            Inline::Bold(vec![text("d")]),
        ];
        assert_eq!(
            normalize_inlines(nodes),
            vec![text("ab"), Inline::Bold(vec![text("cd")])]
        );
    }

    #[test]
    fn flattens_same_mark_nesting() {
        let nodes = vec![Inline::Italic(vec![
            text("a"),
            Inline::Italic(vec![text("b")]),
        ])];
        assert_eq!(normalize_inlines(nodes), vec![Inline::Italic(vec![text("ab")])]);
    }

    #[test]
    fn hoists_edge_whitespace_out_of_marks() {
        let nodes = vec![text("x"), Inline::Italic(vec![text(" y ")]), text("z")];
        assert_eq!(
            normalize_inlines(nodes),
            vec![text("x "), Inline::Italic(vec![text("y")]), text(" z")]
        );
    }

    #[test]
    fn drops_empty_spans_and_nested_links() {
        let nodes = vec![
            Inline::Bold(vec![]),
            Inline::Code(String::new()),
            Inline::Link {
                href: "https://a".into(),
                children: vec![Inline::Link {
                    href: "https://b".into(),
                    children: vec![text("t")],
                }],
            },
        ];
        assert_eq!(
            normalize_inlines(nodes),
            vec![Inline::Link {
                href: "https://a".into(),
                children: vec![text("t")],
            }]
        );
    }

    #[test]
    fn splits_newlines_into_breaks() {
        assert_eq!(
            normalize_inlines(vec![text("a\nb")]),
            vec![text("a"), Inline::LineBreak, text("b")]
        );
    }

    #[test]
    fn break_runs_inside_spans_become_one_break() {
        let nodes = vec![Inline::Bold(vec![
            text("a"),
            Inline::LineBreak,
            text("  "),
            Inline::LineBreak,
            Inline::Italic(vec![Inline::LineBreak, text("b")]),
        ])];
        assert_eq!(
            normalize_inlines(nodes),
            vec![Inline::Bold(vec![
                text("a"),
                Inline::LineBreak,
                Inline::Italic(vec![text("b")]),
            ])]
        );
    }

    #[test]
    fn link_edges_move_outside_the_link() {
        let nodes = vec![Inline::Link {
            href: "https://x.dev".into(),
            children: vec![Inline::LineBreak, text(" Docs ")],
        }];
        assert_eq!(
            normalize_inlines(nodes),
            vec![
                Inline::LineBreak,
                text(" "),
                Inline::Link {
                    href: "https://x.dev".into(),
                    children: vec![text("Docs")],
                },
                text(" "),
            ]
        );
    }

    #[test]
    fn block_content_trims_and_rejects_blank() {
        assert_eq!(
            block_content(vec![Inline::LineBreak, text("  hi  "), Inline::LineBreak]),
            Some(vec![text("hi")])
        );
        assert_eq!(block_content(vec![text("   "), Inline::LineBreak]), None);
    }
}
