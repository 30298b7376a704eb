/// Inline Markdown reader.
///
/// Recursive descent over the characters of one block. Every opener tries to
/// parse a span up to its closer; when no closer is found the opener is kept
/// as literal text. Results are memoized per `(position, closer)` so input
/// full of unmatched markers stays quadratic at worst.
///
/// Openers must be followed by a non-whitespace character and closers must
/// follow one, so `2 * 3 * 4` stays literal.
use std::collections::HashMap;

use crate::ast::Inline;
use crate::normalize::normalize_inlines;

/// Deeper nesting is read as literal markers.
const MAX_NESTING: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Delim {
    Bold,
    Italic,
    Underline,
    LinkText,
}

type Parsed = Option<(Vec<Inline>, usize)>;

/// Parses the inline content of one block. Newlines become line breaks.
pub(crate) fn parse_inlines(text: &str) -> Vec<Inline> {
    let mut parser = InlineParser {
        chars: text.chars().collect(),
        memo: HashMap::new(),
        depth: 0,
    };
    let (nodes, _) = parser.sequence(0, None).unwrap_or_default();
    normalize_inlines(nodes)
}

struct InlineParser {
    chars: Vec<char>,
    memo: HashMap<(usize, Delim), Parsed>,
    depth: usize,
}

impl InlineParser {
    fn at(&self, i: usize) -> Option<char> {
        self.chars.get(i).copied()
    }

    fn is_double_star(&self, i: usize) -> bool {
        self.at(i) == Some('*') && self.at(i + 1) == Some('*')
    }

    /// A span may start at `i` only if `i` holds visible text.
    fn can_open(&self, i: usize) -> bool {
        self.at(i).is_some_and(|c| !c.is_whitespace())
    }

    fn closes(&self, i: usize, start: usize, delim: Delim) -> bool {
        let matched = match delim {
            Delim::Bold => self.is_double_star(i),
            Delim::Italic => self.at(i) == Some('*'),
            Delim::Underline => self.at(i) == Some('_'),
            Delim::LinkText => self.at(i) == Some(']'),
        };
        if !matched || i == start {
            return false;
        }
        match delim {
            Delim::LinkText => true,
            _ => self.at(i - 1).is_some_and(|c| !c.is_whitespace()),
        }
    }

    fn span(&mut self, start: usize, delim: Delim) -> Parsed {
        if let Some(hit) = self.memo.get(&(start, delim)) {
            return hit.clone();
        }
        if self.depth >= MAX_NESTING {
            return None;
        }
        self.depth += 1;
        let result = self.sequence(start, Some(delim));
        self.depth -= 1;
        self.memo.insert((start, delim), result.clone());
        result
    }

    /// Reads nodes from `start` until `close` (or the end of input when
    /// `close` is `None`). Returns the nodes and the position after the closer.
    fn sequence(&mut self, start: usize, close: Option<Delim>) -> Parsed {
        let mut nodes = Vec::new();
        let mut text = String::new();
        let mut i = start;

        while i < self.chars.len() {
            if close == Some(Delim::Bold) && self.closes(i, start, Delim::Bold) {
                flush(&mut text, &mut nodes);
                return Some((nodes, i + 2));
            }
            // `**` opens bold before it can close italic, so `*a **b** c*` nests.
            if close != Some(Delim::Bold) && self.is_double_star(i) && self.can_open(i + 2) {
                if let Some((children, end)) = self.span(i + 2, Delim::Bold) {
                    flush(&mut text, &mut nodes);
                    nodes.push(Inline::Bold(children));
                    i = end;
                    continue;
                }
            }
            if let Some(delim) = close {
                if delim != Delim::Bold && self.closes(i, start, delim) {
                    flush(&mut text, &mut nodes);
                    return Some((nodes, i + 1));
                }
            }

            let c = self.chars[i];
            match c {
                '\\' if self.at(i + 1).is_some_and(|n| n.is_ascii_punctuation()) => {
                    text.push(self.chars[i + 1]);
                    i += 2;
                }
                '`' => {
                    let run = self.run_len(i, '`');
                    match self.code_span(i, run) {
                        Some((code, end)) => {
                            flush(&mut text, &mut nodes);
                            nodes.push(Inline::Code(code));
                            i = end;
                        }
                        None => {
                            text.extend(std::iter::repeat_n('`', run));
                            i += run;
                        }
                    }
                }
                '*' | '_' if self.can_open(i + 1) => {
                    let (delim, wrap): (Delim, fn(Vec<Inline>) -> Inline) = if c == '*' {
                        (Delim::Italic, Inline::Italic)
                    } else {
                        (Delim::Underline, Inline::Underline)
                    };
                    match self.span(i + 1, delim) {
                        Some((children, end)) => {
                            flush(&mut text, &mut nodes);
                            nodes.push(wrap(children));
                            i = end;
                        }
                        None => {
                            text.push(c);
                            i += 1;
                        }
                    }
                }
                '[' => match self.link(i) {
                    Some((link, end)) => {
                        flush(&mut text, &mut nodes);
                        nodes.push(link);
                        i = end;
                    }
                    None => {
                        text.push(c);
                        i += 1;
                    }
                },
                '\n' => {
                    flush(&mut text, &mut nodes);
                    nodes.push(Inline::LineBreak);
                    i += 1;
                }
                _ => {
                    text.push(c);
                    i += 1;
                }
            }
        }

        match close {
            None => {
                flush(&mut text, &mut nodes);
                Some((nodes, i))
            }
            Some(_) => None,
        }
    }

    fn run_len(&self, i: usize, c: char) -> usize {
        self.chars[i..].iter().take_while(|&&x| x == c).count()
    }

    /// A code span opened by `run` backticks ends at the next run of exactly
    /// the same length.
    fn code_span(&self, i: usize, run: usize) -> Option<(String, usize)> {
        let body = i + run;
        let mut j = body;
        while j < self.chars.len() {
            if self.chars[j] == '`' {
                let len = self.run_len(j, '`');
                if len == run {
                    let mut code: String = self.chars[body..j].iter().collect();
                    if code.len() >= 2
                        && code.starts_with(' ')
                        && code.ends_with(' ')
                        && !code.trim().is_empty()
                    {
                        code = code[1..code.len() - 1].to_string();
                    }
                    return Some((code, j + run));
                }
                j += len;
            } else {
                j += 1;
            }
        }
        None
    }

    /// `[text](href)`; an empty text or href is not a link.
    fn link(&mut self, i: usize) -> Option<(Inline, usize)> {
        let (children, after) = self.span(i + 1, Delim::LinkText)?;
        if self.at(after) != Some('(') {
            return None;
        }
        let mut j = after + 1;
        let mut href = String::new();
        loop {
            match self.at(j)? {
                ')' => break,
                '\n' => return None,
                c => href.push(c),
            }
            j += 1;
        }
        let href = href.trim();
        if href.is_empty() {
            return None;
        }
        Some((
            Inline::Link {
                href: href.to_string(),
                children,
            },
            j + 1,
        ))
    }
}

fn flush(text: &mut String, nodes: &mut Vec<Inline>) {
    if !text.is_empty() {
        nodes.push(Inline::Text(std::mem::take(text)));
    }
}
