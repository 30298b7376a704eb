//! Line and run model.
//!
//! The editing surface is a list of typed lines. Each line holds styled
//! runs; a `'\n'` inside a run is a hard line break within the line.
//! Offsets are counted in chars and include those line breaks.

use guide_format::{Block, Document, HeadingLevel, Inline};

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Marks {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub code: bool,
    pub link: Option<String>,
}

impl Marks {
    pub fn plain() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub text: String,
    pub marks: Marks,
}

impl Run {
    pub fn new(text: impl Into<String>, marks: Marks) -> Self {
        Self {
            text: text.into(),
            marks,
        }
    }

    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineKind {
    Paragraph,
    Heading(HeadingLevel),
    Bullet,
    Ordered,
    Quote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub kind: LineKind,
    pub runs: Vec<Run>,
}

impl Line {
    pub fn new(kind: LineKind, runs: Vec<Run>) -> Self {
        let mut line = Self { kind, runs };
        line.merge_runs();
        line
    }

    pub fn empty(kind: LineKind) -> Self {
        Self {
            kind,
            runs: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.runs.iter().map(Run::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.iter().all(Run::is_empty)
    }

    pub fn text(&self) -> String {
        self.runs.iter().map(|run| run.text.as_str()).collect()
    }

    /// Marks new text typed at `offset` picks up. Links and code only
    /// continue when the cursor is strictly inside them.
    pub fn marks_at(&self, offset: usize) -> Marks {
        let before = offset.checked_sub(1).and_then(|i| self.mark_of(i));
        let after = self.mark_of(offset);
        let Some(mut marks) = before.clone().or_else(|| after.clone()) else {
            return Marks::plain();
        };
        let inside = |pick: fn(&Marks) -> bool| {
            before.as_ref().is_some_and(pick) && after.as_ref().is_some_and(pick)
        };
        if !inside(|m| m.code) {
            marks.code = false;
        }
        let same_link = matches!(
            (&before, &after),
            (Some(b), Some(a)) if b.link.is_some() && b.link == a.link
        );
        if !same_link {
            marks.link = None;
        }
        marks
    }

    fn mark_of(&self, index: usize) -> Option<Marks> {
        let mut pos = 0;
        for run in &self.runs {
            let len = run.len();
            if index < pos + len {
                return Some(run.marks.clone());
            }
            pos += len;
        }
        None
    }

    /// Whether every char in `start..end` satisfies `pred`. An empty range
    /// is never covered.
    pub fn covers(&self, start: usize, end: usize, pred: impl Fn(&Marks) -> bool) -> bool {
        if start >= end {
            return false;
        }
        let mut pos = 0;
        for run in &self.runs {
            let len = run.len();
            let overlaps = pos < end && start < pos + len;
            if overlaps && !pred(&run.marks) {
                return false;
            }
            pos += len;
        }
        true
    }

    /// Applies `f` to the marks of every char in `start..end`.
    pub fn update_marks(&mut self, start: usize, end: usize, f: impl Fn(&mut Marks)) {
        if start >= end {
            return;
        }
        let first = self.boundary(start);
        let last = self.boundary(end);
        for run in &mut self.runs[first..last] {
            f(&mut run.marks);
        }
        self.merge_runs();
    }

    pub fn insert(&mut self, offset: usize, text: &str, marks: Marks) {
        if text.is_empty() {
            return;
        }
        let at = self.boundary(offset);
        self.runs.insert(at, Run::new(text, marks));
        self.merge_runs();
    }

    pub fn delete(&mut self, start: usize, end: usize) {
        if start >= end {
            return;
        }
        let first = self.boundary(start);
        let last = self.boundary(end);
        self.runs.drain(first..last);
        self.merge_runs();
    }

    /// Removes and returns the runs from `offset` to the end of the line.
    pub fn split_off(&mut self, offset: usize) -> Vec<Run> {
        let at = self.boundary(offset);
        let tail = self.runs.split_off(at);
        self.merge_runs();
        tail
    }

    pub fn append(&mut self, runs: Vec<Run>) {
        self.runs.extend(runs);
        self.merge_runs();
    }

    /// Makes sure a run starts at `offset` and returns its index.
    fn boundary(&mut self, offset: usize) -> usize {
        let mut pos = 0;
        for i in 0..self.runs.len() {
            if offset == pos {
                return i;
            }
            let len = self.runs[i].len();
            if offset < pos + len {
                let run = &mut self.runs[i];
                let byte = run
                    .text
                    .char_indices()
                    .nth(offset - pos)
                    .map_or(run.text.len(), |(byte, _)| byte);
                let tail = Run::new(run.text.split_off(byte), run.marks.clone());
                self.runs.insert(i + 1, tail);
                return i + 1;
            }
            pos += len;
        }
        self.runs.len()
    }

    fn merge_runs(&mut self) {
        let mut merged: Vec<Run> = Vec::with_capacity(self.runs.len());
        for run in self.runs.drain(..) {
            if run.is_empty() {
                continue;
            }
            match merged.last_mut() {
                Some(last) if last.marks == run.marks => last.text.push_str(&run.text),
                _ => merged.push(run),
            }
        }
        self.runs = merged;
    }
}

/// Lines for a document; an empty document is one empty paragraph.
pub fn lines_from_document(doc: &Document) -> Vec<Line> {
    let mut lines = Vec::new();
    for block in &doc.blocks {
        match block {
            Block::Paragraph(content) => lines.push(line_from(LineKind::Paragraph, content)),
            Block::Heading { level, content } => {
                lines.push(line_from(LineKind::Heading(*level), content));
            }
            Block::BulletList(items) => {
                lines.extend(items.iter().map(|item| line_from(LineKind::Bullet, item)));
            }
            Block::OrderedList(items) => {
                lines.extend(items.iter().map(|item| line_from(LineKind::Ordered, item)));
            }
            Block::Blockquote(content) => lines.push(line_from(LineKind::Quote, content)),
        }
    }
    if lines.is_empty() {
        lines.push(Line::empty(LineKind::Paragraph));
    }
    lines
}

fn line_from(kind: LineKind, content: &[Inline]) -> Line {
    let mut runs = Vec::new();
    collect_runs(content, &Marks::plain(), &mut runs);
    Line::new(kind, runs)
}

fn collect_runs(nodes: &[Inline], marks: &Marks, runs: &mut Vec<Run>) {
    for node in nodes {
        match node {
            Inline::Text(text) => runs.push(Run::new(text.clone(), marks.clone())),
            Inline::LineBreak => runs.push(Run::new("\n", marks.clone())),
            Inline::Code(code) => runs.push(Run::new(
                code.clone(),
                Marks {
                    code: true,
                    ..marks.clone()
                },
            )),
            Inline::Bold(children) => collect_runs(
                children,
                &Marks {
                    bold: true,
                    ..marks.clone()
                },
                runs,
            ),
            Inline::Italic(children) => collect_runs(
                children,
                &Marks {
                    italic: true,
                    ..marks.clone()
                },
                runs,
            ),
            Inline::Underline(children) => collect_runs(
                children,
                &Marks {
                    underline: true,
                    ..marks.clone()
                },
                runs,
            ),
            Inline::Link { href, children } => collect_runs(
                children,
                &Marks {
                    link: Some(href.clone()),
                    ..marks.clone()
                },
                runs,
            ),
        }
    }
}

/// Rebuilds the document tree. Consecutive list lines of one kind form a
/// single list.
pub fn document_from_lines(lines: &[Line]) -> Document {
    let mut blocks: Vec<Block> = Vec::new();
    for line in lines {
        let content = inlines_from_runs(&line.runs);
        match line.kind {
            LineKind::Paragraph => blocks.push(Block::Paragraph(content)),
            LineKind::Heading(level) => blocks.push(Block::Heading { level, content }),
            LineKind::Quote => blocks.push(Block::Blockquote(content)),
            LineKind::Bullet => match blocks.last_mut() {
                Some(Block::BulletList(items)) => items.push(content),
                _ => blocks.push(Block::BulletList(vec![content])),
            },
            LineKind::Ordered => match blocks.last_mut() {
                Some(Block::OrderedList(items)) => items.push(content),
                _ => blocks.push(Block::OrderedList(vec![content])),
            },
        }
    }
    Document::new(blocks)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mark {
    Link(String),
    Bold,
    Italic,
    Underline,
}

impl Mark {
    fn on(&self, marks: &Marks) -> bool {
        match self {
            Mark::Link(href) => marks.link.as_ref() == Some(href),
            Mark::Bold => marks.bold,
            Mark::Italic => marks.italic,
            Mark::Underline => marks.underline,
        }
    }

    fn wrap(self, children: Vec<Inline>) -> Inline {
        match self {
            Mark::Link(href) => Inline::Link { href, children },
            Mark::Bold => Inline::Bold(children),
            Mark::Italic => Inline::Italic(children),
            Mark::Underline => Inline::Underline(children),
        }
    }
}

fn inlines_from_runs(runs: &[Run]) -> Vec<Inline> {
    build(runs, &[])
}

/// Nests flat runs into a tree. At each step the unopened mark that spans
/// the most following runs becomes the outer span; code is always innermost.
fn build(runs: &[Run], open: &[Mark]) -> Vec<Inline> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < runs.len() {
        let marks = &runs[i].marks;
        let mut candidates = Vec::new();
        if let Some(href) = &marks.link {
            candidates.push(Mark::Link(href.clone()));
        }
        if marks.bold {
            candidates.push(Mark::Bold);
        }
        if marks.italic {
            candidates.push(Mark::Italic);
        }
        if marks.underline {
            candidates.push(Mark::Underline);
        }
        candidates.retain(|mark| !open.contains(mark));

        let mut best: Option<(Mark, usize)> = None;
        for mark in candidates {
            let stretch = runs[i..].iter().take_while(|run| mark.on(&run.marks)).count();
            if best.as_ref().map_or(true, |(_, longest)| stretch > *longest) {
                best = Some((mark, stretch));
            }
        }

        match best {
            Some((mark, stretch)) => {
                let mut inner = open.to_vec();
                inner.push(mark.clone());
                let children = build(&runs[i..i + stretch], &inner);
                out.push(mark.wrap(children));
                i += stretch;
            }
            None => {
                leaf(&runs[i], &mut out);
                i += 1;
            }
        }
    }
    out
}

fn leaf(run: &Run, out: &mut Vec<Inline>) {
    for (n, piece) in run.text.split('\n').enumerate() {
        if n > 0 {
            out.push(Inline::LineBreak);
        }
        if piece.is_empty() {
            continue;
        }
        if run.marks.code {
            out.push(Inline::Code(piece.to_string()));
        } else {
            out.push(Inline::text(piece));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bold() -> Marks {
        Marks {
            bold: true,
            ..Marks::plain()
        }
    }

    #[test]
    fn runs_split_and_merge() {
        let mut line = Line::new(LineKind::Paragraph, vec![Run::new("hello world", Marks::plain())]);
        line.update_marks(0, 5, |m| m.bold = true);
        assert_eq!(
            line.runs,
            vec![Run::new("hello", bold()), Run::new(" world", Marks::plain())]
        );
        line.update_marks(0, 5, |m| m.bold = false);
        assert_eq!(line.runs, vec![Run::new("hello world", Marks::plain())]);
    }

    #[test]
    fn insert_delete_and_split_count_chars() {
        let mut line = Line::new(LineKind::Paragraph, vec![Run::new("héllo", Marks::plain())]);
        line.insert(2, "XY", bold());
        assert_eq!(line.text(), "héXYllo");
        line.delete(1, 3);
        assert_eq!(line.text(), "hYllo");
        let tail = line.split_off(2);
        assert_eq!(line.text(), "hY");
        assert_eq!(tail, vec![Run::new("llo", Marks::plain())]);
    }

    #[test]
    fn marks_at_does_not_extend_links() {
        let link = Marks {
            link: Some("https://x.dev".into()),
            ..Marks::plain()
        };
        let line = Line::new(
            LineKind::Paragraph,
            vec![Run::new("ab", link.clone()), Run::new("cd", bold())],
        );
        assert_eq!(line.marks_at(1), link);
        assert_eq!(line.marks_at(2), Marks::plain());
        assert_eq!(line.marks_at(4), bold());
    }

    #[test]
    fn document_lines_round_trip() {
        let doc = guide_format::to_editable("## Head\n\n- a **b**\n- c\n\n1. one\n\n> quote\n\ntext\nmore");
        let lines = lines_from_document(&doc);
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[1].kind, LineKind::Bullet);
        assert_eq!(lines[5].text(), "text\nmore");
        assert_eq!(document_from_lines(&lines), doc);
    }

    #[test]
    fn longest_mark_goes_outside() {
        let italic_bold = Marks {
            bold: true,
            italic: true,
            ..Marks::plain()
        };
        let runs = vec![Run::new("a", bold()), Run::new("b", italic_bold)];
        assert_eq!(
            inlines_from_runs(&runs),
            vec![Inline::Bold(vec![
                Inline::text("a"),
                Inline::Italic(vec![Inline::text("b")]),
            ])]
        );
    }
}
