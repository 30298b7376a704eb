use guide_format::Document;
use tracing::debug;

use crate::command::{Command, Effect};
use crate::key::{Key, KeyOutcome, Modifiers};
use crate::line::{document_from_lines, lines_from_document, Line, LineKind, Marks};
use crate::selection::{Position, Selection};

/// Called with the canonical content after every change.
pub type ChangeCallback = Box<dyn FnMut(&str) + Send>;

const TAB: &str = "    ";

/// IME composition in progress.
struct Composition {
    start: Position,
    len: usize,
    marks: Marks,
    /// Lines when the composition started; decides whether ending it emits.
    before: Vec<Line>,
}

/// Rich-text editor over the line model.
///
/// Every public mutation either changes the lines and reports the new
/// canonical content exactly once, or leaves everything as it was (read-only
/// mode, out-of-range selection, unsupported command). Changes made while an
/// IME composition is active are reported once, when it ends.
pub struct Editor {
    lines: Vec<Line>,
    selection: Selection,
    stored_marks: Option<Marks>,
    composition: Option<Composition>,
    read_only: bool,
    on_change: Option<ChangeCallback>,
}

impl Default for Editor {
    fn default() -> Self {
        Self::new()
    }
}

impl Editor {
    pub fn new() -> Self {
        Self {
            lines: vec![Line::empty(LineKind::Paragraph)],
            selection: Selection::default(),
            stored_marks: None,
            composition: None,
            read_only: false,
            on_change: None,
        }
    }

    pub fn with_content(content: &str) -> Self {
        let mut editor = Self::new();
        editor.set_content(content);
        editor
    }

    pub fn on_change(&mut self, callback: impl FnMut(&str) + Send + 'static) {
        self.on_change = Some(Box::new(callback));
    }

    /// Loads stored content. Does not report a change.
    pub fn set_content(&mut self, content: &str) {
        self.lines = lines_from_document(&guide_format::to_editable(content));
        self.selection = Selection::default();
        self.stored_marks = None;
        self.composition = None;
    }

    /// Canonical Markdown for the current lines.
    pub fn content(&self) -> String {
        guide_format::to_canonical(&self.document())
    }

    pub fn document(&self) -> Document {
        document_from_lines(&self.lines)
    }

    pub fn render_html(&self) -> String {
        guide_format::render_html(&self.document())
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = selection;
        self.stored_marks = None;
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_composing(&self) -> bool {
        self.composition.is_some()
    }

    /// Toolbar state: whether `command` is already in effect at the selection.
    pub fn is_active(&self, command: &Command) -> bool {
        let Some((start, end)) = self.valid_range() else {
            return false;
        };
        match command.effect() {
            Effect::Mark(has, _) if start == end => has(&self.typing_marks(start)),
            Effect::Mark(has, _) => self.range_covers(start, end, has),
            Effect::Link(_) if start == end => {
                self.lines[start.line].marks_at(start.offset).link.is_some()
            }
            Effect::Link(_) => self.range_covers(start, end, |m| m.link.is_some()),
            Effect::Block(kind) => self.lines[start.line..=end.line]
                .iter()
                .all(|line| line.kind == kind),
        }
    }

    pub fn apply_command(&mut self, command: Command) {
        if self.read_only || self.composition.is_some() {
            debug!(?command, "command ignored while read-only or composing");
            return;
        }
        let Some((start, end)) = self.valid_range() else {
            debug!(?command, selection = ?self.selection, "command ignored: selection out of range");
            return;
        };
        let collapsed = start == end;
        if collapsed && command.needs_range() {
            debug!(?command, "command ignored: empty selection");
            return;
        }

        match command.effect() {
            Effect::Mark(has, set) if collapsed => {
                let mut marks = self.typing_marks(start);
                let on = !has(&marks);
                set(&mut marks, on);
                self.stored_marks = Some(marks);
            }
            Effect::Mark(has, set) => {
                let on = !self.range_covers(start, end, has);
                self.edit(|editor| editor.update_range(start, end, |m| set(m, on)));
            }
            Effect::Link(url) => {
                if url.is_empty() {
                    debug!("link ignored: empty url");
                    return;
                }
                self.edit(|editor| {
                    editor.update_range(start, end, |m| m.link = Some(url.clone()));
                });
            }
            Effect::Block(kind) => {
                let all = self.lines[start.line..=end.line]
                    .iter()
                    .all(|line| line.kind == kind);
                let target = if all { LineKind::Paragraph } else { kind };
                self.edit(|editor| {
                    for line in &mut editor.lines[start.line..=end.line] {
                        line.kind = target;
                    }
                });
            }
        }
    }

    /// Types `text` over the selection with the current typing marks.
    pub fn insert_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.replace_selection(text, None);
    }

    /// Hard line break inside the current line (Shift+Enter).
    pub fn insert_line_break(&mut self) {
        self.replace_selection("\n", Some(Marks::plain()));
    }

    /// Enter: splits the line at the caret. An empty list item or quote
    /// line turns into a paragraph instead; a heading continues as a
    /// paragraph.
    pub fn split_line(&mut self) {
        let Some((start, end)) = self.writable_range("split_line") else {
            return;
        };
        self.edit(|editor| {
            editor.delete_range(start, end);
            editor.stored_marks = None;
            let line = &mut editor.lines[start.line];
            let exits = matches!(line.kind, LineKind::Bullet | LineKind::Ordered | LineKind::Quote);
            if exits && line.is_empty() {
                line.kind = LineKind::Paragraph;
                return;
            }
            let next_kind = match line.kind {
                LineKind::Heading(_) | LineKind::Paragraph => LineKind::Paragraph,
                other => other,
            };
            if start.offset == 0 && !line.is_empty() {
                editor.lines.insert(start.line, Line::empty(next_kind));
            } else {
                let tail = line.split_off(start.offset);
                editor.lines.insert(start.line + 1, Line::new(next_kind, tail));
            }
            editor.selection = Selection::caret(Position::new(start.line + 1, 0));
        });
    }

    /// Backspace: deletes the selection or the char before the caret. At
    /// the start of a typed line it resets the line to a paragraph; at the
    /// start of a paragraph it joins the line with the previous one.
    pub fn delete_backward(&mut self) {
        let Some((start, end)) = self.writable_range("delete_backward") else {
            return;
        };
        self.edit(|editor| {
            editor.stored_marks = None;
            if start != end {
                editor.delete_range(start, end);
                return;
            }
            let Position { line, offset } = start;
            if offset > 0 {
                editor.lines[line].delete(offset - 1, offset);
                editor.selection = Selection::caret(Position::new(line, offset - 1));
            } else if editor.lines[line].kind != LineKind::Paragraph {
                editor.lines[line].kind = LineKind::Paragraph;
            } else if line > 0 {
                let runs = std::mem::take(&mut editor.lines[line].runs);
                editor.lines.remove(line);
                let previous = &mut editor.lines[line - 1];
                let joined_at = previous.len();
                previous.append(runs);
                editor.selection = Selection::caret(Position::new(line - 1, joined_at));
            }
        });
    }

    /// Pastes clipboard text as plain, unstyled text.
    pub fn handle_paste(&mut self, raw: &str) {
        let text = sanitize_paste(raw);
        if text.is_empty() {
            return;
        }
        self.replace_selection(&text, Some(Marks::plain()));
    }

    pub fn handle_keydown(&mut self, key: Key, modifiers: Modifiers) -> KeyOutcome {
        if self.read_only || self.composition.is_some() {
            return KeyOutcome::Ignored;
        }
        if modifiers.primary() {
            let Key::Char(c) = key else {
                return KeyOutcome::Ignored;
            };
            let command = match c.to_ascii_lowercase() {
                'b' => Command::Bold,
                'i' => Command::Italic,
                'u' => Command::Underline,
                'k' => {
                    let has_range = self.valid_range().is_some_and(|(start, end)| start != end);
                    return if has_range {
                        KeyOutcome::LinkRequested
                    } else {
                        KeyOutcome::Handled
                    };
                }
                _ => return KeyOutcome::Ignored,
            };
            self.apply_command(command);
            return KeyOutcome::Handled;
        }
        match key {
            Key::Tab if !modifiers.shift => self.insert_text(TAB),
            Key::Enter if modifiers.shift => self.insert_line_break(),
            Key::Enter => self.split_line(),
            Key::Backspace => self.delete_backward(),
            _ => return KeyOutcome::Ignored,
        }
        KeyOutcome::Handled
    }

    pub fn composition_start(&mut self) {
        if self.read_only || self.composition.is_some() {
            return;
        }
        let Some((start, end)) = self.valid_range() else {
            debug!(selection = ?self.selection, "composition ignored: selection out of range");
            return;
        };
        let before = self.lines.clone();
        self.delete_range(start, end);
        let marks = self.typing_marks(start);
        self.composition = Some(Composition {
            start,
            len: 0,
            marks,
            before,
        });
    }

    /// Replaces the text composed so far. Never reports a change.
    pub fn composition_update(&mut self, text: &str) {
        let Some(mut composition) = self.composition.take() else {
            return;
        };
        self.replace_composed(&mut composition, text);
        self.composition = Some(composition);
    }

    /// Commits the composed text and reports the change once.
    pub fn composition_end(&mut self, text: &str) {
        let Some(mut composition) = self.composition.take() else {
            return;
        };
        self.replace_composed(&mut composition, text);
        self.stored_marks = None;
        if self.lines != composition.before {
            self.emit();
        }
    }

    fn replace_composed(&mut self, composition: &mut Composition, text: &str) {
        let Position { line, offset } = composition.start;
        let Some(target) = self.lines.get_mut(line) else {
            return;
        };
        target.delete(offset, offset + composition.len);
        target.insert(offset, text, composition.marks.clone());
        composition.len = text.chars().count();
        self.selection = Selection::caret(Position::new(line, offset + composition.len));
    }

    fn replace_selection(&mut self, text: &str, marks: Option<Marks>) {
        let Some((start, end)) = self.writable_range("insert") else {
            return;
        };
        self.edit(|editor| {
            editor.delete_range(start, end);
            let marks = marks.unwrap_or_else(|| editor.typing_marks(start));
            editor.lines[start.line].insert(start.offset, text, marks);
            editor.stored_marks = None;
            let offset = start.offset + text.chars().count();
            editor.selection = Selection::caret(Position::new(start.line, offset));
        });
    }

    /// Runs `op` and reports the change if the lines differ afterwards.
    fn edit(&mut self, op: impl FnOnce(&mut Self)) {
        let before = self.lines.clone();
        op(self);
        if self.lines != before {
            self.emit();
        }
    }

    fn emit(&mut self) {
        if self.composition.is_some() {
            return;
        }
        let content = self.content();
        if let Some(callback) = self.on_change.as_mut() {
            callback(&content);
        }
    }

    fn writable_range(&self, op: &'static str) -> Option<(Position, Position)> {
        if self.read_only {
            debug!(op, "edit ignored: read-only");
            return None;
        }
        let range = self.valid_range();
        if range.is_none() {
            debug!(op, selection = ?self.selection, "edit ignored: selection out of range");
        }
        range
    }

    fn valid_range(&self) -> Option<(Position, Position)> {
        let (start, end) = self.selection.ordered();
        let valid = |pos: Position| {
            self.lines
                .get(pos.line)
                .is_some_and(|line| pos.offset <= line.len())
        };
        (valid(start) && valid(end)).then_some((start, end))
    }

    fn typing_marks(&self, at: Position) -> Marks {
        match &self.stored_marks {
            Some(marks) => marks.clone(),
            None => self.lines[at.line].marks_at(at.offset),
        }
    }

    /// `(line, from, to)` for every line the range touches.
    fn line_ranges(&self, start: Position, end: Position) -> Vec<(usize, usize, usize)> {
        (start.line..=end.line)
            .map(|line| {
                let from = if line == start.line { start.offset } else { 0 };
                let to = if line == end.line {
                    end.offset
                } else {
                    self.lines[line].len()
                };
                (line, from, to)
            })
            .collect()
    }

    fn range_covers(&self, start: Position, end: Position, pred: impl Fn(&Marks) -> bool) -> bool {
        let ranges: Vec<_> = self
            .line_ranges(start, end)
            .into_iter()
            .filter(|(_, from, to)| from < to)
            .collect();
        !ranges.is_empty()
            && ranges
                .iter()
                .all(|&(line, from, to)| self.lines[line].covers(from, to, &pred))
    }

    fn update_range(&mut self, start: Position, end: Position, f: impl Fn(&mut Marks)) {
        for (line, from, to) in self.line_ranges(start, end) {
            self.lines[line].update_marks(from, to, &f);
        }
    }

    fn delete_range(&mut self, start: Position, end: Position) {
        if start == end {
            return;
        }
        if start.line == end.line {
            self.lines[start.line].delete(start.offset, end.offset);
        } else {
            let tail = self.lines[end.line].split_off(end.offset);
            self.lines.drain(start.line + 1..=end.line);
            let first = &mut self.lines[start.line];
            let len = first.len();
            first.delete(start.offset, len);
            first.append(tail);
        }
        self.selection = Selection::caret(start);
    }
}

/// Clipboard text reduced to what can be typed: CRLF and CR become LF,
/// tabs become four spaces, other control characters are dropped.
fn sanitize_paste(raw: &str) -> String {
    let normalized = raw.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = String::with_capacity(normalized.len());
    for c in normalized.chars() {
        match c {
            '\n' => out.push('\n'),
            '\t' => out.push_str(TAB),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use guide_format::HeadingLevel;

    use super::*;

    fn recording(content: &str) -> (Editor, Arc<Mutex<Vec<String>>>) {
        let emitted = Arc::new(Mutex::new(Vec::new()));
        let mut editor = Editor::with_content(content);
        let sink = emitted.clone();
        editor.on_change(move |content| sink.lock().unwrap().push(content.to_string()));
        (editor, emitted)
    }

    fn select(editor: &mut Editor, from: (usize, usize), to: (usize, usize)) {
        editor.set_selection(Selection::new(
            Position::new(from.0, from.1),
            Position::new(to.0, to.1),
        ));
    }

    fn count(emitted: &Arc<Mutex<Vec<String>>>) -> usize {
        emitted.lock().unwrap().len()
    }

    #[test]
    fn set_content_does_not_emit() {
        let (mut editor, emitted) = recording("# Title");
        editor.set_content("Other **text**");
        assert_eq!(editor.content(), "Other **text**");
        assert_eq!(count(&emitted), 0);
    }

    #[test]
    fn bold_toggles_over_selection() {
        let (mut editor, emitted) = recording("Hello world");
        select(&mut editor, (0, 0), (0, 5));
        editor.apply_command(Command::Bold);
        assert_eq!(editor.content(), "**Hello** world");
        assert!(editor.is_active(&Command::Bold));

        editor.apply_command(Command::Bold);
        assert_eq!(editor.content(), "Hello world");
        assert_eq!(
            *emitted.lock().unwrap(),
            vec!["**Hello** world".to_string(), "Hello world".to_string()]
        );
    }

    #[test]
    fn collapsed_bold_sets_typing_marks() {
        let (mut editor, emitted) = recording("ab");
        select(&mut editor, (0, 2), (0, 2));
        editor.apply_command(Command::Bold);
        assert_eq!(count(&emitted), 0);
        assert!(editor.is_active(&Command::Bold));

        editor.insert_text("c");
        assert_eq!(editor.content(), "ab**c**");
        assert_eq!(count(&emitted), 1);
    }

    #[test]
    fn block_commands_toggle_every_selected_line() {
        let (mut editor, emitted) = recording("one\n\ntwo");
        select(&mut editor, (0, 1), (1, 1));
        editor.apply_command(Command::Heading(HeadingLevel::One));
        assert_eq!(editor.content(), "# one\n\n# two");
        editor.apply_command(Command::Heading(HeadingLevel::One));
        assert_eq!(editor.content(), "one\n\ntwo");

        editor.apply_command(Command::BulletList);
        assert_eq!(editor.content(), "- one\n- two\n");
        editor.apply_command(Command::OrderedList);
        assert_eq!(editor.content(), "1. one\n2. two\n");
        assert!(editor.is_active(&Command::OrderedList));
        assert_eq!(count(&emitted), 4);
    }

    #[test]
    fn links_and_code_need_a_selection() {
        let (mut editor, emitted) = recording("see docs");
        select(&mut editor, (0, 8), (0, 8));
        editor.apply_command(Command::InlineCode);
        editor.apply_command(Command::InsertLink("https://x.dev".into()));
        assert_eq!(count(&emitted), 0);

        select(&mut editor, (0, 4), (0, 8));
        editor.apply_command(Command::InsertLink("   ".into()));
        assert_eq!(count(&emitted), 0);
        editor.apply_command(Command::InsertLink("https://x.dev".into()));
        assert_eq!(editor.content(), "see [docs](https://x.dev)");

        select(&mut editor, (0, 0), (0, 3));
        editor.apply_command(Command::InlineCode);
        assert_eq!(editor.content(), "`see` [docs](https://x.dev)");
        assert_eq!(count(&emitted), 2);
    }

    #[test]
    fn stale_selection_is_a_silent_no_op() {
        let (mut editor, emitted) = recording("short");
        select(&mut editor, (5, 0), (5, 2));
        editor.apply_command(Command::Bold);
        select(&mut editor, (0, 2), (0, 40));
        editor.apply_command(Command::Italic);
        editor.insert_text("x");
        assert_eq!(editor.content(), "short");
        assert_eq!(count(&emitted), 0);
        assert!(!editor.is_active(&Command::Bold));
    }

    #[test]
    fn read_only_ignores_everything() {
        let (mut editor, emitted) = recording("text");
        editor.set_read_only(true);
        select(&mut editor, (0, 0), (0, 4));
        editor.apply_command(Command::Bold);
        editor.insert_text("x");
        editor.handle_paste("y");
        editor.delete_backward();
        assert_eq!(
            editor.handle_keydown(Key::Char('b'), Modifiers::ctrl()),
            KeyOutcome::Ignored
        );
        assert_eq!(editor.content(), "text");
        assert_eq!(count(&emitted), 0);
    }

    #[test]
    fn paste_is_plain_sanitized_text() {
        let (mut editor, emitted) = recording("**bold**");
        select(&mut editor, (0, 4), (0, 4));
        editor.handle_paste("a\r\nb\tc\u{7}");
        assert_eq!(editor.content(), "**bold**a\nb    c");
        assert_eq!(count(&emitted), 1);
        assert_eq!(sanitize_paste("\r\u{1b}[0m"), "\n[0m");
    }

    #[test]
    fn shortcuts_run_commands() {
        let (mut editor, _) = recording("hello");
        select(&mut editor, (0, 0), (0, 5));
        assert_eq!(
            editor.handle_keydown(Key::Char('B'), Modifiers::ctrl()),
            KeyOutcome::Handled
        );
        assert_eq!(editor.content(), "**hello**");
        assert_eq!(
            editor.handle_keydown(Key::Char('i'), Modifiers::meta()),
            KeyOutcome::Handled
        );
        assert_eq!(editor.content(), "***hello***");
        assert_eq!(
            editor.handle_keydown(Key::Char('k'), Modifiers::ctrl()),
            KeyOutcome::LinkRequested
        );
        assert_eq!(
            editor.handle_keydown(Key::Char('z'), Modifiers::ctrl()),
            KeyOutcome::Ignored
        );
        assert_eq!(
            editor.handle_keydown(Key::Char('a'), Modifiers::none()),
            KeyOutcome::Ignored
        );

        select(&mut editor, (0, 5), (0, 5));
        assert_eq!(
            editor.handle_keydown(Key::Char('k'), Modifiers::ctrl()),
            KeyOutcome::Handled
        );
    }

    #[test]
    fn tab_enter_and_backspace() {
        let (mut editor, emitted) = recording("ab");
        select(&mut editor, (0, 1), (0, 1));
        editor.handle_keydown(Key::Tab, Modifiers::none());
        assert_eq!(editor.content(), "a    b");
        assert_eq!(editor.selection(), Selection::caret(Position::new(0, 5)));

        editor.handle_keydown(Key::Enter, Modifiers::none());
        assert_eq!(editor.content(), "a\n\nb");
        assert_eq!(editor.selection(), Selection::caret(Position::new(1, 0)));

        editor.handle_keydown(Key::Backspace, Modifiers::none());
        assert_eq!(editor.content(), "a    b");
        assert_eq!(editor.selection(), Selection::caret(Position::new(0, 5)));

        editor.handle_keydown(Key::Enter, Modifiers::shift());
        assert_eq!(editor.content(), "a\nb");
        assert_eq!(count(&emitted), 4);
    }

    #[test]
    fn enter_on_empty_item_leaves_the_list() {
        let (mut editor, _) = recording("- item");
        select(&mut editor, (0, 4), (0, 4));
        editor.split_line();
        assert_eq!(editor.lines().len(), 2);
        assert_eq!(editor.lines()[1].kind, LineKind::Bullet);

        editor.split_line();
        assert_eq!(editor.lines().len(), 2);
        assert_eq!(editor.lines()[1].kind, LineKind::Paragraph);

        editor.insert_text("after");
        assert_eq!(editor.content(), "- item\n\nafter");
    }

    #[test]
    fn heading_continues_as_paragraph() {
        let (mut editor, _) = recording("# Title");
        select(&mut editor, (0, 5), (0, 5));
        editor.split_line();
        editor.insert_text("body");
        assert_eq!(editor.content(), "# Title\n\nbody");
    }

    #[test]
    fn deleting_across_lines_joins_them() {
        let (mut editor, _) = recording("one\n\ntwo");
        select(&mut editor, (0, 1), (1, 2));
        editor.insert_text("X");
        assert_eq!(editor.content(), "oXo");
    }

    #[test]
    fn composition_emits_once_at_the_end() {
        let (mut editor, emitted) = recording("ab");
        select(&mut editor, (0, 2), (0, 2));
        editor.composition_start();
        editor.composition_update("k");
        editor.composition_update("ka");
        assert!(editor.is_composing());
        assert_eq!(
            editor.handle_keydown(Key::Enter, Modifiers::none()),
            KeyOutcome::Ignored
        );
        assert_eq!(count(&emitted), 0);

        editor.composition_end("か");
        assert_eq!(*emitted.lock().unwrap(), vec!["abか".to_string()]);
        assert_eq!(editor.selection(), Selection::caret(Position::new(0, 3)));
    }

    #[test]
    fn cancelled_composition_does_not_emit() {
        let (mut editor, emitted) = recording("ab");
        select(&mut editor, (0, 1), (0, 1));
        editor.composition_start();
        editor.composition_update("x");
        editor.composition_end("");
        assert_eq!(editor.content(), "ab");
        assert_eq!(count(&emitted), 0);
    }

    #[test]
    fn renders_current_lines() {
        let editor = Editor::with_content("# T\n\n*x*");
        assert_eq!(editor.render_html(), "<h1>T</h1>\n<p><em>x</em></p>");
    }
}
