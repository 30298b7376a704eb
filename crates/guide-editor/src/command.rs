//! Toolbar commands.

use guide_format::HeadingLevel;

use crate::line::{LineKind, Marks};

/// Formatting command from the toolbar or a shortcut.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Bold,
    Italic,
    Underline,
    Heading(HeadingLevel),
    BulletList,
    OrderedList,
    Blockquote,
    InlineCode,
    InsertLink(String),
}

/// What a command does to the selected text.
pub(crate) enum Effect {
    /// Toggle an inline mark over the selection.
    Mark(fn(&Marks) -> bool, fn(&mut Marks, bool)),
    /// Set a link over the selection.
    Link(String),
    /// Toggle the kind of every selected line.
    Block(LineKind),
}

impl Command {
    pub(crate) fn effect(&self) -> Effect {
        match self {
            Command::Bold => Effect::Mark(|m| m.bold, |m, on| m.bold = on),
            Command::Italic => Effect::Mark(|m| m.italic, |m, on| m.italic = on),
            Command::Underline => Effect::Mark(|m| m.underline, |m, on| m.underline = on),
            Command::InlineCode => Effect::Mark(|m| m.code, |m, on| m.code = on),
            Command::InsertLink(url) => Effect::Link(url.trim().to_string()),
            Command::Heading(level) => Effect::Block(LineKind::Heading(*level)),
            Command::BulletList => Effect::Block(LineKind::Bullet),
            Command::OrderedList => Effect::Block(LineKind::Ordered),
            Command::Blockquote => Effect::Block(LineKind::Quote),
        }
    }

    /// Inline code and links only apply to a non-empty selection.
    pub(crate) fn needs_range(&self) -> bool {
        matches!(self, Command::InlineCode | Command::InsertLink(_))
    }
}
