//! Rich-text guide editor.
//!
//! The editor owns an explicit line model (see [`line`]) rather than a
//! markup surface. Commands, typed input, paste and IME composition all
//! mutate that model; the canonical Markdown produced by `guide-format` is
//! reported through the change callback.

pub mod command;
pub mod editor;
pub mod key;
pub mod line;
pub mod selection;

pub use command::Command;
pub use editor::{ChangeCallback, Editor};
pub use key::{Key, KeyOutcome, Modifiers};
pub use line::{Line, LineKind, Marks, Run};
pub use selection::{Position, Selection};
