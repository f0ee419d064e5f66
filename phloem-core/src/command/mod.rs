//! Command synthesis: templates, traffic-log replay, cursor continuation and selection

pub mod placeholder;
pub mod replay;
pub mod scan;
pub mod selector;
pub mod template;

pub use placeholder::{classify_placeholder, ReplaySelector, TokenClass};
pub use replay::{ReplayPattern, ReplaySource, ReplayTarget, TrafficLog, TrafficLogEntry};
pub use scan::{CursorCommand, CursorSession, ScanOutcome, ScanTracker};
pub use selector::{CatalogEntry, CommandSelector, CommandSpec, ConnectionDraw, SelectorOptions};
pub use template::{CommandTemplate, ParsedCommand, RenderContext};

/// Role of a command in cursor iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Not part of cursor iteration
    Plain,
    /// Cursor-bearing command issued with cursor `0`
    ScanInitial,
    /// Cursor-bearing command carrying the last returned cursor
    ScanContinuation,
}

/// A fully resolved request, ready for the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Verb followed by its arguments
    pub args: Vec<Vec<u8>>,
    /// Statistics category
    pub category: String,
    pub kind: CommandKind,
}

impl Command {
    pub fn new(args: Vec<Vec<u8>>, category: impl Into<String>, kind: CommandKind) -> Self {
        Self { args, category: category.into(), kind }
    }

    /// Plain command categorized by its upper-cased verb
    pub fn plain(args: Vec<Vec<u8>>) -> Self {
        let category = args
            .first()
            .map(|verb| String::from_utf8_lossy(verb).to_ascii_uppercase())
            .unwrap_or_default();
        Self { args, category, kind: CommandKind::Plain }
    }

    pub fn verb(&self) -> String {
        self.args.first().map(|v| String::from_utf8_lossy(v).into_owned()).unwrap_or_default()
    }

    pub fn is_cursor_command(&self) -> bool {
        self.kind != CommandKind::Plain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_category_upper_cased() {
        let cmd = Command::plain(vec![b"get".to_vec(), b"k".to_vec()]);
        assert_eq!(cmd.category, "GET");
        assert_eq!(cmd.verb(), "get");
        assert!(!cmd.is_cursor_command());
    }
}
