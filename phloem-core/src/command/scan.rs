//! Cursor continuation tracking
//!
//! With incremental iteration enabled, a cursor-bearing command drawn with cursor `0` opens a
//! session on its connection. Every response carrying a non-zero cursor schedules a
//! continuation that reuses the initial command's arguments with the cursor replaced, until the
//! server returns cursor `0` or the configured number of continuations has been issued.
//!
//! ```text
//! Idle --begin--> Active --cursor 0 / cap reached / error--> Idle
//!                   ^  |
//!                   +--+ cursor c != 0: continuation with cursor c
//! ```

use super::template::CommandTemplate;
use super::{Command, CommandKind};

/// Commands whose cursor is the first argument
const KEYLESS_CURSOR_VERBS: [&str; 1] = ["SCAN"];
/// Commands whose cursor follows a key argument
const KEYED_CURSOR_VERBS: [&str; 3] = ["HSCAN", "SSCAN", "ZSCAN"];

/// A template recognized as a cursor-bearing iteration command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorCommand {
    verb: String,
    cursor_index: usize,
}

impl CursorCommand {
    /// Recognize `SCAN 0 ...` and `HSCAN|SSCAN|ZSCAN <key> 0 ...`
    pub fn recognize(template: &CommandTemplate) -> Option<Self> {
        let verb = template.verb().to_ascii_uppercase();
        let cursor_index = if KEYLESS_CURSOR_VERBS.contains(&verb.as_str()) {
            1
        } else if KEYED_CURSOR_VERBS.contains(&verb.as_str()) {
            2
        } else {
            return None;
        };

        (template.literal_argument(cursor_index) == Some("0"))
            .then_some(Self { verb, cursor_index })
    }

    pub fn verb(&self) -> &str {
        &self.verb
    }

    pub fn cursor_index(&self) -> usize {
        self.cursor_index
    }

    /// Category of commands issued with cursor `0`
    pub fn initial_category(&self) -> String {
        format!("{} 0", self.verb)
    }

    /// Category of commands carrying a returned cursor
    pub fn continuation_category(&self) -> String {
        format!("{} <cursor>", self.verb)
    }
}

/// Open iteration on one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorSession {
    command: CursorCommand,
    /// Arguments of the initial command, keys and payloads already substituted
    base_args: Vec<Vec<u8>>,
    pub current_cursor: u64,
    /// Continuations issued so far
    pub iterations_done: u32,
    pub max_iterations: Option<u32>,
}

impl CursorSession {
    /// Filter clauses following the cursor (MATCH/COUNT/TYPE)
    pub fn options(&self) -> &[Vec<u8>] {
        self.base_args.get(self.command.cursor_index + 1..).unwrap_or_default()
    }

    pub fn command(&self) -> &CursorCommand {
        &self.command
    }

    fn continuation(&self) -> Command {
        let mut args = self.base_args.clone();
        if let Some(cursor) = args.get_mut(self.command.cursor_index) {
            *cursor = self.current_cursor.to_string().into_bytes();
        }
        Command::new(args, self.command.continuation_category(), CommandKind::ScanContinuation)
    }
}

/// Result of feeding a response to the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Server returned cursor 0
    Completed,
    /// The last permitted continuation finished
    Capped,
    /// Next slot carries this cursor
    Continue(u64),
    /// Response had no cursor (error reply or unexpected shape)
    Abandoned,
    /// No session was waiting for a response
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TrackerState {
    Idle,
    Active { session: CursorSession, in_flight: bool },
}

/// Per-connection cursor continuation state machine
#[derive(Debug, Clone)]
pub struct ScanTracker {
    max_iterations: Option<u32>,
    state: TrackerState,
}

impl ScanTracker {
    pub fn new(max_iterations: Option<u32>) -> Self {
        Self { max_iterations, state: TrackerState::Idle }
    }

    /// Open a session for a freshly drawn initial command and return it
    pub fn begin(&mut self, command: CursorCommand, args: Vec<Vec<u8>>) -> Command {
        let initial =
            Command::new(args.clone(), command.initial_category(), CommandKind::ScanInitial);
        self.state = TrackerState::Active {
            session: CursorSession {
                command,
                base_args: args,
                current_cursor: 0,
                iterations_done: 0,
                max_iterations: self.max_iterations,
            },
            in_flight: true,
        };
        initial
    }

    /// The continuation owed by this connection, if any
    ///
    /// Checked before every weighted draw: an open session pre-empts fresh commands.
    pub fn next_continuation(&mut self) -> Option<Command> {
        match &mut self.state {
            TrackerState::Active { session, in_flight } if !*in_flight => {
                *in_flight = true;
                Some(session.continuation())
            }
            _ => None,
        }
    }

    /// Feed the cursor returned for the in-flight command
    pub fn on_response(&mut self, cursor: Option<u64>) -> ScanOutcome {
        let TrackerState::Active { session, in_flight } = &mut self.state else {
            return ScanOutcome::Ignored;
        };
        if !*in_flight {
            return ScanOutcome::Ignored;
        }

        let outcome = match cursor {
            None => ScanOutcome::Abandoned,
            Some(0) => ScanOutcome::Completed,
            Some(_) if session.max_iterations.is_some_and(|max| session.iterations_done >= max) => {
                ScanOutcome::Capped
            }
            Some(next) => {
                session.iterations_done += 1;
                session.current_cursor = next;
                *in_flight = false;
                return ScanOutcome::Continue(next);
            }
        };

        self.state = TrackerState::Idle;
        outcome
    }

    /// Discard any open session
    pub fn abandon(&mut self) {
        self.state = TrackerState::Idle;
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, TrackerState::Active { .. })
    }

    pub fn session(&self) -> Option<&CursorSession> {
        match &self.state {
            TrackerState::Active { session, .. } => Some(session),
            TrackerState::Idle => None,
        }
    }
}
