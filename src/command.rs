//! The state machine's command vocabulary: the opaque payload carried by
//! a `LogEntry`.

use serde::{Deserialize, Serialize};

/// Client-assigned, monotonically increasing (per client) command id.
pub type CommandId = u64;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Noop,
    Add,
    Subtract,
    Multiply,
    Divide,
}

/// `(id, kind, value)`. Two commands are equal iff all three fields match.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub id: CommandId,
    pub kind: CommandKind,
    pub value: i64,
}

impl Command {
    pub fn new(id: CommandId, kind: CommandKind, value: i64) -> Self {
        Command { id, kind, value }
    }

    /// The sentinel command occupying `log[0]`.
    pub fn noop() -> Self {
        Command { id: 0, kind: CommandKind::Noop, value: 0 }
    }

    /// Applies this command to a running state machine value.
    ///
    /// MULTIPLY/DIVIDE are reserved opcodes — accepted into the log and
    /// replicated like any other command, but folded as a no-op here until
    /// a concrete reserved-opcode behavior is defined.
    pub fn apply(&self, state: i64) -> i64 {
        match self.kind {
            CommandKind::Noop => state,
            CommandKind::Add => state + self.value,
            CommandKind::Subtract => state - self.value,
            CommandKind::Multiply | CommandKind::Divide => state,
        }
    }
}
