//! The replicated log: a plain in-memory `Vec<LogEntry>`, indexed by
//! position. Entry 0 is always a sentinel NOOP at term 0; persistence and
//! snapshotting are not modeled here.

use crate::command::Command;

pub type Term = u64;
pub type LogIndex = u64;
pub type ReplicaId = u64;

/// `(term, command, creator_id, index)`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LogEntry {
    pub term: Term,
    pub command: Command,
    pub creator_id: ReplicaId,
    pub index: LogIndex,
}

impl LogEntry {
    pub fn sentinel() -> Self {
        LogEntry { term: 0, command: Command::noop(), creator_id: 0, index: 0 }
    }
}

/// An ordered, never-sparse sequence of `LogEntry`, indexed by position.
/// `entries[0]` is always the sentinel.
#[derive(Debug, Clone)]
pub struct Log {
    entries: Vec<LogEntry>,
}

impl Default for Log {
    fn default() -> Self {
        Log { entries: vec![LogEntry::sentinel()] }
    }
}

impl Log {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest populated index (0 if only the sentinel is present).
    pub fn last_index(&self) -> LogIndex {
        (self.entries.len() - 1) as LogIndex
    }

    /// The term of the entry at `index`, if it exists.
    pub fn term(&self, index: LogIndex) -> Option<Term> {
        self.entries.get(index as usize).map(|e| e.term)
    }

    /// The entry at `index`, if it exists.
    pub fn entry(&self, index: LogIndex) -> Option<&LogEntry> {
        self.entries.get(index as usize)
    }

    /// All entries at or after `index` (inclusive), e.g. the tail a
    /// candidate sends to a proposer in a promise, or a leader sends a
    /// follower in a propose.
    pub fn tail_from(&self, index: LogIndex) -> Vec<LogEntry> {
        let start = index as usize;
        if start >= self.entries.len() {
            return Vec::new();
        }
        self.entries[start..].to_vec()
    }

    pub fn append(&mut self, entry: LogEntry) {
        debug_assert_eq!(entry.index, self.last_index() + 1);
        self.entries.push(entry);
    }

    pub fn append_entries(&mut self, entries: impl IntoIterator<Item = LogEntry>) {
        for e in entries {
            self.append(e);
        }
    }

    /// Drops every entry at or after `index`, retaining `[0, index)`.
    pub fn truncate_suffix(&mut self, index: LogIndex) {
        self.entries.truncate(index as usize);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        false // the sentinel is always present
    }
}
