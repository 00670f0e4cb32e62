//! Merge of promoted entries — the candidate-side reconciliation of its
//! own uncommitted tail with every tail received in a `Promise`.
//!
//! Concatenate, stable-sort by index, collapse same-index entries keeping
//! the higher term (ties broken deterministically — see `merge_entries`
//! below for how arrival order is kept from mattering), then fill index
//! gaps with term-0 NOOP fillers so the result is contiguous.

use crate::command::Command;
use crate::log::{LogEntry, LogIndex, ReplicaId, Term};

/// Merges `existing` (the candidate's own promoted tail so far) with
/// `incoming` (a tail just received from one promising peer, `from`).
///
/// On an index collision the entry with the higher term wins; on a tie the
/// entry is attributed to whichever of the two peer ids (the existing
/// slot's creator vs. `from`) is greater, so replaying the same set of
/// promises in a different arrival order always produces the same merged
/// tail.
pub fn merge_entries(existing: Vec<LogEntry>, incoming: Vec<LogEntry>, from: ReplicaId) -> Vec<LogEntry> {
    let mut all = existing;
    all.extend(incoming.into_iter().map(|mut e| {
        e.creator_id = from;
        e
    }));
    all.sort_by_key(|e| e.index);

    let mut collapsed: Vec<LogEntry> = Vec::with_capacity(all.len());
    for entry in all {
        match collapsed.last_mut() {
            Some(last) if last.index == entry.index => {
                let replace = entry.term > last.term
                    || (entry.term == last.term && entry.creator_id > last.creator_id);
                if replace {
                    *last = entry;
                }
            }
            _ => collapsed.push(entry),
        }
    }

    fill_gaps(collapsed, from)
}

/// Fills index gaps between surviving slots with term-0 NOOP entries so the
/// reconciled tail is contiguous.
fn fill_gaps(collapsed: Vec<LogEntry>, filler_creator: ReplicaId) -> Vec<LogEntry> {
    let mut filled = Vec::with_capacity(collapsed.len());
    let mut prev_index: Option<LogIndex> = None;

    for entry in collapsed {
        if let Some(prev) = prev_index {
            let mut filler_index = prev + 1;
            while filler_index < entry.index {
                filled.push(filler(filler_index, filler_creator));
                filler_index += 1;
            }
        }
        prev_index = Some(entry.index);
        filled.push(entry);
    }

    filled
}

fn filler(index: LogIndex, creator_id: ReplicaId) -> LogEntry {
    LogEntry { term: 0, command: Command::noop(), creator_id, index }
}

/// The term every promoted entry is rewritten to immediately prior to
/// transmission, once the candidate has become the leader.
pub fn reterm(entries: &mut [LogEntry], new_term: Term) {
    for e in entries {
        e.term = new_term;
    }
}
