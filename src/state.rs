//! Per-role state. FOLLOWER and ACCEPTOR carry no role-specific data of
//! their own (everything they'd need — `promised_term`, `last_timer_reset`
//! — lives directly on `Replica`), so only CANDIDATE and PROPOSER get a
//! payload struct.

use std::collections::{HashMap, HashSet};

use crate::log::{LogEntry, LogIndex, ReplicaId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Follower,
    Acceptor,
    Candidate,
    Proposer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Follower => "FOLLOWER",
            Role::Acceptor => "ACCEPTOR",
            Role::Candidate => "CANDIDATE",
            Role::Proposer => "PROPOSER",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CandidateState {
    pub promises_received: HashSet<ReplicaId>,
    pub promoted_entries: Vec<LogEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct ProposerState {
    pub next_index: HashMap<ReplicaId, LogIndex>,
    pub match_index: HashMap<ReplicaId, LogIndex>,
}

/// The role-tagged union of per-role state. Exactly one variant is live at
/// a time; `Replica` never holds state from more than one role
/// simultaneously.
#[derive(Debug, Clone)]
pub enum ReplicaState {
    Follower,
    Acceptor,
    Candidate(CandidateState),
    Proposer(ProposerState),
}

impl ReplicaState {
    pub fn role(&self) -> Role {
        match self {
            ReplicaState::Follower => Role::Follower,
            ReplicaState::Acceptor => Role::Acceptor,
            ReplicaState::Candidate(_) => Role::Candidate,
            ReplicaState::Proposer(_) => Role::Proposer,
        }
    }
}
