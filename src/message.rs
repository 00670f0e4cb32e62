//! Wire types: the message envelope and the typed payloads exchanged
//! between replicas — prepare/promise for election, propose/accept for
//! log replication, plus the client request/response pair.

use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::log::{LogEntry, LogIndex, ReplicaId, Term};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    Prepare,
    Promise,
    Propose,
    Accept,
    ClientRequest,
    ClientResponse,
}

/// `{type, from, to, seq}`. `to == None` means a peer broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageHeader {
    pub message_type: MessageType,
    pub from: ReplicaId,
    pub to: Option<ReplicaId>,
    pub seq: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreparePayload {
    pub term: Term,
    pub proposer_id: ReplicaId,
    pub proposer_commit_index: LogIndex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromisePayload {
    pub vote_granted: bool,
    pub term: Term,
    pub entries: Vec<LogEntry>,
}

/// `entries: None` is the heartbeat-carrying variant: asserts leadership
/// and carries `leader_commit` without replicating any new entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposePayload {
    pub term: Term,
    pub prev_log_index: Option<LogIndex>,
    pub prev_log_term: Option<Term>,
    pub entries: Option<Vec<LogEntry>>,
    pub leader_commit: LogIndex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptPayload {
    pub success: bool,
    pub term: Term,
    pub index: LogIndex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientResponsePayload {
    pub success: bool,
    pub command: Command,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Payload {
    Prepare(PreparePayload),
    Promise(PromisePayload),
    Propose(ProposePayload),
    Accept(AcceptPayload),
    ClientRequest(Command),
    ClientResponse(ClientResponsePayload),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub header: MessageHeader,
    pub payload: Payload,
}

impl Envelope {
    pub fn unicast(message_type: MessageType, from: ReplicaId, to: ReplicaId, seq: u64, payload: Payload) -> Self {
        Envelope { header: MessageHeader { message_type, from, to: Some(to), seq }, payload }
    }

    pub fn broadcast(message_type: MessageType, from: ReplicaId, seq: u64, payload: Payload) -> Self {
        Envelope { header: MessageHeader { message_type, from, to: None, seq }, payload }
    }
}

/// A sleep-trigger event. Not a peer `Envelope`: it arrives from the chaos
/// collaborator, addressed by a target-id set rather than a single `to`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SleepTrigger {
    pub target_ids: Vec<ReplicaId>,
    pub sleep_leader: bool,
    pub time_to_sleep_ms: u64,
}
