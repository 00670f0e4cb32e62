//! The replica role state machine: election, log replication, commit and
//! apply, and client request handling.
//!
//! `Replica` never performs IO. Every handler takes `&mut self` plus an
//! `&mut Effects` out-parameter and returns nothing but a
//! [`crate::errors::Result`]: outbound messages, client responses, and
//! sleep requests all accumulate on `Effects` for a driver to dispatch
//! afterward, and an `Err` means the handler observed a state the protocol
//! should make impossible. This keeps the algorithm itself synchronous and
//! trivially single-threaded per replica, with the driver's event loop the
//! only place that touches a clock, a socket, or a sleep.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;

use crate::command::Command;
use crate::config::Config;
use crate::errors::*;
use crate::log::{Log, LogEntry, LogIndex, ReplicaId, Term};
use crate::merge;
use crate::message::{
    AcceptPayload, ClientResponsePayload, Envelope, MessageType, Payload, PreparePayload,
    PromisePayload, ProposePayload, SleepTrigger,
};
use crate::state::{CandidateState, ProposerState, ReplicaState, Role};

/// What a chaos sleep-trigger asks this replica to do.
#[derive(Debug, Clone)]
pub enum SleepEffect {
    /// This replica is the leader and sleeping it is disallowed: forward
    /// the trigger to some other, not-already-targeted peer instead.
    Forward { to: ReplicaId, trigger: SleepTrigger },
    /// This replica should itself suspend for `duration`. The driver is
    /// expected to stop delivering events for that long and then call
    /// [`Replica::resume_from_sleep`].
    SelfSleep { duration: Duration },
}

/// Everything a single handler call produced. A driver drains `outbound`
/// to the transport, `client_response` to the client link, and `sleep` to
/// whatever suspends delivery.
#[derive(Debug, Clone, Default)]
pub struct Effects {
    pub outbound: Vec<Envelope>,
    pub client_response: Option<ClientResponsePayload>,
    pub sleep: Option<SleepEffect>,
}

impl Effects {
    pub fn new() -> Self {
        Effects::default()
    }
}

/// A single replica's consensus state. `id` is the replica's own ordinal
/// in `1..=config.n`.
pub struct Replica {
    id: ReplicaId,
    config: Config,
    seq: u64,

    current_term: Term,
    promised_term: Option<Term>,
    last_timer_reset: Instant,

    log: Log,
    commit_index: LogIndex,
    last_applied: LogIndex,
    state_machine_value: i64,

    state: ReplicaState,
}

impl Replica {
    /// A fresh replica, seeded at term `id` so that every replica's terms
    /// occupy a distinct residue class mod `config.n` from the start.
    pub fn new(id: ReplicaId, config: Config, now: Instant) -> Self {
        Replica {
            id,
            current_term: id,
            promised_term: None,
            last_timer_reset: now,
            log: Log::new(),
            commit_index: 0,
            last_applied: 0,
            state_machine_value: 0,
            state: ReplicaState::Follower,
            config,
            seq: 0,
        }
    }

    pub fn id(&self) -> ReplicaId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.state.role()
    }

    pub fn current_term(&self) -> Term {
        self.current_term
    }

    pub fn commit_index(&self) -> LogIndex {
        self.commit_index
    }

    pub fn state_machine_value(&self) -> i64 {
        self.state_machine_value
    }

    pub fn log(&self) -> &Log {
        &self.log
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn peer_ids(&self) -> Vec<ReplicaId> {
        (1..=self.config.n).filter(|&p| p != self.id).collect()
    }

    /// The cluster's highest-ordinal replica seeds the first leader
    /// directly, skipping a pointless first election in an otherwise
    /// empty cluster. Every other replica calls this as a no-op.
    pub fn bootstrap(&mut self, now: Instant, effects: &mut Effects) {
        if self.id == self.config.n {
            self.become_proposer(now, effects);
        }
    }

    // ---- role transitions -------------------------------------------------

    fn become_follower(&mut self, now: Instant) {
        self.promised_term = None;
        self.last_timer_reset = now;
        self.state = ReplicaState::Follower;
    }

    fn become_candidate(&mut self, now: Instant) {
        self.last_timer_reset = now;
        self.state = ReplicaState::Candidate(CandidateState::default());
    }

    /// Bumps `current_term` by `config.n` (preserving this replica's
    /// residue class), resets the timer, and broadcasts a fresh prepare.
    /// Used both for a replica's first candidacy and for every
    /// resend-on-timeout while already a candidate.
    fn send_prepare(&mut self, now: Instant, effects: &mut Effects) {
        self.last_timer_reset = now;
        self.current_term += self.config.n;
        self.promised_term = Some(self.current_term);

        let mut promises_received = std::collections::HashSet::new();
        promises_received.insert(self.id);
        let promoted_entries = self.log.tail_from(self.commit_index + 1);
        self.state = ReplicaState::Candidate(CandidateState { promises_received, promoted_entries });

        let seq = self.next_seq();
        effects.outbound.push(Envelope::broadcast(
            MessageType::Prepare,
            self.id,
            seq,
            Payload::Prepare(PreparePayload {
                term: self.current_term,
                proposer_id: self.id,
                proposer_commit_index: self.commit_index,
            }),
        ));
    }

    /// Splices the candidate's reconciled tail into the log, re-termed to
    /// the winning term, then performs the generic become-leader steps.
    fn become_proposer_from_candidate(&mut self, now: Instant, effects: &mut Effects) {
        if let ReplicaState::Candidate(ref mut cs) = self.state {
            let mut promoted = std::mem::take(&mut cs.promoted_entries);
            merge::reterm(&mut promoted, self.current_term);
            self.log.truncate_suffix(self.commit_index + 1);
            self.log.append_entries(promoted);
        }
        self.become_proposer(now, effects);
    }

    /// Initializes leader-only progress tracking, then replicates each
    /// peer's tail from `commit_index + 1` on (which, for a freshly
    /// promoted candidate, is exactly the reconciled `promoted_entries`
    /// spliced into the log just before this call) — this is the one
    /// point where a recovered uncommitted suffix actually gets pushed to
    /// followers, rather than waiting on the next client command. Also
    /// replies to a carried-over pending client command if one is sitting
    /// unacknowledged at `last_applied`.
    fn become_proposer(&mut self, now: Instant, effects: &mut Effects) {
        self.last_timer_reset = now;
        let mut next_index = HashMap::new();
        let mut match_index = HashMap::new();
        for p in self.peer_ids() {
            next_index.insert(p, self.commit_index + 1);
            match_index.insert(p, 0);
        }
        self.state = ReplicaState::Proposer(ProposerState { next_index, match_index });

        for peer in self.peer_ids() {
            self.replicate_to_peer(peer, effects);
        }

        if let Some(applied) = self.log.entry(self.last_applied) {
            if applied.command.id != 0 {
                self.send_client_response(effects);
            }
        }
    }

    fn broadcast_heartbeat(&mut self, effects: &mut Effects) {
        for peer in self.peer_ids() {
            let seq = self.next_seq();
            effects.outbound.push(Envelope::unicast(
                MessageType::Propose,
                self.id,
                peer,
                seq,
                Payload::Propose(ProposePayload {
                    term: self.current_term,
                    prev_log_index: None,
                    prev_log_term: None,
                    entries: None,
                    leader_commit: self.commit_index,
                }),
            ));
        }
    }

    // ---- periodic tick ------------------------------------------------------

    /// Driven by the replica's own timer, at a fixed granularity
    /// independent of role.
    pub fn handle_tick(&mut self, now: Instant, effects: &mut Effects) {
        match &self.state {
            ReplicaState::Proposer(_) => self.broadcast_heartbeat(effects),
            ReplicaState::Follower => {
                if self.promised_term.is_none() && self.timed_out(now) {
                    self.become_candidate(now);
                }
            }
            ReplicaState::Candidate(_) => {
                if self.timed_out(now) {
                    self.send_prepare(now, effects);
                }
            }
            ReplicaState::Acceptor => {}
        }
    }

    fn timed_out(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_timer_reset) > self.config.timeout
    }

    // ---- election: prepare / promise ----------------------------------------

    /// Any role may receive a prepare; granting it always moves the
    /// replica to ACCEPTOR regardless of its role beforehand.
    pub fn handle_prepare(&mut self, from: ReplicaId, payload: PreparePayload, now: Instant, effects: &mut Effects) {
        let grant = payload.term > self.current_term
            && self.promised_term.map_or(true, |pt| payload.term > pt);

        if grant {
            self.promised_term = Some(payload.term);
            self.last_timer_reset = now;
            self.state = ReplicaState::Acceptor;
        }

        let entries = self.log.tail_from(payload.proposer_commit_index + 1);
        let seq = self.next_seq();
        effects.outbound.push(Envelope::unicast(
            MessageType::Promise,
            self.id,
            from,
            seq,
            Payload::Promise(PromisePayload { vote_granted: grant, term: self.current_term, entries }),
        ));
    }

    /// Candidate-only; ignored in every other role (a promise arriving
    /// after the candidacy already resolved is simply stale).
    pub fn handle_promise(&mut self, from: ReplicaId, payload: PromisePayload, now: Instant, effects: &mut Effects) {
        if !payload.vote_granted {
            return;
        }
        let majority_reached = if let ReplicaState::Candidate(ref mut cs) = self.state {
            cs.promises_received.insert(from);
            let existing = std::mem::take(&mut cs.promoted_entries);
            cs.promoted_entries = merge::merge_entries(existing, payload.entries, from);
            cs.promises_received.len() as u64 > self.config.n / 2
        } else {
            false
        };
        if majority_reached {
            self.become_proposer_from_candidate(now, effects);
        }
    }

    // ---- replication: propose / accept ---------------------------------------

    /// Any role may receive a propose; a message addressed to a different
    /// replica is dropped (defensive — a real transport would never
    /// deliver it here in the first place).
    pub fn handle_propose(
        &mut self,
        from: ReplicaId,
        to: ReplicaId,
        payload: ProposePayload,
        now: Instant,
        effects: &mut Effects,
    ) -> Result<()> {
        if to != self.id {
            return Ok(());
        }

        if payload.entries.is_none() {
            self.handle_heartbeat(payload, now);
            return Ok(());
        }

        self.last_timer_reset = now;

        if payload.term < self.current_term {
            self.reply_accept(from, false, payload.prev_log_index.unwrap_or(0), effects);
            return Ok(());
        }
        self.become_follower(now);

        let prev_index = payload.prev_log_index.unwrap_or(0);
        let prev_term = payload.prev_log_term.unwrap_or(0);
        if self.log.last_index() < prev_index || self.log.term(prev_index) != Some(prev_term) {
            self.reply_accept(from, false, prev_index, effects);
            return Ok(());
        }

        let entries = payload.entries.unwrap();

        // Compare every overlapping index rather than assuming only the
        // very first one can conflict: a stale leader can otherwise
        // resend a tail whose early entries already match but whose
        // later ones don't.
        let mut first_new = 0usize;
        while first_new < entries.len() {
            let idx = prev_index + 1 + first_new as LogIndex;
            match self.log.term(idx) {
                Some(t) if t == entries[first_new].term => first_new += 1,
                Some(_) => {
                    if idx <= self.commit_index {
                        bail!(ErrorKind::InvariantViolation(
                            self.state.role().as_str().to_string(),
                            self.current_term,
                            format!(
                                "propose from {} would truncate already-committed index {}",
                                from, idx
                            ),
                        ));
                    }
                    self.log.truncate_suffix(idx);
                    break;
                }
                None => break,
            }
        }
        self.log.append_entries(entries[first_new..].iter().cloned());

        let index = prev_index + entries.len() as LogIndex;
        self.reply_accept(from, true, index, effects);

        self.apply_as_follower(payload.leader_commit);
        Ok(())
    }

    fn reply_accept(&mut self, to: ReplicaId, success: bool, index: LogIndex, effects: &mut Effects) {
        let seq = self.next_seq();
        effects.outbound.push(Envelope::unicast(
            MessageType::Accept,
            self.id,
            to,
            seq,
            Payload::Accept(AcceptPayload { success, term: self.current_term, index }),
        ));
    }

    /// A propose with `entries: None`: asserts the sender's leadership
    /// without replicating anything new.
    fn handle_heartbeat(&mut self, payload: ProposePayload, now: Instant) {
        if payload.term > self.current_term {
            self.become_follower(now);
            self.apply_as_follower(payload.leader_commit);
        }
    }

    /// Proposer-only; ignored in every other role, matching the role the
    /// message is meaningful for rather than falling through an
    /// unreachable default arm.
    pub fn handle_accept(&mut self, from: ReplicaId, payload: AcceptPayload, now: Instant, effects: &mut Effects) {
        if !matches!(self.state, ReplicaState::Proposer(_)) {
            return;
        }

        if payload.success {
            if let ReplicaState::Proposer(ref mut ps) = self.state {
                // Derived straight from this accept's own prevLogIndex +
                // entries, not from replaying `promoted_entries.len()`
                // after the fact, so it can't drift from what the
                // follower actually durably has.
                ps.match_index.insert(from, payload.index);
                ps.next_index.insert(from, payload.index + 1);
            }
            self.commit_entries(effects);
            return;
        }

        if payload.term > self.current_term {
            self.current_term = payload.term;
            self.become_follower(now);
            return;
        }

        if let ReplicaState::Proposer(ref mut ps) = self.state {
            let ni = ps.next_index.entry(from).or_insert(1);
            if *ni > 1 {
                *ni -= 1;
            }
        }
    }

    /// Advances `commit_index` over every index in `(commit_index, last]`
    /// that both belongs to the current term and is already durable on a
    /// majority of replicas (including self), then applies the newly
    /// committed entries. Only once `last_applied` has actually caught up
    /// to the log's tail does it report the committed command back to its
    /// client and nudge followers with a heartbeat — a commit that still
    /// trails the tail says nothing final yet.
    fn commit_entries(&mut self, effects: &mut Effects) {
        let match_index = match &self.state {
            ReplicaState::Proposer(ps) => ps.match_index.clone(),
            _ => return,
        };

        let before = self.commit_index;
        let last = self.log.last_index();
        for i in (self.commit_index + 1)..=last {
            if self.log.term(i) != Some(self.current_term) {
                continue;
            }
            let acked = 1 + match_index.values().filter(|&&m| m >= i).count() as u64;
            if acked > self.config.n / 2 {
                self.commit_index = i;
            }
        }

        if self.commit_index > before {
            for i in (before + 1)..=self.commit_index {
                self.apply_entry(i);
            }
            if self.last_applied == self.log.last_index() {
                self.broadcast_heartbeat(effects);
                self.send_client_response(effects);
            }
        }
    }

    fn apply_entry(&mut self, index: LogIndex) {
        if let Some(entry) = self.log.entry(index) {
            self.state_machine_value = entry.command.apply(self.state_machine_value);
            self.last_applied = index;
        }
    }

    /// Advances `commit_index`/`last_applied` to `min(leader_commit,
    /// last_index)` and applies anything newly covered. Never produces a
    /// client response — only the leader that originally accepted a
    /// command replies to it.
    fn apply_as_follower(&mut self, leader_commit: LogIndex) {
        let new_commit = leader_commit.min(self.log.last_index());
        if new_commit > self.commit_index {
            let old_commit = self.commit_index;
            self.commit_index = new_commit;
            for i in (old_commit + 1)..=new_commit {
                self.apply_entry(i);
            }
        }
    }

    fn send_client_response(&mut self, effects: &mut Effects) {
        if let Some(entry) = self.log.entry(self.last_applied) {
            effects.client_response =
                Some(ClientResponsePayload { success: true, command: entry.command });
        }
    }

    // ---- client requests ----------------------------------------------------

    /// Only a PROPOSER appends client commands to the log; every other
    /// role silently drops the request (the client is responsible for
    /// retrying against whichever replica is actually leading).
    ///
    /// A retransmit of the command already sitting at `last_applied` is
    /// not appended again: the leader just re-sends the same response, so
    /// a client that never saw its first `CLIENT_RESPONSE` can't get the
    /// command committed twice.
    pub fn handle_client_request(&mut self, command: Command, effects: &mut Effects) {
        if !matches!(self.state, ReplicaState::Proposer(_)) {
            return;
        }
        if let Some(applied) = self.log.entry(self.last_applied) {
            if applied.command.id == command.id {
                self.send_client_response(effects);
                return;
            }
        }
        let term = self.current_term;
        let index = self.log.last_index() + 1;
        self.log.append(LogEntry { term, command, creator_id: self.id, index });

        let peers = self.peer_ids();
        for peer in peers {
            self.replicate_to_peer(peer, effects);
        }
    }

    fn replicate_to_peer(&mut self, peer: ReplicaId, effects: &mut Effects) {
        let next_index = match &self.state {
            ReplicaState::Proposer(ps) => *ps.next_index.get(&peer).unwrap_or(&(self.commit_index + 1)),
            _ => return,
        };
        let prev_index = next_index.saturating_sub(1);
        let prev_term = self.log.term(prev_index).unwrap_or(0);
        let entries = self.log.tail_from(next_index);

        let seq = self.next_seq();
        effects.outbound.push(Envelope::unicast(
            MessageType::Propose,
            self.id,
            peer,
            seq,
            Payload::Propose(ProposePayload {
                term: self.current_term,
                prev_log_index: Some(prev_index),
                prev_log_term: Some(prev_term),
                entries: Some(entries),
                leader_commit: self.commit_index,
            }),
        ));
    }

    // ---- chaos sleep triggers -------------------------------------------------

    /// A sleep trigger this replica isn't targeted by is ignored. A
    /// targeted leader forwards it on to some other, not-yet-targeted
    /// peer instead of sleeping itself, unless `sleep_leader` overrides
    /// that. Every other targeted role sleeps directly.
    pub fn handle_sleep_trigger(&mut self, trigger: SleepTrigger, effects: &mut Effects) {
        if !trigger.target_ids.contains(&self.id) {
            return;
        }

        let is_leader = matches!(self.state, ReplicaState::Proposer(_));
        if is_leader && !trigger.sleep_leader {
            if let Some(peer) = self.choose_forward_target(&trigger.target_ids) {
                effects.sleep = Some(SleepEffect::Forward {
                    to: peer,
                    trigger: SleepTrigger {
                        target_ids: vec![peer],
                        sleep_leader: trigger.sleep_leader,
                        time_to_sleep_ms: trigger.time_to_sleep_ms,
                    },
                });
            }
            return;
        }

        effects.sleep = Some(SleepEffect::SelfSleep {
            duration: Duration::from_millis(trigger.time_to_sleep_ms),
        });
    }

    fn choose_forward_target(&self, already_targeted: &[ReplicaId]) -> Option<ReplicaId> {
        let excluded: std::collections::HashSet<ReplicaId> = already_targeted.iter().copied().collect();
        let candidates: Vec<ReplicaId> = self.peer_ids().into_iter().filter(|p| !excluded.contains(p)).collect();
        candidates.choose(&mut rand::thread_rng()).copied()
    }

    /// Called by the driver once a self-sleep's duration has elapsed.
    /// Queued events that arrived during the sleep are processed in
    /// order immediately afterward, same as any other follower event.
    pub fn resume_from_sleep(&mut self, now: Instant) {
        self.become_follower(now);
    }
}
