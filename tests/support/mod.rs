//! A tiny in-memory cluster harness shared by the integration tests below.
//!
//! `Replica` handlers are plain synchronous functions, so exercising the
//! full protocol across several replicas needs neither `tokio` nor a real
//! `Transport` — this just queues `Envelope`s and redelivers them through
//! `multipaxos::node::dispatch_inbound`, the same dispatch `node::run` uses.

use std::collections::VecDeque;
use std::time::Instant;

use multipaxos::command::Command;
use multipaxos::config::Config;
use multipaxos::consensus::{Effects, Replica};
use multipaxos::log::ReplicaId;
use multipaxos::message::{ClientResponsePayload, Envelope};
use multipaxos::node::dispatch_inbound;
use multipaxos::state::Role;

pub struct Cluster {
    pub replicas: Vec<Replica>,
    pub now: Instant,
    queue: VecDeque<Envelope>,
    pub client_responses: Vec<ClientResponsePayload>,
}

impl Cluster {
    /// Builds `n` replicas and runs `bootstrap` on each, exactly as
    /// `main.rs` does for the demo binary.
    pub fn new(n: u64, config: Config) -> Self {
        let now = Instant::now();
        let mut replicas: Vec<Replica> = (1..=n).map(|id| Replica::new(id, config.clone(), now)).collect();
        let mut queue = VecDeque::new();
        for r in &mut replicas {
            let mut effects = Effects::new();
            r.bootstrap(now, &mut effects);
            queue.extend(effects.outbound);
        }
        Cluster { replicas, now, queue, client_responses: Vec::new() }
    }

    fn replica_mut(&mut self, id: ReplicaId) -> &mut Replica {
        self.replicas.iter_mut().find(|r| r.id() == id).expect("unknown replica id")
    }

    pub fn replica(&self, id: ReplicaId) -> &Replica {
        self.replicas.iter().find(|r| r.id() == id).expect("unknown replica id")
    }

    pub fn leader(&self) -> Option<&Replica> {
        self.replicas.iter().find(|r| r.role() == Role::Proposer)
    }

    /// Delivers every envelope currently queued, expanding broadcasts to
    /// every other replica, feeding whatever each handler produces back
    /// onto the queue, until nothing is left in flight. Models an
    /// idealized Transport that never drops or reorders within a round.
    pub fn drain(&mut self) {
        while let Some(envelope) = self.queue.pop_front() {
            let targets: Vec<ReplicaId> = match envelope.header.to {
                Some(to) => vec![to],
                None => {
                    let from = envelope.header.from;
                    self.replicas.iter().map(|r| r.id()).filter(|&id| id != from).collect()
                }
            };
            for to in targets {
                let mut effects = Effects::new();
                let replica = self.replica_mut(to);
                dispatch_inbound(replica, envelope.clone(), self.now, &mut effects);
                self.queue.extend(effects.outbound);
                if let Some(response) = effects.client_response {
                    self.client_responses.push(response);
                }
            }
        }
    }

    pub fn client_request(&mut self, leader: ReplicaId, command: Command) {
        let mut effects = Effects::new();
        self.replica_mut(leader).handle_client_request(command, &mut effects);
        self.queue.extend(effects.outbound);
        if let Some(response) = effects.client_response {
            self.client_responses.push(response);
        }
    }

    pub fn tick_all(&mut self) {
        for r in &mut self.replicas {
            let mut effects = Effects::new();
            r.handle_tick(self.now, &mut effects);
            self.queue.extend(effects.outbound);
        }
    }
}
