//! The network boundary. `Replica` never touches a socket; something
//! implementing `Transport` carries its `Envelope`s to peers. A real
//! deployment would back this with TCP or HTTP; the demo binary uses the
//! in-memory channel version below, which is sufficient to exercise the
//! whole protocol in one process.

use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::log::ReplicaId;
use crate::message::Envelope;

/// Delivers one outbound envelope. `to: None` on the envelope's header
/// means "every other replica"; a `Transport` implementation is
/// responsible for fanning that out.
pub trait Transport: Send + Sync {
    fn send(&self, envelope: Envelope);
}

/// A `Transport` wired directly to each peer's inbound channel, with no
/// serialization or real network hop — every replica in the demo lives in
/// the same process.
pub struct InMemoryTransport {
    peers: HashMap<ReplicaId, mpsc::UnboundedSender<Envelope>>,
}

impl InMemoryTransport {
    pub fn new(peers: HashMap<ReplicaId, mpsc::UnboundedSender<Envelope>>) -> Self {
        InMemoryTransport { peers }
    }
}

impl Transport for InMemoryTransport {
    fn send(&self, envelope: Envelope) {
        match envelope.header.to {
            Some(to) => {
                if let Some(sender) = self.peers.get(&to) {
                    let _ = sender.send(envelope);
                }
            }
            None => {
                let from = envelope.header.from;
                for (&id, sender) in &self.peers {
                    if id != from {
                        let _ = sender.send(envelope.clone());
                    }
                }
            }
        }
    }
}
