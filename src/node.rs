//! The async driver: the only place in this crate that touches a clock,
//! awaits a channel, or sleeps. Wires a synchronous [`Replica`] up to a
//! [`Transport`], a client response sink, and whatever feeds it ticks,
//! client commands, and chaos sleep triggers.
//!
//! Deliberately kept thin: every decision lives in `Replica`; this module
//! only drains the `Effects` each decision produces.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;

use crate::command::Command;
use crate::consensus::{Effects, Replica, SleepEffect};
use crate::log::ReplicaId;
use crate::message::{ClientResponsePayload, Envelope, Payload, SleepTrigger};
use crate::state::Role;
use crate::statistics::Statistics;
use crate::transport::Transport;

/// Everything that can happen to a replica outside of peer traffic.
pub enum LocalEvent {
    Tick,
    ClientRequest(Command),
    Sleep(SleepTrigger),
}

/// Routes an inbound envelope to the handler its payload names. Each
/// handler decides for itself, from its own current role, whether the
/// message is meaningful right now — there is no separate role dispatch
/// table to keep in sync with `Replica`'s own state.
///
/// Public so test harnesses can drive a cluster of `Replica`s through the
/// same dispatch logic `run` uses, without pulling in tokio channels.
pub fn dispatch_inbound(replica: &mut Replica, envelope: Envelope, now: Instant, effects: &mut Effects) {
    let from = envelope.header.from;
    let to = envelope.header.to.unwrap_or_else(|| replica.id());
    match envelope.payload {
        Payload::Prepare(p) => replica.handle_prepare(from, p, now, effects),
        Payload::Promise(p) => replica.handle_promise(from, p, now, effects),
        Payload::Propose(p) => {
            if let Err(err) = replica.handle_propose(from, to, p, now, effects) {
                // Per the core's error design, this category is never an
                // expected protocol rejection — it means this replica's
                // own state is inconsistent with the log-matching
                // invariant, which is a bug, not a remote fault.
                panic!("replica {} hit an invariant violation: {}", replica.id(), err);
            }
        }
        Payload::Accept(p) => replica.handle_accept(from, p, now, effects),
        Payload::ClientRequest(command) => replica.handle_client_request(command, effects),
        Payload::ClientResponse(_) => {}
    }
}

fn note_role_change(stats: &mut Statistics, prior: Role, current: Role, now: Instant) {
    if prior != Role::Candidate && current == Role::Candidate {
        stats.election_started(now);
    }
    if prior != Role::Proposer && current == Role::Proposer {
        stats.leader_elected(now);
    }
}

fn dispatch_effects(
    transport: &Arc<dyn Transport>,
    sleep_forward: &mpsc::UnboundedSender<(ReplicaId, SleepTrigger)>,
    client_response_tx: &mpsc::UnboundedSender<ClientResponsePayload>,
    effects: Effects,
) {
    for envelope in effects.outbound {
        transport.send(envelope);
    }
    if let Some(response) = effects.client_response {
        let _ = client_response_tx.send(response);
    }
    if let Some(SleepEffect::Forward { to, trigger }) = effects.sleep {
        let _ = sleep_forward.send((to, trigger));
    }
}

/// Runs one replica's event loop until both its inbound channels close.
/// `sleep_forward` carries a forwarded sleep trigger to whichever peer
/// this replica redirected it to; the caller is expected to have wired
/// every replica's forward sender to every other replica's `local_events`
/// producer (via a small adapter, since `LocalEvent::Sleep` is not itself
/// `Clone`/channel-portable across replicas without one).
pub async fn run(
    mut replica: Replica,
    mut peer_events: mpsc::UnboundedReceiver<Envelope>,
    mut local_events: mpsc::UnboundedReceiver<LocalEvent>,
    transport: Arc<dyn Transport>,
    sleep_forward: mpsc::UnboundedSender<(ReplicaId, SleepTrigger)>,
    client_response_tx: mpsc::UnboundedSender<ClientResponsePayload>,
) {
    let mut stats = Statistics::new();

    let mut effects = Effects::new();
    replica.bootstrap(Instant::now(), &mut effects);
    dispatch_effects(&transport, &sleep_forward, &client_response_tx, effects);

    loop {
        let prior_role = replica.role();
        let now = Instant::now();
        let mut effects = Effects::new();

        tokio::select! {
            maybe = peer_events.recv() => {
                match maybe {
                    Some(envelope) => dispatch_inbound(&mut replica, envelope, now, &mut effects),
                    None => break,
                }
            }
            maybe = local_events.recv() => {
                match maybe {
                    Some(LocalEvent::Tick) => replica.handle_tick(now, &mut effects),
                    Some(LocalEvent::ClientRequest(command)) => replica.handle_client_request(command, &mut effects),
                    Some(LocalEvent::Sleep(trigger)) => replica.handle_sleep_trigger(trigger, &mut effects),
                    None => break,
                }
            }
        }

        note_role_change(&mut stats, prior_role, replica.role(), now);

        if let Some(SleepEffect::SelfSleep { duration }) = effects.sleep.take() {
            dispatch_effects(&transport, &sleep_forward, &client_response_tx, effects);
            log::info!("replica {} sleeping for {:?}", replica.id(), duration);
            tokio::time::sleep(duration).await;
            replica.resume_from_sleep(Instant::now());
            continue;
        }

        dispatch_effects(&transport, &sleep_forward, &client_response_tx, effects);
    }
}
