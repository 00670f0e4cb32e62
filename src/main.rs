use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Arg, Command as ClapCommand};
use tokio::sync::mpsc;

use multipaxos::chaos::ChaosSource;
use multipaxos::client::Client;
use multipaxos::clock;
use multipaxos::config::{node_name, Config};
use multipaxos::consensus::Replica;
use multipaxos::log::ReplicaId;
use multipaxos::message::{ClientResponsePayload, Envelope, SleepTrigger};
use multipaxos::node::{self, LocalEvent};
use multipaxos::transport::{InMemoryTransport, Transport};

fn build_cli() -> ClapCommand {
    ClapCommand::new("multipaxos-node")
        .about("Runs a demo Multi-Paxos cluster in a single process")
        .arg(Arg::new("nodes").long("nodes").default_value("5"))
        .arg(Arg::new("timeout-ms").long("timeout-ms").default_value("200"))
        .arg(Arg::new("heartbeat-ms").long("heartbeat-ms").default_value("30"))
        .arg(Arg::new("client-interval-ms").long("client-interval-ms").default_value("200"))
        .arg(Arg::new("sleep-interval-ms").long("sleep-interval-ms").default_value("2000"))
        .arg(Arg::new("sleep-time-ms").long("sleep-time-ms").default_value("1000"))
        .arg(Arg::new("sleep-targets").long("sleep-targets").default_value("1"))
        .arg(Arg::new("sleep-leader").long("sleep-leader").action(clap::ArgAction::SetTrue))
}

fn parse_u64(matches: &clap::ArgMatches, name: &str) -> u64 {
    matches.get_one::<String>(name).unwrap().parse().unwrap_or_else(|_| panic!("--{} must be an integer", name))
}

fn config_from_matches(matches: &clap::ArgMatches) -> Config {
    Config {
        n: parse_u64(matches, "nodes"),
        timeout: Duration::from_millis(parse_u64(matches, "timeout-ms")),
        heartbeat: Duration::from_millis(parse_u64(matches, "heartbeat-ms")),
        client_request_interval: Duration::from_millis(parse_u64(matches, "client-interval-ms")),
        sleep_trigger_interval: Duration::from_millis(parse_u64(matches, "sleep-interval-ms")),
        sleep_time: Duration::from_millis(parse_u64(matches, "sleep-time-ms")),
        sleep_leader: matches.get_flag("sleep-leader"),
        sleep_targets: parse_u64(matches, "sleep-targets") as usize,
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let matches = build_cli().get_matches();
    let config = config_from_matches(&matches);
    let n = config.n;

    let mut local_senders: HashMap<ReplicaId, mpsc::UnboundedSender<LocalEvent>> = HashMap::new();
    let mut local_receivers: HashMap<ReplicaId, mpsc::UnboundedReceiver<LocalEvent>> = HashMap::new();
    let mut peer_senders: HashMap<ReplicaId, mpsc::UnboundedSender<Envelope>> = HashMap::new();
    let mut peer_receivers: HashMap<ReplicaId, mpsc::UnboundedReceiver<Envelope>> = HashMap::new();

    for id in 1..=n {
        let (ltx, lrx) = mpsc::unbounded_channel();
        local_senders.insert(id, ltx);
        local_receivers.insert(id, lrx);
        let (ptx, prx) = mpsc::unbounded_channel();
        peer_senders.insert(id, ptx);
        peer_receivers.insert(id, prx);
    }

    let transport: Arc<dyn Transport> = Arc::new(InMemoryTransport::new(peer_senders));
    let (sleep_forward_tx, mut sleep_forward_rx) = mpsc::unbounded_channel::<(ReplicaId, SleepTrigger)>();
    let (client_response_tx, mut client_response_rx) = mpsc::unbounded_channel::<ClientResponsePayload>();

    let now = Instant::now();
    for id in 1..=n {
        let replica = Replica::new(id, config.clone(), now);
        let peer_events = peer_receivers.remove(&id).unwrap();
        let local_events = local_receivers.remove(&id).unwrap();
        let transport = transport.clone();
        let sleep_forward = sleep_forward_tx.clone();
        let client_response_tx = client_response_tx.clone();
        log::info!("starting {}", node_name(id));
        tokio::spawn(node::run(replica, peer_events, local_events, transport, sleep_forward, client_response_tx));
    }
    drop(sleep_forward_tx);
    drop(client_response_tx);

    // A forwarded sleep trigger is addressed to a single replica; route it
    // to that replica's own local event queue.
    {
        let local_senders = local_senders.clone();
        tokio::spawn(async move {
            while let Some((to, trigger)) = sleep_forward_rx.recv().await {
                if let Some(sender) = local_senders.get(&to) {
                    let _ = sender.send(LocalEvent::Sleep(trigger));
                }
            }
        });
    }

    // One clock per replica, all at the same heartbeat granularity.
    for sender in local_senders.values() {
        let (tick_tx, mut tick_rx) = mpsc::unbounded_channel();
        tokio::spawn(clock::run(config.heartbeat, tick_tx));
        let sender = sender.clone();
        tokio::spawn(async move {
            while tick_rx.recv().await.is_some() {
                if sender.send(LocalEvent::Tick).is_err() {
                    break;
                }
            }
        });
    }

    // Chaos: a trigger is delivered to every replica; each decides for
    // itself, from its own id, whether it's actually targeted.
    {
        let chaos = ChaosSource::new(n, config.sleep_leader, config.sleep_time.as_millis() as u64, config.sleep_targets);
        let interval = config.sleep_trigger_interval;
        let local_senders = local_senders.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let trigger = chaos.next_trigger();
                log::info!("chaos: sleeping {:?}", trigger.target_ids);
                for sender in local_senders.values() {
                    let _ = sender.send(LocalEvent::Sleep(trigger.clone()));
                }
            }
        });
    }

    // The client always targets the replica that bootstraps as leader.
    // Rediscovering a new leader after a chaos-induced failover is left
    // to a real transport/client implementation.
    {
        let leader_hint = local_senders.get(&n).unwrap().clone();
        tokio::spawn(async move {
            let mut client = Client::new();
            let _ = leader_hint.send(LocalEvent::ClientRequest(client.first_command()));
            while let Some(response) = client_response_rx.recv().await {
                let next = client.on_response(response);
                tokio::time::sleep(config.client_request_interval).await;
                let _ = leader_hint.send(LocalEvent::ClientRequest(next));
            }
        });
    }

    let _ = tokio::signal::ctrl_c().await;
    log::info!("shutting down");
}
