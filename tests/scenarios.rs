//! The six concrete scenarios from the core's testable-properties list,
//! driven end to end against a small in-memory cluster.

mod support;

use std::time::Instant;

use multipaxos::command::{Command, CommandKind};
use multipaxos::config::Config;
use multipaxos::consensus::{Effects, Replica};
use multipaxos::log::LogEntry;
use multipaxos::message::ProposePayload;
use multipaxos::state::Role;

use support::Cluster;

fn config(n: u64) -> Config {
    Config { n, ..Config::default() }
}

/// 1. Single-leader steady state: N=5, no chaos, `ADD 10` then `SUBTRACT 3`.
#[test]
fn single_leader_steady_state_replicates_identically() {
    let mut cluster = Cluster::new(5, config(5));
    cluster.drain();
    assert_eq!(cluster.leader().unwrap().id(), 5, "the highest ordinal bootstraps as leader");

    cluster.client_request(5, Command::new(1, CommandKind::Add, 10));
    cluster.drain();
    cluster.client_request(5, Command::new(2, CommandKind::Subtract, 3));
    cluster.drain();

    for replica in &cluster.replicas {
        assert_eq!(replica.state_machine_value(), 7, "replica {} diverged", replica.id());
    }
    let commit_index = cluster.replica(5).commit_index();
    for replica in &cluster.replicas {
        assert_eq!(replica.log().entry(commit_index).unwrap().command.id, 2);
    }
    assert_eq!(cluster.client_responses.len(), 2);
}

/// 2. Leader step-down: N=3, leader receives a higher-term PROPOSE and
/// steps down without losing its log.
#[test]
fn leader_steps_down_on_higher_term_propose_and_keeps_its_log() {
    let mut cluster = Cluster::new(3, config(3));
    cluster.drain();
    cluster.client_request(3, Command::new(1, CommandKind::Add, 5));
    cluster.drain();

    let leader_id = cluster.leader().unwrap().id();
    assert_eq!(leader_id, 3);
    let log_before = cluster.replica(leader_id).log().last_index();
    let commit_before = cluster.replica(leader_id).commit_index();

    let higher_term = cluster.replica(leader_id).current_term() + 1;
    let mut effects = Effects::new();
    {
        let leader = cluster.replicas.iter_mut().find(|r| r.id() == leader_id).unwrap();
        leader
            .handle_propose(
                1,
                leader_id,
                ProposePayload {
                    term: higher_term,
                    prev_log_index: Some(commit_before),
                    prev_log_term: Some(leader.log().term(commit_before).unwrap()),
                    entries: Some(vec![]),
                    leader_commit: commit_before,
                },
                cluster.now,
                &mut effects,
            )
            .unwrap();
    }

    let leader = cluster.replicas.iter().find(|r| r.id() == leader_id).unwrap();
    assert_eq!(leader.role(), Role::Follower);
    assert_eq!(leader.log().last_index(), log_before, "stepping down must not drop any log entries");
}

/// 3. Log repair: a follower's log diverges from the leader's at the tail;
/// the leader backs off `next_index` until the follower accepts, then the
/// follower truncates and catches up.
#[test]
fn log_repair_converges_after_next_index_backoff() {
    let now = Instant::now();
    let mut follower = Replica::new(1, config(3), now);
    follower.log().last_index(); // sanity: starts at the sentinel only

    // Follower: [NOOP, (1, ADD 5), (1, ADD 2)]
    let mut seed = Effects::new();
    follower
        .handle_propose(
            2,
            1,
            ProposePayload {
                term: 1,
                prev_log_index: Some(0),
                prev_log_term: Some(0),
                entries: Some(vec![
                    LogEntry { term: 1, command: Command::new(1, CommandKind::Add, 5), creator_id: 2, index: 1 },
                    LogEntry { term: 1, command: Command::new(2, CommandKind::Add, 2), creator_id: 2, index: 2 },
                ]),
                leader_commit: 0,
            },
            now,
            &mut seed,
        )
        .unwrap();
    assert_eq!(follower.log().last_index(), 2);

    // Leader's view: [NOOP, (1, ADD 5), (2, SUBTRACT 1)], leaderCommit=2.
    // First attempt optimistically probes at prevLogIndex=2 and is rejected
    // (terms disagree at index 2 even though both logs have an entry there).
    let mut effects = Effects::new();
    follower
        .handle_propose(
            2,
            1,
            ProposePayload {
                term: 2,
                prev_log_index: Some(2),
                prev_log_term: Some(2),
                entries: Some(vec![]),
                leader_commit: 2,
            },
            now,
            &mut effects,
        )
        .unwrap();
    match &effects.outbound[0].payload {
        multipaxos::message::Payload::Accept(p) => assert!(!p.success),
        _ => panic!("expected an accept reply"),
    }

    // Leader backs off to prevLogIndex=1 and resends with the real tail.
    let mut effects = Effects::new();
    follower
        .handle_propose(
            2,
            1,
            ProposePayload {
                term: 2,
                prev_log_index: Some(1),
                prev_log_term: Some(1),
                entries: Some(vec![LogEntry {
                    term: 2,
                    command: Command::new(9, CommandKind::Subtract, 1),
                    creator_id: 2,
                    index: 2,
                }]),
                leader_commit: 2,
            },
            now,
            &mut effects,
        )
        .unwrap();

    match &effects.outbound[0].payload {
        multipaxos::message::Payload::Accept(p) => assert!(p.success),
        _ => panic!("expected an accept reply"),
    }
    assert_eq!(follower.log().term(2), Some(2));
    assert_eq!(follower.state_machine_value(), 4, "5 - 1 once both entries are applied");
}

/// 4. Election with a promoted tail: a leader's uncommitted entry,
/// replicated to only one peer before the leader vanishes, survives the
/// next election and eventually commits.
#[test]
fn election_recovers_an_uncommitted_entry_via_promoted_tail() {
    let now = Instant::now();
    let cfg = config(3);

    // B (id=2) holds an uncommitted entry from a leader (A, id that has
    // since vanished) that never got committed before A disappeared.
    let mut b = Replica::new(2, cfg.clone(), now);
    let mut seed = Effects::new();
    b.handle_propose(
        9, // A's id, not part of this 3-node config — irrelevant once A is gone
        2,
        ProposePayload {
            term: 9,
            prev_log_index: Some(0),
            prev_log_term: Some(0),
            entries: Some(vec![LogEntry {
                term: 9,
                command: Command::new(1, CommandKind::Add, 7),
                creator_id: 9,
                index: 1,
            }]),
            leader_commit: 0,
        },
        now,
        &mut seed,
    )
    .unwrap();
    assert_eq!(b.log().last_index(), 1);
    assert_eq!(b.role(), Role::Follower);

    // C (id=3) times out, becomes CANDIDATE, and — on the next timeout —
    // actually broadcasts prepare under a bumped term.
    let mut c = Replica::new(3, cfg, now);
    let t1 = now + std::time::Duration::from_secs(1);
    c.handle_tick(t1, &mut Effects::new());
    assert_eq!(c.role(), Role::Candidate);
    let t2 = t1 + std::time::Duration::from_secs(1);
    let mut prepare_effects = Effects::new();
    c.handle_tick(t2, &mut prepare_effects);
    assert!(!prepare_effects.outbound.is_empty(), "the second timeout should (re)broadcast prepare");
    let prepare_term = c.current_term();

    // B grants the vote; its promise carries the uncommitted tail.
    let mut promise_effects = Effects::new();
    b.handle_prepare(
        3,
        multipaxos::message::PreparePayload { term: prepare_term, proposer_id: 3, proposer_commit_index: 0 },
        now,
        &mut promise_effects,
    );
    let promise = match &promise_effects.outbound[0].payload {
        multipaxos::message::Payload::Promise(p) => p.clone(),
        _ => panic!("expected a promise"),
    };
    assert!(promise.vote_granted);
    assert_eq!(promise.entries.len(), 1);

    let mut become_leader_effects = Effects::new();
    c.handle_promise(2, promise, now, &mut become_leader_effects);
    assert_eq!(c.role(), Role::Proposer, "2-of-3 promises (C + B) is a majority");
    assert_eq!(c.log().last_index(), 1, "the promoted entry was spliced in under the new term");
    assert_eq!(c.log().term(1), Some(prepare_term));

    // C replicates the re-termed entry; B accepts it and it commits.
    let propose = become_leader_effects
        .outbound
        .iter()
        .find_map(|e| match &e.payload {
            multipaxos::message::Payload::Propose(p) if e.header.to == Some(2) => Some(p.clone()),
            _ => None,
        })
        .expect("leader replicates to B on election");

    let mut accept_effects = Effects::new();
    b.handle_propose(3, 2, propose, now, &mut accept_effects).unwrap();
    let accept = match &accept_effects.outbound[0].payload {
        multipaxos::message::Payload::Accept(p) => p.clone(),
        _ => panic!("expected an accept"),
    };
    assert!(accept.success);

    let mut commit_effects = Effects::new();
    c.handle_accept(2, accept, now, &mut commit_effects);
    assert_eq!(c.commit_index(), 1);
    assert_eq!(c.state_machine_value(), 7);
}

/// 5. Split promotion merge: suffixes with a gap between index 2 and 4
/// collapse into a contiguous tail with a NOOP filler at index 3.
#[test]
fn split_promotion_merge_fills_the_gap_with_a_noop() {
    // 5 nodes so a majority (3) needs both promises below, rather than
    // the candidate already winning on the first one.
    let now = Instant::now();
    let cfg = config(5);
    let mut candidate = Replica::new(1, cfg, now);

    // The candidate already carries an uncommitted entry of its own at
    // index 1, so the promised suffixes from its peers (indices 2 and 4,
    // below) are themselves contiguous with the candidate's own tail —
    // exactly as a real peer's log, which is never sparse, would produce.
    let mut seed = Effects::new();
    candidate
        .handle_propose(
            9,
            1,
            ProposePayload {
                term: 1,
                prev_log_index: Some(0),
                prev_log_term: Some(0),
                entries: Some(vec![LogEntry {
                    term: 1,
                    command: Command::new(0, CommandKind::Noop, 0),
                    creator_id: 9,
                    index: 1,
                }]),
                leader_commit: 0,
            },
            now,
            &mut seed,
        )
        .unwrap();

    // One tick to notice the timeout and become CANDIDATE, a second once
    // that candidacy itself times out to actually broadcast prepare.
    let t1 = now + std::time::Duration::from_secs(1);
    candidate.handle_tick(t1, &mut Effects::new());
    assert_eq!(candidate.role(), Role::Candidate);
    let t2 = t1 + std::time::Duration::from_secs(1);
    let mut prepare_effects = Effects::new();
    candidate.handle_tick(t2, &mut prepare_effects);
    let term = candidate.current_term();

    let mut m1 = Effects::new();
    candidate.handle_promise(
        2,
        multipaxos::message::PromisePayload {
            vote_granted: true,
            term,
            entries: vec![LogEntry { term: 1, command: Command::new(1, CommandKind::Add, 1), creator_id: 2, index: 2 }],
        },
        now,
        &mut m1,
    );
    let mut m2 = Effects::new();
    candidate.handle_promise(
        3,
        multipaxos::message::PromisePayload {
            vote_granted: true,
            term,
            entries: vec![LogEntry { term: 1, command: Command::new(2, CommandKind::Add, 2), creator_id: 3, index: 4 }],
        },
        now,
        &mut m2,
    );

    assert_eq!(candidate.role(), Role::Proposer);
    assert_eq!(candidate.log().last_index(), 4);
    assert_eq!(candidate.log().term(3), Some(term), "filler entries are re-termed on becoming leader too");
    assert_eq!(candidate.log().entry(3).unwrap().command, Command::noop());
}

/// 6. Duplicate client response: a retransmit of an already-committed
/// command elicits the same response again instead of a fresh commit.
#[test]
fn duplicate_client_request_does_not_commit_twice() {
    let mut cluster = Cluster::new(3, config(3));
    cluster.drain();
    let leader_id = cluster.leader().unwrap().id();

    let command = Command::new(1, CommandKind::Add, 42);
    cluster.client_request(leader_id, command);
    cluster.drain();
    assert_eq!(cluster.client_responses.len(), 1);
    let committed_index = cluster.replica(leader_id).commit_index();

    // The client never saw the response and retransmits the same command.
    cluster.client_request(leader_id, command);
    cluster.drain();

    assert_eq!(cluster.client_responses.len(), 2, "the leader re-sends a response for the retransmit");
    assert_eq!(cluster.client_responses[1].command, command);
    assert_eq!(
        cluster.replica(leader_id).commit_index(),
        committed_index,
        "a retransmit of an already-applied command must not append a second log entry"
    );
}
