//! Cluster configuration: timing and cluster-size knobs collected into one
//! plain struct so the demo binary's `clap` flags and the test harness can
//! both override them without touching the algorithm.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// Cluster size. Term allocation partitions the term space into `N`
    /// disjoint residue classes, so this must match across every replica
    /// in the cluster.
    pub n: u64,

    pub timeout: Duration,
    pub heartbeat: Duration,
    pub client_request_interval: Duration,

    pub sleep_trigger_interval: Duration,
    pub sleep_time: Duration,
    pub sleep_leader: bool,
    pub sleep_targets: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            n: 5,
            timeout: Duration::from_millis(200),
            heartbeat: Duration::from_millis(30),
            client_request_interval: Duration::from_millis(200),
            sleep_trigger_interval: Duration::from_secs(2),
            sleep_time: Duration::from_secs(1),
            sleep_leader: false,
            sleep_targets: 1,
        }
    }
}

impl Config {
    pub fn majority(&self) -> u64 {
        self.n / 2 + 1
    }
}

/// A replica's identity: `PaxosNode_<k>` with ordinals `1..N`.
pub fn node_name(ordinal: u64) -> String {
    format!("PaxosNode_{}", ordinal)
}
