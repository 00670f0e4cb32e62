//! The chaos collaborator: periodically names a random subset of
//! replicas to suspend, simulating crashes without a real fault injector.

use rand::seq::SliceRandom;

use crate::log::ReplicaId;
use crate::message::SleepTrigger;

pub struct ChaosSource {
    n: u64,
    sleep_leader: bool,
    sleep_time_ms: u64,
    targets: usize,
}

impl ChaosSource {
    pub fn new(n: u64, sleep_leader: bool, sleep_time_ms: u64, targets: usize) -> Self {
        ChaosSource { n, sleep_leader, sleep_time_ms, targets }
    }

    /// Picks `targets` distinct replica ids out of `1..=n` and wraps them
    /// in a trigger. Never panics if `targets > n`: it simply clamps to
    /// the whole cluster.
    pub fn next_trigger(&self) -> SleepTrigger {
        let all: Vec<ReplicaId> = (1..=self.n).collect();
        let count = self.targets.min(all.len());
        let mut rng = rand::thread_rng();
        let mut chosen: Vec<ReplicaId> = all.clone();
        chosen.shuffle(&mut rng);
        chosen.truncate(count);

        SleepTrigger { target_ids: chosen, sleep_leader: self.sleep_leader, time_to_sleep_ms: self.sleep_time_ms }
    }
}
