//! Leader-election statistics: an observability collaborator, not part of
//! the consensus core. Nothing here feeds back into `Replica` — dropping
//! this module entirely would not change what the cluster decides, only
//! what gets logged about it.

use std::time::Instant;

#[derive(Debug, Default)]
pub struct Statistics {
    leader_changes: u64,
    total_election_duration: std::time::Duration,
    election_started_at: Option<Instant>,
    first_election: bool,
}

impl Statistics {
    pub fn new() -> Self {
        Statistics { first_election: true, ..Statistics::default() }
    }

    pub fn election_started(&mut self, now: Instant) {
        if self.election_started_at.is_none() {
            log::info!("election started");
            self.election_started_at = Some(now);
        }
    }

    /// Call once a new leader is confirmed. Skips folding the very first
    /// election into the average: startup bootstraps a leader directly,
    /// and that isn't a failover worth averaging in with the rest.
    pub fn leader_elected(&mut self, now: Instant) {
        if let Some(started) = self.election_started_at.take() {
            if self.first_election {
                self.first_election = false;
                return;
            }
            self.leader_changes += 1;
            self.total_election_duration += now.saturating_duration_since(started);
            log::info!(
                "average election duration: {:?}",
                self.total_election_duration / self.leader_changes as u32
            );
        }
    }

    pub fn leader_changes(&self) -> u64 {
        self.leader_changes
    }
}
