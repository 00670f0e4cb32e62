//! The timer collaborator: a periodic tick generator, decoupled from
//! `Replica` so tests can drive ticks directly instead of waiting on a
//! real clock.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time;

/// An empty signal; the receiving end doesn't care which clock produced
/// it, only that time has passed.
#[derive(Debug, Clone, Copy)]
pub struct Tick;

/// Sends a `Tick` on `period` until the channel's receiver is dropped.
pub async fn run(period: Duration, sender: mpsc::UnboundedSender<Tick>) {
    let mut interval = time::interval(period);
    loop {
        interval.tick().await;
        if sender.send(Tick).is_err() {
            return;
        }
    }
}
