//! The client collaborator: generates a stream of commands, one at a
//! time, and verifies responses match what it last sent before advancing
//! — the at-most-one-outstanding-command handshake from the replica side
//! of the protocol.
//!
//! Like `Replica`, `Client` itself performs no IO: `on_response` and
//! `next_command` are pure, and a driver is responsible for actually
//! transmitting whatever command they return and waiting out the
//! request interval between sends.

use rand::Rng;

use crate::command::{Command, CommandKind};
use crate::message::ClientResponsePayload;

pub struct Client {
    next_id: u64,
    last_command: Command,
    /// The client's own independent replay of the committed command
    /// sequence, used to verify the cluster's answers rather than to
    /// drive the demo.
    expected_value: i64,
}

impl Client {
    pub fn new() -> Self {
        let first = Command::new(1, CommandKind::Add, 33);
        Client { next_id: 2, last_command: first, expected_value: 0 }
    }

    /// The command to send first, before any response has arrived.
    pub fn first_command(&self) -> Command {
        self.last_command
    }

    /// Processes a reply to the outstanding command. Returns the next
    /// command to send: a freshly generated one if the reply confirmed
    /// `last_command` committed, or `last_command` again (a retry) if the
    /// reply was a failure or named some other command — a leader that
    /// changed mid-flight can only ever have committed at most one of
    /// them, so resending is always safe.
    pub fn on_response(&mut self, response: ClientResponsePayload) -> Command {
        if response.success && response.command == self.last_command {
            self.expected_value = self.last_command.apply(self.expected_value);
            self.last_command = self.generate_command();
        }
        self.last_command
    }

    fn generate_command(&mut self) -> Command {
        let magnitude = rand::thread_rng().gen_range(-100..=100);
        let kind = if magnitude > 0 { CommandKind::Add } else { CommandKind::Subtract };
        let command = Command::new(self.next_id, kind, magnitude.abs() as i64);
        self.next_id += 1;
        command
    }

    pub fn expected_value(&self) -> i64 {
        self.expected_value
    }
}

impl Default for Client {
    fn default() -> Self {
        Client::new()
    }
}
