#[macro_use]
extern crate error_chain;

pub mod chaos;
pub mod client;
pub mod clock;
pub mod command;
pub mod config;
pub mod consensus;
pub mod errors;
pub mod log;
pub mod merge;
pub mod message;
pub mod node;
pub mod rpc;
pub mod state;
pub mod statistics;
pub mod transport;
