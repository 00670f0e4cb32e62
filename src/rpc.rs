//! Wire encoding helpers.
//!
//! The core never calls these itself — only a real `Transport` would — but
//! keeping the envelope `serde`-derived and round-trippable through
//! MessagePack makes the wire format a tested property of the crate.

use serde::{de::DeserializeOwned, Serialize};

use crate::errors::*;

pub fn marshal<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    rmp_serde::to_vec(value).chain_err(|| "failed to marshal message")
}

pub fn unmarshal<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    rmp_serde::from_slice(bytes).chain_err(|| "failed to unmarshal message")
}
