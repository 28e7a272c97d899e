//! Zappy AI: autonomous team agent for the Zappy game server.
//!
//! One process drives one player over one TCP connection: a line transport
//! that separates replies from broadcasts, an obfuscated team channel, and a
//! role state machine deciding what to do each tick.

pub mod agent;
pub mod cipher;
pub mod config;
pub mod elevation;
pub mod jobs;
pub mod protocol;
pub mod replication;
pub mod transport;
pub mod types;
