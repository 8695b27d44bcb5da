//! # Valence Status
//!
//! Node-facing status surfaces:
//!
//! - [`PersistentStatusHandler`] - a [`StatusHandler`](valence_core::StatusHandler)
//!   that keeps a metric map in memory and persists it to storage whenever
//!   a newer block nonce is recorded
//! - [`NodeStatistics`] - the aggregate statistics DTO
//! - [`HeartbeatSender`] - signs and broadcasts periodic liveness messages
//!
//! All writes here are advisory: storage failures are logged and dropped,
//! never surfaced to the metric writers.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod heartbeat;
pub mod persister;
pub mod statistics;

pub use heartbeat::{HeartbeatConfig, HeartbeatSender};
pub use persister::PersistentStatusHandler;
pub use statistics::NodeStatistics;
