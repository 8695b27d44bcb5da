//! # Valence Types
//!
//! Core type definitions for the Valence sharded proof-of-stake node:
//! - [`Validator`] - consensus participant identified by its public key
//! - [`Header`], [`Body`], [`MiniBlock`] - block structures
//! - [`BlockChain`] - thread-safe chain tip holder
//! - [`ConsensusMessage`] - the consensus wire envelope
//! - [`Heartbeat`] - node liveness message
//! - [`BootstrapData`] - per-round sync checkpoint

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod block;
pub mod bootstrap;
pub mod chain;
pub mod heartbeat;
pub mod message;
pub mod validator;

pub use block::{Body, Header, MiniBlock, MiniBlockHeader};
pub use bootstrap::{BootstrapData, ForkSnapshot};
pub use chain::BlockChain;
pub use heartbeat::Heartbeat;
pub use message::{ConsensusMessage, MessageType};
pub use validator::Validator;

/// Shard identifier.
pub type ShardId = u32;

/// Shard id reserved for the meta-chain.
pub const METACHAIN_SHARD_ID: ShardId = u32::MAX;

/// Result type alias for type-level operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when working with Valence types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A fixed-size field had the wrong length.
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// A string field exceeded its maximum length.
    #[error("field {field} too long: {actual} > {max}")]
    FieldTooLong {
        /// Field name.
        field: &'static str,
        /// Actual length.
        actual: usize,
        /// Maximum allowed length.
        max: usize,
    },

    /// Invalid hex string.
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}
