//! # Valence Sync
//!
//! Block synchronization: catches the node up to the network one nonce at
//! a time.
//!
//! - [`HeadersPool`] / [`MiniBlocksPool`] - received-data pools that signal
//!   registered handlers on arrival
//! - [`HeaderStore`] - committed headers, addressable by hash and nonce
//! - [`BootstrapStorer`] - per-round checkpoints for restart recovery
//! - [`BlockSynchronizer`] - the sync loop: probe pools, request what is
//!   missing, wait for arrival, process and commit through the external
//!   block processor, roll back on forks
//!
//! ## Sync Flow
//!
//! 1. Skip the iteration while the network watcher reports no connectivity
//! 2. Ask the fork detector for a verdict; roll back one block when the
//!    local branch is inferior
//! 3. Fetch the header for `current nonce + 1` (pool first, then network)
//! 4. Fetch the miniblocks the header references
//! 5. Process, commit, advance the tip, checkpoint, update metrics
//! 6. On failure revert account state, log, and let the next iteration retry

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod pools;
pub mod store;
pub mod synchronizer;

pub use pools::{HeadersPool, MiniBlocksPool};
pub use store::{BootstrapStorer, HeaderStore};
pub use synchronizer::{BlockSynchronizer, SyncConfig};

use thiserror::Error;
use valence_core::{MarshalError, ProcessError, StorageError};

/// Errors surfaced by the synchronizer.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The node has no network connectivity; the iteration was skipped.
    #[error("waiting for network connection")]
    NotConnected,

    /// The awaited data did not arrive inside the wait window.
    #[error("timeout while waiting for requested data")]
    TimeIsOut,

    /// A header could not be obtained.
    #[error("missing header for nonce {0}")]
    MissingHeader(u64),

    /// A referenced miniblock could not be obtained.
    #[error("missing block body")]
    MissingBody,

    /// An operation needed a committed header but the chain has none.
    #[error("nil block header")]
    NilHeader,

    /// A rollback could not complete.
    #[error("rollback failed: {0}")]
    RollbackFailed(String),

    /// There is no bootstrap checkpoint to replay.
    #[error("no bootstrap data in storage")]
    NoBootstrapData,

    /// The external processor rejected the block.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// Backing store failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// (De)serialization failure.
    #[error(transparent)]
    Marshal(#[from] MarshalError),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
