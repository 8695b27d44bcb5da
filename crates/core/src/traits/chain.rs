//! Chain, block-processing and fork-detection seams.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use valence_types::{Body, Header};

/// Errors surfaced by the block processor.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The block contents failed validation.
    #[error("invalid block: {0}")]
    InvalidBlock(String),

    /// The block could not be committed.
    #[error("commit failed: {0}")]
    CommitFailed(String),

    /// The header references data the processor cannot find.
    #[error("missing block body")]
    MissingBody,

    /// Account state could not be re-rooted.
    #[error("state revert failed: {0}")]
    RevertFailed(String),

    /// Internal processor error.
    #[error("processor error: {0}")]
    Internal(String),
}

/// Read/write access to one shard chain's tip.
pub trait ChainHandler: Send + Sync {
    /// The genesis header, if installed.
    fn genesis_header(&self) -> Option<Header>;

    /// Hash of the genesis header; empty before genesis is installed.
    fn genesis_header_hash(&self) -> Vec<u8>;

    /// The current committed header, if any.
    fn current_header(&self) -> Option<Header>;

    /// Hash of the current committed header; empty before the first commit.
    fn current_header_hash(&self) -> Vec<u8>;

    /// Move the chain tip.
    fn set_current_header(&self, header: Header, hash: Vec<u8>);
}

impl ChainHandler for valence_types::BlockChain {
    fn genesis_header(&self) -> Option<Header> {
        valence_types::BlockChain::genesis_header(self)
    }

    fn genesis_header_hash(&self) -> Vec<u8> {
        valence_types::BlockChain::genesis_header_hash(self)
    }

    fn current_header(&self) -> Option<Header> {
        valence_types::BlockChain::current_header(self)
    }

    fn current_header_hash(&self) -> Vec<u8> {
        valence_types::BlockChain::current_header_hash(self)
    }

    fn set_current_header(&self, header: Header, hash: Vec<u8>) {
        valence_types::BlockChain::set_current_header(self, header, hash)
    }
}

/// Executes and commits blocks on behalf of the consensus and sync layers.
///
/// Commits are serialized by the implementation; callers may assume a total
/// order by header nonce.
#[async_trait]
pub trait BlockProcessor: Send + Sync {
    /// Execute a block against the current state without committing.
    async fn process_block(
        &self,
        chain: &dyn ChainHandler,
        header: &Header,
        body: &Body,
    ) -> Result<(), ProcessError>;

    /// Commit a previously processed block.
    async fn commit_block(
        &self,
        chain: &dyn ChainHandler,
        header: &Header,
        body: &Body,
    ) -> Result<(), ProcessError>;

    /// Discard uncommitted state changes from a failed process attempt.
    fn revert_account_state(&self);

    /// Re-root account state to the root recorded in the given header.
    fn revert_state_to_block(&self, header: &Header) -> Result<(), ProcessError>;

    /// Assemble a block body for the given header under construction.
    async fn create_block_body(&self, header: &Header) -> Result<Body, ProcessError>;

    /// Populate the header's miniblock references and root hash from a body.
    fn apply_body_to_header(&self, header: &mut Header, body: &Body) -> Result<(), ProcessError>;

    /// Marshal the miniblocks (keyed by destination shard) and transactions
    /// (keyed by topic) that must be broadcast after a commit.
    #[allow(clippy::type_complexity)]
    fn marshalized_data_to_broadcast(
        &self,
        header: &Header,
        body: &Body,
    ) -> Result<(HashMap<u32, Vec<u8>>, HashMap<String, Vec<Vec<u8>>>), ProcessError>;

    /// Return a dropped block's contents to the data pools.
    fn restore_block_into_pools(&self, header: &Header, body: &Body) -> Result<(), ProcessError>;
}

/// Verdict of the fork detector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkInfo {
    /// Whether a fork is currently suspected.
    pub is_detected: bool,
    /// Nonce of the suspected divergence; `u64::MAX` when not detected.
    pub nonce: u64,
    /// Round of the suspected divergence; `u64::MAX` when not detected.
    pub round: u64,
    /// Header hash at the divergence, when known.
    pub hash: Option<Vec<u8>>,
}

impl ForkInfo {
    /// A not-detected verdict.
    pub fn new() -> Self {
        Self {
            is_detected: false,
            nonce: u64::MAX,
            round: u64::MAX,
            hash: None,
        }
    }
}

impl Default for ForkInfo {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks received headers and reports suspected chain divergences.
pub trait ForkDetector: Send + Sync {
    /// Record a header observed by the node.
    fn add_header(&self, header: &Header, hash: &[u8]);

    /// Forget a header, typically after a rollback.
    fn remove_header(&self, nonce: u64, hash: &[u8]);

    /// Highest nonce the detector believes exists on the network.
    fn probable_highest_nonce(&self) -> u64;

    /// Current fork verdict.
    fn check_fork(&self) -> ForkInfo;

    /// Reset the detector to a checkpoint nonce after a replay or rollback.
    fn restore_to(&self, nonce: u64);
}

/// Round arithmetic: the round is a pure function of wall-clock time.
pub trait Rounder: Send + Sync {
    /// Current round index.
    fn index(&self) -> u64;

    /// Start timestamp of the current round, unix milliseconds.
    fn time_stamp(&self) -> u64;

    /// Nominal round duration.
    fn time_duration(&self) -> Duration;

    /// Recompute the round from the given wall-clock time.
    fn update_round(&self, genesis_time_ms: u64, current_time_ms: u64);
}
