//! # Valence Consensus
//!
//! The per-round consensus machine of the Valence node.
//!
//! A round is a fixed wall-clock window owned by a deterministically
//! selected validator group. Within the round the nodes walk an ordered
//! sequence of subrounds:
//!
//! ```text
//! StartRound → Block → CommitmentHash → Bitmap → Commitment → Signature → EndRound
//! ```
//!
//! - **StartRound** resets state and selects the round's consensus group
//!   from the previous randomness seed
//! - **Block**: the leader (group position 0) proposes a body and header;
//!   followers validate and mirror
//! - **CommitmentHash / Bitmap / Commitment**: commit-reveal over the
//!   multi-signer's commitments, with the leader fixing the participant
//!   bitmap in between
//! - **Signature**: bitmap members produce signature shares over the round
//!   digest
//! - **EndRound**: shares are verified and aggregated onto the header, the
//!   block is committed and broadcast
//!
//! Every subround exposes `job` (produce output when required), `check`
//! (completion predicate) and `extend` (window lapsed); the [`Chronology`]
//! driver schedules them by percent windows of the round duration and the
//! [`ConsensusWorker`] routes validated incoming envelopes to them.
//! Cancelling a round (`RoundCanceled`) forces every check false until the
//! next round resets.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod chronology;
pub mod round;
pub mod selector;
pub mod state;
pub mod subrounds;
pub mod worker;

pub use chronology::Chronology;
pub use round::{RoundConfig, TimeRounder};
pub use selector::IndexHashedGroupSelector;
pub use state::{ConsensusState, SubroundId, SubroundStatus};
pub use subrounds::{threshold, RoundServices, SubroundHandler};
pub use worker::ConsensusWorker;

use thiserror::Error;
use valence_core::{CryptoError, MarshalError, NetworkError, ProcessError};

/// Errors surfaced by the consensus machine.
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// The eligible list is smaller than the consensus size.
    #[error("eligible list smaller than consensus size")]
    SmallEligibleList,

    /// The selection randomness was empty.
    #[error("nil randomness")]
    NilRandomness,

    /// The consensus size is not at least 1.
    #[error("invalid consensus size")]
    InvalidConsensusSize,

    /// A message sender is not part of the round's consensus group.
    #[error("sender not in consensus group")]
    NotInConsensusGroup,

    /// A message belongs to another round.
    #[error("message for round {got}, current round is {current}")]
    StaleMessage {
        /// Round carried by the message.
        got: u64,
        /// The node's current round.
        current: u64,
    },

    /// A required signature share was never produced.
    #[error("missing signature share for group index {0}")]
    MissingSignature(u16),

    /// The chain has neither a current nor a genesis header.
    #[error("nil block header")]
    NilHeader,

    /// Crypto seam failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// (De)serialization failure.
    #[error(transparent)]
    Marshal(#[from] MarshalError),

    /// Block processor failure.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// Broadcast failure.
    #[error(transparent)]
    Network(#[from] NetworkError),
}

/// Result type for consensus operations.
pub type Result<T> = std::result::Result<T, ConsensusError>;
