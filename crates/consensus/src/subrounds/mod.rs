//! Subround handlers and their shared service bundle.
//!
//! Each subround is one handler with three entry points: `do_job` produces
//! output when this node is required to (leader proposal, shares, ...),
//! `do_check` decides completion, and `extend` fires once when the window
//! lapses. Incoming envelopes reach the handlers through `on_message`.

pub mod bitmap;
pub mod block;
pub mod commitment;
pub mod commitment_hash;
pub mod end_round;
pub mod signature;
pub mod start_round;

pub use bitmap::SubroundBitmap;
pub use block::SubroundBlock;
pub use commitment::SubroundCommitment;
pub use commitment_hash::SubroundCommitmentHash;
pub use end_round::SubroundEndRound;
pub use signature::SubroundSignature;
pub use start_round::SubroundStartRound;

use std::sync::Arc;

use async_trait::async_trait;
use valence_core::{
    BlockProcessor, BroadcastMessenger, ChainHandler, Hasher, Marshalizer, MultiSigner, Rounder,
    SingleSigner, StatusHandler,
};
use valence_types::{ConsensusMessage, Header, MessageType, ShardId};

use crate::selector::IndexHashedGroupSelector;
use crate::state::{ConsensusState, SubroundId, SubroundStatus};
use crate::{ConsensusError, Result};

/// Completion threshold of a subround for a group of `group_size`.
///
/// The block proposal and the final commit need one actor; commitment
/// hashes are awaited from the full group; the voting phases need a
/// Byzantine quorum.
pub fn threshold(subround: SubroundId, group_size: usize) -> usize {
    match subround {
        SubroundId::StartRound | SubroundId::Block | SubroundId::EndRound => 1,
        SubroundId::CommitmentHash => group_size,
        SubroundId::Bitmap | SubroundId::Commitment | SubroundId::Signature => {
            2 * group_size / 3 + 1
        }
    }
}

/// The collaborators every subround works against.
pub struct RoundServices<M: Marshalizer, H: Hasher> {
    /// Chain tip access.
    pub chain: Arc<dyn ChainHandler>,
    /// Block execution and commit.
    pub processor: Arc<dyn BlockProcessor>,
    /// Outbound broadcasting.
    pub messenger: Arc<dyn BroadcastMessenger>,
    /// Envelope and rand-seed signing.
    pub single_signer: Arc<dyn SingleSigner>,
    /// Group signing for the round.
    pub multi_signer: Arc<dyn MultiSigner>,
    /// Round clock.
    pub rounder: Arc<dyn Rounder>,
    /// Metric sink.
    pub status: Arc<dyn StatusHandler>,
    /// Group selection.
    pub selector: Arc<IndexHashedGroupSelector<H>>,
    /// Payload codec.
    pub marshalizer: M,
    /// Digest function.
    pub hasher: H,
    /// Shard this node operates in.
    pub shard_id: ShardId,
}

impl<M: Marshalizer, H: Hasher> RoundServices<M, H> {
    /// Hash of a header: the digest of its marshaled form.
    pub fn header_hash(&self, header: &Header) -> Result<Vec<u8>> {
        Ok(self.hasher.compute(&self.marshalizer.marshal(header)?))
    }

    /// The randomness the current round builds on: the previous header's
    /// rand seed, or the genesis seed (genesis hash when unset) before the
    /// first commit.
    pub fn prev_rand_seed(&self) -> Result<Vec<u8>> {
        if let Some(current) = self.chain.current_header() {
            return Ok(current.rand_seed);
        }
        let genesis = self.chain.genesis_header().ok_or(ConsensusError::NilHeader)?;
        if genesis.rand_seed.is_empty() {
            Ok(self.chain.genesis_header_hash())
        } else {
            Ok(genesis.rand_seed)
        }
    }

    /// Build, sign and broadcast a consensus envelope for the round.
    pub async fn send_message(
        &self,
        state: &ConsensusState,
        msg_type: MessageType,
        sub_round_data: Vec<u8>,
        block_header_hash: Vec<u8>,
    ) -> Result<()> {
        let mut message = ConsensusMessage::new(
            block_header_hash,
            sub_round_data,
            state.self_pub_key().to_vec(),
            msg_type,
            state.round_index(),
            self.rounder.time_stamp(),
            self.shard_id,
        );
        let signing_bytes = self.marshalizer.marshal(&message.signing_copy())?;
        message.signature = self.single_signer.sign(&signing_bytes)?;

        self.messenger.broadcast_consensus_message(&message).await?;
        Ok(())
    }
}

/// One subround of the consensus round machine.
#[async_trait]
pub trait SubroundHandler: Send + Sync {
    /// Which subround this handler drives.
    fn id(&self) -> SubroundId;

    /// Produce this node's output for the subround, when required.
    /// Returns true when output was produced.
    async fn do_job(&self) -> bool;

    /// Whether the subround completed. A canceled round always checks
    /// false.
    fn do_check(&self) -> bool;

    /// The subround's window lapsed without completion.
    fn extend(&self) {
        // default: record the lapse; Finished is never downgraded
    }

    /// Whether this handler consumes envelopes of the given type.
    fn consumes(&self, _msg_type: MessageType) -> bool {
        false
    }

    /// Feed an incoming, already validated envelope to the handler.
    /// Returns true when the message was accepted.
    async fn on_message(&self, _message: &ConsensusMessage) -> bool {
        false
    }
}

/// Shared extend behavior: mark the subround Extended unless it already
/// finished.
pub(crate) fn mark_extended(state: &ConsensusState, subround: SubroundId) {
    state.set_status(subround, SubroundStatus::Extended);
}
