//! Commitment hash exchange.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace};
use valence_core::{Hasher, Marshalizer};
use valence_types::{ConsensusMessage, MessageType};

use crate::state::{ConsensusState, SubroundId, SubroundStatus};
use crate::subrounds::{mark_extended, threshold, RoundServices, SubroundHandler};

/// Every group member creates its round commitment and announces only the
/// commitment's hash; reveals come later, after the leader fixed the
/// participant bitmap.
pub struct SubroundCommitmentHash<M: Marshalizer, H: Hasher> {
    state: Arc<ConsensusState>,
    services: Arc<RoundServices<M, H>>,
}

impl<M: Marshalizer, H: Hasher> SubroundCommitmentHash<M, H> {
    /// Create the handler.
    pub fn new(state: Arc<ConsensusState>, services: Arc<RoundServices<M, H>>) -> Self {
        Self { state, services }
    }
}

#[async_trait]
impl<M: Marshalizer, H: Hasher> SubroundHandler for SubroundCommitmentHash<M, H> {
    fn id(&self) -> SubroundId {
        SubroundId::CommitmentHash
    }

    async fn do_job(&self) -> bool {
        let Some(own_index) = self.state.self_index() else {
            return false;
        };
        if self.state.round_canceled()
            || self
                .state
                .job_done(self.state.self_pub_key(), SubroundId::CommitmentHash)
            || self.state.data().is_empty()
        {
            return false;
        }

        let commitment = match self.services.multi_signer.create_commitment() {
            Ok(commitment) => commitment,
            Err(e) => {
                debug!(error = %e, "creating commitment");
                return false;
            }
        };
        let commitment_hash = self.services.hasher.compute(&commitment);
        if let Err(e) = self
            .services
            .multi_signer
            .store_commitment_hash(own_index, &commitment_hash)
        {
            debug!(error = %e, "storing own commitment hash");
            return false;
        }

        if let Err(e) = self
            .services
            .send_message(
                &self.state,
                MessageType::MtCommitmentHash,
                commitment_hash,
                self.state.data(),
            )
            .await
        {
            debug!(error = %e, "broadcasting commitment hash");
            return false;
        }

        self.state
            .set_job_done(self.state.self_pub_key(), SubroundId::CommitmentHash, true);
        true
    }

    fn do_check(&self) -> bool {
        if self.state.round_canceled() {
            return false;
        }
        if self.state.status(SubroundId::CommitmentHash) == SubroundStatus::Finished {
            return true;
        }

        let done = self.state.count_jobs_done(SubroundId::CommitmentHash);
        if done >= threshold(SubroundId::CommitmentHash, self.state.consensus_group_size()) {
            self.state
                .set_status(SubroundId::CommitmentHash, SubroundStatus::Finished);
            return true;
        }
        false
    }

    fn extend(&self) {
        mark_extended(&self.state, SubroundId::CommitmentHash);
    }

    fn consumes(&self, msg_type: MessageType) -> bool {
        msg_type == MessageType::MtCommitmentHash
    }

    async fn on_message(&self, message: &ConsensusMessage) -> bool {
        if message.block_header_hash != self.state.data() {
            trace!("commitment hash for a different proposal");
            return false;
        }
        let Some(index) = self.state.index_of(&message.pub_key) else {
            return false;
        };
        if self.state.job_done(&message.pub_key, SubroundId::CommitmentHash) {
            return false;
        }

        if let Err(e) = self
            .services
            .multi_signer
            .store_commitment_hash(index, &message.sub_round_data)
        {
            debug!(error = %e, "storing received commitment hash");
            return false;
        }
        self.state
            .set_job_done(&message.pub_key, SubroundId::CommitmentHash, true);
        true
    }
}
