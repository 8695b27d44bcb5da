//! Commitment reveal.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use valence_core::{Hasher, Marshalizer};
use valence_types::{ConsensusMessage, MessageType};

use crate::state::{ConsensusState, SubroundId, SubroundStatus};
use crate::subrounds::{mark_extended, threshold, RoundServices, SubroundHandler};

/// Members selected in the bitmap reveal the commitments whose hashes they
/// announced earlier; a reveal that does not match its stored hash is
/// dropped by the multi-signer.
pub struct SubroundCommitment<M: Marshalizer, H: Hasher> {
    state: Arc<ConsensusState>,
    services: Arc<RoundServices<M, H>>,
}

impl<M: Marshalizer, H: Hasher> SubroundCommitment<M, H> {
    /// Create the handler.
    pub fn new(state: Arc<ConsensusState>, services: Arc<RoundServices<M, H>>) -> Self {
        Self { state, services }
    }
}

#[async_trait]
impl<M: Marshalizer, H: Hasher> SubroundHandler for SubroundCommitment<M, H> {
    fn id(&self) -> SubroundId {
        SubroundId::Commitment
    }

    async fn do_job(&self) -> bool {
        let Some(own_index) = self.state.self_index() else {
            return false;
        };
        // only members the leader selected reveal
        if self.state.round_canceled()
            || !self.state.job_done(self.state.self_pub_key(), SubroundId::Bitmap)
            || self
                .state
                .job_done(self.state.self_pub_key(), SubroundId::Commitment)
        {
            return false;
        }

        let commitment = match self.services.multi_signer.commitment(own_index) {
            Ok(commitment) => commitment,
            Err(e) => {
                debug!(error = %e, "fetching own commitment");
                return false;
            }
        };

        if let Err(e) = self
            .services
            .send_message(
                &self.state,
                MessageType::MtCommitment,
                commitment,
                self.state.data(),
            )
            .await
        {
            debug!(error = %e, "broadcasting commitment");
            return false;
        }

        self.state
            .set_job_done(self.state.self_pub_key(), SubroundId::Commitment, true);
        true
    }

    fn do_check(&self) -> bool {
        if self.state.round_canceled() {
            return false;
        }
        if self.state.status(SubroundId::Commitment) == SubroundStatus::Finished {
            return true;
        }

        let done = self.state.count_jobs_done(SubroundId::Commitment);
        if done >= threshold(SubroundId::Commitment, self.state.consensus_group_size()) {
            self.state
                .set_status(SubroundId::Commitment, SubroundStatus::Finished);
            return true;
        }
        false
    }

    fn extend(&self) {
        mark_extended(&self.state, SubroundId::Commitment);
    }

    fn consumes(&self, msg_type: MessageType) -> bool {
        msg_type == MessageType::MtCommitment
    }

    async fn on_message(&self, message: &ConsensusMessage) -> bool {
        if message.block_header_hash != self.state.data() {
            return false;
        }
        let Some(index) = self.state.index_of(&message.pub_key) else {
            return false;
        };
        // reveals are only valid from members inside the bitmap
        if !self.state.job_done(&message.pub_key, SubroundId::Bitmap) {
            return false;
        }

        if let Err(e) = self
            .services
            .multi_signer
            .store_commitment(index, &message.sub_round_data)
        {
            debug!(error = %e, "storing revealed commitment");
            return false;
        }
        self.state
            .set_job_done(&message.pub_key, SubroundId::Commitment, true);
        true
    }
}
