//! Signature share exchange.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use valence_core::{Hasher, Marshalizer};
use valence_types::{ConsensusMessage, MessageType};

use crate::state::{ConsensusState, SubroundId, SubroundStatus};
use crate::subrounds::{mark_extended, threshold, RoundServices, SubroundHandler};

/// Bitmap members sign the round digest; shares are verified against the
/// sender's group key before being stored for aggregation.
pub struct SubroundSignature<M: Marshalizer, H: Hasher> {
    state: Arc<ConsensusState>,
    services: Arc<RoundServices<M, H>>,
}

impl<M: Marshalizer, H: Hasher> SubroundSignature<M, H> {
    /// Create the handler.
    pub fn new(state: Arc<ConsensusState>, services: Arc<RoundServices<M, H>>) -> Self {
        Self { state, services }
    }
}

#[async_trait]
impl<M: Marshalizer, H: Hasher> SubroundHandler for SubroundSignature<M, H> {
    fn id(&self) -> SubroundId {
        SubroundId::Signature
    }

    async fn do_job(&self) -> bool {
        if self.state.self_index().is_none()
            || self.state.round_canceled()
            || !self.state.job_done(self.state.self_pub_key(), SubroundId::Bitmap)
            || self
                .state
                .job_done(self.state.self_pub_key(), SubroundId::Signature)
            || self.state.data().is_empty()
        {
            return false;
        }

        let bitmap = self.state.generate_bitmap(SubroundId::Bitmap);
        let share = match self
            .services
            .multi_signer
            .create_signature_share(&self.state.data(), &bitmap)
        {
            Ok(share) => share,
            Err(e) => {
                debug!(error = %e, "creating signature share");
                return false;
            }
        };

        if let Err(e) = self
            .services
            .send_message(
                &self.state,
                MessageType::MtSignature,
                share,
                self.state.data(),
            )
            .await
        {
            debug!(error = %e, "broadcasting signature share");
            return false;
        }

        self.state
            .set_job_done(self.state.self_pub_key(), SubroundId::Signature, true);
        true
    }

    fn do_check(&self) -> bool {
        if self.state.round_canceled() {
            return false;
        }
        if self.state.status(SubroundId::Signature) == SubroundStatus::Finished {
            return true;
        }

        let done = self.state.count_jobs_done(SubroundId::Signature);
        if done >= threshold(SubroundId::Signature, self.state.consensus_group_size()) {
            self.state
                .set_status(SubroundId::Signature, SubroundStatus::Finished);
            return true;
        }
        false
    }

    fn extend(&self) {
        mark_extended(&self.state, SubroundId::Signature);
    }

    fn consumes(&self, msg_type: MessageType) -> bool {
        msg_type == MessageType::MtSignature
    }

    async fn on_message(&self, message: &ConsensusMessage) -> bool {
        if message.block_header_hash != self.state.data() {
            return false;
        }
        let Some(index) = self.state.index_of(&message.pub_key) else {
            return false;
        };
        if !self.state.job_done(&message.pub_key, SubroundId::Bitmap) {
            return false;
        }
        if self.state.job_done(&message.pub_key, SubroundId::Signature) {
            return false;
        }

        let bitmap = self.state.generate_bitmap(SubroundId::Bitmap);
        if let Err(e) = self.services.multi_signer.verify_signature_share(
            index,
            &message.sub_round_data,
            &self.state.data(),
            &bitmap,
        ) {
            debug!(error = %e, "verifying received signature share");
            return false;
        }
        if let Err(e) = self
            .services
            .multi_signer
            .store_signature_share(index, &message.sub_round_data)
        {
            debug!(error = %e, "storing received signature share");
            return false;
        }

        self.state
            .set_job_done(&message.pub_key, SubroundId::Signature, true);
        true
    }
}
