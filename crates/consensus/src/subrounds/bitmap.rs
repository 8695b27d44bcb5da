//! Leader's participant bitmap.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace};
use valence_core::{bitmap_is_set, Hasher, Marshalizer};
use valence_types::{ConsensusMessage, MessageType};

use crate::state::{ConsensusState, SubroundId, SubroundStatus};
use crate::subrounds::{mark_extended, threshold, RoundServices, SubroundHandler};

/// The leader fixes which members take part in the signing: the bitmap of
/// everyone whose commitment hash arrived. Receivers mirror the bitmap
/// into their job-done map; a bitmap that excludes the leader itself is
/// rejected.
pub struct SubroundBitmap<M: Marshalizer, H: Hasher> {
    state: Arc<ConsensusState>,
    services: Arc<RoundServices<M, H>>,
}

impl<M: Marshalizer, H: Hasher> SubroundBitmap<M, H> {
    /// Create the handler.
    pub fn new(state: Arc<ConsensusState>, services: Arc<RoundServices<M, H>>) -> Self {
        Self { state, services }
    }

    fn apply_bitmap(&self, bitmap: &[u8]) {
        let group = self.state.consensus_group();
        for (i, validator) in group.iter().enumerate() {
            if bitmap_is_set(bitmap, i) {
                self.state
                    .set_job_done(validator.pub_key(), SubroundId::Bitmap, true);
            }
        }
    }
}

#[async_trait]
impl<M: Marshalizer, H: Hasher> SubroundHandler for SubroundBitmap<M, H> {
    fn id(&self) -> SubroundId {
        SubroundId::Bitmap
    }

    async fn do_job(&self) -> bool {
        if !self.state.is_self_leader()
            || self.state.round_canceled()
            || self
                .state
                .job_done(self.state.self_pub_key(), SubroundId::Bitmap)
        {
            return false;
        }

        let bitmap = self.state.generate_bitmap(SubroundId::CommitmentHash);
        if let Err(e) = self
            .services
            .send_message(
                &self.state,
                MessageType::MtBitmap,
                bitmap.clone(),
                self.state.data(),
            )
            .await
        {
            debug!(error = %e, "broadcasting bitmap");
            return false;
        }

        self.apply_bitmap(&bitmap);
        true
    }

    fn do_check(&self) -> bool {
        if self.state.round_canceled() {
            return false;
        }
        if self.state.status(SubroundId::Bitmap) == SubroundStatus::Finished {
            return true;
        }

        let done = self.state.count_jobs_done(SubroundId::Bitmap);
        let group_size = self.state.consensus_group_size();
        let leader_in = self
            .state
            .leader()
            .map(|leader| self.state.job_done(leader.pub_key(), SubroundId::Bitmap))
            .unwrap_or(false);

        if leader_in && done >= threshold(SubroundId::Bitmap, group_size) {
            self.state
                .set_status(SubroundId::Bitmap, SubroundStatus::Finished);
            return true;
        }
        false
    }

    fn extend(&self) {
        mark_extended(&self.state, SubroundId::Bitmap);
    }

    fn consumes(&self, msg_type: MessageType) -> bool {
        msg_type == MessageType::MtBitmap
    }

    async fn on_message(&self, message: &ConsensusMessage) -> bool {
        let Some(leader) = self.state.leader() else {
            return false;
        };
        if message.pub_key != leader.pub_key() {
            trace!("bitmap not sent by the round leader");
            return false;
        }
        if message.block_header_hash != self.state.data() {
            return false;
        }

        let Some(leader_index) = self.state.index_of(leader.pub_key()) else {
            return false;
        };
        if !bitmap_is_set(&message.sub_round_data, leader_index as usize) {
            debug!("rejecting bitmap that excludes the leader");
            return false;
        }

        self.apply_bitmap(&message.sub_round_data);
        true
    }
}
