//! Aggregation, commit and broadcast.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};
use valence_core::metrics::{METRIC_CONSENSUS_ROUND_STATE, METRIC_COUNT_ACCEPTED_BLOCKS};
use valence_core::{bitmap_is_set, Hasher, Marshalizer};

use crate::state::{ConsensusState, SubroundId, SubroundStatus};
use crate::subrounds::{mark_extended, RoundServices, SubroundHandler};
use crate::{ConsensusError, Result};

/// Closes the round: verifies every collected signature share, aggregates
/// them onto the header, commits through the block processor and
/// broadcasts block, shard header, miniblocks and transactions, in that
/// order. Any failure aborts with statuses untouched; the node catches up
/// through sync in a later round.
pub struct SubroundEndRound<M: Marshalizer, H: Hasher> {
    state: Arc<ConsensusState>,
    services: Arc<RoundServices<M, H>>,
}

impl<M: Marshalizer, H: Hasher> SubroundEndRound<M, H> {
    /// Create the handler.
    pub fn new(state: Arc<ConsensusState>, services: Arc<RoundServices<M, H>>) -> Self {
        Self { state, services }
    }

    /// Every member the bitmap selects must have a stored share that
    /// verifies against the round digest.
    fn check_signatures_validity(&self, bitmap: &[u8]) -> Result<()> {
        let group = self.state.consensus_group();
        let data = self.state.data();
        let size = group.len().min(bitmap.len() * 8);

        for (i, validator) in group.iter().enumerate().take(size) {
            if !bitmap_is_set(bitmap, i) {
                continue;
            }
            if !self.state.job_done(validator.pub_key(), SubroundId::Signature) {
                return Err(ConsensusError::MissingSignature(i as u16));
            }

            let share = self.services.multi_signer.signature_share(i as u16)?;
            self.services
                .multi_signer
                .verify_signature_share(i as u16, &share, &data, bitmap)?;
        }
        Ok(())
    }

    async fn broadcast_committed_block(&self) {
        let (Some(header), Some(body)) = (self.state.header(), self.state.body()) else {
            return;
        };

        if let Err(e) = self.services.messenger.broadcast_block(&body, &header).await {
            debug!(error = %e, "broadcasting block");
        }
        if let Err(e) = self.services.messenger.broadcast_shard_header(&header).await {
            debug!(error = %e, "broadcasting shard header");
        }

        match self
            .services
            .processor
            .marshalized_data_to_broadcast(&header, &body)
        {
            Ok((mini_blocks, transactions)) => {
                if let Err(e) = self.services.messenger.broadcast_mini_blocks(mini_blocks).await {
                    debug!(error = %e, "broadcasting miniblocks");
                }
                if let Err(e) = self
                    .services
                    .messenger
                    .broadcast_transactions(transactions)
                    .await
                {
                    debug!(error = %e, "broadcasting transactions");
                }
            }
            Err(e) => debug!(error = %e, "marshaling broadcast data"),
        }
    }
}

#[async_trait]
impl<M: Marshalizer, H: Hasher> SubroundHandler for SubroundEndRound<M, H> {
    fn id(&self) -> SubroundId {
        SubroundId::EndRound
    }

    async fn do_job(&self) -> bool {
        if !self.state.is_self_in_consensus_group() || self.state.round_canceled() {
            return false;
        }

        let bitmap = self.state.generate_bitmap(SubroundId::Signature);
        if let Err(e) = self.check_signatures_validity(&bitmap) {
            debug!(error = %e, "signature validity check failed");
            return false;
        }

        let signature = match self.services.multi_signer.aggregate_sigs(&bitmap) {
            Ok(signature) => signature,
            Err(e) => {
                debug!(error = %e, "aggregating signatures");
                return false;
            }
        };

        let Some(mut header) = self.state.header() else {
            return false;
        };
        let Some(body) = self.state.body() else {
            return false;
        };
        header.signature = signature;
        header.pub_keys_bitmap = bitmap;
        self.state.set_header(header.clone());

        if let Err(e) = self
            .services
            .processor
            .commit_block(self.services.chain.as_ref(), &header, &body)
            .await
        {
            debug!(error = %e, "committing block");
            return false;
        }
        self.services
            .chain
            .set_current_header(header.clone(), self.state.data());

        self.state
            .set_status(SubroundId::EndRound, SubroundStatus::Finished);

        self.broadcast_committed_block().await;

        let action = if self.state.is_self_leader() {
            "proposed"
        } else {
            "synchronized"
        };
        info!(nonce = header.nonce, round = header.round, action = action, "block committed");

        self.services.status.increment(METRIC_COUNT_ACCEPTED_BLOCKS);
        self.services.status.set_string_value(
            METRIC_CONSENSUS_ROUND_STATE,
            &format!("valid block produced in round {}", header.round),
        );
        true
    }

    fn do_check(&self) -> bool {
        if self.state.round_canceled() {
            return false;
        }
        self.state.status(SubroundId::EndRound) == SubroundStatus::Finished
    }

    fn extend(&self) {
        mark_extended(&self.state, SubroundId::EndRound);
    }
}
