//! Round bootstrap: state reset and consensus group selection.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};
use valence_core::metrics::{METRIC_CONSENSUS_STATE, METRIC_COUNT_CONSENSUS, METRIC_COUNT_LEADER};
use valence_core::{Hasher, Marshalizer};

use crate::state::{ConsensusState, SubroundId, SubroundStatus};
use crate::subrounds::{mark_extended, RoundServices, SubroundHandler};

/// First subround of every round: derives the consensus group from the
/// previous randomness and arms the multi-signer.
pub struct SubroundStartRound<M: Marshalizer, H: Hasher> {
    state: Arc<ConsensusState>,
    services: Arc<RoundServices<M, H>>,
}

impl<M: Marshalizer, H: Hasher> SubroundStartRound<M, H> {
    /// Create the handler.
    pub fn new(state: Arc<ConsensusState>, services: Arc<RoundServices<M, H>>) -> Self {
        Self { state, services }
    }
}

#[async_trait]
impl<M: Marshalizer, H: Hasher> SubroundHandler for SubroundStartRound<M, H> {
    fn id(&self) -> SubroundId {
        SubroundId::StartRound
    }

    async fn do_job(&self) -> bool {
        let randomness = match self.services.prev_rand_seed() {
            Ok(seed) => seed,
            Err(e) => {
                debug!(error = %e, "start round: no randomness source");
                self.state.set_round_canceled(true);
                return false;
            }
        };

        let group = match self.services.selector.compute_validators_group(&randomness) {
            Ok(group) => group,
            Err(e) => {
                debug!(error = %e, "start round: group selection failed");
                self.state.set_round_canceled(true);
                return false;
            }
        };

        let round_index = self.services.rounder.index();
        self.state.reset_round(round_index, group.clone());

        let role = if self.state.is_self_leader() {
            "proposer"
        } else if self.state.is_self_in_consensus_group() {
            "participant"
        } else {
            "observer"
        };
        self.services
            .status
            .set_string_value(METRIC_CONSENSUS_STATE, role);

        if let Some(own_index) = self.state.self_index() {
            let pub_keys: Vec<Vec<u8>> =
                group.iter().map(|v| v.pub_key().to_vec()).collect();
            if let Err(e) = self.services.multi_signer.reset(&pub_keys, own_index) {
                debug!(error = %e, "start round: multi-signer reset failed");
                self.state.set_round_canceled(true);
                return false;
            }
            self.services.status.increment(METRIC_COUNT_CONSENSUS);
        }
        if self.state.is_self_leader() {
            self.services.status.increment(METRIC_COUNT_LEADER);
        }

        info!(
            round = round_index,
            leader = self.state.leader().map(|l| l.short_hex()).unwrap_or_default(),
            role = role,
            "round started"
        );

        self.state
            .set_status(SubroundId::StartRound, SubroundStatus::Finished);
        true
    }

    fn do_check(&self) -> bool {
        if self.state.round_canceled() {
            return false;
        }
        self.state.status(SubroundId::StartRound) == SubroundStatus::Finished
    }

    fn extend(&self) {
        mark_extended(&self.state, SubroundId::StartRound);
    }
}
