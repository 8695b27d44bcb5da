//! Block proposal and validation.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace};
use valence_core::{Hasher, Marshalizer};
use valence_types::{Body, ConsensusMessage, Header, MessageType};

use crate::state::{ConsensusState, SubroundId, SubroundStatus};
use crate::subrounds::{mark_extended, threshold, RoundServices, SubroundHandler};

/// Block subround: the leader assembles and broadcasts the proposal;
/// followers validate the received header and body against the chain and
/// the leader's rand-seed signature.
pub struct SubroundBlock<M: Marshalizer, H: Hasher> {
    state: Arc<ConsensusState>,
    services: Arc<RoundServices<M, H>>,
}

impl<M: Marshalizer, H: Hasher> SubroundBlock<M, H> {
    /// Create the handler.
    pub fn new(state: Arc<ConsensusState>, services: Arc<RoundServices<M, H>>) -> Self {
        Self { state, services }
    }

    /// Header construction: next nonce over the chain tip, previous hash
    /// from the tip (genesis hash before the first commit), the previous
    /// rand seed carried only when the predecessor is genesis, and a new
    /// rand seed signed over the previous one.
    fn create_header(&self) -> Option<Header> {
        let services = &self.services;
        let (nonce, prev_hash, prev_rand_seed) = match services.chain.current_header() {
            Some(current) => (current.nonce + 1, services.chain.current_header_hash(), Vec::new()),
            None => {
                let genesis = services.chain.genesis_header()?;
                (
                    genesis.nonce + 1,
                    services.chain.genesis_header_hash(),
                    genesis.rand_seed.clone(),
                )
            }
        };

        let seed_basis = services.prev_rand_seed().ok()?;
        let rand_seed = match services.single_signer.sign(&seed_basis) {
            Ok(seed) => seed,
            Err(e) => {
                debug!(error = %e, "signing rand seed");
                return None;
            }
        };

        Some(Header {
            nonce,
            prev_hash,
            prev_rand_seed,
            rand_seed,
            shard_id: services.shard_id,
            round: services.rounder.index(),
            time_stamp: services.rounder.time_stamp(),
            ..Default::default()
        })
    }

    async fn received_block_header(&self, message: &ConsensusMessage) -> bool {
        let Some(leader) = self.state.leader() else {
            return false;
        };
        if message.pub_key != leader.pub_key() {
            trace!("block header not sent by the round leader");
            return false;
        }
        if self.state.header().is_some() {
            return false;
        }

        let header: Header = match self.services.marshalizer.unmarshal(&message.sub_round_data) {
            Ok(header) => header,
            Err(e) => {
                debug!(error = %e, "decoding proposed header");
                return false;
            }
        };

        // the announced digest must be the hash of the decoded header
        match self.services.header_hash(&header) {
            Ok(hash) if hash == message.block_header_hash => {}
            _ => {
                debug!("proposed header does not match its announced hash");
                return false;
            }
        }

        // the new rand seed must be the leader's signature over the
        // previous one
        let Ok(seed_basis) = self.services.prev_rand_seed() else {
            return false;
        };
        if self
            .services
            .single_signer
            .verify(leader.pub_key(), &seed_basis, &header.rand_seed)
            .is_err()
        {
            debug!("proposed header carries an invalid rand seed");
            return false;
        }

        self.state.set_header(header);
        self.state.set_data(message.block_header_hash.clone());
        self.state
            .set_job_done(leader.pub_key(), SubroundId::Block, true);
        self.try_process_received_block().await;
        true
    }

    async fn received_block_body(&self, message: &ConsensusMessage) -> bool {
        if self.state.body().is_some() {
            return false;
        }
        let body: Body = match self.services.marshalizer.unmarshal(&message.sub_round_data) {
            Ok(body) => body,
            Err(e) => {
                debug!(error = %e, "decoding proposed body");
                return false;
            }
        };
        self.state.set_body(body);
        self.try_process_received_block().await;
        true
    }

    /// Once both halves of the proposal arrived, execute it; a rejected
    /// proposal cancels the round for this node.
    async fn try_process_received_block(&self) {
        if self.state.is_self_leader() {
            return;
        }
        let (Some(header), Some(body)) = (self.state.header(), self.state.body()) else {
            return;
        };

        if let Err(e) = self
            .services
            .processor
            .process_block(self.services.chain.as_ref(), &header, &body)
            .await
        {
            debug!(error = %e, "processing proposed block");
            self.state.set_round_canceled(true);
        }
    }
}

#[async_trait]
impl<M: Marshalizer, H: Hasher> SubroundHandler for SubroundBlock<M, H> {
    fn id(&self) -> SubroundId {
        SubroundId::Block
    }

    async fn do_job(&self) -> bool {
        if !self.state.is_self_leader()
            || self.state.round_canceled()
            || self
                .state
                .job_done(self.state.self_pub_key(), SubroundId::Block)
        {
            return false;
        }

        let Some(mut header) = self.create_header() else {
            return false;
        };

        let body = match self.services.processor.create_block_body(&header).await {
            Ok(body) => body,
            Err(e) => {
                debug!(error = %e, "creating block body");
                return false;
            }
        };
        if let Err(e) = self.services.processor.apply_body_to_header(&mut header, &body) {
            debug!(error = %e, "applying body to header");
            return false;
        }

        let header_hash = match self.services.header_hash(&header) {
            Ok(hash) => hash,
            Err(e) => {
                debug!(error = %e, "hashing proposed header");
                return false;
            }
        };

        let body_bytes = match self.services.marshalizer.marshal(&body) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(error = %e, "marshaling proposed body");
                return false;
            }
        };
        let header_bytes = match self.services.marshalizer.marshal(&header) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(error = %e, "marshaling proposed header");
                return false;
            }
        };

        self.state.set_header(header);
        self.state.set_body(body);
        self.state.set_data(header_hash.clone());

        if let Err(e) = self
            .services
            .send_message(
                &self.state,
                MessageType::MtBlockBody,
                body_bytes,
                header_hash.clone(),
            )
            .await
        {
            debug!(error = %e, "broadcasting block body");
        }
        if let Err(e) = self
            .services
            .send_message(
                &self.state,
                MessageType::MtBlockHeader,
                header_bytes,
                header_hash,
            )
            .await
        {
            debug!(error = %e, "broadcasting block header");
        }

        self.state
            .set_job_done(self.state.self_pub_key(), SubroundId::Block, true);
        true
    }

    fn do_check(&self) -> bool {
        if self.state.round_canceled() {
            return false;
        }
        if self.state.status(SubroundId::Block) == SubroundStatus::Finished {
            return true;
        }

        let done = self.state.count_jobs_done(SubroundId::Block);
        if done >= threshold(SubroundId::Block, self.state.consensus_group_size())
            && self.state.header().is_some()
        {
            self.state
                .set_status(SubroundId::Block, SubroundStatus::Finished);
            return true;
        }
        false
    }

    fn extend(&self) {
        mark_extended(&self.state, SubroundId::Block);
    }

    fn consumes(&self, msg_type: MessageType) -> bool {
        matches!(
            msg_type,
            MessageType::MtBlockBody | MessageType::MtBlockHeader
        )
    }

    async fn on_message(&self, message: &ConsensusMessage) -> bool {
        match message.msg_type {
            MessageType::MtBlockHeader => self.received_block_header(message).await,
            MessageType::MtBlockBody => self.received_block_body(message).await,
            _ => false,
        }
    }
}
