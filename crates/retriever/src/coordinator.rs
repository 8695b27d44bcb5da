//! Topic-routed request dispatch with de-duplication and chunking.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, trace};
use valence_core::{RequestHandler, ResolversFinder};
use valence_types::{ShardId, METACHAIN_SHARD_ID};

use crate::requested::RequestedItems;
use crate::{Result, RetrieverError};

/// Topics and limits for the coordinator.
#[derive(Debug, Clone)]
pub struct RequestConfig {
    /// Topic for transaction requests.
    pub tx_topic: String,
    /// Topic for unsigned (smart-contract result) transaction requests.
    pub scr_topic: String,
    /// Topic for reward transaction requests.
    pub reward_topic: String,
    /// Topic for miniblock requests.
    pub mini_block_topic: String,
    /// Topic for shard header requests.
    pub shard_header_topic: String,
    /// Topic for meta-chain header requests.
    pub meta_header_topic: String,
    /// Maximum number of hashes per dispatched batch.
    pub max_txs_to_request: usize,
    /// Minimum interval between sweeps of the requested-items cache.
    pub sweep_interval: Duration,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            tx_topic: "transactions".into(),
            scr_topic: "unsignedTransactions".into(),
            reward_topic: "rewardTransactions".into(),
            mini_block_topic: "miniBlocks".into(),
            shard_header_topic: "shardHeaders".into(),
            meta_header_topic: "metaHeaders".into(),
            max_txs_to_request: 100,
            sweep_interval: Duration::from_secs(1),
        }
    }
}

impl RequestConfig {
    fn validate(&self) -> Result<()> {
        if self.tx_topic.is_empty() {
            return Err(RetrieverError::EmptyTopic("transaction"));
        }
        if self.scr_topic.is_empty() {
            return Err(RetrieverError::EmptyTopic("unsigned transaction"));
        }
        if self.reward_topic.is_empty() {
            return Err(RetrieverError::EmptyTopic("reward transaction"));
        }
        if self.mini_block_topic.is_empty() {
            return Err(RetrieverError::EmptyTopic("miniblock"));
        }
        if self.shard_header_topic.is_empty() {
            return Err(RetrieverError::EmptyTopic("shard header"));
        }
        if self.meta_header_topic.is_empty() {
            return Err(RetrieverError::EmptyTopic("meta header"));
        }
        if self.max_txs_to_request < 1 {
            return Err(RetrieverError::InvalidMaxTxsToRequest);
        }
        Ok(())
    }
}

/// Split `items` into chunks of at most `chunk_size` elements.
pub fn split_in_chunks(items: &[Vec<u8>], chunk_size: usize) -> Vec<Vec<Vec<u8>>> {
    items
        .chunks(chunk_size.max(1))
        .map(|chunk| chunk.to_vec())
        .collect()
}

/// De-duplicating request dispatcher over the resolver topics.
///
/// One coordinator serves either a shard node or a meta-chain node; the
/// difference is the direction header-by-nonce requests travel.
pub struct RequestCoordinator<F: ResolversFinder> {
    finder: Arc<F>,
    requested: Arc<RequestedItems>,
    config: RequestConfig,
    is_meta_chain: bool,
    last_sweep: Mutex<Instant>,
}

impl<F: ResolversFinder + 'static> RequestCoordinator<F> {
    /// Coordinator for a shard node.
    pub fn new_shard(
        finder: Arc<F>,
        requested: Arc<RequestedItems>,
        config: RequestConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            finder,
            requested,
            config,
            is_meta_chain: false,
            last_sweep: Mutex::new(Instant::now()),
        })
    }

    /// Coordinator for a meta-chain node.
    pub fn new_meta(
        finder: Arc<F>,
        requested: Arc<RequestedItems>,
        config: RequestConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            finder,
            requested,
            config,
            is_meta_chain: true,
            last_sweep: Mutex::new(Instant::now()),
        })
    }

    fn sweep_if_needed(&self) {
        let mut last = self.last_sweep.lock();
        if last.elapsed() <= self.config.sweep_interval {
            return;
        }
        *last = Instant::now();
        self.requested.sweep();
    }

    /// Filter out hashes already requested in this window, recording the
    /// remainder as requested.
    fn unrequested_hashes(&self, hashes: &[Vec<u8>]) -> Vec<Vec<u8>> {
        self.sweep_if_needed();

        let mut unrequested = Vec::new();
        for hash in hashes {
            let key = hex::encode(hash);
            if !self.requested.has(&key) {
                self.requested.add(&key);
                unrequested.push(hash.clone());
            }
        }
        unrequested
    }

    fn request_by_hashes(&self, shard: ShardId, hashes: &[Vec<u8>], topic: &str) {
        let unrequested = self.unrequested_hashes(hashes);
        trace!(
            num = unrequested.len(),
            topic = topic,
            shard = shard,
            "requesting items from network"
        );
        if unrequested.is_empty() {
            return;
        }

        let resolver = match self.finder.cross_shard_resolver(topic, shard) {
            Ok(resolver) => resolver,
            Err(_) => {
                error!(topic = topic, shard = shard, "missing resolver");
                return;
            }
        };

        let batches = split_in_chunks(&unrequested, self.config.max_txs_to_request);
        let topic = topic.to_string();
        tokio::spawn(async move {
            let Some(batch_resolver) = resolver.hash_array_requester() else {
                debug!(topic = %topic, "resolver has no hash-array capability");
                return;
            };
            for batch in batches {
                if let Err(e) = batch_resolver.request_data_from_hash_array(&batch) {
                    debug!(topic = %topic, error = %e, "requesting batch");
                }
            }
        });
    }
}

impl<F: ResolversFinder + 'static> RequestHandler for RequestCoordinator<F> {
    fn request_transaction(&self, shard: ShardId, hashes: &[Vec<u8>]) {
        self.request_by_hashes(shard, hashes, &self.config.tx_topic);
    }

    fn request_unsigned_transactions(&self, shard: ShardId, hashes: &[Vec<u8>]) {
        self.request_by_hashes(shard, hashes, &self.config.scr_topic);
    }

    fn request_reward_transactions(&self, shard: ShardId, hashes: &[Vec<u8>]) {
        self.request_by_hashes(shard, hashes, &self.config.reward_topic);
    }

    fn request_mini_block(&self, shard: ShardId, hash: &[u8]) {
        self.sweep_if_needed();

        let key = hex::encode(hash);
        if self.requested.has(&key) {
            trace!(key = %key, "item already requested");
            return;
        }

        trace!(
            hash = %key,
            shard = shard,
            topic = %self.config.mini_block_topic,
            "requesting miniblock from network"
        );

        let resolver = match self
            .finder
            .cross_shard_resolver(&self.config.mini_block_topic, shard)
        {
            Ok(resolver) => resolver,
            Err(_) => {
                error!(
                    topic = %self.config.mini_block_topic,
                    shard = shard,
                    "missing resolver"
                );
                return;
            }
        };

        if let Err(e) = resolver.request_data_from_hash(hash) {
            debug!(error = %e, "requesting miniblock");
            return;
        }
        self.requested.add(&key);
    }

    fn request_header(&self, shard: ShardId, hash: &[u8]) {
        self.sweep_if_needed();

        let key = hex::encode(hash);
        if self.requested.has(&key) {
            trace!(key = %key, "item already requested");
            return;
        }

        let topic = if shard == METACHAIN_SHARD_ID {
            &self.config.meta_header_topic
        } else {
            &self.config.shard_header_topic
        };
        trace!(topic = %topic, shard = shard, hash = %key, "requesting header by hash");

        let resolver = if shard == METACHAIN_SHARD_ID {
            self.finder.meta_chain_resolver(topic)
        } else {
            self.finder.cross_shard_resolver(topic, shard)
        };
        let resolver = match resolver {
            Ok(resolver) => resolver,
            Err(_) => {
                error!(topic = %topic, shard = shard, "missing resolver");
                return;
            }
        };

        if let Err(e) = resolver.request_data_from_hash(hash) {
            debug!(error = %e, "requesting header by hash");
            return;
        }
        self.requested.add(&key);
    }

    fn request_header_by_nonce(&self, shard: ShardId, nonce: u64) {
        self.sweep_if_needed();

        let key = format!("{}-{}", shard, nonce);
        if self.requested.has(&key) {
            trace!(key = %key, "item already requested");
            return;
        }

        // shard nodes follow the meta-chain for nonce lookups; a meta-chain
        // node asks the shard directly
        let (topic, resolver) = if self.is_meta_chain {
            let topic = &self.config.shard_header_topic;
            (topic, self.finder.cross_shard_resolver(topic, shard))
        } else {
            let topic = &self.config.meta_header_topic;
            (topic, self.finder.meta_chain_resolver(topic))
        };
        let resolver = match resolver {
            Ok(resolver) => resolver,
            Err(_) => {
                debug!(topic = %topic, shard = shard, "missing resolver");
                return;
            }
        };

        let Some(nonce_resolver) = resolver.nonce_requester() else {
            debug!(topic = %topic, shard = shard, "resolver is not a nonce resolver");
            return;
        };

        if let Err(e) = nonce_resolver.request_data_from_nonce(nonce) {
            debug!(error = %e, "requesting header by nonce");
            return;
        }
        self.requested.add(&key);
    }
}
