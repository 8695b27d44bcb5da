//! Network-facing seams: resolvers, request handling, broadcasting.
//!
//! The core never opens connections; it talks to resolvers found through a
//! [`ResolversFinder`] and broadcasts through messenger traits. Connection
//! bring-up and peer management live outside the core.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use valence_types::{Body, ConsensusMessage, Header, ShardId};

/// Errors surfaced by the network seams.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// No resolver is registered for the topic/shard pair.
    #[error("missing resolver for topic {topic} shard {shard}")]
    MissingResolver {
        /// Request topic.
        topic: String,
        /// Target shard.
        shard: ShardId,
    },

    /// A request could not be dispatched.
    #[error("request dispatch failed: {0}")]
    SendFailed(String),

    /// A broadcast could not be dispatched.
    #[error("broadcast failed: {0}")]
    BroadcastFailed(String),
}

/// A peer-facing data resolver for one topic.
///
/// Optional capabilities are exposed through the probe methods; a resolver
/// that does not support them returns `None` and the caller skips it with a
/// log entry instead of failing.
pub trait Resolver: Send + Sync {
    /// Request one item by hash.
    fn request_data_from_hash(&self, hash: &[u8]) -> Result<(), NetworkError>;

    /// This resolver's hash-array capability, if it has one.
    fn hash_array_requester(&self) -> Option<&dyn HashArrayResolver> {
        None
    }

    /// This resolver's nonce capability, if it has one.
    fn nonce_requester(&self) -> Option<&dyn NonceResolver> {
        None
    }
}

/// Batch requests by hash array.
pub trait HashArrayResolver: Send + Sync {
    /// Request a batch of items by hash.
    fn request_data_from_hash_array(&self, hashes: &[Vec<u8>]) -> Result<(), NetworkError>;
}

/// Requests addressed by nonce instead of hash.
pub trait NonceResolver: Send + Sync {
    /// Request the item with the given nonce.
    fn request_data_from_nonce(&self, nonce: u64) -> Result<(), NetworkError>;
}

/// Looks up the resolver serving a topic.
pub trait ResolversFinder: Send + Sync {
    /// Resolver for a topic toward a peer shard.
    fn cross_shard_resolver(
        &self,
        topic: &str,
        shard: ShardId,
    ) -> Result<Arc<dyn Resolver>, NetworkError>;

    /// Resolver for a topic toward the meta-chain.
    fn meta_chain_resolver(&self, topic: &str) -> Result<Arc<dyn Resolver>, NetworkError>;

    /// Resolver for a topic inside the node's own shard.
    fn intra_shard_resolver(&self, topic: &str) -> Result<Arc<dyn Resolver>, NetworkError>;
}

/// The de-duplicated request surface consumed by the synchronizer.
pub trait RequestHandler: Send + Sync {
    /// Request transactions by hash.
    fn request_transaction(&self, shard: ShardId, hashes: &[Vec<u8>]);

    /// Request unsigned (smart-contract result) transactions by hash.
    fn request_unsigned_transactions(&self, shard: ShardId, hashes: &[Vec<u8>]);

    /// Request reward transactions by hash.
    fn request_reward_transactions(&self, shard: ShardId, hashes: &[Vec<u8>]);

    /// Request one miniblock by hash.
    fn request_mini_block(&self, shard: ShardId, hash: &[u8]);

    /// Request one header by hash.
    fn request_header(&self, shard: ShardId, hash: &[u8]);

    /// Request one header by nonce.
    fn request_header_by_nonce(&self, shard: ShardId, nonce: u64);
}

/// Raw topic broadcasting.
pub trait PeerMessenger: Send + Sync {
    /// Broadcast bytes on a topic.
    fn broadcast(&self, topic: &str, data: &[u8]);
}

/// Typed broadcast surface used by the consensus rounds.
#[async_trait]
pub trait BroadcastMessenger: Send + Sync {
    /// Broadcast a full block (body + header).
    async fn broadcast_block(&self, body: &Body, header: &Header) -> Result<(), NetworkError>;

    /// Broadcast a shard header toward the meta-chain.
    async fn broadcast_shard_header(&self, header: &Header) -> Result<(), NetworkError>;

    /// Broadcast marshaled miniblocks keyed by destination shard.
    async fn broadcast_mini_blocks(
        &self,
        mini_blocks: HashMap<u32, Vec<u8>>,
    ) -> Result<(), NetworkError>;

    /// Broadcast marshaled transactions keyed by topic.
    async fn broadcast_transactions(
        &self,
        transactions: HashMap<String, Vec<Vec<u8>>>,
    ) -> Result<(), NetworkError>;

    /// Broadcast a consensus envelope.
    async fn broadcast_consensus_message(
        &self,
        message: &ConsensusMessage,
    ) -> Result<(), NetworkError>;
}

/// Reports whether the node currently has network connectivity.
pub trait NetworkConnectionWatcher: Send + Sync {
    /// True when the node is connected to the network.
    fn is_connected_to_the_network(&self) -> bool;
}
