//! Block header, miniblock and body structures.
//!
//! A shard block body is a list of miniblocks; the header references each
//! miniblock by hash through [`MiniBlockHeader`] entries, in order. The
//! body-to-header linkage is what the synchronizer and the consensus rounds
//! validate before committing.

use serde::{Deserialize, Serialize};

use crate::ShardId;

/// Header of a shard block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Strictly increasing block index; genesis is 0.
    pub nonce: u64,
    /// Hash of the previous committed header (genesis hash for the first block).
    pub prev_hash: Vec<u8>,
    /// Randomness seed of the previous header. Populated only when the
    /// previous block is genesis; zero-length otherwise.
    pub prev_rand_seed: Vec<u8>,
    /// This round's randomness seed: the leader's signature over the
    /// previous seed.
    pub rand_seed: Vec<u8>,
    /// Bitmap of the consensus group members whose signature shares were
    /// aggregated into `signature`.
    pub pub_keys_bitmap: Vec<u8>,
    /// Shard this header belongs to.
    pub shard_id: ShardId,
    /// Round in which the block was proposed.
    pub round: u64,
    /// Round start timestamp, unix milliseconds.
    pub time_stamp: u64,
    /// Aggregated consensus signature.
    pub signature: Vec<u8>,
    /// Miniblock references, in body order.
    pub mini_block_headers: Vec<MiniBlockHeader>,
    /// State root after applying the body.
    pub root_hash: Vec<u8>,
}

impl Header {
    /// Collect the referenced miniblock hashes, in order.
    pub fn mini_block_hashes(&self) -> Vec<Vec<u8>> {
        self.mini_block_headers
            .iter()
            .map(|mbh| mbh.hash.clone())
            .collect()
    }
}

/// Reference to a miniblock inside a header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiniBlockHeader {
    /// Hash of the referenced miniblock.
    pub hash: Vec<u8>,
    /// Shard that produced the transactions.
    pub sender_shard_id: ShardId,
    /// Shard that executes the transactions.
    pub receiver_shard_id: ShardId,
    /// Number of transactions in the miniblock.
    pub tx_count: u32,
}

/// A shard-scoped batch of transaction hashes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiniBlock {
    /// Hashes of the contained transactions.
    pub tx_hashes: Vec<Vec<u8>>,
    /// Shard that produced the transactions.
    pub sender_shard_id: ShardId,
    /// Shard that executes the transactions.
    pub receiver_shard_id: ShardId,
}

/// A block body: the ordered miniblocks referenced by a header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Body {
    /// The miniblocks, in header order.
    pub mini_blocks: Vec<MiniBlock>,
}

impl Body {
    /// Create a body from miniblocks.
    pub fn new(mini_blocks: Vec<MiniBlock>) -> Self {
        Self { mini_blocks }
    }

    /// Number of miniblocks in the body.
    pub fn len(&self) -> usize {
        self.mini_blocks.len()
    }

    /// Whether the body holds no miniblocks.
    pub fn is_empty(&self) -> bool {
        self.mini_blocks.is_empty()
    }
}
