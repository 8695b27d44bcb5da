//! Aggregate node statistics.

use serde::{Deserialize, Serialize};

/// Summary of chain throughput as seen by this node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStatistics {
    /// Number of live nodes.
    // TODO: wire the validator registry count; fixed at 1 until then
    pub nr_of_nodes: u64,
    /// Number of shards, including the meta-chain.
    pub nr_of_shards: u32,
    /// Nominal round duration in milliseconds.
    pub round_time_ms: u64,
    /// Blocks committed by this node.
    pub block_number: u64,
    /// Transactions processed across committed blocks.
    pub total_processed_txs: u64,
    /// Peak transactions in a single block.
    pub peak_tps: u64,
}

impl NodeStatistics {
    /// Statistics at genesis.
    pub fn new(nr_of_shards: u32, round_time_ms: u64) -> Self {
        Self {
            nr_of_nodes: 1,
            nr_of_shards,
            round_time_ms,
            block_number: 0,
            total_processed_txs: 0,
            peak_tps: 0,
        }
    }

    /// Record a committed block.
    pub fn record_block(&mut self, block_number: u64, tx_count: u64) {
        self.block_number = block_number;
        self.total_processed_txs += tx_count;
        if tx_count > self.peak_tps {
            self.peak_tps = tx_count;
        }
    }
}
