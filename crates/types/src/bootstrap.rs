//! Per-round sync checkpoint persisted by the synchronizer.

use serde::{Deserialize, Serialize};

/// Snapshot of the fork detector's verdict at checkpoint time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkSnapshot {
    /// Whether a fork was signaled.
    pub is_detected: bool,
    /// Nonce of the suspected divergence; `u64::MAX` when not detected.
    pub nonce: u64,
    /// Round of the suspected divergence; `u64::MAX` when not detected.
    pub round: u64,
    /// Header hash at the divergence, when known.
    pub hash: Option<Vec<u8>>,
}

impl ForkSnapshot {
    /// An empty, not-detected snapshot.
    pub fn empty() -> Self {
        Self {
            is_detected: false,
            nonce: u64::MAX,
            round: u64::MAX,
            hash: None,
        }
    }
}

/// State the synchronizer persists once per committed round so a restarted
/// node can resume without replaying the network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapData {
    /// Round of the last committed block.
    pub last_round: u64,
    /// Highest committed header nonce.
    pub highest_nonce: u64,
    /// Fork detector snapshot at commit time.
    pub fork: ForkSnapshot,
}
