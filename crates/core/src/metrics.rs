//! Status-handler metric keys.
//!
//! Metrics are advisory: writers never fail on a metric update and readers
//! must tolerate missing keys.

/// Nonce of the last committed block.
pub const METRIC_NONCE: &str = "valence_nonce";
/// Current consensus round index.
pub const METRIC_CURRENT_ROUND: &str = "valence_current_round";
/// Round of the last block synchronized from the network.
pub const METRIC_SYNCHRONIZED_ROUND: &str = "valence_synchronized_round";
/// 1 while the synchronizer is behind the network, 0 otherwise.
pub const METRIC_IS_SYNCING: &str = "valence_is_syncing";
/// Highest nonce the fork detector believes exists.
pub const METRIC_PROBABLE_HIGHEST_NONCE: &str = "valence_probable_highest_nonce";
/// Rounds in which this node was part of the consensus group.
pub const METRIC_COUNT_CONSENSUS: &str = "valence_count_consensus";
/// Rounds in which this node was the leader.
pub const METRIC_COUNT_LEADER: &str = "valence_count_leader";
/// Blocks accepted at the end of a round.
pub const METRIC_COUNT_ACCEPTED_BLOCKS: &str = "valence_count_accepted_blocks";
/// Role of the node in the current round ("proposer", "participant", "observer").
pub const METRIC_CONSENSUS_STATE: &str = "valence_consensus_state";
/// Free-form outcome of the last consensus round.
pub const METRIC_CONSENSUS_ROUND_STATE: &str = "valence_consensus_round_state";
