//! Per-round consensus state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use valence_types::{Body, Header, Validator};

/// Number of subrounds in a round.
pub const NR_OF_SUBROUNDS: usize = 7;

/// The ordered phases of a consensus round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubroundId {
    /// Round bootstrap: state reset and group selection.
    StartRound,
    /// Block proposal and validation.
    Block,
    /// Commitment hash exchange.
    CommitmentHash,
    /// Leader's participant bitmap.
    Bitmap,
    /// Commitment reveal.
    Commitment,
    /// Signature share exchange.
    Signature,
    /// Aggregation, commit and broadcast.
    EndRound,
}

impl SubroundId {
    /// All subrounds, in round order.
    pub const ALL: [SubroundId; NR_OF_SUBROUNDS] = [
        SubroundId::StartRound,
        SubroundId::Block,
        SubroundId::CommitmentHash,
        SubroundId::Bitmap,
        SubroundId::Commitment,
        SubroundId::Signature,
        SubroundId::EndRound,
    ];

    /// Position within the round.
    pub fn index(self) -> usize {
        match self {
            SubroundId::StartRound => 0,
            SubroundId::Block => 1,
            SubroundId::CommitmentHash => 2,
            SubroundId::Bitmap => 3,
            SubroundId::Commitment => 4,
            SubroundId::Signature => 5,
            SubroundId::EndRound => 6,
        }
    }
}

impl std::fmt::Display for SubroundId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SubroundId::StartRound => "start round",
            SubroundId::Block => "block",
            SubroundId::CommitmentHash => "commitment hash",
            SubroundId::Bitmap => "bitmap",
            SubroundId::Commitment => "commitment",
            SubroundId::Signature => "signature",
            SubroundId::EndRound => "end round",
        };
        write!(f, "{}", name)
    }
}

/// Completion state of a subround.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubroundStatus {
    /// Still running or never reached.
    NotFinished,
    /// The window lapsed without completion.
    Extended,
    /// Completed. Final within the round.
    Finished,
}

struct RoundData {
    round_index: u64,
    consensus_group: Vec<Validator>,
    header: Option<Header>,
    body: Option<Body>,
    data: Vec<u8>,
}

/// Mutable state of the current consensus round.
///
/// The chronology task is the only writer of the round-level fields; the
/// worker marks job completion concurrently through the lock-protected
/// job-done map keyed per (public key, subround).
pub struct ConsensusState {
    self_pub_key: Vec<u8>,
    round: RwLock<RoundData>,
    job_done: RwLock<HashMap<(Vec<u8>, SubroundId), bool>>,
    status: RwLock<[SubroundStatus; NR_OF_SUBROUNDS]>,
    round_canceled: AtomicBool,
}

impl ConsensusState {
    /// State for the node identified by `self_pub_key`.
    pub fn new(self_pub_key: Vec<u8>) -> Self {
        Self {
            self_pub_key,
            round: RwLock::new(RoundData {
                round_index: 0,
                consensus_group: Vec::new(),
                header: None,
                body: None,
                data: Vec::new(),
            }),
            job_done: RwLock::new(HashMap::new()),
            status: RwLock::new([SubroundStatus::NotFinished; NR_OF_SUBROUNDS]),
            round_canceled: AtomicBool::new(false),
        }
    }

    /// Reset everything for a new round with its consensus group.
    pub fn reset_round(&self, round_index: u64, consensus_group: Vec<Validator>) {
        {
            let mut round = self.round.write();
            round.round_index = round_index;
            round.consensus_group = consensus_group;
            round.header = None;
            round.body = None;
            round.data.clear();
        }
        self.job_done.write().clear();
        *self.status.write() = [SubroundStatus::NotFinished; NR_OF_SUBROUNDS];
        self.round_canceled.store(false, Ordering::Release);
    }

    /// This node's public key.
    pub fn self_pub_key(&self) -> &[u8] {
        &self.self_pub_key
    }

    /// Index of the current round.
    pub fn round_index(&self) -> u64 {
        self.round.read().round_index
    }

    /// The round's ordered consensus group.
    pub fn consensus_group(&self) -> Vec<Validator> {
        self.round.read().consensus_group.clone()
    }

    /// Size of the round's consensus group.
    pub fn consensus_group_size(&self) -> usize {
        self.round.read().consensus_group.len()
    }

    /// The round leader: position 0 of the group.
    pub fn leader(&self) -> Option<Validator> {
        self.round.read().consensus_group.first().cloned()
    }

    /// Whether this node leads the current round.
    pub fn is_self_leader(&self) -> bool {
        self.leader()
            .map(|leader| leader.pub_key() == self.self_pub_key)
            .unwrap_or(false)
    }

    /// Whether this node belongs to the current consensus group.
    pub fn is_self_in_consensus_group(&self) -> bool {
        self.index_of(&self.self_pub_key).is_some()
    }

    /// This node's position in the group.
    pub fn self_index(&self) -> Option<u16> {
        self.index_of(&self.self_pub_key)
    }

    /// Position of a public key in the group.
    pub fn index_of(&self, pub_key: &[u8]) -> Option<u16> {
        self.round
            .read()
            .consensus_group
            .iter()
            .position(|v| v.pub_key() == pub_key)
            .map(|i| i as u16)
    }

    /// Mark a member's job in a subround done (or not).
    pub fn set_job_done(&self, pub_key: &[u8], subround: SubroundId, done: bool) {
        self.job_done
            .write()
            .insert((pub_key.to_vec(), subround), done);
    }

    /// Whether a member completed its job in a subround.
    pub fn job_done(&self, pub_key: &[u8], subround: SubroundId) -> bool {
        self.job_done
            .read()
            .get(&(pub_key.to_vec(), subround))
            .copied()
            .unwrap_or(false)
    }

    /// Number of group members that completed a subround's job.
    pub fn count_jobs_done(&self, subround: SubroundId) -> usize {
        let group = self.round.read().consensus_group.clone();
        let jobs = self.job_done.read();
        group
            .iter()
            .filter(|v| {
                jobs.get(&(v.pub_key().to_vec(), subround))
                    .copied()
                    .unwrap_or(false)
            })
            .count()
    }

    /// Bitmap over the group: bit `i` set iff member `i` completed the
    /// subround's job (LSB-first per byte).
    pub fn generate_bitmap(&self, subround: SubroundId) -> Vec<u8> {
        let group = self.round.read().consensus_group.clone();
        let mut bitmap = vec![0u8; group.len().div_ceil(8)];
        let jobs = self.job_done.read();
        for (i, validator) in group.iter().enumerate() {
            let done = jobs
                .get(&(validator.pub_key().to_vec(), subround))
                .copied()
                .unwrap_or(false);
            if done {
                bitmap[i / 8] |= 1 << (i % 8);
            }
        }
        bitmap
    }

    /// Status of a subround.
    pub fn status(&self, subround: SubroundId) -> SubroundStatus {
        self.status.read()[subround.index()]
    }

    /// Set a subround's status. Finished is final: downgrades within the
    /// round are ignored.
    pub fn set_status(&self, subround: SubroundId, status: SubroundStatus) {
        let mut statuses = self.status.write();
        if statuses[subround.index()] == SubroundStatus::Finished
            && status != SubroundStatus::Finished
        {
            return;
        }
        statuses[subround.index()] = status;
    }

    /// The header under consensus.
    pub fn header(&self) -> Option<Header> {
        self.round.read().header.clone()
    }

    /// Install the header under consensus.
    pub fn set_header(&self, header: Header) {
        self.round.write().header = Some(header);
    }

    /// The body under consensus.
    pub fn body(&self) -> Option<Body> {
        self.round.read().body.clone()
    }

    /// Install the body under consensus.
    pub fn set_body(&self, body: Body) {
        self.round.write().body = Some(body);
    }

    /// The round's data digest (the proposed header's hash).
    pub fn data(&self) -> Vec<u8> {
        self.round.read().data.clone()
    }

    /// Set the round's data digest.
    pub fn set_data(&self, data: Vec<u8>) {
        self.round.write().data = data;
    }

    /// Whether the round was canceled.
    pub fn round_canceled(&self) -> bool {
        self.round_canceled.load(Ordering::Acquire)
    }

    /// Cancel the round: every subsequent check returns false until the
    /// next round resets.
    pub fn set_round_canceled(&self, canceled: bool) {
        self.round_canceled.store(canceled, Ordering::Release);
    }
}
