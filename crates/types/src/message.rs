//! Consensus wire envelope.

use serde::{Deserialize, Serialize};

use crate::ShardId;

/// Kind of payload carried by a [`ConsensusMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// Proposed block body.
    MtBlockBody,
    /// Proposed block header.
    MtBlockHeader,
    /// Hash of a signature commitment.
    MtCommitmentHash,
    /// Leader's bitmap of received commitment hashes.
    MtBitmap,
    /// Revealed commitment.
    MtCommitment,
    /// Signature share over the round digest.
    MtSignature,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MessageType::MtBlockBody => "block body",
            MessageType::MtBlockHeader => "block header",
            MessageType::MtCommitmentHash => "commitment hash",
            MessageType::MtBitmap => "bitmap",
            MessageType::MtCommitment => "commitment",
            MessageType::MtSignature => "signature",
        };
        write!(f, "{}", name)
    }
}

/// Envelope for every message exchanged during a consensus round.
///
/// The signature covers the marshaled envelope with the `signature` field
/// cleared; [`ConsensusMessage::signing_copy`] produces that form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusMessage {
    /// Hash of the block header the round is deciding on.
    pub block_header_hash: Vec<u8>,
    /// Sub-round specific payload (marshaled header/body, commitment, share...).
    pub sub_round_data: Vec<u8>,
    /// Sender's public key.
    pub pub_key: Vec<u8>,
    /// Sender's signature over the envelope.
    pub signature: Vec<u8>,
    /// What the payload is.
    pub msg_type: MessageType,
    /// Round the message belongs to.
    pub round_index: u64,
    /// Round timestamp, unix milliseconds.
    pub time_stamp: u64,
    /// Shard of the sender.
    pub shard_id: ShardId,
}

impl ConsensusMessage {
    /// Create an unsigned message.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        block_header_hash: Vec<u8>,
        sub_round_data: Vec<u8>,
        pub_key: Vec<u8>,
        msg_type: MessageType,
        round_index: u64,
        time_stamp: u64,
        shard_id: ShardId,
    ) -> Self {
        Self {
            block_header_hash,
            sub_round_data,
            pub_key,
            signature: Vec::new(),
            msg_type,
            round_index,
            time_stamp,
            shard_id,
        }
    }

    /// The envelope with the signature field cleared, for signing and
    /// verification.
    pub fn signing_copy(&self) -> Self {
        let mut copy = self.clone();
        copy.signature = Vec::new();
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signing_copy_clears_only_the_signature() {
        let mut msg = ConsensusMessage::new(
            vec![1],
            vec![2],
            vec![3],
            MessageType::MtSignature,
            7,
            1000,
            0,
        );
        msg.signature = vec![9, 9];

        let copy = msg.signing_copy();
        assert!(copy.signature.is_empty());
        assert_eq!(copy.sub_round_data, msg.sub_round_data);
        assert_eq!(copy.round_index, msg.round_index);
    }
}
