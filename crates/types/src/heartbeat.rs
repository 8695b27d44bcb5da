//! Node liveness message.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{Error, Result, ShardId};

/// Maximum length of the free-form payload field.
pub const MAX_PAYLOAD_LEN: usize = 64;
/// Maximum length of the version number field.
pub const MAX_VERSION_LEN: usize = 128;
/// Maximum length of the node display name field.
pub const MAX_DISPLAY_NAME_LEN: usize = 128;

/// Periodic liveness broadcast.
///
/// The signature covers the marshaled heartbeat with the `signature` field
/// empty. Over-length string fields are trimmed after a warning rather than
/// rejected, so a misconfigured node still heartbeats.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    /// Free-form payload, nominally a timestamp string.
    pub payload: Vec<u8>,
    /// Shard of the sender.
    pub shard_id: ShardId,
    /// Software version of the sender.
    pub version_number: String,
    /// Human-readable node name.
    pub node_display_name: String,
    /// Sender's public key.
    pub pub_key: Vec<u8>,
    /// Signature over the marshaled heartbeat without this field.
    pub signature: Vec<u8>,
}

impl Heartbeat {
    /// Check the length limits of all bounded fields.
    pub fn verify_lengths(&self) -> Result<()> {
        if self.payload.len() > MAX_PAYLOAD_LEN {
            return Err(Error::FieldTooLong {
                field: "payload",
                actual: self.payload.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }
        if self.version_number.len() > MAX_VERSION_LEN {
            return Err(Error::FieldTooLong {
                field: "version_number",
                actual: self.version_number.len(),
                max: MAX_VERSION_LEN,
            });
        }
        if self.node_display_name.len() > MAX_DISPLAY_NAME_LEN {
            return Err(Error::FieldTooLong {
                field: "node_display_name",
                actual: self.node_display_name.len(),
                max: MAX_DISPLAY_NAME_LEN,
            });
        }
        Ok(())
    }

    /// Trim every over-length field to its maximum, logging what was cut.
    pub fn trim_lengths(&mut self) {
        if self.payload.len() > MAX_PAYLOAD_LEN {
            warn!(len = self.payload.len(), "trimming heartbeat payload");
            self.payload.truncate(MAX_PAYLOAD_LEN);
        }
        if self.version_number.len() > MAX_VERSION_LEN {
            warn!(
                len = self.version_number.len(),
                "trimming heartbeat version number"
            );
            self.version_number.truncate(MAX_VERSION_LEN);
        }
        if self.node_display_name.len() > MAX_DISPLAY_NAME_LEN {
            warn!(
                len = self.node_display_name.len(),
                "trimming heartbeat display name"
            );
            self.node_display_name.truncate(MAX_DISPLAY_NAME_LEN);
        }
    }

    /// The heartbeat with the signature field cleared, for signing and
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
    fn verify_lengths_flags_long_fields() {
        let mut hb = Heartbeat {
            version_number: "v".repeat(MAX_VERSION_LEN + 1),
            ..Default::default()
        };
        assert!(hb.verify_lengths().is_err());

        hb.trim_lengths();
        assert!(hb.verify_lengths().is_ok());
        assert_eq!(hb.version_number.len(), MAX_VERSION_LEN);
    }

    #[test]
    fn trim_is_a_no_op_for_short_fields() {
        let mut hb = Heartbeat {
            payload: b"2024".to_vec(),
            version_number: "v1.0.0".into(),
            node_display_name: "node-7".into(),
            ..Default::default()
        };
        let before = hb.clone();
        hb.trim_lengths();
        assert_eq!(hb, before);
    }
}
