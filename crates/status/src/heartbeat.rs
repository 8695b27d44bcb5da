//! Heartbeat broadcasting.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;
use valence_core::{CryptoError, Marshalizer, PeerMessenger, SingleSigner};
use valence_types::{Heartbeat, ShardId};

/// Heartbeat sender configuration.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Topic the heartbeat is broadcast on.
    pub topic: String,
    /// Software version advertised.
    pub version_number: String,
    /// Human-readable node name advertised.
    pub node_display_name: String,
    /// Shard of this node.
    pub shard_id: ShardId,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            topic: "heartbeat".into(),
            version_number: String::new(),
            node_display_name: String::new(),
            shard_id: 0,
        }
    }
}

/// Signs and broadcasts liveness messages on the heartbeat topic.
///
/// The signature covers the marshaled heartbeat without the signature
/// field; over-length string fields are trimmed after a warning so a
/// misconfigured display name cannot stop the heartbeat.
pub struct HeartbeatSender<M: Marshalizer> {
    messenger: Arc<dyn PeerMessenger>,
    single_signer: Arc<dyn SingleSigner>,
    marshalizer: M,
    config: HeartbeatConfig,
}

impl<M: Marshalizer> HeartbeatSender<M> {
    /// Create a sender.
    pub fn new(
        messenger: Arc<dyn PeerMessenger>,
        single_signer: Arc<dyn SingleSigner>,
        marshalizer: M,
        config: HeartbeatConfig,
    ) -> Self {
        Self {
            messenger,
            single_signer,
            marshalizer,
            config,
        }
    }

    /// Build, sign and broadcast one heartbeat.
    pub fn send_heartbeat(&self) -> Result<(), CryptoError> {
        let now_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let mut heartbeat = Heartbeat {
            payload: now_secs.to_string().into_bytes(),
            shard_id: self.config.shard_id,
            version_number: self.config.version_number.clone(),
            node_display_name: self.config.node_display_name.clone(),
            pub_key: self.single_signer.public_key(),
            signature: Vec::new(),
        };

        if let Err(e) = heartbeat.verify_lengths() {
            warn!(error = %e, "heartbeat field over limit");
            heartbeat.trim_lengths();
        }

        let unsigned = self
            .marshalizer
            .marshal(&heartbeat)
            .map_err(|e| CryptoError::Internal(e.to_string()))?;
        heartbeat.signature = self.single_signer.sign(&unsigned)?;

        let wire = self
            .marshalizer
            .marshal(&heartbeat)
            .map_err(|e| CryptoError::Internal(e.to_string()))?;
        self.messenger.broadcast(&self.config.topic, &wire);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use valence_core::{BincodeMarshalizer, CryptoResult};
    use valence_types::heartbeat::MAX_DISPLAY_NAME_LEN;

    #[derive(Default)]
    struct RecordingMessenger {
        sent: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl PeerMessenger for RecordingMessenger {
        fn broadcast(&self, topic: &str, data: &[u8]) {
            self.sent.lock().push((topic.to_string(), data.to_vec()));
        }
    }

    struct MarkerSigner;

    impl SingleSigner for MarkerSigner {
        fn sign(&self, message: &[u8]) -> CryptoResult<Vec<u8>> {
            // deterministic marker over the exact signed bytes
            let mut sig = b"signed:".to_vec();
            sig.extend_from_slice(&message[..message.len().min(8)]);
            Ok(sig)
        }

        fn verify(&self, _pub_key: &[u8], _message: &[u8], _sig: &[u8]) -> CryptoResult<()> {
            Ok(())
        }

        fn public_key(&self) -> Vec<u8> {
            b"hb-key".to_vec()
        }
    }

    fn sender(config: HeartbeatConfig) -> (HeartbeatSender<BincodeMarshalizer>, Arc<RecordingMessenger>) {
        let messenger = Arc::new(RecordingMessenger::default());
        let sender = HeartbeatSender::new(
            Arc::clone(&messenger) as Arc<dyn PeerMessenger>,
            Arc::new(MarkerSigner),
            BincodeMarshalizer,
            config,
        );
        (sender, messenger)
    }

    #[test]
    fn heartbeat_is_signed_and_broadcast_on_the_topic() {
        let (sender, messenger) = sender(HeartbeatConfig {
            version_number: "v1.2.3".into(),
            node_display_name: "node-7".into(),
            ..HeartbeatConfig::default()
        });

        sender.send_heartbeat().unwrap();

        let sent = messenger.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "heartbeat");

        let heartbeat: Heartbeat = BincodeMarshalizer.unmarshal(&sent[0].1).unwrap();
        assert_eq!(heartbeat.pub_key, b"hb-key");
        assert_eq!(heartbeat.version_number, "v1.2.3");
        assert!(heartbeat.signature.starts_with(b"signed:"));

        // the signature covers the message with the signature cleared
        let unsigned = BincodeMarshalizer.marshal(&heartbeat.signing_copy()).unwrap();
        let expected = MarkerSigner.sign(&unsigned).unwrap();
        assert_eq!(heartbeat.signature, expected);
    }

    #[test]
    fn over_length_fields_are_trimmed_before_signing() {
        let (sender, messenger) = sender(HeartbeatConfig {
            node_display_name: "x".repeat(MAX_DISPLAY_NAME_LEN + 40),
            ..HeartbeatConfig::default()
        });

        sender.send_heartbeat().unwrap();

        let sent = messenger.sent.lock();
        let heartbeat: Heartbeat = BincodeMarshalizer.unmarshal(&sent[0].1).unwrap();
        assert_eq!(heartbeat.node_display_name.len(), MAX_DISPLAY_NAME_LEN);
        assert!(heartbeat.verify_lengths().is_ok());
    }
}
