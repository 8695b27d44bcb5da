//! Inbound consensus message routing.

use std::sync::Arc;

use tracing::trace;
use valence_core::{Marshalizer, SingleSigner};
use valence_types::ConsensusMessage;

use crate::state::ConsensusState;
use crate::subrounds::SubroundHandler;
use crate::{ConsensusError, Result};

/// Validates incoming consensus envelopes and hands them to the subround
/// that consumes their type.
///
/// Validation: the sender must be part of the current consensus group, the
/// round index must match, and the signature must cover the marshaled
/// envelope with the signature field cleared.
pub struct ConsensusWorker<M: Marshalizer> {
    state: Arc<ConsensusState>,
    single_signer: Arc<dyn SingleSigner>,
    marshalizer: M,
    handlers: Vec<Arc<dyn SubroundHandler>>,
}

impl<M: Marshalizer> ConsensusWorker<M> {
    /// Create a worker routing to the given handlers.
    pub fn new(
        state: Arc<ConsensusState>,
        single_signer: Arc<dyn SingleSigner>,
        marshalizer: M,
        handlers: Vec<Arc<dyn SubroundHandler>>,
    ) -> Self {
        Self {
            state,
            single_signer,
            marshalizer,
            handlers,
        }
    }

    /// Validate and route one envelope. Returns whether a handler accepted
    /// it.
    pub async fn on_message(&self, message: &ConsensusMessage) -> Result<bool> {
        if self.state.index_of(&message.pub_key).is_none() {
            return Err(ConsensusError::NotInConsensusGroup);
        }

        let current = self.state.round_index();
        if message.round_index != current {
            return Err(ConsensusError::StaleMessage {
                got: message.round_index,
                current,
            });
        }

        let signing_bytes = self.marshalizer.marshal(&message.signing_copy())?;
        self.single_signer
            .verify(&message.pub_key, &signing_bytes, &message.signature)?;

        for handler in &self.handlers {
            if handler.consumes(message.msg_type) {
                return Ok(handler.on_message(message).await);
            }
        }

        trace!(msg_type = %message.msg_type, "no subround consumes this message type");
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SubroundId;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use valence_core::{BincodeMarshalizer, CryptoError, CryptoResult};
    use valence_types::{MessageType, Validator};

    // signature = b"sig:" ++ pub_key; verification recomputes it
    struct MarkerSigner {
        pub_key: Vec<u8>,
    }

    impl SingleSigner for MarkerSigner {
        fn sign(&self, _message: &[u8]) -> CryptoResult<Vec<u8>> {
            let mut sig = b"sig:".to_vec();
            sig.extend_from_slice(&self.pub_key);
            Ok(sig)
        }

        fn verify(&self, pub_key: &[u8], _message: &[u8], signature: &[u8]) -> CryptoResult<()> {
            let mut expected = b"sig:".to_vec();
            expected.extend_from_slice(pub_key);
            if signature == expected {
                Ok(())
            } else {
                Err(CryptoError::InvalidSignature)
            }
        }

        fn public_key(&self) -> Vec<u8> {
            self.pub_key.clone()
        }
    }

    struct CountingHandler {
        accepted: AtomicUsize,
    }

    #[async_trait]
    impl SubroundHandler for CountingHandler {
        fn id(&self) -> SubroundId {
            SubroundId::Signature
        }

        async fn do_job(&self) -> bool {
            false
        }

        fn do_check(&self) -> bool {
            false
        }

        fn consumes(&self, msg_type: MessageType) -> bool {
            msg_type == MessageType::MtSignature
        }

        async fn on_message(&self, _message: &ConsensusMessage) -> bool {
            self.accepted.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    fn signed_message(pub_key: &[u8], round: u64, msg_type: MessageType) -> ConsensusMessage {
        let mut message = ConsensusMessage::new(
            vec![0xda; 4],
            vec![1, 2, 3],
            pub_key.to_vec(),
            msg_type,
            round,
            0,
            0,
        );
        let mut sig = b"sig:".to_vec();
        sig.extend_from_slice(pub_key);
        message.signature = sig;
        message
    }

    fn worker_with_group(
        members: &[&str],
    ) -> (ConsensusWorker<BincodeMarshalizer>, Arc<CountingHandler>) {
        let state = Arc::new(ConsensusState::new(members[0].as_bytes().to_vec()));
        state.reset_round(
            4,
            members
                .iter()
                .map(|m| Validator::new(m.as_bytes().to_vec()))
                .collect(),
        );
        let handler = Arc::new(CountingHandler {
            accepted: AtomicUsize::new(0),
        });
        let worker = ConsensusWorker::new(
            state,
            Arc::new(MarkerSigner {
                pub_key: members[0].as_bytes().to_vec(),
            }),
            BincodeMarshalizer,
            vec![Arc::clone(&handler) as Arc<dyn SubroundHandler>],
        );
        (worker, handler)
    }

    #[tokio::test]
    async fn routes_valid_messages_to_the_consuming_handler() {
        let (worker, handler) = worker_with_group(&["a", "b", "c"]);
        let message = signed_message(b"b", 4, MessageType::MtSignature);

        assert!(worker.on_message(&message).await.unwrap());
        assert_eq!(handler.accepted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejects_senders_outside_the_group() {
        let (worker, handler) = worker_with_group(&["a", "b", "c"]);
        let message = signed_message(b"zz", 4, MessageType::MtSignature);

        assert!(matches!(
            worker.on_message(&message).await,
            Err(ConsensusError::NotInConsensusGroup)
        ));
        assert_eq!(handler.accepted.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejects_messages_from_other_rounds() {
        let (worker, _) = worker_with_group(&["a", "b"]);
        let message = signed_message(b"b", 9, MessageType::MtSignature);

        assert!(matches!(
            worker.on_message(&message).await,
            Err(ConsensusError::StaleMessage { got: 9, current: 4 })
        ));
    }

    #[tokio::test]
    async fn rejects_bad_signatures() {
        let (worker, _) = worker_with_group(&["a", "b"]);
        let mut message = signed_message(b"b", 4, MessageType::MtSignature);
        message.signature = b"sig:someone-else".to_vec();

        assert!(matches!(
            worker.on_message(&message).await,
            Err(ConsensusError::Crypto(_))
        ));
    }

    #[tokio::test]
    async fn unconsumed_types_fall_through() {
        let (worker, handler) = worker_with_group(&["a", "b"]);
        let message = signed_message(b"b", 4, MessageType::MtBitmap);

        assert!(!worker.on_message(&message).await.unwrap());
        assert_eq!(handler.accepted.load(Ordering::SeqCst), 0);
    }
}
