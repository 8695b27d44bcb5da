//! Consensus participant identity.

use serde::{Deserialize, Serialize};

/// A consensus participant, identified by its public key.
///
/// Validators are compared and hashed by public-key bytes only; the selector
/// and the consensus state never look inside the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Validator {
    pub_key: Vec<u8>,
}

impl Validator {
    /// Create a validator from its public key bytes.
    pub fn new(pub_key: Vec<u8>) -> Self {
        Self { pub_key }
    }

    /// The validator's public key.
    pub fn pub_key(&self) -> &[u8] {
        &self.pub_key
    }

    /// Short hex rendering of the public key, for logs.
    pub fn short_hex(&self) -> String {
        let end = self.pub_key.len().min(4);
        hex::encode(&self.pub_key[..end])
    }
}
