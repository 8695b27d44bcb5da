//! Deterministic BLS12-381 single signer.
//!
//! BLS signatures are deterministic for a fixed key and message, which is
//! what makes them usable as the rand-seed chain: every honest leader
//! produces the same seed for the same predecessor.

use blst::min_pk::{PublicKey, SecretKey, Signature};
use blst::BLST_ERROR;
use rand::RngCore;
use valence_core::{CryptoError, CryptoResult, SingleSigner};

use crate::DST;

/// A BLS12-381 key pair (min-pk: 48-byte public keys, 96-byte signatures).
#[derive(Clone)]
pub struct BlsKeyPair {
    secret: SecretKey,
}

impl BlsKeyPair {
    /// Generate a key pair from OS randomness.
    pub fn random() -> Self {
        let mut ikm = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut ikm);
        let secret = SecretKey::key_gen(&ikm, &[]).expect("32 bytes of ikm is always enough");
        Self { secret }
    }

    /// Derive a key pair from seed material (at least 32 bytes).
    pub fn from_seed(seed: &[u8]) -> CryptoResult<Self> {
        let secret = SecretKey::key_gen(seed, &[])
            .map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self { secret })
    }

    /// The public key bytes (48 bytes, compressed G1).
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.secret.sk_to_pk().to_bytes().to_vec()
    }

    pub(crate) fn secret(&self) -> &SecretKey {
        &self.secret
    }
}

impl std::fmt::Debug for BlsKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlsKeyPair")
            .field("public_key", &hex::encode(&self.public_key_bytes()[..8]))
            .finish_non_exhaustive()
    }
}

/// BLS-backed implementation of the [`SingleSigner`] seam.
#[derive(Debug, Clone)]
pub struct BlsSingleSigner {
    pair: BlsKeyPair,
    public: Vec<u8>,
}

impl BlsSingleSigner {
    /// Wrap a key pair as a signer.
    pub fn new(pair: BlsKeyPair) -> Self {
        let public = pair.public_key_bytes();
        Self { pair, public }
    }
}

impl SingleSigner for BlsSingleSigner {
    fn sign(&self, message: &[u8]) -> CryptoResult<Vec<u8>> {
        Ok(self.pair.secret().sign(message, DST, &[]).to_bytes().to_vec())
    }

    fn verify(&self, pub_key: &[u8], message: &[u8], signature: &[u8]) -> CryptoResult<()> {
        let pk = PublicKey::from_bytes(pub_key)
            .map_err(|e| CryptoError::InvalidPublicKey(format!("{:?}", e)))?;
        let sig =
            Signature::from_bytes(signature).map_err(|_| CryptoError::InvalidSignature)?;

        match sig.verify(true, message, DST, &[], &pk, true) {
            BLST_ERROR::BLST_SUCCESS => Ok(()),
            _ => Err(CryptoError::InvalidSignature),
        }
    }

    fn public_key(&self) -> Vec<u8> {
        self.public.clone()
    }
}
