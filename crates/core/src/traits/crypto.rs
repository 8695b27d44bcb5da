//! Cryptographic seams: hashing, single signing, multi-signing.
//!
//! The round machine and the trie are generic over these traits so the
//! hash function and signature scheme are deployment choices, not core
//! assumptions.

use thiserror::Error;

/// Errors surfaced by the crypto seams.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// A signature did not verify.
    #[error("invalid signature")]
    InvalidSignature,

    /// A public key could not be decoded.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// A private key could not be decoded.
    #[error("invalid private key")]
    InvalidPrivateKey,

    /// A group index was outside the signer set.
    #[error("index {index} out of bounds for group of {size}")]
    IndexOutOfBounds {
        /// Offending index.
        index: u16,
        /// Group size.
        size: usize,
    },

    /// A required commitment or share has not been stored.
    #[error("missing {what} for index {index}")]
    MissingElement {
        /// What is missing ("commitment hash", "commitment", "signature share").
        what: &'static str,
        /// Group index.
        index: u16,
    },

    /// A revealed commitment does not match its stored hash.
    #[error("commitment mismatch for index {0}")]
    CommitmentMismatch(u16),

    /// Aggregation failed.
    #[error("aggregation failed: {0}")]
    AggregationFailed(String),

    /// Internal error.
    #[error("crypto error: {0}")]
    Internal(String),
}

/// Result type for crypto seam operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// A cryptographic hash function.
pub trait Hasher: Clone + Send + Sync + 'static {
    /// Hash the input.
    fn compute(&self, data: &[u8]) -> Vec<u8>;

    /// Output length in bytes.
    fn size(&self) -> usize;
}

/// Deterministic single-key signer, used for the rand-seed chain and for
/// consensus envelope signatures.
pub trait SingleSigner: Send + Sync {
    /// Sign a message with the node's key.
    fn sign(&self, message: &[u8]) -> CryptoResult<Vec<u8>>;

    /// Verify a signature made by `pub_key` over `message`.
    fn verify(&self, pub_key: &[u8], message: &[u8], signature: &[u8]) -> CryptoResult<()>;

    /// The signer's public key.
    fn public_key(&self) -> Vec<u8>;
}

/// Multi-party signing over a fixed consensus group.
///
/// The commitment operations carry opaque bytes: the round machine collects
/// commitment hashes, a participation bitmap and revealed commitments before
/// any share is produced, whatever scheme backs the shares. Bitmap bit `i`
/// refers to group member `i` (LSB-first within each byte).
pub trait MultiSigner: Send + Sync {
    /// Re-arm the signer for a new round's group; `own_index` is this
    /// node's position in `pub_keys`.
    fn reset(&self, pub_keys: &[Vec<u8>], own_index: u16) -> CryptoResult<()>;

    /// Create this node's commitment for the round and return it; the
    /// matching secret stays inside the signer.
    fn create_commitment(&self) -> CryptoResult<Vec<u8>>;

    /// Store the commitment hash received from group member `index`.
    fn store_commitment_hash(&self, index: u16, hash: &[u8]) -> CryptoResult<()>;

    /// The stored commitment hash of member `index`.
    fn commitment_hash(&self, index: u16) -> CryptoResult<Vec<u8>>;

    /// Store the revealed commitment of member `index`; fails with
    /// [`CryptoError::CommitmentMismatch`] when it does not hash to the
    /// stored commitment hash.
    fn store_commitment(&self, index: u16, commitment: &[u8]) -> CryptoResult<()>;

    /// The stored commitment of member `index`.
    fn commitment(&self, index: u16) -> CryptoResult<Vec<u8>>;

    /// Fold the commitments selected by `bitmap` into one value.
    fn aggregate_commitments(&self, bitmap: &[u8]) -> CryptoResult<Vec<u8>>;

    /// Produce this node's signature share over `message` for the group
    /// subset in `bitmap`.
    fn create_signature_share(&self, message: &[u8], bitmap: &[u8]) -> CryptoResult<Vec<u8>>;

    /// Store the signature share received from member `index`.
    fn store_signature_share(&self, index: u16, share: &[u8]) -> CryptoResult<()>;

    /// The stored signature share of member `index`.
    fn signature_share(&self, index: u16) -> CryptoResult<Vec<u8>>;

    /// Verify member `index`'s share over `message` within `bitmap`.
    fn verify_signature_share(
        &self,
        index: u16,
        share: &[u8],
        message: &[u8],
        bitmap: &[u8],
    ) -> CryptoResult<()>;

    /// Aggregate the stored shares selected by `bitmap`.
    fn aggregate_sigs(&self, bitmap: &[u8]) -> CryptoResult<Vec<u8>>;

    /// Verify an aggregated signature over `message` against the subset of
    /// group keys selected by `bitmap`.
    fn verify(&self, message: &[u8], bitmap: &[u8], signature: &[u8]) -> CryptoResult<()>;
}

/// Whether bit `index` is set in an LSB-first bitmap.
pub fn bitmap_is_set(bitmap: &[u8], index: usize) -> bool {
    bitmap
        .get(index / 8)
        .map(|byte| byte & (1 << (index % 8)) != 0)
        .unwrap_or(false)
}
