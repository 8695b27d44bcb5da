//! Hash functions behind the core [`Hasher`] seam.

use sha2::{Digest as Sha2Digest, Sha256};
use sha3::Keccak256;
use valence_core::Hasher;

/// Compute the SHA-256 hash of `data`.
pub fn sha256(data: &[u8]) -> Vec<u8> {
    Sha256::digest(data).to_vec()
}

/// Compute the Keccak-256 hash of `data`.
pub fn keccak256(data: &[u8]) -> Vec<u8> {
    Keccak256::digest(data).to_vec()
}

/// SHA-256 hasher; the default for consensus seeds and digests.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl Hasher for Sha256Hasher {
    fn compute(&self, data: &[u8]) -> Vec<u8> {
        sha256(data)
    }

    fn size(&self) -> usize {
        32
    }
}

/// Keccak-256 hasher; the default for trie node addressing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Keccak256Hasher;

impl Hasher for Keccak256Hasher {
    fn compute(&self, data: &[u8]) -> Vec<u8> {
        keccak256(data)
    }

    fn size(&self) -> usize {
        32
    }
}
