//! Group signing for one consensus round.
//!
//! The signer tracks one round at a time: [`MultiSigner::reset`] arms it
//! with the round's ordered group keys, then the round machine feeds it
//! commitment hashes, revealed commitments and signature shares as they
//! arrive. Shares and the final aggregate are real BLS over the round
//! digest; the commitment values are opaque commit/reveal bytes (random
//! per round) whose only contract is that a reveal must match the hash
//! announced earlier.

use std::collections::HashMap;

use blst::min_pk::{AggregateSignature, PublicKey, Signature};
use blst::BLST_ERROR;
use parking_lot::RwLock;
use rand::RngCore;
use valence_core::{bitmap_is_set, CryptoError, CryptoResult, Hasher, MultiSigner};

use crate::single::BlsKeyPair;
use crate::DST;

#[derive(Default)]
struct RoundState {
    pub_keys: Vec<Vec<u8>>,
    own_index: u16,
    commitment_hashes: HashMap<u16, Vec<u8>>,
    commitments: HashMap<u16, Vec<u8>>,
    signature_shares: HashMap<u16, Vec<u8>>,
}

/// BLS-backed implementation of the [`MultiSigner`] seam.
pub struct BlsMultiSigner<H: Hasher> {
    hasher: H,
    pair: BlsKeyPair,
    state: RwLock<RoundState>,
}

impl<H: Hasher> BlsMultiSigner<H> {
    /// Create a signer for the node's key pair.
    pub fn new(hasher: H, pair: BlsKeyPair) -> Self {
        Self {
            hasher,
            pair,
            state: RwLock::new(RoundState::default()),
        }
    }

    fn check_index(&self, index: u16) -> CryptoResult<()> {
        let size = self.state.read().pub_keys.len();
        if (index as usize) < size {
            Ok(())
        } else {
            Err(CryptoError::IndexOutOfBounds { index, size })
        }
    }

    fn selected_indices(&self, bitmap: &[u8]) -> Vec<u16> {
        let size = self.state.read().pub_keys.len();
        (0..size)
            .filter(|i| bitmap_is_set(bitmap, *i))
            .map(|i| i as u16)
            .collect()
    }
}

impl<H: Hasher> MultiSigner for BlsMultiSigner<H> {
    fn reset(&self, pub_keys: &[Vec<u8>], own_index: u16) -> CryptoResult<()> {
        if (own_index as usize) >= pub_keys.len() {
            return Err(CryptoError::IndexOutOfBounds {
                index: own_index,
                size: pub_keys.len(),
            });
        }

        let mut state = self.state.write();
        *state = RoundState {
            pub_keys: pub_keys.to_vec(),
            own_index,
            ..RoundState::default()
        };
        Ok(())
    }

    fn create_commitment(&self) -> CryptoResult<Vec<u8>> {
        let mut commitment = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut commitment);

        let mut state = self.state.write();
        let own = state.own_index;
        state.commitments.insert(own, commitment.clone());
        Ok(commitment)
    }

    fn store_commitment_hash(&self, index: u16, hash: &[u8]) -> CryptoResult<()> {
        self.check_index(index)?;
        self.state
            .write()
            .commitment_hashes
            .insert(index, hash.to_vec());
        Ok(())
    }

    fn commitment_hash(&self, index: u16) -> CryptoResult<Vec<u8>> {
        self.check_index(index)?;
        self.state
            .read()
            .commitment_hashes
            .get(&index)
            .cloned()
            .ok_or(CryptoError::MissingElement {
                what: "commitment hash",
                index,
            })
    }

    fn store_commitment(&self, index: u16, commitment: &[u8]) -> CryptoResult<()> {
        self.check_index(index)?;

        let mut state = self.state.write();
        if let Some(expected) = state.commitment_hashes.get(&index) {
            if self.hasher.compute(commitment) != *expected {
                return Err(CryptoError::CommitmentMismatch(index));
            }
        }
        state.commitments.insert(index, commitment.to_vec());
        Ok(())
    }

    fn commitment(&self, index: u16) -> CryptoResult<Vec<u8>> {
        self.check_index(index)?;
        self.state
            .read()
            .commitments
            .get(&index)
            .cloned()
            .ok_or(CryptoError::MissingElement {
                what: "commitment",
                index,
            })
    }

    fn aggregate_commitments(&self, bitmap: &[u8]) -> CryptoResult<Vec<u8>> {
        let indices = self.selected_indices(bitmap);
        let state = self.state.read();

        let mut concatenated = Vec::new();
        for index in indices {
            let commitment =
                state
                    .commitments
                    .get(&index)
                    .ok_or(CryptoError::MissingElement {
                        what: "commitment",
                        index,
                    })?;
            concatenated.extend_from_slice(commitment);
        }
        Ok(self.hasher.compute(&concatenated))
    }

    fn create_signature_share(&self, message: &[u8], _bitmap: &[u8]) -> CryptoResult<Vec<u8>> {
        let share = self.pair.secret().sign(message, DST, &[]).to_bytes().to_vec();
        let own = self.state.read().own_index;
        self.state.write().signature_shares.insert(own, share.clone());
        Ok(share)
    }

    fn store_signature_share(&self, index: u16, share: &[u8]) -> CryptoResult<()> {
        self.check_index(index)?;
        Signature::from_bytes(share).map_err(|_| CryptoError::InvalidSignature)?;
        self.state
            .write()
            .signature_shares
            .insert(index, share.to_vec());
        Ok(())
    }

    fn signature_share(&self, index: u16) -> CryptoResult<Vec<u8>> {
        self.check_index(index)?;
        self.state
            .read()
            .signature_shares
            .get(&index)
            .cloned()
            .ok_or(CryptoError::MissingElement {
                what: "signature share",
                index,
            })
    }

    fn verify_signature_share(
        &self,
        index: u16,
        share: &[u8],
        message: &[u8],
        _bitmap: &[u8],
    ) -> CryptoResult<()> {
        self.check_index(index)?;

        let pub_key = self.state.read().pub_keys[index as usize].clone();
        let pk = PublicKey::from_bytes(&pub_key)
            .map_err(|e| CryptoError::InvalidPublicKey(format!("{:?}", e)))?;
        let sig = Signature::from_bytes(share).map_err(|_| CryptoError::InvalidSignature)?;

        match sig.verify(true, message, DST, &[], &pk, true) {
            BLST_ERROR::BLST_SUCCESS => Ok(()),
            _ => Err(CryptoError::InvalidSignature),
        }
    }

    fn aggregate_sigs(&self, bitmap: &[u8]) -> CryptoResult<Vec<u8>> {
        let indices = self.selected_indices(bitmap);
        if indices.is_empty() {
            return Err(CryptoError::AggregationFailed("empty bitmap".into()));
        }

        let state = self.state.read();
        let mut shares = Vec::with_capacity(indices.len());
        for index in &indices {
            let raw = state
                .signature_shares
                .get(index)
                .ok_or(CryptoError::MissingElement {
                    what: "signature share",
                    index: *index,
                })?;
            shares.push(Signature::from_bytes(raw).map_err(|_| CryptoError::InvalidSignature)?);
        }

        let refs: Vec<&Signature> = shares.iter().collect();
        let aggregate = AggregateSignature::aggregate(&refs, true)
            .map_err(|e| CryptoError::AggregationFailed(format!("{:?}", e)))?;
        Ok(aggregate.to_signature().to_bytes().to_vec())
    }

    fn verify(&self, message: &[u8], bitmap: &[u8], signature: &[u8]) -> CryptoResult<()> {
        let indices = self.selected_indices(bitmap);
        if indices.is_empty() {
            return Err(CryptoError::InvalidSignature);
        }

        let state = self.state.read();
        let mut pks = Vec::with_capacity(indices.len());
        for index in &indices {
            pks.push(
                PublicKey::from_bytes(&state.pub_keys[*index as usize])
                    .map_err(|e| CryptoError::InvalidPublicKey(format!("{:?}", e)))?,
            );
        }
        let pk_refs: Vec<&PublicKey> = pks.iter().collect();

        let sig = Signature::from_bytes(signature).map_err(|_| CryptoError::InvalidSignature)?;
        match sig.fast_aggregate_verify(true, message, DST, &pk_refs) {
            BLST_ERROR::BLST_SUCCESS => Ok(()),
            _ => Err(CryptoError::InvalidSignature),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Sha256Hasher;

    fn group_of(n: usize) -> (Vec<BlsKeyPair>, Vec<Vec<u8>>) {
        let pairs: Vec<BlsKeyPair> = (0..n).map(|_| BlsKeyPair::random()).collect();
        let keys = pairs.iter().map(|p| p.public_key_bytes()).collect();
        (pairs, keys)
    }

    fn signer_for(pair: &BlsKeyPair, keys: &[Vec<u8>], index: u16) -> BlsMultiSigner<Sha256Hasher> {
        let signer = BlsMultiSigner::new(Sha256Hasher, pair.clone());
        signer.reset(keys, index).unwrap();
        signer
    }

    #[test]
    fn reset_rejects_out_of_range_own_index() {
        let (pairs, keys) = group_of(3);
        let signer = BlsMultiSigner::new(Sha256Hasher, pairs[0].clone());
        assert!(matches!(
            signer.reset(&keys, 3),
            Err(CryptoError::IndexOutOfBounds { .. })
        ));
    }

    #[test]
    fn commitment_reveal_must_match_hash() {
        let (pairs, keys) = group_of(3);
        let signer = signer_for(&pairs[0], &keys, 0);

        let commitment = vec![7u8; 32];
        let hash = Sha256Hasher.compute(&commitment);
        signer.store_commitment_hash(1, &hash).unwrap();

        assert!(matches!(
            signer.store_commitment(1, &[0u8; 32]),
            Err(CryptoError::CommitmentMismatch(1))
        ));
        signer.store_commitment(1, &commitment).unwrap();
        assert_eq!(signer.commitment(1).unwrap(), commitment);
    }

    #[test]
    fn aggregate_verifies_against_bitmap_subset() {
        let (pairs, keys) = group_of(3);
        let message = b"round digest";
        let bitmap = [0b0000_0111u8];

        let leader = signer_for(&pairs[0], &keys, 0);
        for (i, pair) in pairs.iter().enumerate() {
            let member = signer_for(pair, &keys, i as u16);
            let share = member.create_signature_share(message, &bitmap).unwrap();
            leader.store_signature_share(i as u16, &share).unwrap();
            leader
                .verify_signature_share(i as u16, &share, message, &bitmap)
                .unwrap();
        }

        let aggregate = leader.aggregate_sigs(&bitmap).unwrap();
        leader.verify(message, &bitmap, &aggregate).unwrap();

        // a bitmap naming a member whose share is absent must fail
        let partial = signer_for(&pairs[0], &keys, 0);
        let share = partial.create_signature_share(message, &bitmap).unwrap();
        partial.store_signature_share(0, &share).unwrap();
        assert!(partial.aggregate_sigs(&bitmap).is_err());

        // the aggregate must not verify against a smaller subset
        assert!(leader.verify(message, &[0b0000_0011u8], &aggregate).is_err());
    }

    #[test]
    fn missing_share_is_reported_with_its_index() {
        let (pairs, keys) = group_of(2);
        let signer = signer_for(&pairs[0], &keys, 0);
        assert!(matches!(
            signer.signature_share(1),
            Err(CryptoError::MissingElement { index: 1, .. })
        ));
    }
}
