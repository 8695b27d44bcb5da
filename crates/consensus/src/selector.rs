//! Deterministic validator group selection.
//!
//! For each group position `i` the selector hashes
//! `big_endian_u64(i) ∥ randomness`, interprets the digest as a big-endian
//! unsigned integer modulo the expanded list length, and walks forward
//! (wrapping) past validators already selected. Identical inputs always
//! yield the identical ordered group; position 0 is the round leader.

use parking_lot::RwLock;
use valence_core::Hasher;
use valence_types::Validator;

use crate::{ConsensusError, Result};

/// Index-hashed selector over an eligible validator list.
pub struct IndexHashedGroupSelector<H: Hasher> {
    hasher: H,
    eligible: RwLock<Vec<Validator>>,
    consensus_size: usize,
}

impl<H: Hasher> IndexHashedGroupSelector<H> {
    /// Create a selector producing groups of `consensus_size` validators.
    pub fn new(consensus_size: usize, hasher: H) -> Result<Self> {
        if consensus_size < 1 {
            return Err(ConsensusError::InvalidConsensusSize);
        }
        Ok(Self {
            hasher,
            eligible: RwLock::new(Vec::new()),
            consensus_size,
        })
    }

    /// Install the eligible list; the selector keeps its own copy.
    pub fn load_eligible_list(&self, eligible: &[Validator]) {
        *self.eligible.write() = eligible.to_vec();
    }

    /// The configured group size.
    pub fn consensus_size(&self) -> usize {
        self.consensus_size
    }

    /// Compute the ordered consensus group for the given randomness.
    pub fn compute_validators_group(&self, randomness: &[u8]) -> Result<Vec<Validator>> {
        if randomness.is_empty() {
            return Err(ConsensusError::NilRandomness);
        }

        let eligible = self.eligible.read().clone();
        if eligible.len() < self.consensus_size {
            return Err(ConsensusError::SmallEligibleList);
        }

        let expanded = Self::expand_eligible_list(eligible);
        let mut group: Vec<Validator> = Vec::with_capacity(self.consensus_size);

        for index in 0..self.consensus_size {
            let proposed = self.compute_list_index(index as u64, randomness, expanded.len());
            let checked = Self::check_index(proposed, &expanded, &group);
            group.push(expanded[checked].clone());
        }

        Ok(group)
    }

    // placeholder for stake/rating weighting: currently the identity
    fn expand_eligible_list(eligible: Vec<Validator>) -> Vec<Validator> {
        eligible
    }

    fn compute_list_index(&self, index: u64, randomness: &[u8], list_len: usize) -> usize {
        let mut seed = index.to_be_bytes().to_vec();
        seed.extend_from_slice(randomness);
        let digest = self.hasher.compute(&seed);
        mod_big_endian(&digest, list_len)
    }

    fn check_index(proposed: usize, expanded: &[Validator], selected: &[Validator]) -> usize {
        let mut index = proposed;
        while selected.iter().any(|v| v.pub_key() == expanded[index].pub_key()) {
            index = (index + 1) % expanded.len();
        }
        index
    }
}

/// The big-endian integer value of `bytes` modulo `modulus`, folded
/// incrementally so arbitrary digest widths need no big-integer type.
fn mod_big_endian(bytes: &[u8], modulus: usize) -> usize {
    let modulus = modulus as u128;
    let mut acc: u128 = 0;
    for byte in bytes {
        acc = (acc * 256 + *byte as u128) % modulus;
    }
    acc as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[derive(Clone)]
    struct Sha256Like;

    impl Hasher for Sha256Like {
        fn compute(&self, data: &[u8]) -> Vec<u8> {
            // deterministic toy digest: enough for selection tests
            let mut out = vec![0u8; 32];
            let mut acc: u8 = 0x5a;
            for (i, byte) in data.iter().enumerate() {
                acc = acc.wrapping_mul(31).wrapping_add(*byte);
                out[i % 32] = out[i % 32].wrapping_add(acc);
            }
            out
        }

        fn size(&self) -> usize {
            32
        }
    }

    fn validators(names: &[&str]) -> Vec<Validator> {
        names
            .iter()
            .map(|n| Validator::new(n.as_bytes().to_vec()))
            .collect()
    }

    fn selector(size: usize) -> IndexHashedGroupSelector<Sha256Like> {
        IndexHashedGroupSelector::new(size, Sha256Like).unwrap()
    }

    #[test]
    fn construction_rejects_zero_size() {
        assert!(matches!(
            IndexHashedGroupSelector::new(0, Sha256Like),
            Err(ConsensusError::InvalidConsensusSize)
        ));
    }

    #[test]
    fn empty_randomness_is_rejected() {
        let s = selector(1);
        s.load_eligible_list(&validators(&["a"]));
        assert!(matches!(
            s.compute_validators_group(&[]),
            Err(ConsensusError::NilRandomness)
        ));
    }

    #[test]
    fn small_eligible_list_is_rejected() {
        let s = selector(3);
        s.load_eligible_list(&validators(&["a", "b"]));
        assert!(matches!(
            s.compute_validators_group(b"seed"),
            Err(ConsensusError::SmallEligibleList)
        ));
    }

    #[test]
    fn group_has_size_and_no_duplicates() {
        let s = selector(3);
        s.load_eligible_list(&validators(&["a", "b", "c", "d", "e"]));

        let group = s.compute_validators_group(b"seed").unwrap();
        assert_eq!(group.len(), 3);

        let unique: HashSet<_> = group.iter().map(|v| v.pub_key().to_vec()).collect();
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn selection_is_deterministic() {
        let s = selector(3);
        s.load_eligible_list(&validators(&["a", "b", "c", "d", "e"]));

        let g1 = s.compute_validators_group(b"seed").unwrap();
        let g2 = s.compute_validators_group(b"seed").unwrap();
        assert_eq!(g1, g2);
    }

    #[test]
    fn randomness_changes_the_group() {
        let s = selector(3);
        s.load_eligible_list(&validators(&["a", "b", "c", "d", "e"]));

        let g1 = s.compute_validators_group(b"seed").unwrap();
        let g2 = s.compute_validators_group(b"seee").unwrap();
        assert_ne!(g1, g2);
    }

    #[test]
    fn full_size_group_is_a_permutation() {
        let names = ["a", "b", "c", "d", "e", "f", "g"];
        let s = selector(names.len());
        s.load_eligible_list(&validators(&names));

        // the probe must wrap past every collision and still place each
        // validator exactly once
        let group = s.compute_validators_group(b"anything").unwrap();
        let unique: HashSet<_> = group.iter().map(|v| v.pub_key().to_vec()).collect();
        assert_eq!(unique.len(), names.len());
    }

    #[test]
    fn mod_big_endian_matches_small_values() {
        assert_eq!(mod_big_endian(&[0x01, 0x00], 10), 256 % 10);
        assert_eq!(mod_big_endian(&[0xff], 7), 255 % 7);
        assert_eq!(mod_big_endian(&[0x00], 5), 0);
    }
}
