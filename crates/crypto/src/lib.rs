//! # Valence Crypto
//!
//! Cryptographic primitives for the Valence node core:
//!
//! - **Hashers** - [`Sha256Hasher`] and [`Keccak256Hasher`] behind the
//!   core [`Hasher`](valence_core::Hasher) seam
//! - **Single signing** - [`BlsSingleSigner`], deterministic BLS12-381
//!   signatures used for the rand-seed chain and consensus envelopes
//! - **Multi signing** - [`BlsMultiSigner`], commit/reveal bookkeeping plus
//!   BLS share aggregation behind the [`MultiSigner`](valence_core::MultiSigner)
//!   seam

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod hash;
pub mod multisig;
pub mod single;

pub use hash::{keccak256, sha256, Keccak256Hasher, Sha256Hasher};
pub use multisig::BlsMultiSigner;
pub use single::{BlsKeyPair, BlsSingleSigner};

/// Domain separation tag for Valence BLS signatures.
pub(crate) const DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_VALENCE_";

#[cfg(test)]
mod tests {
    use super::*;
    use valence_core::{Hasher, SingleSigner};

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn keccak256_known_vector() {
        assert_eq!(
            hex::encode(keccak256(b"hello")),
            "1c8aff950685c2ed4bc3174f3472287b56d9517b9c948127319a09a7a36deac8"
        );
    }

    #[test]
    fn hashers_report_their_size() {
        assert_eq!(Sha256Hasher.size(), 32);
        assert_eq!(Keccak256Hasher.size(), 32);
        assert_eq!(Sha256Hasher.compute(b"x").len(), 32);
    }

    #[test]
    fn single_signer_round_trip() {
        let signer = BlsSingleSigner::new(BlsKeyPair::random());
        let message = b"round seed";

        let sig = signer.sign(message).unwrap();
        signer.verify(&signer.public_key(), message, &sig).unwrap();
        assert!(signer.verify(&signer.public_key(), b"other", &sig).is_err());
    }

    #[test]
    fn bls_signatures_are_deterministic() {
        let pair = BlsKeyPair::from_seed(b"a seed with at least 32 bytes!!!").unwrap();
        let signer = BlsSingleSigner::new(pair);

        let s1 = signer.sign(b"msg").unwrap();
        let s2 = signer.sign(b"msg").unwrap();
        assert_eq!(s1, s2);
    }
}
