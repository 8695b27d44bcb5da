//! Persistence for committed headers and per-round sync checkpoints.

use tracing::debug;
use valence_core::{Marshalizer, StorageError, Storer};
use valence_types::{BootstrapData, Header};

use crate::{Result, SyncError};

const NONCE_KEY_PREFIX: &[u8] = b"hdr_nonce_";
const HIGHEST_ROUND_KEY: &[u8] = b"bootstrap_highest_round";

fn nonce_key(nonce: u64) -> Vec<u8> {
    let mut key = NONCE_KEY_PREFIX.to_vec();
    key.extend_from_slice(&nonce.to_be_bytes());
    key
}

/// Committed headers, stored under their hash with a nonce index.
pub struct HeaderStore<S, M> {
    store: S,
    marshalizer: M,
}

impl<S, M> HeaderStore<S, M>
where
    S: Storer,
    M: Marshalizer,
{
    /// Create a header store over the given backing store.
    pub fn new(store: S, marshalizer: M) -> Self {
        Self { store, marshalizer }
    }

    /// Persist a committed header under its hash and index it by nonce.
    pub fn put(&self, header: &Header, hash: &[u8]) -> Result<()> {
        let encoded = self.marshalizer.marshal(header)?;
        self.store.put(hash, &encoded)?;
        self.store.put(&nonce_key(header.nonce), hash)?;
        Ok(())
    }

    /// Load a header by hash.
    pub fn get(&self, hash: &[u8]) -> Result<Header> {
        let encoded = self.store.get(hash)?;
        Ok(self.marshalizer.unmarshal(&encoded)?)
    }

    /// Load a header and its hash by nonce.
    pub fn get_by_nonce(&self, nonce: u64) -> Result<(Header, Vec<u8>)> {
        let hash = self.store.get(&nonce_key(nonce))?;
        let header = self.get(&hash)?;
        Ok((header, hash))
    }
}

/// Per-round bootstrap checkpoints.
///
/// Layout: `big_endian(round) → marshal(BootstrapData)`, plus one auxiliary
/// key holding the highest persisted round.
pub struct BootstrapStorer<S, M> {
    store: S,
    marshalizer: M,
}

impl<S, M> BootstrapStorer<S, M>
where
    S: Storer,
    M: Marshalizer,
{
    /// Create a bootstrap storer over the given backing store.
    pub fn new(store: S, marshalizer: M) -> Self {
        Self { store, marshalizer }
    }

    /// Persist the checkpoint for a round and advance the highest-round
    /// marker when it moved forward.
    pub fn put(&self, round: u64, data: &BootstrapData) -> Result<()> {
        let encoded = self.marshalizer.marshal(data)?;
        self.store.put(&round.to_be_bytes(), &encoded)?;

        let highest = self.get_highest_round().unwrap_or(None);
        if highest.map_or(true, |h| round >= h) {
            self.store.put(HIGHEST_ROUND_KEY, &round.to_be_bytes())?;
        } else {
            debug!(round = round, highest = ?highest, "checkpoint behind highest round");
        }
        Ok(())
    }

    /// Load the checkpoint of a round.
    pub fn get(&self, round: u64) -> Result<BootstrapData> {
        let encoded = self.store.get(&round.to_be_bytes())?;
        Ok(self.marshalizer.unmarshal(&encoded)?)
    }

    /// The highest persisted round, when any checkpoint exists.
    pub fn get_highest_round(&self) -> Result<Option<u64>> {
        match self.store.get(HIGHEST_ROUND_KEY) {
            Ok(bytes) => {
                let bytes: [u8; 8] = bytes
                    .try_into()
                    .map_err(|_| StorageError::Serialization("highest round key".into()))?;
                Ok(Some(u64::from_be_bytes(bytes)))
            }
            Err(StorageError::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Load the newest checkpoint.
    pub fn get_latest(&self) -> Result<BootstrapData> {
        let round = self
            .get_highest_round()?
            .ok_or(SyncError::NoBootstrapData)?;
        self.get(round)
    }
}
