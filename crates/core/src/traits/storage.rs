//! Key-value storage seam and an in-memory implementation.

use std::collections::HashMap;

use parking_lot::RwLock;
use thiserror::Error;

/// Errors surfaced by storers.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested key does not exist.
    #[error("key not found")]
    NotFound,

    /// A backend I/O failure.
    #[error("storage I/O error: {0}")]
    Io(String),

    /// A (de)serialization failure while persisting structured values.
    #[error("storage serialization error: {0}")]
    Serialization(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Synchronous key-value store.
///
/// The trie uses it content-addressed (key = node hash); the bootstrap
/// storer and the persistent status handler use explicit keys.
/// Implementations must be thread-safe.
pub trait Storer: Send + Sync {
    /// Store a value under a key, overwriting any previous value.
    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Fetch the value stored under a key.
    fn get(&self, key: &[u8]) -> StorageResult<Vec<u8>>;

    /// Whether a key exists.
    fn has(&self, key: &[u8]) -> bool;
}

/// Lock-protected in-memory storer, used in tests and as the default
/// backing store for advisory data.
#[derive(Debug, Default)]
pub struct MemStorer {
    entries: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemStorer {
    /// Create an empty storer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the storer holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Storer for MemStorer {
    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.entries.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &[u8]) -> StorageResult<Vec<u8>> {
        self.entries
            .read()
            .get(key)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    fn has(&self, key: &[u8]) -> bool {
        self.entries.read().contains_key(key)
    }
}

impl<S: Storer + ?Sized> Storer for std::sync::Arc<S> {
    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        (**self).put(key, value)
    }

    fn get(&self, key: &[u8]) -> StorageResult<Vec<u8>> {
        (**self).get(key)
    }

    fn has(&self, key: &[u8]) -> bool {
        (**self).has(key)
    }
}
