//! Received-data pools with arrival notification.
//!
//! The network layer adds decoded headers and miniblocks here; the
//! synchronizer registers handlers to be signaled when something it asked
//! for lands. Handlers run on the adder's task after the pool locks are
//! released.

use std::collections::HashMap;

use parking_lot::RwLock;
use valence_types::{Header, MiniBlock};

type ArrivalHandler = Box<dyn Fn(&[u8]) + Send + Sync>;

/// Pool of received headers, indexed by hash and by nonce.
#[derive(Default)]
pub struct HeadersPool {
    by_hash: RwLock<HashMap<Vec<u8>, Header>>,
    by_nonce: RwLock<HashMap<u64, Vec<u8>>>,
    handlers: RwLock<Vec<ArrivalHandler>>,
}

impl HeadersPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header under its hash, then signal the registered handlers.
    pub fn add(&self, header: Header, hash: Vec<u8>) {
        {
            let mut by_hash = self.by_hash.write();
            let mut by_nonce = self.by_nonce.write();
            by_nonce.insert(header.nonce, hash.clone());
            by_hash.insert(hash.clone(), header);
        }
        for handler in self.handlers.read().iter() {
            handler(&hash);
        }
    }

    /// Fetch a header by hash.
    pub fn get(&self, hash: &[u8]) -> Option<Header> {
        self.by_hash.read().get(hash).cloned()
    }

    /// Fetch a header and its hash by nonce.
    pub fn get_by_nonce(&self, nonce: u64) -> Option<(Header, Vec<u8>)> {
        let hash = self.by_nonce.read().get(&nonce).cloned()?;
        let header = self.by_hash.read().get(&hash).cloned()?;
        Some((header, hash))
    }

    /// Remove a header by hash.
    pub fn remove(&self, hash: &[u8]) {
        let mut by_hash = self.by_hash.write();
        if let Some(header) = by_hash.remove(hash) {
            self.by_nonce.write().remove(&header.nonce);
        }
    }

    /// Register a handler invoked with the hash of every added header.
    pub fn register_handler(&self, handler: ArrivalHandler) {
        self.handlers.write().push(handler);
    }

    /// Number of pooled headers.
    pub fn len(&self) -> usize {
        self.by_hash.read().len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.by_hash.read().is_empty()
    }
}

/// Pool of received miniblocks, indexed by hash.
#[derive(Default)]
pub struct MiniBlocksPool {
    by_hash: RwLock<HashMap<Vec<u8>, MiniBlock>>,
    handlers: RwLock<Vec<ArrivalHandler>>,
}

impl MiniBlocksPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a miniblock under its hash, then signal the registered handlers.
    pub fn add(&self, hash: Vec<u8>, mini_block: MiniBlock) {
        self.by_hash.write().insert(hash.clone(), mini_block);
        for handler in self.handlers.read().iter() {
            handler(&hash);
        }
    }

    /// Fetch a miniblock by hash.
    pub fn get(&self, hash: &[u8]) -> Option<MiniBlock> {
        self.by_hash.read().get(hash).cloned()
    }

    /// Whether a miniblock is pooled.
    pub fn has(&self, hash: &[u8]) -> bool {
        self.by_hash.read().contains_key(hash)
    }

    /// Remove a miniblock by hash.
    pub fn remove(&self, hash: &[u8]) {
        self.by_hash.write().remove(hash);
    }

    /// Register a handler invoked with the hash of every added miniblock.
    pub fn register_handler(&self, handler: ArrivalHandler) {
        self.handlers.write().push(handler);
    }
}
