//! Collaborator traits consumed by the node core.
//!
//! Each seam lives in its own module with its own error enum, so a crate
//! pulls in exactly the contracts it needs.

pub mod chain;
pub mod crypto;
pub mod network;
pub mod status;
pub mod storage;

pub use chain::{BlockProcessor, ChainHandler, ForkDetector, ForkInfo, ProcessError, Rounder};
pub use crypto::{bitmap_is_set, CryptoError, CryptoResult, Hasher, MultiSigner, SingleSigner};
pub use network::{
    BroadcastMessenger, HashArrayResolver, NetworkConnectionWatcher, NetworkError, NonceResolver,
    PeerMessenger, RequestHandler, Resolver, ResolversFinder,
};
pub use status::{NilStatusHandler, StatusHandler};
pub use storage::{MemStorer, StorageError, StorageResult, Storer};
