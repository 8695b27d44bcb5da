//! # Valence Core
//!
//! Shared abstractions consumed by every Valence node-core crate:
//!
//! - **Collaborator traits** - block processor, broadcast messenger,
//!   resolvers, fork detector, status handler, rounder, crypto seams
//! - **Marshaling** - the [`Marshalizer`] trait with bincode and JSON
//!   implementations
//! - **Storage** - the content-addressed [`traits::Storer`] seam and an
//!   in-memory implementation
//! - **Metric keys** - the status-handler key constants
//!
//! Non-optional dependencies are mandatory constructor arguments in the
//! crates that consume these traits; there is no nil-interface checking at
//! steady state.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod marshal;
pub mod metrics;
pub mod traits;

pub use marshal::{BincodeMarshalizer, JsonMarshalizer, MarshalError, Marshalizer};
pub use traits::{
    bitmap_is_set, BlockProcessor, BroadcastMessenger, ChainHandler, CryptoError, CryptoResult,
    ForkDetector, ForkInfo, HashArrayResolver, Hasher, MemStorer, MultiSigner,
    NetworkConnectionWatcher, NetworkError, NilStatusHandler, NonceResolver, PeerMessenger,
    ProcessError, RequestHandler, Resolver, ResolversFinder, Rounder, SingleSigner, StatusHandler,
    StorageError, StorageResult, Storer,
};
