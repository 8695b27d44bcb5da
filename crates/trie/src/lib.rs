//! # Valence Trie
//!
//! Hex-path Patricia-Merkle trie used for committed state.
//!
//! - Three node variants: branch (17 child slots), extension (shared
//!   nibble prefix) and leaf (terminal suffix plus value)
//! - Children are either **expanded** (an owned in-memory node) or
//!   **collapsed** (the 32-byte hash of a node living in the backing
//!   store); resolution loads and installs the child in place
//! - Nodes are content-addressed: `hash = H(marshal(collapsed) ∥ tag)`
//!   with tag `0x00` extension, `0x01` leaf, `0x02` branch - the tag
//!   values are part of the on-disk format
//! - `commit` flushes dirty nodes depth-first into a key-value store
//!
//! The trie is single-writer per root: every operation takes `&mut self`
//! and committers serialize at the root.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod encoding;
pub mod node;
pub mod trie;

pub use encoding::{hex_to_key_bytes, key_bytes_to_hex, prefix_len};
pub use node::{BranchNode, ChildRef, ExtensionNode, LeafNode, TrieNode};
pub use trie::PatriciaMerkleTrie;

use thiserror::Error;
use valence_core::{MarshalError, StorageError};

/// Tag byte appended to an encoded extension node.
pub const EXTENSION_TAG: u8 = 0;
/// Tag byte appended to an encoded leaf node.
pub const LEAF_TAG: u8 = 1;
/// Tag byte appended to an encoded branch node.
pub const BRANCH_TAG: u8 = 2;

/// Number of child slots in a branch node: 16 nibbles plus the value slot.
pub const NR_OF_CHILDREN: usize = 17;

/// Errors surfaced by trie operations.
#[derive(Debug, Error)]
pub enum TrieError {
    /// An operation addressed a node that does not exist.
    #[error("nil node")]
    NilNode,

    /// A decoded node carried an unknown tag byte.
    #[error("invalid node tag: {0}")]
    InvalidNode(u8),

    /// A node encoding was empty.
    #[error("invalid node encoding")]
    InvalidEncoding,

    /// A hex-to-key conversion got a sequence of invalid length.
    #[error("invalid hex key length")]
    InvalidLength,

    /// A referenced node is missing from the backing store.
    #[error("node not found in storage: {0}")]
    MissingNode(String),

    /// Backing store failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Node (de)serialization failure.
    #[error(transparent)]
    Marshal(#[from] MarshalError),
}

/// Result type for trie operations.
pub type Result<T> = std::result::Result<T, TrieError>;
