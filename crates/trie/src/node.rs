//! Trie node variants, their on-disk codec and child resolution.

use serde::{Deserialize, Serialize};
use valence_core::{Hasher, Marshalizer, Storer};

use crate::{Result, TrieError, BRANCH_TAG, EXTENSION_TAG, LEAF_TAG, NR_OF_CHILDREN};

/// A branch child: either the hash of a stored node (collapsed) or an
/// owned in-memory node (expanded).
///
/// Resolution transitions collapsed → expanded in place; the reverse
/// happens implicitly at encoding time, which only ever writes hashes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildRef {
    /// The child is stored; only its hash is held.
    Collapsed(Vec<u8>),
    /// The child is loaded in memory.
    Expanded(Box<TrieNode>),
}

impl ChildRef {
    /// The child's hash, when known. An expanded child only has a hash
    /// after `set_hash` ran over it.
    pub fn hash(&self) -> Option<Vec<u8>> {
        match self {
            ChildRef::Collapsed(hash) => Some(hash.clone()),
            ChildRef::Expanded(node) => node.cached_hash().map(<[u8]>::to_vec),
        }
    }

    /// Whether the child is collapsed.
    pub fn is_collapsed(&self) -> bool {
        matches!(self, ChildRef::Collapsed(_))
    }

    /// Load the referenced node from the store and install it in place.
    /// No-op for an already expanded child.
    pub fn resolve<S, M>(&mut self, store: &S, marshalizer: &M) -> Result<()>
    where
        S: Storer,
        M: Marshalizer,
    {
        if let ChildRef::Collapsed(hash) = self {
            let encoded = store
                .get(hash)
                .map_err(|_| TrieError::MissingNode(hex::encode(&hash[..hash.len().min(8)])))?;
            let mut node = decode_node(&encoded, marshalizer)?;
            node.set_cached_hash(hash.clone());
            *self = ChildRef::Expanded(Box::new(node));
        }
        Ok(())
    }

    /// Mutable access to the expanded node; fails on a collapsed child.
    pub fn expanded_mut(&mut self) -> Result<&mut TrieNode> {
        match self {
            ChildRef::Expanded(node) => Ok(node),
            ChildRef::Collapsed(_) => Err(TrieError::NilNode),
        }
    }
}

/// A node with 17 child slots: one per nibble plus the terminator slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchNode {
    /// Child slots, indexed by nibble (slot 16 holds terminated keys).
    pub children: [Option<ChildRef>; NR_OF_CHILDREN],
    pub(crate) hash: Option<Vec<u8>>,
    pub(crate) dirty: bool,
}

/// A node carrying a shared nibble prefix and a single child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionNode {
    /// The shared path prefix (never contains the terminator).
    pub key: Vec<u8>,
    /// The single child under the prefix.
    pub child: ChildRef,
    pub(crate) hash: Option<Vec<u8>>,
    pub(crate) dirty: bool,
}

/// A terminal node: the remaining key nibbles and the stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafNode {
    /// Remaining nibbles including the terminator (empty under slot 16).
    pub key: Vec<u8>,
    /// The stored value.
    pub value: Vec<u8>,
    pub(crate) hash: Option<Vec<u8>>,
    pub(crate) dirty: bool,
}

/// A Patricia-Merkle trie node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrieNode {
    /// 17-slot branch.
    Branch(BranchNode),
    /// Prefix-sharing extension.
    Extension(ExtensionNode),
    /// Terminal leaf.
    Leaf(LeafNode),
}

#[derive(Serialize, Deserialize)]
struct CollapsedBranch {
    children: Vec<Option<Vec<u8>>>,
}

#[derive(Serialize, Deserialize)]
struct CollapsedExtension {
    key: Vec<u8>,
    child: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct CollapsedLeaf {
    key: Vec<u8>,
    value: Vec<u8>,
}

impl TrieNode {
    /// A new dirty branch with no children.
    pub fn new_branch() -> Self {
        TrieNode::Branch(BranchNode {
            children: std::array::from_fn(|_| None),
            hash: None,
            dirty: true,
        })
    }

    /// A new dirty extension.
    pub fn new_extension(key: Vec<u8>, child: ChildRef) -> Self {
        TrieNode::Extension(ExtensionNode {
            key,
            child,
            hash: None,
            dirty: true,
        })
    }

    /// A new dirty leaf.
    pub fn new_leaf(key: Vec<u8>, value: Vec<u8>) -> Self {
        TrieNode::Leaf(LeafNode {
            key,
            value,
            hash: None,
            dirty: true,
        })
    }

    /// Whether the node has uncommitted changes.
    pub fn is_dirty(&self) -> bool {
        match self {
            TrieNode::Branch(n) => n.dirty,
            TrieNode::Extension(n) => n.dirty,
            TrieNode::Leaf(n) => n.dirty,
        }
    }

    /// The cached hash, valid only while the node is clean.
    pub fn cached_hash(&self) -> Option<&[u8]> {
        match self {
            TrieNode::Branch(n) => n.hash.as_deref(),
            TrieNode::Extension(n) => n.hash.as_deref(),
            TrieNode::Leaf(n) => n.hash.as_deref(),
        }
    }

    /// Mark the node mutated: dirty with the cached hash invalidated.
    pub fn mark_dirty(&mut self) {
        match self {
            TrieNode::Branch(n) => {
                n.dirty = true;
                n.hash = None;
            }
            TrieNode::Extension(n) => {
                n.dirty = true;
                n.hash = None;
            }
            TrieNode::Leaf(n) => {
                n.dirty = true;
                n.hash = None;
            }
        }
    }

    pub(crate) fn set_cached_hash(&mut self, hash: Vec<u8>) {
        match self {
            TrieNode::Branch(n) => n.hash = Some(hash),
            TrieNode::Extension(n) => n.hash = Some(hash),
            TrieNode::Leaf(n) => n.hash = Some(hash),
        }
    }

    fn clear_dirty(&mut self) {
        match self {
            TrieNode::Branch(n) => n.dirty = false,
            TrieNode::Extension(n) => n.dirty = false,
            TrieNode::Leaf(n) => n.dirty = false,
        }
    }

    /// The tag byte appended to this node's encoding.
    pub fn tag(&self) -> u8 {
        match self {
            TrieNode::Branch(_) => BRANCH_TAG,
            TrieNode::Extension(_) => EXTENSION_TAG,
            TrieNode::Leaf(_) => LEAF_TAG,
        }
    }

    /// Serialize the collapsed form of this node and append the tag byte.
    ///
    /// Every expanded child must carry a cached hash; `set_hash` establishes
    /// that invariant bottom-up before encoding is attempted.
    pub fn encode<M: Marshalizer>(&self, marshalizer: &M) -> Result<Vec<u8>> {
        let mut encoded = match self {
            TrieNode::Branch(n) => {
                let mut children = Vec::with_capacity(NR_OF_CHILDREN);
                for child in &n.children {
                    match child {
                        Some(c) => children.push(Some(c.hash().ok_or(TrieError::NilNode)?)),
                        None => children.push(None),
                    }
                }
                marshalizer.marshal(&CollapsedBranch { children })?
            }
            TrieNode::Extension(n) => marshalizer.marshal(&CollapsedExtension {
                key: n.key.clone(),
                child: n.child.hash().ok_or(TrieError::NilNode)?,
            })?,
            TrieNode::Leaf(n) => marshalizer.marshal(&CollapsedLeaf {
                key: n.key.clone(),
                value: n.value.clone(),
            })?,
        };
        encoded.push(self.tag());
        Ok(encoded)
    }

    /// Compute and cache hashes bottom-up for this node and every dirty
    /// expanded descendant. After this call `cached_hash` is present and
    /// equals `H(encode(collapsed(node)))`.
    pub fn set_hash<M, H>(&mut self, marshalizer: &M, hasher: &H) -> Result<()>
    where
        M: Marshalizer,
        H: Hasher,
    {
        if !self.is_dirty() && self.cached_hash().is_some() {
            return Ok(());
        }

        match self {
            TrieNode::Branch(n) => {
                for child in n.children.iter_mut().flatten() {
                    if let ChildRef::Expanded(node) = child {
                        node.set_hash(marshalizer, hasher)?;
                    }
                }
            }
            TrieNode::Extension(n) => {
                if let ChildRef::Expanded(node) = &mut n.child {
                    node.set_hash(marshalizer, hasher)?;
                }
            }
            TrieNode::Leaf(_) => {}
        }

        let encoded = self.encode(marshalizer)?;
        let hash = hasher.compute(&encoded);
        self.set_cached_hash(hash);
        Ok(())
    }

    /// Depth-first commit: store every dirty node as `hash → encoding` and
    /// clear its dirty flag. `set_hash` must have run first.
    pub fn commit<S, M, H>(&mut self, store: &S, marshalizer: &M, hasher: &H) -> Result<()>
    where
        S: Storer,
        M: Marshalizer,
        H: Hasher,
    {
        if !self.is_dirty() {
            return Ok(());
        }

        match self {
            TrieNode::Branch(n) => {
                for child in n.children.iter_mut().flatten() {
                    if let ChildRef::Expanded(node) = child {
                        node.commit(store, marshalizer, hasher)?;
                    }
                }
            }
            TrieNode::Extension(n) => {
                if let ChildRef::Expanded(node) = &mut n.child {
                    node.commit(store, marshalizer, hasher)?;
                }
            }
            TrieNode::Leaf(_) => {}
        }

        let encoded = self.encode(marshalizer)?;
        let hash = match self.cached_hash() {
            Some(hash) => hash.to_vec(),
            None => hasher.compute(&encoded),
        };
        store.put(&hash, &encoded)?;
        self.set_cached_hash(hash);
        self.clear_dirty();
        Ok(())
    }
}

/// Decode a stored node: strip the trailing tag byte, then unmarshal the
/// collapsed payload. The result is clean, with collapsed children.
pub fn decode_node<M: Marshalizer>(encoded: &[u8], marshalizer: &M) -> Result<TrieNode> {
    if encoded.is_empty() {
        return Err(TrieError::InvalidEncoding);
    }

    let (payload, tag) = encoded.split_at(encoded.len() - 1);
    let node = match tag[0] {
        EXTENSION_TAG => {
            let collapsed: CollapsedExtension = marshalizer.unmarshal(payload)?;
            TrieNode::Extension(ExtensionNode {
                key: collapsed.key,
                child: ChildRef::Collapsed(collapsed.child),
                hash: None,
                dirty: false,
            })
        }
        LEAF_TAG => {
            let collapsed: CollapsedLeaf = marshalizer.unmarshal(payload)?;
            TrieNode::Leaf(LeafNode {
                key: collapsed.key,
                value: collapsed.value,
                hash: None,
                dirty: false,
            })
        }
        BRANCH_TAG => {
            let collapsed: CollapsedBranch = marshalizer.unmarshal(payload)?;
            let mut children: [Option<ChildRef>; NR_OF_CHILDREN] =
                std::array::from_fn(|_| None);
            for (slot, child) in collapsed.children.into_iter().enumerate().take(NR_OF_CHILDREN)
            {
                children[slot] = child.map(ChildRef::Collapsed);
            }
            TrieNode::Branch(BranchNode {
                children,
                hash: None,
                dirty: false,
            })
        }
        other => return Err(TrieError::InvalidNode(other)),
    };
    Ok(node)
}
