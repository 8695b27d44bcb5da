//! The Patricia-Merkle trie over a content-addressed store.

use std::collections::HashMap;

use tracing::trace;
use valence_core::{Hasher, Marshalizer, Storer};

use crate::encoding::{hex_to_key_bytes, key_bytes_to_hex, prefix_len};
use crate::node::{decode_node, ChildRef, TrieNode};
use crate::{Result, TrieError};

/// Hex-path Patricia-Merkle trie.
///
/// Keys are raw bytes; values are raw bytes. Mutations only touch the
/// in-memory expanded nodes; `commit` flushes dirty nodes into the store
/// keyed by their hash, after which subtrees may live in the store only
/// (collapsed) and are resolved back on demand.
pub struct PatriciaMerkleTrie<S, M, H> {
    store: S,
    marshalizer: M,
    hasher: H,
    root: Option<TrieNode>,
}

impl<S, M, H> PatriciaMerkleTrie<S, M, H>
where
    S: Storer,
    M: Marshalizer,
    H: Hasher,
{
    /// Create an empty trie over the given store.
    pub fn new(store: S, marshalizer: M, hasher: H) -> Self {
        Self {
            store,
            marshalizer,
            hasher,
            root: None,
        }
    }

    /// Recreate a trie from a committed root hash, loading the root node
    /// from the store. The children stay collapsed until resolved.
    pub fn from_root(store: S, marshalizer: M, hasher: H, root_hash: &[u8]) -> Result<Self> {
        if root_hash.is_empty() {
            return Err(TrieError::NilNode);
        }

        let encoded = store
            .get(root_hash)
            .map_err(|_| TrieError::MissingNode(hex::encode(&root_hash[..root_hash.len().min(8)])))?;
        let mut root = decode_node(&encoded, &marshalizer)?;
        root.set_cached_hash(root_hash.to_vec());

        Ok(Self {
            store,
            marshalizer,
            hasher,
            root: Some(root),
        })
    }

    /// Whether the trie holds no entries.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Insert or update a key. An empty value deletes the key.
    pub fn update(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if value.is_empty() {
            self.delete(key)?;
            return Ok(());
        }

        let hex = key_bytes_to_hex(key);
        let root = self.root.take();
        let new_root = self.insert_at(root, hex, value.to_vec())?;
        self.root = Some(new_root);
        Ok(())
    }

    /// Fetch the value stored under a key.
    pub fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let hex = key_bytes_to_hex(key);
        match self.root.take() {
            None => Ok(None),
            Some(mut root) => {
                let result = Self::get_at(&mut root, &hex, &self.store, &self.marshalizer);
                self.root = Some(root);
                result
            }
        }
    }

    /// Remove a key. Removing an absent key leaves the trie unchanged.
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        let hex = key_bytes_to_hex(key);
        if let Some(root) = self.root.take() {
            let (_, new_root) = self.delete_at(root, &hex)?;
            self.root = new_root;
        }
        Ok(())
    }

    /// The root hash. For an empty trie this is the hash of no bytes.
    pub fn root_hash(&mut self) -> Result<Vec<u8>> {
        match &mut self.root {
            None => Ok(self.hasher.compute(&[])),
            Some(root) => {
                root.set_hash(&self.marshalizer, &self.hasher)?;
                Ok(root
                    .cached_hash()
                    .map(<[u8]>::to_vec)
                    .expect("set_hash populates the cache"))
            }
        }
    }

    /// Flush every dirty node into the store, depth-first.
    pub fn commit(&mut self) -> Result<()> {
        if let Some(root) = &mut self.root {
            root.set_hash(&self.marshalizer, &self.hasher)?;
            root.commit(&self.store, &self.marshalizer, &self.hasher)?;
            if let Some(hash) = root.cached_hash() {
                trace!(root = hex::encode(&hash[..hash.len().min(8)]), "trie committed");
            }
        }
        Ok(())
    }

    /// Walk the whole trie, resolving collapsed subtrees from the store,
    /// and return every raw key with its value.
    pub fn get_all_leaves(&mut self) -> Result<HashMap<Vec<u8>, Vec<u8>>> {
        let mut leaves = HashMap::new();
        if let Some(root) = self.root.take() {
            let mut root = root;
            let result = Self::collect_leaves(
                &mut root,
                Vec::new(),
                &mut leaves,
                &self.store,
                &self.marshalizer,
            );
            self.root = Some(root);
            result?;
        }
        Ok(leaves)
    }

    fn insert_at(
        &mut self,
        node: Option<TrieNode>,
        key: Vec<u8>,
        value: Vec<u8>,
    ) -> Result<TrieNode> {
        let Some(node) = node else {
            return Ok(TrieNode::new_leaf(key, value));
        };

        match node {
            TrieNode::Leaf(mut leaf) => {
                if leaf.key == key {
                    leaf.value = value;
                    let mut node = TrieNode::Leaf(leaf);
                    node.mark_dirty();
                    return Ok(node);
                }

                // split at the common prefix; both keys keep at least one
                // nibble because every key is terminator-delimited
                let common = prefix_len(&leaf.key, &key);
                let mut branch = TrieNode::new_branch();
                if let TrieNode::Branch(b) = &mut branch {
                    let old_pos = leaf.key[common] as usize;
                    let old_rest = leaf.key[common + 1..].to_vec();
                    b.children[old_pos] = Some(ChildRef::Expanded(Box::new(TrieNode::new_leaf(
                        old_rest, leaf.value,
                    ))));

                    let new_pos = key[common] as usize;
                    let new_rest = key[common + 1..].to_vec();
                    b.children[new_pos] = Some(ChildRef::Expanded(Box::new(TrieNode::new_leaf(
                        new_rest, value,
                    ))));
                }

                if common > 0 {
                    Ok(TrieNode::new_extension(
                        key[..common].to_vec(),
                        ChildRef::Expanded(Box::new(branch)),
                    ))
                } else {
                    Ok(branch)
                }
            }
            TrieNode::Extension(mut ext) => {
                let common = prefix_len(&ext.key, &key);

                if common == ext.key.len() {
                    ext.child.resolve(&self.store, &self.marshalizer)?;
                    let child = match ext.child {
                        ChildRef::Expanded(node) => *node,
                        ChildRef::Collapsed(_) => return Err(TrieError::NilNode),
                    };
                    let new_child =
                        self.insert_at(Some(child), key[common..].to_vec(), value)?;
                    ext.child = ChildRef::Expanded(Box::new(new_child));
                    let mut node = TrieNode::Extension(ext);
                    node.mark_dirty();
                    return Ok(node);
                }

                let mut branch = TrieNode::new_branch();
                if let TrieNode::Branch(b) = &mut branch {
                    let ext_pos = ext.key[common] as usize;
                    let ext_rest = ext.key[common + 1..].to_vec();
                    b.children[ext_pos] = Some(if ext_rest.is_empty() {
                        ext.child
                    } else {
                        ChildRef::Expanded(Box::new(TrieNode::new_extension(ext_rest, ext.child)))
                    });

                    let new_pos = key[common] as usize;
                    let new_rest = key[common + 1..].to_vec();
                    b.children[new_pos] = Some(ChildRef::Expanded(Box::new(TrieNode::new_leaf(
                        new_rest, value,
                    ))));
                }

                if common > 0 {
                    Ok(TrieNode::new_extension(
                        key[..common].to_vec(),
                        ChildRef::Expanded(Box::new(branch)),
                    ))
                } else {
                    Ok(branch)
                }
            }
            TrieNode::Branch(mut branch) => {
                let pos = key[0] as usize;
                let rest = key[1..].to_vec();

                let child = match branch.children[pos].take() {
                    Some(mut child_ref) => {
                        child_ref.resolve(&self.store, &self.marshalizer)?;
                        match child_ref {
                            ChildRef::Expanded(node) => Some(*node),
                            ChildRef::Collapsed(_) => return Err(TrieError::NilNode),
                        }
                    }
                    None => None,
                };

                let new_child = self.insert_at(child, rest, value)?;
                branch.children[pos] = Some(ChildRef::Expanded(Box::new(new_child)));

                let mut node = TrieNode::Branch(branch);
                node.mark_dirty();
                Ok(node)
            }
        }
    }

    fn get_at(
        node: &mut TrieNode,
        key: &[u8],
        store: &S,
        marshalizer: &M,
    ) -> Result<Option<Vec<u8>>> {
        match node {
            TrieNode::Leaf(leaf) => {
                if leaf.key == key {
                    Ok(Some(leaf.value.clone()))
                } else {
                    Ok(None)
                }
            }
            TrieNode::Extension(ext) => {
                if key.len() < ext.key.len() || key[..ext.key.len()] != ext.key[..] {
                    return Ok(None);
                }
                ext.child.resolve(store, marshalizer)?;
                Self::get_at(ext.child.expanded_mut()?, &key[ext.key.len()..], store, marshalizer)
            }
            TrieNode::Branch(branch) => {
                let Some(pos) = key.first().map(|n| *n as usize) else {
                    return Ok(None);
                };
                match &mut branch.children[pos] {
                    None => Ok(None),
                    Some(child) => {
                        child.resolve(store, marshalizer)?;
                        Self::get_at(child.expanded_mut()?, &key[1..], store, marshalizer)
                    }
                }
            }
        }
    }

    fn delete_at(&mut self, node: TrieNode, key: &[u8]) -> Result<(bool, Option<TrieNode>)> {
        match node {
            TrieNode::Leaf(leaf) => {
                if leaf.key == key {
                    Ok((true, None))
                } else {
                    Ok((false, Some(TrieNode::Leaf(leaf))))
                }
            }
            TrieNode::Extension(mut ext) => {
                if key.len() < ext.key.len() || key[..ext.key.len()] != ext.key[..] {
                    return Ok((false, Some(TrieNode::Extension(ext))));
                }

                ext.child.resolve(&self.store, &self.marshalizer)?;
                let child = match ext.child {
                    ChildRef::Expanded(node) => *node,
                    ChildRef::Collapsed(_) => return Err(TrieError::NilNode),
                };

                let (removed, new_child) = self.delete_at(child, &key[ext.key.len()..])?;
                if !removed {
                    ext.child = ChildRef::Expanded(Box::new(new_child.expect("unchanged child")));
                    return Ok((false, Some(TrieNode::Extension(ext))));
                }

                let merged = match new_child {
                    None => None,
                    Some(TrieNode::Leaf(mut l)) => {
                        let mut key = ext.key;
                        key.append(&mut l.key);
                        Some(TrieNode::new_leaf(key, l.value))
                    }
                    Some(TrieNode::Extension(mut e)) => {
                        let mut key = ext.key;
                        key.append(&mut e.key);
                        Some(TrieNode::new_extension(key, e.child))
                    }
                    Some(branch @ TrieNode::Branch(_)) => Some(TrieNode::new_extension(
                        ext.key,
                        ChildRef::Expanded(Box::new(branch)),
                    )),
                };
                Ok((true, merged))
            }
            TrieNode::Branch(mut branch) => {
                let Some(pos) = key.first().map(|n| *n as usize) else {
                    return Ok((false, Some(TrieNode::Branch(branch))));
                };

                let Some(mut child_ref) = branch.children[pos].take() else {
                    return Ok((false, Some(TrieNode::Branch(branch))));
                };
                child_ref.resolve(&self.store, &self.marshalizer)?;
                let child = match child_ref {
                    ChildRef::Expanded(node) => *node,
                    ChildRef::Collapsed(_) => return Err(TrieError::NilNode),
                };

                let (removed, new_child) = self.delete_at(child, &key[1..])?;
                branch.children[pos] =
                    new_child.map(|n| ChildRef::Expanded(Box::new(n)));
                if !removed {
                    return Ok((false, Some(TrieNode::Branch(branch))));
                }

                let remaining: Vec<usize> = branch
                    .children
                    .iter()
                    .enumerate()
                    .filter_map(|(i, c)| c.as_ref().map(|_| i))
                    .collect();

                match remaining.len() {
                    0 => Ok((true, None)),
                    1 => {
                        // a single-child branch collapses into its child,
                        // re-prefixed with the child's slot nibble
                        let slot = remaining[0];
                        let mut only = branch.children[slot].take().expect("slot is occupied");
                        only.resolve(&self.store, &self.marshalizer)?;
                        let only = match only {
                            ChildRef::Expanded(node) => *node,
                            ChildRef::Collapsed(_) => return Err(TrieError::NilNode),
                        };

                        let merged = match only {
                            TrieNode::Leaf(mut l) => {
                                let mut key = vec![slot as u8];
                                key.append(&mut l.key);
                                TrieNode::new_leaf(key, l.value)
                            }
                            TrieNode::Extension(mut e) => {
                                let mut key = vec![slot as u8];
                                key.append(&mut e.key);
                                TrieNode::new_extension(key, e.child)
                            }
                            inner @ TrieNode::Branch(_) => TrieNode::new_extension(
                                vec![slot as u8],
                                ChildRef::Expanded(Box::new(inner)),
                            ),
                        };
                        Ok((true, Some(merged)))
                    }
                    _ => {
                        let mut node = TrieNode::Branch(branch);
                        node.mark_dirty();
                        Ok((true, Some(node)))
                    }
                }
            }
        }
    }

    fn collect_leaves(
        node: &mut TrieNode,
        prefix: Vec<u8>,
        out: &mut HashMap<Vec<u8>, Vec<u8>>,
        store: &S,
        marshalizer: &M,
    ) -> Result<()> {
        match node {
            TrieNode::Leaf(leaf) => {
                let mut hex = prefix;
                hex.extend_from_slice(&leaf.key);
                let key = hex_to_key_bytes(&hex)?;
                out.insert(key, leaf.value.clone());
                Ok(())
            }
            TrieNode::Extension(ext) => {
                let mut hex = prefix;
                hex.extend_from_slice(&ext.key);
                ext.child.resolve(store, marshalizer)?;
                Self::collect_leaves(ext.child.expanded_mut()?, hex, out, store, marshalizer)
            }
            TrieNode::Branch(branch) => {
                for (slot, child) in branch.children.iter_mut().enumerate() {
                    if let Some(child) = child {
                        let mut hex = prefix.clone();
                        hex.push(slot as u8);
                        child.resolve(store, marshalizer)?;
                        Self::collect_leaves(child.expanded_mut()?, hex, out, store, marshalizer)?;
                    }
                }
                Ok(())
            }
        }
    }
}
