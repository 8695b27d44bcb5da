//! Integration tests for the Patricia-Merkle trie.

use std::sync::Arc;

use valence_core::{BincodeMarshalizer, MemStorer};
use valence_crypto::Keccak256Hasher;
use valence_trie::PatriciaMerkleTrie;

type Trie = PatriciaMerkleTrie<Arc<MemStorer>, BincodeMarshalizer, Keccak256Hasher>;

fn new_trie() -> (Trie, Arc<MemStorer>) {
    let store = Arc::new(MemStorer::new());
    let trie = PatriciaMerkleTrie::new(Arc::clone(&store), BincodeMarshalizer, Keccak256Hasher);
    (trie, store)
}

#[test]
fn insert_and_get() {
    let (mut trie, _) = new_trie();

    trie.update(b"key1", b"value1").unwrap();
    trie.update(b"key2", b"value2").unwrap();

    assert_eq!(trie.get(b"key1").unwrap(), Some(b"value1".to_vec()));
    assert_eq!(trie.get(b"key2").unwrap(), Some(b"value2".to_vec()));
    assert_eq!(trie.get(b"key3").unwrap(), None);
}

#[test]
fn update_round_trip_arbitrary_keys() {
    let (mut trie, _) = new_trie();
    let entries: Vec<(Vec<u8>, Vec<u8>)> = vec![
        (b"doe".to_vec(), b"reindeer".to_vec()),
        (b"dog".to_vec(), b"puppy".to_vec()),
        (b"dogglesworth".to_vec(), b"cat".to_vec()),
        (vec![0x00], b"zero".to_vec()),
        (vec![0xff, 0xff], b"ones".to_vec()),
        (b"".to_vec(), b"empty key".to_vec()),
    ];

    for (key, value) in &entries {
        trie.update(key, value).unwrap();
    }
    for (key, value) in &entries {
        assert_eq!(trie.get(key).unwrap().as_ref(), Some(value), "key {:?}", key);
    }
}

#[test]
fn overwrite_changes_root() {
    let (mut trie, _) = new_trie();

    trie.update(b"key", b"v1").unwrap();
    let root1 = trie.root_hash().unwrap();

    trie.update(b"key", b"v2").unwrap();
    let root2 = trie.root_hash().unwrap();

    assert_ne!(root1, root2);
    assert_eq!(trie.get(b"key").unwrap(), Some(b"v2".to_vec()));
}

#[test]
fn deterministic_root_regardless_of_insert_order() {
    let (mut a, _) = new_trie();
    a.update(b"doe", b"reindeer").unwrap();
    a.update(b"dog", b"puppy").unwrap();
    a.update(b"dogglesworth", b"cat").unwrap();

    let (mut b, _) = new_trie();
    b.update(b"dogglesworth", b"cat").unwrap();
    b.update(b"doe", b"reindeer").unwrap();
    b.update(b"dog", b"puppy").unwrap();

    assert_eq!(a.root_hash().unwrap(), b.root_hash().unwrap());
}

#[test]
fn delete_restores_previous_root() {
    let (mut trie, _) = new_trie();

    trie.update(b"doe", b"reindeer").unwrap();
    let root_before = trie.root_hash().unwrap();

    trie.update(b"dog", b"puppy").unwrap();
    trie.delete(b"dog").unwrap();

    assert_eq!(trie.root_hash().unwrap(), root_before);
    assert_eq!(trie.get(b"dog").unwrap(), None);
}

#[test]
fn delete_is_idempotent() {
    let (mut trie, _) = new_trie();

    trie.update(b"doe", b"reindeer").unwrap();
    trie.update(b"dog", b"puppy").unwrap();

    trie.delete(b"dog").unwrap();
    let root_after_first = trie.root_hash().unwrap();

    trie.delete(b"dog").unwrap();
    assert_eq!(trie.root_hash().unwrap(), root_after_first);
}

#[test]
fn empty_value_deletes() {
    let (mut trie, _) = new_trie();

    trie.update(b"key", b"value").unwrap();
    trie.update(b"key", b"").unwrap();

    assert_eq!(trie.get(b"key").unwrap(), None);
    assert!(trie.is_empty());
}

#[test]
fn root_is_stable_across_commit() {
    let (mut trie, _) = new_trie();

    trie.update(b"doe", b"reindeer").unwrap();
    trie.update(b"dog", b"puppy").unwrap();
    let root_before = trie.root_hash().unwrap();

    trie.commit().unwrap();
    assert_eq!(trie.root_hash().unwrap(), root_before);
}

#[test]
fn committed_trie_recreates_from_root() {
    let (mut trie, store) = new_trie();

    trie.update(b"doe", b"reindeer").unwrap();
    trie.update(b"dog", b"puppy").unwrap();
    trie.commit().unwrap();
    let root = trie.root_hash().unwrap();

    let mut reloaded =
        PatriciaMerkleTrie::from_root(store, BincodeMarshalizer, Keccak256Hasher, &root).unwrap();
    assert_eq!(reloaded.get(b"doe").unwrap(), Some(b"reindeer".to_vec()));
    assert_eq!(reloaded.get(b"dog").unwrap(), Some(b"puppy".to_vec()));
    assert_eq!(reloaded.root_hash().unwrap(), root);
}

#[test]
fn all_leaves_survive_a_collapsed_root() {
    let (mut trie, store) = new_trie();

    trie.update(b"doe", b"reindeer").unwrap();
    trie.update(b"dog", b"puppy").unwrap();
    trie.update(b"dogglesworth", b"cat").unwrap();
    trie.commit().unwrap();
    let root = trie.root_hash().unwrap();

    // reload from the root hash: every subtree starts collapsed and must be
    // resolved from the store while walking
    let mut collapsed =
        PatriciaMerkleTrie::from_root(store, BincodeMarshalizer, Keccak256Hasher, &root).unwrap();
    let leaves = collapsed.get_all_leaves().unwrap();

    assert_eq!(leaves.len(), 3);
    assert_eq!(leaves[b"doe".as_slice()], b"reindeer".to_vec());
    assert_eq!(leaves[b"dog".as_slice()], b"puppy".to_vec());
    assert_eq!(leaves[b"dogglesworth".as_slice()], b"cat".to_vec());
}

#[test]
fn get_resolves_collapsed_subtrees() {
    let (mut trie, store) = new_trie();

    for i in 0u8..50 {
        trie.update(&[i], format!("value-{}", i).as_bytes()).unwrap();
    }
    trie.commit().unwrap();
    let root = trie.root_hash().unwrap();

    let mut reloaded =
        PatriciaMerkleTrie::from_root(store, BincodeMarshalizer, Keccak256Hasher, &root).unwrap();
    for i in 0u8..50 {
        assert_eq!(
            reloaded.get(&[i]).unwrap(),
            Some(format!("value-{}", i).into_bytes())
        );
    }
    assert_eq!(reloaded.get(&[200]).unwrap(), None);
}

#[test]
fn mutations_after_commit_change_the_root() {
    let (mut trie, _) = new_trie();

    trie.update(b"doe", b"reindeer").unwrap();
    trie.commit().unwrap();
    let root1 = trie.root_hash().unwrap();

    trie.update(b"dog", b"puppy").unwrap();
    let root2 = trie.root_hash().unwrap();
    assert_ne!(root1, root2);

    trie.commit().unwrap();
    assert_eq!(trie.root_hash().unwrap(), root2);
}

#[test]
fn empty_trie_has_the_empty_hash() {
    let (mut trie, _) = new_trie();
    use valence_core::Hasher;
    assert_eq!(trie.root_hash().unwrap(), Keccak256Hasher.compute(&[]));
}

#[test]
fn from_root_rejects_unknown_and_empty_roots() {
    let store = Arc::new(MemStorer::new());
    assert!(PatriciaMerkleTrie::from_root(
        Arc::clone(&store),
        BincodeMarshalizer,
        Keccak256Hasher,
        &[]
    )
    .is_err());
    assert!(PatriciaMerkleTrie::from_root(
        store,
        BincodeMarshalizer,
        Keccak256Hasher,
        &[7u8; 32]
    )
    .is_err());
}
