//! End-to-end tree scenarios through the public API

use shortcut_smt::{
    verify_proof, BigUint, Blake3Hasher, FileStore, KvStore, LeafData, MemoryStore, NodeId,
    Sha256Hasher, SparseMerkleTree, TreeConfig, TreeHasher,
};
use tempfile::tempdir;

const X: [u8; 32] = [0xAA; 32];
const Y: [u8; 32] = [0xBB; 32];

fn k(n: u64) -> BigUint {
    BigUint::from(n)
}

#[tokio::test]
async fn scenario_prove_single_leaf() {
    let mut tree = SparseMerkleTree::create(MemoryStore::new(), Blake3Hasher, 4, None)
        .await
        .unwrap();
    assert_eq!(tree.num_leaves(), k(8));

    assert!(tree.update(&k(3), X).await.unwrap());
    let proof = tree
        .get_merkle_proof(&k(3), &LeafData::Value(X))
        .await
        .unwrap()
        .expect("leaf 3 should be provable");

    assert!(tree.verify_merkle_proof(&k(3), &proof));
    assert!(!tree.verify_merkle_proof(&k(5), &proof));
}

#[tokio::test]
async fn scenario_common_ancestor_is_materialized() {
    let mut tree = SparseMerkleTree::create(MemoryStore::new(), Blake3Hasher, 4, None)
        .await
        .unwrap();
    tree.update(&k(3), X).await.unwrap();
    tree.update(&k(5), Y).await.unwrap();

    // 3 and 5 first differ in their top bit, so they meet at the root
    let root = tree.root();
    assert!(root.is_internal());
    let (left, right) = root.children().unwrap();

    let h = Blake3Hasher;
    let zero = |depth: usize| tree.zero_hash(depth).unwrap();
    let left_of_3 = h.hash_internal(&zero(2), &h.hash_internal(&zero(3), &h.hash_leaf(&X)));
    let right_of_5 = h.hash_internal(&h.hash_internal(&zero(3), &h.hash_leaf(&Y)), &zero(2));
    assert_eq!(left, left_of_3);
    assert_eq!(right, right_of_5);
    assert_eq!(tree.root_hash(), h.hash_internal(&left_of_3, &right_of_5));
}

#[tokio::test]
async fn scenario_overwrite_drops_old_record() {
    let store = MemoryStore::new();
    let mut tree = SparseMerkleTree::create(store.clone(), Blake3Hasher, 4, None)
        .await
        .unwrap();
    tree.update(&k(6), X).await.unwrap();
    tree.update(&k(6), Y).await.unwrap();

    assert_eq!(tree.get_leaf(&k(6), None).await.unwrap(), Some(LeafData::Value(Y)));
    let stale = NodeId::new(&Blake3Hasher.hash_leaf(&X), &k(6), 3);
    assert_eq!(store.get(stale.as_bytes()).await.unwrap(), None);
}

#[tokio::test]
async fn scenario_proofs_verify_without_a_tree() {
    let mut tree = SparseMerkleTree::create(MemoryStore::new(), Sha256Hasher, 65, None)
        .await
        .unwrap();
    let key = BigUint::from(u64::MAX);
    tree.update(&key, X).await.unwrap();
    tree.update(&k(1), Y).await.unwrap();

    let proof = tree
        .get_merkle_proof(&key, &LeafData::Value(X))
        .await
        .unwrap()
        .unwrap();
    let leaf_hash = Sha256Hasher.hash_leaf(&X);
    assert!(verify_proof(
        &Sha256Hasher,
        &tree.root_hash(),
        &key,
        &leaf_hash,
        &proof.siblings
    ));
    assert!(!verify_proof(
        &Blake3Hasher,
        &tree.root_hash(),
        &key,
        &leaf_hash,
        &proof.siblings
    ));
    assert_eq!(proof.compute_root(&Sha256Hasher), tree.root_hash());
}

#[tokio::test]
async fn scenario_file_store_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tree.smt");
    let config = TreeConfig::new(33);
    let keys = [k(0), k(1), k(1 << 20), k((1 << 32) - 1)];

    let root = {
        let store = FileStore::create(&path).unwrap();
        let mut tree = SparseMerkleTree::create_with_config(store, Blake3Hasher, &config, None)
            .await
            .unwrap();
        for (i, key) in keys.iter().enumerate() {
            let mut value = X;
            value[0] = i as u8;
            assert!(tree.update(key, value).await.unwrap());
        }
        tree.update(&k(1), Y).await.unwrap();
        tree.store().sync().unwrap();
        tree.root_hash()
    };

    let store = FileStore::open(&path).unwrap();
    let tree = SparseMerkleTree::create_with_config(store, Blake3Hasher, &config, Some(root))
        .await
        .unwrap();
    assert!(tree.root().is_internal());
    assert_eq!(tree.get_leaf(&k(1), None).await.unwrap(), Some(LeafData::Value(Y)));
    let mut first = X;
    first[0] = 0;
    assert_eq!(tree.get_leaf(&k(0), None).await.unwrap(), Some(LeafData::Value(first)));

    for key in &keys[2..] {
        let leaf = tree.get_leaf(key, None).await.unwrap().unwrap();
        let proof = tree.get_merkle_proof(key, &leaf).await.unwrap().unwrap();
        assert!(tree.verify_merkle_proof(key, &proof));
    }
}
