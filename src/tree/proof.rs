//! Merkle proofs

use super::path::PathEnd;
use super::{bits, SparseMerkleTree};
use crate::hasher::TreeHasher;
use crate::model::{Hash, LeafData};
use crate::store::KvStore;
use crate::Result;
use log::debug;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// Proof that `leaf` sits at `key` under `root_hash`
///
/// `siblings[i]` is the hash beside the path at depth `i + 1`, so the list
/// runs from just below the root down to the leaf level.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub root_hash: Hash,
    #[serde(with = "decimal")]
    pub key: BigUint,
    pub leaf: LeafData,
    pub siblings: Vec<Hash>,
}

/// Keys travel as decimal strings so proof files stay readable
mod decimal {
    use num_bigint::BigUint;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(key: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(key)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

impl MerkleProof {
    /// Height of the tree this proof is for
    pub fn height(&self) -> usize {
        self.siblings.len() + 1
    }

    /// Root obtained by folding the leaf with the siblings
    pub fn compute_root<H: TreeHasher + ?Sized>(&self, hasher: &H) -> Hash {
        compute_root(hasher, &self.key, &self.leaf.hash(hasher), &self.siblings)
    }

    /// Check the proof against its own `root_hash`
    pub fn verify<H: TreeHasher + ?Sized>(&self, hasher: &H) -> bool {
        verify_proof(
            hasher,
            &self.root_hash,
            &self.key,
            &self.leaf.hash(hasher),
            &self.siblings,
        )
    }
}

/// Check that `leaf_hash` at `key` with `siblings` yields `root`
///
/// Pure: touches no store, so it can run alongside anything.
pub fn verify_proof<H: TreeHasher + ?Sized>(
    hasher: &H,
    root: &Hash,
    key: &BigUint,
    leaf_hash: &Hash,
    siblings: &[Hash],
) -> bool {
    if siblings.is_empty() || key.bits() > siblings.len() as u64 {
        return false;
    }
    compute_root(hasher, key, leaf_hash, siblings) == *root
}

fn compute_root<H: TreeHasher + ?Sized>(
    hasher: &H,
    key: &BigUint,
    leaf_hash: &Hash,
    siblings: &[Hash],
) -> Hash {
    let height = siblings.len() + 1;
    let mut current = *leaf_hash;
    for depth in (0..siblings.len()).rev() {
        let sibling = &siblings[depth];
        current = if bits::is_left(key, depth, height) {
            hasher.hash_internal(&current, sibling)
        } else {
            hasher.hash_internal(sibling, &current)
        };
    }
    current
}

impl<S: KvStore, H: TreeHasher> SparseMerkleTree<S, H> {
    /// Build a proof that `key` holds `leaf` under the current root
    ///
    /// Also proves default leaves: pass the empty leaf value. Returns `None`
    /// when the key is out of range, when the tree holds a different leaf at
    /// `key`, or when the path runs into an opaque subtree (import a proof
    /// for it first).
    pub async fn get_merkle_proof(
        &self,
        key: &BigUint,
        leaf: &LeafData,
    ) -> Result<Option<MerkleProof>> {
        let path = self.get_nodes_in_path(key).await?;
        if path.is_empty() {
            return Ok(None);
        }

        let (stored_leaf, siblings) = match self.classify(key, &path)? {
            PathEnd::Leaf => {
                let terminal = &path[path.len() - 1];
                (terminal.hash, self.siblings_along(key, &path, None))
            }
            PathEnd::Shortcut { leaf_hash } => (leaf_hash, self.siblings_along(key, &path, None)),
            PathEnd::EmptyBranch => (
                self.empty_leaf_hash(),
                self.siblings_along(key, &path, None),
            ),
            PathEnd::Diverged {
                leaf_key,
                leaf_hash,
            } => (
                self.empty_leaf_hash(),
                self.siblings_along(key, &path, Some((&leaf_key, &leaf_hash))),
            ),
            PathEnd::Opaque => {
                debug!("Cannot prove key {}: path is not materialized", key);
                return Ok(None);
            }
        };

        let expected = leaf.hash(&self.hasher);
        if expected != stored_leaf {
            debug!(
                "Cannot prove key {}: tree holds {}, asked for {}",
                key,
                stored_leaf.short(),
                expected.short()
            );
            return Ok(None);
        }

        Ok(Some(MerkleProof {
            root_hash: self.root.hash,
            key: key.clone(),
            leaf: *leaf,
            siblings,
        }))
    }

    /// Check `proof`'s leaf and siblings at `key` against the current root
    pub fn verify_merkle_proof(&self, key: &BigUint, proof: &MerkleProof) -> bool {
        if proof.siblings.len() != self.leaf_depth() {
            return false;
        }
        verify_proof(
            &self.hasher,
            &self.root.hash,
            key,
            &proof.leaf.hash(&self.hasher),
            &proof.siblings,
        )
    }
}
