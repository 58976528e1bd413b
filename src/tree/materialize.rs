//! Proof-driven path materialization
//!
//! A path is materialized by replaying a proof: if the proof reproduces the
//! current root, every internal node along it is written out, and every
//! non-empty sibling the store does not already hold is written as a
//! placeholder. The root hash never changes; only its backing records do.

use super::changeset::ChangeSet;
use super::path::PathEnd;
use super::{bits, MerkleProof, SparseMerkleTree};
use crate::hasher::TreeHasher;
use crate::model::{Hash, LeafData, Node, NodeKind};
use crate::store::KvStore;
use crate::Result;
use log::debug;
use num_bigint::BigUint;

impl<S: KvStore, H: TreeHasher> SparseMerkleTree<S, H> {
    /// Materialize the path described by `proof`
    ///
    /// Returns `false`, without touching the store, when the proof has the
    /// wrong length, its key is out of range, or it does not reproduce the
    /// current root. A proof whose leaf is already stored is accepted as is.
    pub async fn verify_and_store(&mut self, proof: &MerkleProof) -> Result<bool> {
        let key = &proof.key;
        if proof.siblings.len() != self.leaf_depth() || !self.contains_key(key) {
            debug!("Rejecting malformed proof for key {}", key);
            return Ok(false);
        }

        let leaf_hash = proof.leaf.hash(&self.hasher);
        if leaf_hash != self.empty_leaf_hash()
            && self
                .load_node(leaf_hash, key.clone(), self.leaf_depth())
                .await?
                .is_some()
        {
            return Ok(true);
        }

        // Leaf first, root last
        let mut chain = Vec::with_capacity(self.height);
        chain.push(self.leaf_node(key, &proof.leaf));
        let mut current = leaf_hash;
        for depth in (0..self.leaf_depth()).rev() {
            let (left, right) = self.combine(key, depth, current, proof.siblings[depth]);
            current = self.hasher.hash_internal(&left, &right);
            chain.push(self.normalize(Node::internal(
                current,
                self.prefix(key, depth),
                depth,
                left,
                right,
            )));
        }

        if current != self.root.hash {
            debug!(
                "Proof for key {} yields root {}, tree root is {}",
                key,
                current.short(),
                self.root.hash.short()
            );
            return Ok(false);
        }

        let old_path = self.get_nodes_in_path(key).await?;
        let diverged = match old_path.last().map(|node| &node.kind) {
            Some(NodeKind::Shortcut {
                leaf_key,
                leaf_hash,
            }) if leaf_key != key => Some((leaf_key.clone(), *leaf_hash)),
            _ => None,
        };

        let mut changes = ChangeSet::new();
        for node in old_path {
            changes.delete(node);
        }

        for depth in 1..self.height {
            let sibling = proof.siblings[depth - 1];
            if sibling == self.zero_hashes[depth] {
                continue;
            }
            let sibling_key = bits::sibling_prefix(key, depth, self.height);
            if self
                .load_node(sibling, sibling_key.clone(), depth)
                .await?
                .is_some()
            {
                continue;
            }
            changes.put(self.sibling_placeholder(sibling, sibling_key, depth, diverged.as_ref()));
        }

        let new_root = match chain.last() {
            Some(root) => root.clone(),
            None => return Err(self.invariant("Materialized an empty chain".into())),
        };
        if new_root.depth != 0 || new_root.hash != self.root.hash {
            return Err(self.invariant(format!(
                "Materialized chain for key {} tops out at depth {}",
                key, new_root.depth
            )));
        }
        for node in chain {
            changes.put(node);
        }

        self.commit(changes, new_root).await?;

        debug!("Materialized path to key {}", key);
        Ok(true)
    }

    /// Materialize the path to `key` assuming its leaf is default
    ///
    /// The proof is assembled from the stored path, down to `known_depth`
    /// when given, with every sibling below taken from the zero-hash table
    /// (or from a diverging shortcut's leaf where one branches off). Used to
    /// split a shortcut before writing a new leaf beside it.
    pub async fn verify_and_store_partially_empty_path(
        &mut self,
        key: &BigUint,
        known_depth: Option<usize>,
    ) -> Result<bool> {
        let path = self.get_nodes_in_path(key).await?;
        if path.is_empty() {
            return Ok(false);
        }

        let limit = known_depth.map_or(path.len(), |depth| (depth + 1).min(path.len()));
        let siblings = if limit < path.len() {
            self.siblings_along(key, &path[..limit], None)
        } else {
            match self.classify(key, &path)? {
                PathEnd::Diverged {
                    leaf_key,
                    leaf_hash,
                } => self.siblings_along(key, &path, Some((&leaf_key, &leaf_hash))),
                _ => self.siblings_along(key, &path, None),
            }
        };

        let proof = MerkleProof {
            root_hash: self.root.hash,
            key: key.clone(),
            leaf: LeafData::Value(self.empty_leaf),
            siblings,
        };
        self.verify_and_store(&proof).await
    }

    /// Record standing in for a sibling the store does not hold
    ///
    /// When the sibling is exactly the subtree of a shortcut being split, it
    /// is re-homed as a shortcut so its leaf stays readable; anything else
    /// is only known by hash.
    fn sibling_placeholder(
        &self,
        hash: Hash,
        key: BigUint,
        depth: usize,
        diverged: Option<&(BigUint, Hash)>,
    ) -> Node {
        if let Some((leaf_key, leaf_hash)) = diverged {
            if self.prefix(leaf_key, depth) == key
                && self.lone_leaf_hash(leaf_key, leaf_hash, depth) == hash
            {
                return self.lone_leaf_node(leaf_key, leaf_hash, depth);
            }
        }
        Node::opaque(hash, key, depth)
    }
}
