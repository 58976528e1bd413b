//! Leaf updates

use super::changeset::ChangeSet;
use super::path::PathEnd;
use super::{MerkleProof, SparseMerkleTree};
use crate::hasher::TreeHasher;
use crate::model::{Hash, LeafData, LeafValue, Node};
use crate::store::KvStore;
use crate::Result;
use log::{debug, warn};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// One step of a batch: prove the old leaf, then write the new one
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    /// Proof of the leaf's current value, against the pre-batch root
    pub proof: MerkleProof,
    /// Value to write at `proof.key`
    pub new_leaf: LeafData,
}

impl<S: KvStore, H: TreeHasher> SparseMerkleTree<S, H> {
    /// Write `value` at `key`
    pub async fn update(&mut self, key: &BigUint, value: LeafValue) -> Result<bool> {
        self.update_leaf(key, LeafData::Value(value)).await
    }

    /// Write a leaf whose value is withheld; only `leaf_hash` is stored
    pub async fn update_leaf_hash(&mut self, key: &BigUint, leaf_hash: Hash) -> Result<bool> {
        self.update_leaf(key, LeafData::Hash(leaf_hash)).await
    }

    /// Write `leaf` at `key` and re-hash the path up to the root
    ///
    /// Returns `false`, leaving the tree as it was, when `key` is out of
    /// range or when room for the leaf cannot be made under a proof against
    /// the current root (the key lies in an opaque subtree). Writing the
    /// empty leaf value clears the leaf.
    pub async fn update_leaf(&mut self, key: &BigUint, leaf: LeafData) -> Result<bool> {
        if !self.contains_key(key) {
            debug!("Key {} out of range", key);
            return Ok(false);
        }

        let mut path = self.get_nodes_in_path(key).await?;
        let mut end = self.classify(key, &path)?;

        if matches!(end, PathEnd::Diverged { .. } | PathEnd::Opaque) {
            if !self
                .verify_and_store_partially_empty_path(key, None)
                .await?
            {
                debug!("Could not make room for key {}", key);
                return Ok(false);
            }
            path = self.get_nodes_in_path(key).await?;
            end = self.classify(key, &path)?;
            if end != PathEnd::EmptyBranch {
                return Err(self.invariant(format!(
                    "Materialized path to key {} ends in {:?}",
                    key, end
                )));
            }
        }

        let mut changes = ChangeSet::new();
        let leaf_hash = leaf.hash(&self.hasher);
        let leaf_node = self.leaf_node(key, &leaf);

        // The position the new single-leaf subtree takes, and the internal
        // nodes above it that need re-hashing
        let terminal = match path.pop() {
            Some(node) => node,
            None => return Err(self.invariant(format!("Empty path for key {}", key))),
        };
        let depth = match end {
            PathEnd::Leaf => {
                let depth = terminal.depth;
                changes.delete(terminal);
                depth
            }
            PathEnd::Shortcut {
                leaf_hash: old_leaf_hash,
            } => {
                let depth = terminal.depth;
                changes.delete(terminal);
                changes.delete(Node::leaf(
                    old_leaf_hash,
                    key.clone(),
                    self.leaf_depth(),
                    None,
                ));
                depth
            }
            PathEnd::EmptyBranch if terminal.is_empty() => terminal.depth,
            PathEnd::EmptyBranch => {
                let depth = terminal.depth + 1;
                path.push(terminal);
                depth
            }
            PathEnd::Diverged { .. } | PathEnd::Opaque => {
                return Err(self.invariant(format!("Unresolved path to key {}", key)));
            }
        };

        let replacement = if depth == self.leaf_depth() {
            leaf_node
        } else {
            changes.put(leaf_node);
            self.lone_leaf_node(key, &leaf_hash, depth)
        };
        changes.put(replacement.clone());

        let mut child = replacement;
        for ancestor in path.into_iter().rev() {
            let (left, right) = match ancestor.children() {
                Some(children) if ancestor.depth + 1 == child.depth => children,
                _ => {
                    return Err(self.invariant(format!(
                        "Non-internal ancestor at depth {} above depth {} for key {}",
                        ancestor.depth, child.depth, key
                    )))
                }
            };
            let (left, right) = if self.is_left(key, ancestor.depth) {
                (child.hash, right)
            } else {
                (left, child.hash)
            };
            let hash = self.hasher.hash_internal(&left, &right);
            let node = self.normalize(Node::internal(
                hash,
                ancestor.key.clone(),
                ancestor.depth,
                left,
                right,
            ));
            changes.delete(ancestor);
            changes.put(node.clone());
            child = node;
        }

        if child.depth != 0 {
            return Err(self.invariant(format!(
                "Re-hashed path for key {} tops out at depth {}",
                key, child.depth
            )));
        }

        self.commit(changes, child).await?;

        debug!("Updated key {}: root {}", key, self.root.hash.short());
        Ok(true)
    }

    /// Apply a batch of proven updates in order
    ///
    /// Every old-value proof must first verify against the pre-batch root;
    /// if any does not, nothing is written. Items are then applied one by
    /// one, each materializing its proof and writing its new leaf. The batch
    /// is not atomic as a whole: if an item fails at that stage the call
    /// returns `false` and the items before it stay applied.
    pub async fn batch_update(&mut self, items: &[BatchItem]) -> Result<bool> {
        for (index, item) in items.iter().enumerate() {
            if !self.verify_merkle_proof(&item.proof.key, &item.proof) {
                debug!(
                    "Batch item {} (key {}) does not verify against root {}",
                    index,
                    item.proof.key,
                    self.root.hash.short()
                );
                return Ok(false);
            }
        }

        for (index, item) in items.iter().enumerate() {
            let key = &item.proof.key;

            // Once earlier items have moved the root, the old proof can only
            // be honoured if the tree still holds the proven value
            let proven = self.verify_and_store(&item.proof).await?
                || self.get_merkle_proof(key, &item.proof.leaf).await?.is_some();
            if !proven {
                warn!(
                    "Batch item {} (key {}) no longer matches the tree; {} item(s) already applied",
                    index, key, index
                );
                return Ok(false);
            }

            if !self.update_leaf(key, item.new_leaf).await? {
                warn!(
                    "Batch item {} (key {}) could not be written; {} item(s) already applied",
                    index, key, index
                );
                return Ok(false);
            }
        }

        Ok(true)
    }
}
