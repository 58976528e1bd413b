//! Path traversal and leaf reads

use super::{bits, SparseMerkleTree};
use crate::hasher::TreeHasher;
use crate::model::{Hash, LeafData, Node, NodeKind};
use crate::store::KvStore;
use crate::{Error, Result};
use log::{debug, warn};
use num_bigint::BigUint;

/// How the stored path to a leaf ends
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum PathEnd {
    /// The leaf record for the key itself
    Leaf,
    /// A shortcut holding the key's leaf
    Shortcut { leaf_hash: Hash },
    /// An empty root, or an internal node whose child toward the key is empty
    EmptyBranch,
    /// A shortcut holding some other leaf
    Diverged { leaf_key: BigUint, leaf_hash: Hash },
    /// A subtree known only by its hash
    Opaque,
}

impl<S: KvStore, H: TreeHasher> SparseMerkleTree<S, H> {
    /// Stored nodes from the root down toward the leaf at `key`
    ///
    /// The walk stops at the first node that is not internal, or where the
    /// child toward `key` is empty or missing. A result shorter than
    /// `height` therefore means the leaf is held by a shortcut, is default,
    /// or lies below an opaque subtree. Out-of-range keys yield no nodes.
    pub async fn get_nodes_in_path(&self, key: &BigUint) -> Result<Vec<Node>> {
        if !self.contains_key(key) {
            return Ok(Vec::new());
        }

        let mut path = Vec::with_capacity(self.height);
        let mut current = self.root.clone();
        loop {
            let depth = current.depth;
            let child_hash = match current.kind {
                NodeKind::Internal { left, right } => {
                    Some(if self.is_left(key, depth) { left } else { right })
                }
                _ => None,
            };
            path.push(current);

            let Some(child_hash) = child_hash else { break };
            if child_hash == self.zero_hashes[depth + 1] {
                break;
            }

            match self
                .load_node(child_hash, self.prefix(key, depth + 1), depth + 1)
                .await?
            {
                Some(child) => current = child,
                None => {
                    warn!(
                        "Child {} at depth {} missing from store",
                        child_hash,
                        depth + 1
                    );
                    break;
                }
            }
        }

        Ok(path)
    }

    /// Classify the end of a path returned by `get_nodes_in_path`
    pub(crate) fn classify(&self, key: &BigUint, path: &[Node]) -> Result<PathEnd> {
        let terminal = path
            .last()
            .ok_or_else(|| self.invariant(format!("Empty path for key {}", key)))?;

        match &terminal.kind {
            NodeKind::Empty => Ok(PathEnd::EmptyBranch),
            NodeKind::Leaf { .. } => {
                if terminal.depth == self.leaf_depth() && terminal.key == *key {
                    Ok(PathEnd::Leaf)
                } else {
                    Err(Error::Corruption(format!(
                        "Leaf {} found on the path to key {}",
                        terminal.key, key
                    )))
                }
            }
            NodeKind::Shortcut {
                leaf_key,
                leaf_hash,
            } => {
                if leaf_key == key {
                    Ok(PathEnd::Shortcut {
                        leaf_hash: *leaf_hash,
                    })
                } else {
                    Ok(PathEnd::Diverged {
                        leaf_key: leaf_key.clone(),
                        leaf_hash: *leaf_hash,
                    })
                }
            }
            NodeKind::Opaque => Ok(PathEnd::Opaque),
            NodeKind::Internal { left, right } => {
                let depth = terminal.depth;
                let child = if self.is_left(key, depth) { left } else { right };
                if *child == self.zero_hashes[depth + 1] {
                    Ok(PathEnd::EmptyBranch)
                } else {
                    Err(Error::Corruption(format!(
                        "Node {} at depth {} references missing child {}",
                        terminal.hash,
                        depth + 1,
                        child
                    )))
                }
            }
        }
    }

    /// Read the leaf at `key`
    ///
    /// Fails with [`Error::StaleRoot`] when `expected_root` is given and is
    /// not the current root. Returns `None` for default leaves and for
    /// leaves inside opaque subtrees.
    pub async fn get_leaf(
        &self,
        key: &BigUint,
        expected_root: Option<&Hash>,
    ) -> Result<Option<LeafData>> {
        if let Some(expected) = expected_root {
            if *expected != self.root.hash {
                return Err(Error::StaleRoot {
                    expected: *expected,
                    actual: self.root.hash,
                });
            }
        }

        let path = self.get_nodes_in_path(key).await?;
        if path.is_empty() {
            return Ok(None);
        }

        match self.classify(key, &path)? {
            PathEnd::Leaf => Ok(path.last().and_then(Node::leaf_data)),
            PathEnd::Shortcut { leaf_hash } => {
                let leaf = self
                    .load_node(leaf_hash, key.clone(), self.leaf_depth())
                    .await?
                    .ok_or_else(|| {
                        Error::Corruption(format!("Shortcut leaf {} missing from store", key))
                    })?;
                Ok(leaf.leaf_data())
            }
            PathEnd::Opaque => {
                debug!("Leaf {} lies in an opaque subtree", key);
                Ok(None)
            }
            PathEnd::EmptyBranch | PathEnd::Diverged { .. } => Ok(None),
        }
    }

    /// Sibling hashes along `path`, ordered root to leaf
    ///
    /// Internal nodes of `path` supply their off-path child. Below the end
    /// of `path` every sibling is taken as empty, except for the one place
    /// where a diverging shortcut's leaf branches off.
    pub(crate) fn siblings_along(
        &self,
        key: &BigUint,
        path: &[Node],
        diverged: Option<(&BigUint, &Hash)>,
    ) -> Vec<Hash> {
        let mut siblings = Vec::with_capacity(self.leaf_depth());
        for node in path {
            if let NodeKind::Internal { left, right } = node.kind {
                siblings.push(if self.is_left(key, node.depth) { right } else { left });
            }
        }

        while siblings.len() < self.leaf_depth() {
            let depth = siblings.len() + 1;
            let sibling = match diverged {
                Some((leaf_key, leaf_hash))
                    if bits::sibling_prefix(key, depth, self.height)
                        == self.prefix(leaf_key, depth) =>
                {
                    self.lone_leaf_hash(leaf_key, leaf_hash, depth)
                }
                _ => self.zero_hashes[depth],
            };
            siblings.push(sibling);
        }

        siblings
    }
}
