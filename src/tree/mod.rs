//! Sparse Merkle tree engine
//!
//! The tree has `height` levels: the root at depth 0 and `2^(height-1)`
//! leaves at depth `height - 1`. Only non-empty structure is stored:
//!
//! - an empty subtree is implied by the zero-hash table and never written
//! - a subtree holding a single leaf is one `Shortcut` record plus the leaf
//! - `Internal` records exist only where two non-empty subtrees meet, or
//!   where a verified proof materialized a path
//!
//! Every record lives under `NodeId(hash, key, depth)`, so changing a node
//! writes a new record and deletes the old one.
//!
//! Mutating operations take `&mut self` and path reads are not isolated from
//! writes made through another tree instance sharing the same store; two
//! instances must never mutate one store concurrently.

mod bits;
mod changeset;
mod materialize;
mod path;
mod proof;
mod update;


pub use bits::{is_left, num_leaves, prefix, sibling_prefix};
pub use proof::{verify_proof, MerkleProof};
pub use update::BatchItem;

use self::changeset::ChangeSet;
use crate::config::TreeConfig;
use crate::hasher::{gen_zero_hashes, TreeHasher};
use crate::model::{Hash, LeafData, LeafValue, Node, NodeId, NodeKind};
use crate::store::KvStore;
use crate::{Error, Result};
use log::{debug, error, trace, warn};
use num_bigint::BigUint;
use num_traits::Zero;

/// A sparse Merkle tree over an asynchronous key-value store
pub struct SparseMerkleTree<S: KvStore, H: TreeHasher> {
    store: S,
    hasher: H,
    height: usize,
    empty_leaf: LeafValue,
    /// `zero_hashes[d]` is the hash of an empty subtree rooted at depth `d`
    zero_hashes: Vec<Hash>,
    root: Node,
}

impl<S: KvStore, H: TreeHasher> SparseMerkleTree<S, H> {
    /// Open a tree of `height` levels with a zero empty leaf
    ///
    /// Without `root_hash` the tree starts empty. See
    /// [`SparseMerkleTree::create_with_config`] for how an existing root is
    /// resolved.
    pub async fn create(
        store: S,
        hasher: H,
        height: usize,
        root_hash: Option<Hash>,
    ) -> Result<Self> {
        Self::create_with_config(store, hasher, &TreeConfig::new(height), root_hash).await
    }

    /// Open a tree with the shape described by `config`
    ///
    /// A `root_hash` whose record is in the store resumes that tree. A root
    /// hash that the store does not know yields an opaque root: the tree can
    /// then only be filled in by importing proofs with
    /// [`SparseMerkleTree::verify_and_store`].
    pub async fn create_with_config(
        store: S,
        hasher: H,
        config: &TreeConfig,
        root_hash: Option<Hash>,
    ) -> Result<Self> {
        config.validate()?;

        let height = config.height;
        let zero_hashes = gen_zero_hashes(&hasher, height, &config.empty_leaf);
        let empty_root = Node::empty(zero_hashes[0], BigUint::zero(), 0);

        let mut tree = SparseMerkleTree {
            store,
            hasher,
            height,
            empty_leaf: config.empty_leaf,
            zero_hashes,
            root: empty_root,
        };

        if let Some(hash) = root_hash {
            if hash != tree.zero_hashes[0] {
                tree.root = match tree.load_node(hash, BigUint::zero(), 0).await? {
                    Some(node) => node,
                    None => {
                        warn!("Root {} not in store, starting from an opaque root", hash);
                        Node::opaque(hash, BigUint::zero(), 0)
                    }
                };
            }
        }

        debug!(
            "Opened tree: height={} hasher={} root={}",
            height,
            tree.hasher.name(),
            tree.root.hash
        );
        Ok(tree)
    }

    // === Accessors ===

    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of leaves, `2^(height-1)`
    pub fn num_leaves(&self) -> BigUint {
        bits::num_leaves(self.height)
    }

    pub fn root_hash(&self) -> Hash {
        self.root.hash
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Hash of an empty subtree rooted at `depth`
    pub fn zero_hash(&self, depth: usize) -> Option<Hash> {
        self.zero_hashes.get(depth).copied()
    }

    pub fn zero_hashes(&self) -> &[Hash] {
        &self.zero_hashes
    }

    pub fn empty_leaf(&self) -> &LeafValue {
        &self.empty_leaf
    }

    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Whether `key` addresses a leaf of this tree
    pub fn contains_key(&self, key: &BigUint) -> bool {
        key.bits() < self.height as u64
    }

    // === Internal helpers ===

    fn is_left(&self, key: &BigUint, depth: usize) -> bool {
        bits::is_left(key, depth, self.height)
    }

    fn prefix(&self, key: &BigUint, depth: usize) -> BigUint {
        bits::prefix(key, depth, self.height)
    }

    fn leaf_depth(&self) -> usize {
        self.height - 1
    }

    fn empty_leaf_hash(&self) -> Hash {
        self.zero_hashes[self.leaf_depth()]
    }

    /// Combine a child hash with its sibling in the order `key` dictates
    fn combine(&self, key: &BigUint, depth: usize, child: Hash, sibling: Hash) -> (Hash, Hash) {
        if self.is_left(key, depth) {
            (child, sibling)
        } else {
            (sibling, child)
        }
    }

    /// Hash of a subtree at `depth` whose only non-default leaf is `leaf_key`
    fn lone_leaf_hash(&self, leaf_key: &BigUint, leaf_hash: &Hash, depth: usize) -> Hash {
        let mut hash = *leaf_hash;
        for d in (depth..self.leaf_depth()).rev() {
            let (left, right) = self.combine(leaf_key, d, hash, self.zero_hashes[d + 1]);
            hash = self.hasher.hash_internal(&left, &right);
        }
        hash
    }

    /// The record representing a single-leaf subtree at `depth`
    ///
    /// Above the leaf level this is a shortcut; at the leaf level it is the
    /// leaf itself, with its value unknown.
    fn lone_leaf_node(&self, leaf_key: &BigUint, leaf_hash: &Hash, depth: usize) -> Node {
        let key = self.prefix(leaf_key, depth);
        if *leaf_hash == self.empty_leaf_hash() {
            return Node::empty(self.zero_hashes[depth], key, depth);
        }
        if depth == self.leaf_depth() {
            return Node::leaf(*leaf_hash, key, depth, None);
        }
        Node {
            hash: self.lone_leaf_hash(leaf_key, leaf_hash, depth),
            key,
            depth,
            kind: NodeKind::Shortcut {
                leaf_key: leaf_key.clone(),
                leaf_hash: *leaf_hash,
            },
        }
    }

    /// The leaf record for `key` holding `leaf`
    fn leaf_node(&self, key: &BigUint, leaf: &LeafData) -> Node {
        let node = Node::leaf(
            leaf.hash(&self.hasher),
            key.clone(),
            self.leaf_depth(),
            leaf.value().copied(),
        );
        self.normalize(node)
    }

    /// Replace a node that hashes to its depth's zero hash with `Empty`
    fn normalize(&self, node: Node) -> Node {
        if !node.is_empty() && node.hash == self.zero_hashes[node.depth] {
            return Node::empty(node.hash, node.key, node.depth);
        }
        node
    }

    /// Load the node stored under `(hash, key, depth)` and check it against `hash`
    async fn load_node(&self, hash: Hash, key: BigUint, depth: usize) -> Result<Option<Node>> {
        let id = NodeId::new(&hash, &key, depth);
        let bytes = match self.store.get(id.as_bytes()).await? {
            Some(bytes) => bytes,
            None => {
                trace!("No node at depth {} for {}", depth, hash.short());
                return Ok(None);
            }
        };

        let node = Node::decode(hash, key, &bytes)?;
        if node.depth != depth {
            return Err(Error::Corruption(format!(
                "Node {} stored at depth {}, expected {}",
                hash, node.depth, depth
            )));
        }
        self.check_node(&node)?;
        trace!("Loaded {:?} at depth {}", node.kind, depth);
        Ok(Some(node))
    }

    /// Recompute a loaded node's hash from its contents
    fn check_node(&self, node: &Node) -> Result<()> {
        let expected = match &node.kind {
            NodeKind::Leaf { value: Some(value) } => Some(self.hasher.hash_leaf(value)),
            NodeKind::Internal { left, right } => Some(self.hasher.hash_internal(left, right)),
            NodeKind::Shortcut {
                leaf_key,
                leaf_hash,
            } => {
                if self.prefix(leaf_key, node.depth) != node.key {
                    return Err(Error::Corruption(format!(
                        "Shortcut {} points outside its subtree",
                        node.hash
                    )));
                }
                Some(self.lone_leaf_hash(leaf_key, leaf_hash, node.depth))
            }
            NodeKind::Empty => {
                return Err(Error::Corruption(format!(
                    "Empty node stored under {}",
                    node.hash
                )))
            }
            NodeKind::Leaf { value: None } | NodeKind::Opaque => None,
        };

        match expected {
            Some(hash) if hash != node.hash => Err(Error::Corruption(format!(
                "Node stored under {} hashes to {}",
                node.hash, hash
            ))),
            _ => Ok(()),
        }
    }

    /// Land `changes` and move the root to `root`
    ///
    /// Once the root has moved the operation has happened, so a failed prune
    /// is logged and leaves unreachable records behind instead of failing it.
    async fn commit(&mut self, changes: ChangeSet, root: Node) -> Result<()> {
        changes.write(&self.store).await?;
        self.root = root;
        if let Err(err) = changes.prune(&self.store).await {
            warn!(
                "Superseded records left in store under root {}: {}",
                self.root.hash.short(),
                err
            );
        }
        Ok(())
    }

    fn invariant(&self, message: String) -> Error {
        error!("{}", message);
        Error::Invariant(message)
    }
}
