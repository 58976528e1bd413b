//! Tree node types and their stored representation

use crate::hasher::TreeHasher;
use crate::model::Hash;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// Payload of a materialized leaf
pub type LeafValue = [u8; 32];

/// What a caller knows about a leaf: its value, or only its hash
///
/// `Hash` is used when the preimage is intentionally withheld; the tree then
/// stores the leaf without a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeafData {
    Value(#[serde(with = "hex::serde")] LeafValue),
    Hash(Hash),
}

impl LeafData {
    /// The leaf hash this data commits to
    pub fn hash<H: TreeHasher + ?Sized>(&self, hasher: &H) -> Hash {
        match self {
            LeafData::Value(value) => hasher.hash_leaf(value),
            LeafData::Hash(hash) => *hash,
        }
    }

    /// The value, if known
    pub fn value(&self) -> Option<&LeafValue> {
        match self {
            LeafData::Value(value) => Some(value),
            LeafData::Hash(_) => None,
        }
    }
}

impl From<LeafValue> for LeafData {
    fn from(value: LeafValue) -> Self {
        LeafData::Value(value)
    }
}

/// Shape of a node
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// A subtree holding only default leaves; never persisted
    Empty,
    /// A leaf at the bottom level; `value` is absent when only the hash is known
    Leaf { value: Option<LeafValue> },
    /// A materialized internal node
    Internal { left: Hash, right: Hash },
    /// A subtree containing exactly one non-default leaf, stored without any
    /// of the intermediate nodes between it and the leaf
    Shortcut { leaf_key: BigUint, leaf_hash: Hash },
    /// A subtree known only by its hash, stored from a verified proof
    Opaque,
}

/// A node at a given position of the tree
///
/// `key` is the position prefix: the leaf key of any leaf below this node,
/// shifted right by `height - 1 - depth` bits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub hash: Hash,
    pub key: BigUint,
    pub depth: usize,
    pub kind: NodeKind,
}

impl Node {
    pub fn empty(hash: Hash, key: BigUint, depth: usize) -> Self {
        Node {
            hash,
            key,
            depth,
            kind: NodeKind::Empty,
        }
    }

    pub fn leaf(hash: Hash, key: BigUint, depth: usize, value: Option<LeafValue>) -> Self {
        Node {
            hash,
            key,
            depth,
            kind: NodeKind::Leaf { value },
        }
    }

    pub fn internal(hash: Hash, key: BigUint, depth: usize, left: Hash, right: Hash) -> Self {
        Node {
            hash,
            key,
            depth,
            kind: NodeKind::Internal { left, right },
        }
    }

    pub fn opaque(hash: Hash, key: BigUint, depth: usize) -> Self {
        Node {
            hash,
            key,
            depth,
            kind: NodeKind::Opaque,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.kind, NodeKind::Empty)
    }

    pub fn is_internal(&self) -> bool {
        matches!(self.kind, NodeKind::Internal { .. })
    }

    /// Child hashes of an internal node
    pub fn children(&self) -> Option<(Hash, Hash)> {
        match self.kind {
            NodeKind::Internal { left, right } => Some((left, right)),
            _ => None,
        }
    }

    /// Leaf payload of a leaf node
    pub fn leaf_data(&self) -> Option<LeafData> {
        match self.kind {
            NodeKind::Leaf { value: Some(value) } => Some(LeafData::Value(value)),
            NodeKind::Leaf { value: None } => Some(LeafData::Hash(self.hash)),
            _ => None,
        }
    }

    /// Storage identifier of this node
    pub fn id(&self) -> NodeId {
        NodeId::new(&self.hash, &self.key, self.depth)
    }

    /// Serialize the stored part of this node
    pub fn encode(&self) -> crate::Result<Vec<u8>> {
        let record = StoredNode {
            depth: self.depth as u32,
            kind: self.kind.clone(),
        };
        Ok(bincode::serialize(&record)?)
    }

    /// Rebuild a node from the record stored under `NodeId(hash, key, depth)`
    pub fn decode(hash: Hash, key: BigUint, bytes: &[u8]) -> crate::Result<Self> {
        let record: StoredNode = bincode::deserialize(bytes)?;
        Ok(Node {
            hash,
            key,
            depth: record.depth as usize,
            kind: record.kind,
        })
    }
}

/// The record body written to the store; hash and key live in the identifier
#[derive(Serialize, Deserialize)]
struct StoredNode {
    depth: u32,
    kind: NodeKind,
}

/// Storage identifier derived from a node's hash and position
///
/// A position is the pair (depth, prefix): prefixes alone repeat across
/// depths. Updating a node always yields a new identifier, so writes are
/// copy-on-write and the superseded identifier must be deleted explicitly.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NodeId(Hash);

impl NodeId {
    pub fn new(hash: &Hash, key: &BigUint, depth: usize) -> Self {
        NodeId(Hash::digest_many(&[
            b"smt-node",
            &(depth as u32).to_be_bytes(),
            hash.as_bytes(),
            &key.to_bytes_be(),
        ]))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}
