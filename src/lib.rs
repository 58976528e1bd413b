//! # shortcut_smt
//!
//! A persistent sparse Merkle tree over a key space of up to 2^256 leaves,
//! backed by any asynchronous key-value store.
//!
//! Almost every leaf of such a tree holds the default value, so the tree
//! never stores the empty parts of it. A leaf that is alone in its subtree is
//! kept as a single *shortcut* record instead of a chain of internal nodes;
//! the chain is only materialized, under a proof that the root does not
//! change, once a second leaf needs to diverge from it.
//!
//! ## Core Concepts
//!
//! - **Zero hashes**: the hash of an empty subtree at each depth
//! - **Shortcuts**: single-leaf subtrees stored without their ancestors
//! - **Copy-on-write**: every node is stored under an identifier derived from
//!   its hash and position, so an update writes new records and deletes the
//!   old ones
//! - **Proofs**: root-to-leaf sibling lists that can be verified without a store
//!
//! ## Example
//!
//! ```ignore
//! use shortcut_smt::{Blake3Hasher, MemoryStore, SparseMerkleTree};
//!
//! let mut tree = SparseMerkleTree::create(MemoryStore::new(), Blake3Hasher, 32, None).await?;
//! tree.update(&5u32.into(), [1u8; 32]).await?;
//! let proof = tree.get_merkle_proof(&5u32.into(), &[1u8; 32].into()).await?.unwrap();
//! assert!(tree.verify_merkle_proof(&5u32.into(), &proof));
//! ```

pub mod config;
pub mod hasher;
pub mod model;
pub mod store;
pub mod tree;

mod error;

pub use config::{HasherKind, TreeConfig};
pub use error::{Error, Result};
pub use hasher::{gen_zero_hashes, Blake3Hasher, Sha256Hasher, TreeHasher};
pub use model::{Hash, LeafData, LeafValue, Node, NodeId, NodeKind};
pub use num_bigint::BigUint;
pub use store::{FileStore, KvStore, MemoryStore};
pub use tree::{verify_proof, BatchItem, MerkleProof, SparseMerkleTree};

/// Store file format version
pub const VERSION: u32 = 1;

/// Magic bytes for store file identification
pub const MAGIC: &[u8; 8] = b"SMT_KVS\0";
