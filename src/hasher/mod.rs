//! Pluggable hash functions for the tree

mod blake;
mod sha;
mod traits;

pub use blake::Blake3Hasher;
pub use sha::Sha256Hasher;
pub use traits::{gen_zero_hashes, TreeHasher};
