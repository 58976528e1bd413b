//! SHA-256 tree hasher

use super::TreeHasher;
use crate::model::{Hash, LeafValue};
use sha2::{Digest, Sha256};

const LEAF_PREFIX: u8 = 0x00;
const INTERNAL_PREFIX: u8 = 0x01;

/// SHA-256 with a one-byte domain prefix per mode
#[derive(Clone, Copy, Debug, Default)]
pub struct Sha256Hasher;

impl Sha256Hasher {
    fn finish(hasher: Sha256) -> Hash {
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        Hash::from_bytes(out)
    }
}

impl TreeHasher for Sha256Hasher {
    fn hash_leaf(&self, value: &LeafValue) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update([LEAF_PREFIX]);
        hasher.update(value);
        Self::finish(hasher)
    }

    fn hash_internal(&self, left: &Hash, right: &Hash) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update([INTERNAL_PREFIX]);
        hasher.update(left.as_bytes());
        hasher.update(right.as_bytes());
        Self::finish(hasher)
    }

    fn name(&self) -> &str {
        "sha256"
    }
}
