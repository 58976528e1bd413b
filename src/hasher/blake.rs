//! BLAKE3 tree hasher

use super::TreeHasher;
use crate::model::{Hash, LeafValue};

const LEAF_PREFIX: u8 = 0x00;
const INTERNAL_PREFIX: u8 = 0x01;

/// BLAKE3 with a one-byte domain prefix per mode
#[derive(Clone, Copy, Debug, Default)]
pub struct Blake3Hasher;

impl TreeHasher for Blake3Hasher {
    fn hash_leaf(&self, value: &LeafValue) -> Hash {
        Hash::digest_many(&[&[LEAF_PREFIX], value])
    }

    fn hash_internal(&self, left: &Hash, right: &Hash) -> Hash {
        Hash::digest_many(&[&[INTERNAL_PREFIX], left.as_bytes(), right.as_bytes()])
    }

    fn name(&self) -> &str {
        "blake3"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modes_are_domain_separated() {
        let hasher = Blake3Hasher;
        let half = [7u8; 32];
        let leaf = hasher.hash_leaf(&half);
        let plain = Hash::digest(&half);
        assert_ne!(leaf, plain);

        // An internal preimage never collides with a leaf preimage of the same bytes
        let left = Hash::from_bytes([1u8; 32]);
        let right = Hash::from_bytes([2u8; 32]);
        let mut joined = Vec::new();
        joined.extend_from_slice(left.as_bytes());
        joined.extend_from_slice(right.as_bytes());
        assert_ne!(hasher.hash_internal(&left, &right), Hash::digest(&joined));
    }

    #[test]
    fn test_internal_is_ordered() {
        let hasher = Blake3Hasher;
        let a = Hash::digest(b"a");
        let b = Hash::digest(b"b");
        assert_ne!(hasher.hash_internal(&a, &b), hasher.hash_internal(&b, &a));
    }
}
