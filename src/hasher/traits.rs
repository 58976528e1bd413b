//! Hash function trait definition

use crate::model::{Hash, LeafValue};

/// Two-mode hash function used to build the tree
///
/// Implementations must frame leaf and internal preimages differently so a
/// leaf hash can never be mistaken for an internal node hash.
pub trait TreeHasher: Send + Sync {
    /// Hash a leaf payload
    fn hash_leaf(&self, value: &LeafValue) -> Hash;

    /// Hash two child digests into their parent
    fn hash_internal(&self, left: &Hash, right: &Hash) -> Hash;

    /// Get the hash function name
    fn name(&self) -> &str;
}

impl<T: TreeHasher + ?Sized> TreeHasher for Box<T> {
    fn hash_leaf(&self, value: &LeafValue) -> Hash {
        (**self).hash_leaf(value)
    }

    fn hash_internal(&self, left: &Hash, right: &Hash) -> Hash {
        (**self).hash_internal(left, right)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Build the zero-hash table for a tree of `height` levels
///
/// Entry `d` is the hash of an entirely empty subtree rooted at depth `d`:
/// the last entry is the hash of the empty leaf and entry 0 is the root of an
/// empty tree.
pub fn gen_zero_hashes<H: TreeHasher + ?Sized>(
    hasher: &H,
    height: usize,
    empty_leaf: &LeafValue,
) -> Vec<Hash> {
    let mut zero_hashes = vec![Hash::ZERO; height];
    let mut current = hasher.hash_leaf(empty_leaf);

    for item in zero_hashes.iter_mut().rev() {
        *item = current;
        current = hasher.hash_internal(&current, &current);
    }

    zero_hashes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::Blake3Hasher;

    #[test]
    fn test_zero_hashes_bottom_up() {
        let hasher = Blake3Hasher;
        let empty_leaf = [0u8; 32];
        let zeros = gen_zero_hashes(&hasher, 4, &empty_leaf);

        let level3 = hasher.hash_leaf(&empty_leaf);
        let level2 = hasher.hash_internal(&level3, &level3);
        let level1 = hasher.hash_internal(&level2, &level2);
        let level0 = hasher.hash_internal(&level1, &level1);

        assert_eq!(zeros, vec![level0, level1, level2, level3]);
    }

    #[test]
    fn test_zero_hashes_depend_on_empty_leaf() {
        let hasher = Blake3Hasher;
        let a = gen_zero_hashes(&hasher, 3, &[0u8; 32]);
        let b = gen_zero_hashes(&hasher, 3, &[1u8; 32]);
        assert_ne!(a[0], b[0]);
    }

    #[test]
    fn test_boxed_hasher_delegates() {
        let boxed: Box<dyn TreeHasher> = Box::new(Blake3Hasher);
        let value = [5u8; 32];
        assert_eq!(boxed.hash_leaf(&value), Blake3Hasher.hash_leaf(&value));
        assert_eq!(boxed.name(), "blake3");
    }
}
