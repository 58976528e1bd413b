//! Key and position arithmetic
//!
//! Depth 0 is the root and depth `height - 1` the leaves. The child taken
//! below depth `d` is decided by bit `height - 2 - d` of the leaf key.

use num_bigint::BigUint;
use num_traits::One;

/// Number of leaves of a tree with `height` levels
pub fn num_leaves(height: usize) -> BigUint {
    BigUint::one() << (height - 1)
}

/// Whether `key` lies below the left child of its ancestor at `depth`
pub fn is_left(key: &BigUint, depth: usize, height: usize) -> bool {
    !key.bit((height - 2 - depth) as u64)
}

/// Position key of the ancestor of `key` at `depth`
pub fn prefix(key: &BigUint, depth: usize, height: usize) -> BigUint {
    key >> (height - 1 - depth)
}

/// Position key of the node beside the ancestor of `key` at `depth`
pub fn sibling_prefix(key: &BigUint, depth: usize, height: usize) -> BigUint {
    let mut position = prefix(key, depth, height);
    let bit = position.bit(0);
    position.set_bit(0, !bit);
    position
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: u32) -> BigUint {
        BigUint::from(n)
    }

    #[test]
    fn test_is_left_reads_bits_from_the_top() {
        // height 4: three branching levels, key 3 = 0b011
        assert!(is_left(&key(3), 0, 4));
        assert!(!is_left(&key(3), 1, 4));
        assert!(!is_left(&key(3), 2, 4));

        // key 5 = 0b101
        assert!(!is_left(&key(5), 0, 4));
        assert!(is_left(&key(5), 1, 4));
        assert!(!is_left(&key(5), 2, 4));
    }

    #[test]
    fn test_prefix() {
        assert_eq!(prefix(&key(5), 0, 4), key(0));
        assert_eq!(prefix(&key(5), 1, 4), key(1));
        assert_eq!(prefix(&key(5), 2, 4), key(2));
        assert_eq!(prefix(&key(5), 3, 4), key(5));
    }

    #[test]
    fn test_sibling_prefix() {
        assert_eq!(sibling_prefix(&key(5), 3, 4), key(4));
        assert_eq!(sibling_prefix(&key(5), 2, 4), key(3));
        assert_eq!(sibling_prefix(&key(5), 1, 4), key(0));
    }

    #[test]
    fn test_num_leaves_at_full_width() {
        assert_eq!(num_leaves(4), key(8));
        assert_eq!(num_leaves(257).bits(), 257);
    }
}
