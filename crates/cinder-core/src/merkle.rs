//! SHA-256d Merkle tree over transaction hashes.
//!
//! Leaves are the transaction hashes themselves; parent nodes hash the
//! concatenation of their children. A layer with an odd element count
//! duplicates its last entry. The empty tree has a zero root.

use crate::hash::{sha256d, Hash256};

fn node_hash(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(left.as_bytes());
    buf[32..].copy_from_slice(right.as_bytes());
    sha256d(&buf)
}

/// Compute the Merkle root of a slice of transaction hashes.
pub fn merkle_root(hashes: &[Hash256]) -> Hash256 {
    if hashes.is_empty() {
        return Hash256::ZERO;
    }

    let mut layer = hashes.to_vec();
    while layer.len() > 1 {
        let mut next = Vec::with_capacity(layer.len().div_ceil(2));
        for pair in layer.chunks(2) {
            let left = &pair[0];
            let right = pair.get(1).unwrap_or(left);
            next.push(node_hash(left, right));
        }
        layer = next;
    }
    layer[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(seed: u8) -> Hash256 {
        Hash256([seed; 32])
    }

    #[test]
    fn empty_tree_is_zero() {
        assert_eq!(merkle_root(&[]), Hash256::ZERO);
    }

    #[test]
    fn single_leaf_is_its_own_root() {
        assert_eq!(merkle_root(&[h(1)]), h(1));
    }

    #[test]
    fn two_leaves_hash_together() {
        assert_eq!(merkle_root(&[h(1), h(2)]), node_hash(&h(1), &h(2)));
    }

    #[test]
    fn odd_layer_duplicates_last() {
        // With three leaves the third pairs with itself.
        let ab = node_hash(&h(1), &h(2));
        let cc = node_hash(&h(3), &h(3));
        assert_eq!(merkle_root(&[h(1), h(2), h(3)]), node_hash(&ab, &cc));
    }

    #[test]
    fn root_is_order_sensitive() {
        assert_ne!(merkle_root(&[h(1), h(2)]), merkle_root(&[h(2), h(1)]));
    }

    #[test]
    fn deeper_tree_is_deterministic() {
        let leaves: Vec<Hash256> = (0..7).map(h).collect();
        assert_eq!(merkle_root(&leaves), merkle_root(&leaves));
        assert_ne!(merkle_root(&leaves), merkle_root(&leaves[..6]));
    }
}
