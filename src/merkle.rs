//! Merkle tree integrity metadata (`metadata.dat`).
//!
//! Leaves are SHA-1 hashes over `key ‖ value`, one per flushed/compacted
//! record. If the leaf count is odd, the last leaf is duplicated. The tree
//! uses a concrete `(key, value)` leaf type rather than a polymorphic
//! content interface, since there is exactly one leaf kind in practice.
//!
//! [`build_intermediate`] returns as soon as the *current recursion's
//! input slice* has length 2, from inside the reduction loop. This is a
//! known hazard — only trees whose leaf count is a power of two are
//! correctly formed — preserved verbatim rather than silently corrected;
//! see DESIGN.md.

use sha1::{Digest, Sha1};

/// A SHA-1 digest, as used throughout this module.
pub type Hash20 = [u8; 20];

/// A Merkle tree over the `(key, value)` leaves of one SSTable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    root: Hash20,
    leaves: Vec<Hash20>,
}

fn sha1_hash(data: &[u8]) -> Hash20 {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hashes one `(key, value)` leaf: `SHA1(key ‖ value)`.
fn leaf_hash(key: &str, value: &[u8]) -> Hash20 {
    let mut buf = Vec::with_capacity(key.len() + value.len());
    buf.extend_from_slice(key.as_bytes());
    buf.extend_from_slice(value);
    sha1_hash(&buf)
}

/// Reduces one level of the tree to its parent level, preserving a
/// deliberate quirk: when the slice passed to *this* call has exactly two
/// elements, the function returns immediately after hashing that single
/// pair instead of falling through to the recursive call below. For
/// power-of-two leaf counts this never diverges from plain pairwise
/// reduction; other leaf counts inherit whatever this construction
/// produces.
fn build_intermediate(level: &[Hash20]) -> Hash20 {
    let mut parents = Vec::with_capacity(level.len().div_ceil(2));
    let mut i = 0;
    while i < level.len() {
        let left = i;
        let right = if i + 1 == level.len() { i } else { i + 1 };
        let mut combined = Vec::with_capacity(40);
        combined.extend_from_slice(&level[left]);
        combined.extend_from_slice(&level[right]);
        let parent = sha1_hash(&combined);
        parents.push(parent);
        if level.len() == 2 {
            return parent;
        }
        i += 2;
    }
    build_intermediate(&parents)
}

impl MerkleTree {
    /// Builds a tree over `entries` (in the order given — typically
    /// ascending key order from a flush or merge).
    ///
    /// Returns `None` if `entries` is empty.
    pub fn build(entries: &[(String, Vec<u8>)]) -> Option<Self> {
        if entries.is_empty() {
            return None;
        }
        let mut leaves: Vec<Hash20> = entries
            .iter()
            .map(|(k, v)| leaf_hash(k, v))
            .collect();
        if leaves.len() % 2 == 1 {
            leaves.push(*leaves.last().unwrap());
        }
        let root = if leaves.len() == 1 {
            leaves[0]
        } else {
            build_intermediate(&leaves)
        };
        Some(MerkleTree { root, leaves })
    }

    /// The tree's root hash.
    pub fn root(&self) -> Hash20 {
        self.root
    }

    /// The (possibly duplicated) leaf hashes, in construction order.
    pub fn leaves(&self) -> &[Hash20] {
        &self.leaves
    }

    /// Serializes the root hash. Parent back-links are omitted, so only
    /// the root is persisted — sufficient to detect corruption of the
    /// emitted content without re-deriving the whole tree on read.
    pub fn serialize(&self) -> Vec<u8> {
        self.root.to_vec()
    }

    /// Deserializes a root hash written by [`MerkleTree::serialize`].
    pub fn deserialize(bytes: &[u8]) -> Option<Hash20> {
        bytes.get(..20)?.try_into().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_has_no_tree() {
        assert!(MerkleTree::build(&[]).is_none());
    }

    #[test]
    fn single_leaf_is_its_own_root() {
        let entries = vec![("a".to_string(), b"1".to_vec())];
        let tree = MerkleTree::build(&entries).unwrap();
        assert_eq!(tree.root(), leaf_hash("a", b"1"));
    }

    #[test]
    fn power_of_two_leaves_build_a_full_tree() {
        let entries: Vec<_> = (0..4)
            .map(|i| (format!("k{i}"), vec![i as u8]))
            .collect();
        let tree = MerkleTree::build(&entries).unwrap();
        assert_eq!(tree.leaves().len(), 4);
        // deterministic: rebuilding from the same entries gives the same root
        let tree2 = MerkleTree::build(&entries).unwrap();
        assert_eq!(tree.root(), tree2.root());
    }

    #[test]
    fn odd_leaf_count_duplicates_last_leaf() {
        let entries: Vec<_> = (0..3)
            .map(|i| (format!("k{i}"), vec![i as u8]))
            .collect();
        let tree = MerkleTree::build(&entries).unwrap();
        assert_eq!(tree.leaves().len(), 4);
        assert_eq!(tree.leaves()[2], tree.leaves()[3]);
    }

    #[test]
    fn round_trips_root_through_serialization() {
        let entries = vec![("a".to_string(), b"1".to_vec()), ("b".to_string(), b"2".to_vec())];
        let tree = MerkleTree::build(&entries).unwrap();
        let bytes = tree.serialize();
        let restored = MerkleTree::deserialize(&bytes).unwrap();
        assert_eq!(restored, tree.root());
    }
}
