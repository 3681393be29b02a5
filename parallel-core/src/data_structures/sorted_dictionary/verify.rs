use std::cmp::Ordering as KeyOrdering;
use std::sync::atomic::Ordering;

use thiserror::Error;

use super::SortedDictionary;
use super::node::{DUMMY_COUNT, ROOT_HOLDER};
use crate::data_structures::internal::NIL;

/// Broken red-black or bookkeeping property found by
/// [`SortedDictionary::verify`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("dummy {index} is not linked as a black chain")]
    DummyChain { index: u32 },

    #[error("root {index} is red")]
    RedRoot { index: u32 },

    #[error("node {index} has parent {actual}, expected {expected}")]
    ParentLink { index: u32, expected: u32, actual: u32 },

    #[error("node {index} is an internal node without an entry")]
    MissingEntry { index: u32 },

    #[error("leaf {index} carries an entry or a right child")]
    MalformedLeaf { index: u32 },

    #[error("keys of node {index} are out of order")]
    KeyOrder { index: u32 },

    #[error("red node {index} has a red child")]
    RedRed { index: u32 },

    #[error("subtrees of node {index} have black heights {left} and {right}")]
    BlackHeight { index: u32, left: usize, right: usize },

    #[error("node {index} is still flagged")]
    Flagged { index: u32 },

    #[error("node {index} still carries marker {marker}")]
    Marked { index: u32, marker: usize },

    #[error("counted {counted} entries, length is {len}")]
    Count { counted: usize, len: usize },
}

/// Shape of a tree that passed [`SortedDictionary::verify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeShape {
    pub len: usize,

    /// Black nodes on every path from the root down to a leaf, leaf included.
    pub black_height: usize,

    /// Internal nodes on the longest root-to-leaf path.
    pub height: usize,
}

// Per-subtree result of the recursive walk.
struct Subtree {
    count: usize,
    black_height: usize,
    height: usize,
}

impl<K, V> SortedDictionary<K, V> {
    /// Checks the whole tree. Needs exclusive access, so it can only observe a
    /// quiescent state.
    ///
    pub fn verify(&mut self) -> Result<TreeShape, InvariantViolation> {
        for index in 0..DUMMY_COUNT as u32 {
            let node = self.node(index);
            let expected_parent = if index == 0 { NIL } else { index - 1 };

            if node.is_red() || node.right() != NIL || node.parent() != expected_parent {
                return Err(InvariantViolation::DummyChain { index });
            }
            if index < ROOT_HOLDER && node.left() != index + 1 {
                return Err(InvariantViolation::DummyChain { index });
            }
            self.check_idle(index)?;
        }

        let root = self.node(ROOT_HOLDER).left();
        if self.node(root).is_red() {
            return Err(InvariantViolation::RedRoot { index: root });
        }

        let subtree = self.verify_subtree(root, ROOT_HOLDER, None, None)?;

        let len = self.len.load(Ordering::Relaxed);
        if subtree.count != len {
            return Err(InvariantViolation::Count {
                counted: subtree.count,
                len,
            });
        }

        Ok(TreeShape {
            len,
            black_height: subtree.black_height,
            height: subtree.height,
        })
    }

    fn verify_subtree(
        &self,
        index: u32,
        parent: u32,
        lower: Option<&K>,
        upper: Option<&K>,
    ) -> Result<Subtree, InvariantViolation> {
        let node = self.node(index);
        self.check_idle(index)?;

        if node.parent() != parent {
            return Err(InvariantViolation::ParentLink {
                index,
                expected: parent,
                actual: node.parent(),
            });
        }

        // Exclusive access: no flag needed to read entries.
        let entry = unsafe { node.entry() };

        if node.is_leaf() {
            if entry.is_some() || node.right() != NIL {
                return Err(InvariantViolation::MalformedLeaf { index });
            }
            return Ok(Subtree {
                count: 0,
                black_height: 1,
                height: 0,
            });
        }

        let Some((key, _)) = entry else {
            return Err(InvariantViolation::MissingEntry { index });
        };

        let above_lower = lower.is_none_or(|low| (self.compare)(low, key) == KeyOrdering::Less);
        let below_upper = upper.is_none_or(|high| (self.compare)(key, high) == KeyOrdering::Less);
        if !above_lower || !below_upper {
            return Err(InvariantViolation::KeyOrder { index });
        }

        let (left, right) = (node.left(), node.right());
        if node.is_red() && (self.node(left).is_red() || self.node(right).is_red()) {
            return Err(InvariantViolation::RedRed { index });
        }

        let l = self.verify_subtree(left, index, lower, Some(key))?;
        let r = self.verify_subtree(right, index, Some(key), upper)?;

        if l.black_height != r.black_height {
            return Err(InvariantViolation::BlackHeight {
                index,
                left: l.black_height,
                right: r.black_height,
            });
        }

        Ok(Subtree {
            count: l.count + r.count + 1,
            black_height: l.black_height + usize::from(!node.is_red()),
            height: l.height.max(r.height) + 1,
        })
    }

    fn check_idle(&self, index: u32) -> Result<(), InvariantViolation> {
        let node = self.node(index);

        if node.is_flagged() {
            return Err(InvariantViolation::Flagged { index });
        }

        match node.marker() {
            0 => Ok(()),
            marker => Err(InvariantViolation::Marked { index, marker }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tree_shape() {
        let mut dict: SortedDictionary<u8, ()> = SortedDictionary::new();
        let shape = dict.verify().unwrap();

        assert_eq!(
            shape,
            TreeShape {
                len: 0,
                black_height: 1,
                height: 0
            }
        );
    }

    #[test]
    fn test_ascending_inserts_stay_balanced() {
        let mut dict = SortedDictionary::new();
        for k in 0..1024u32 {
            dict.insert(k, ());
        }

        let shape = dict.verify().unwrap();
        assert_eq!(shape.len, 1024);
        // Red-black bound: height <= 2 * log2(n + 1).
        assert!(shape.height <= 20, "height {}", shape.height);
    }

    #[test]
    fn test_detects_stray_flag() {
        let mut dict = SortedDictionary::new();
        dict.insert(1, 1);

        let root = dict.node(ROOT_HOLDER).left();
        assert!(dict.node(root).try_flag());
        assert_eq!(dict.verify(), Err(InvariantViolation::Flagged { index: root }));

        dict.node(root).unflag();
        assert!(dict.verify().is_ok());
    }
}
