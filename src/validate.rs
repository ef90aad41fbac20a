//! Structural validation.
//!
//! Walks a whole tree checking every invariant the rebalancing protocol is
//! supposed to maintain: fan-out bounds for root and non-root nodes of
//! both kinds, strictly increasing keys, separator consistency (every key
//! of a subtree lies inside the half-open window its parents carved out
//! for it), uniform leaf depth, and agreement between the handle's entry
//! count and the entries actually stored. The walk is read-only and O(N);
//! it exists for tests and debugging, and any failure it reports is a bug
//! in the tree itself.

use thiserror::Error;

use crate::node::{Node, NodeRef};
use crate::tree::BpTree;

/// A structural invariant the tree failed to uphold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A leaf holds an entry count outside its permitted bounds.
    #[error("leaf holds {size} entries, outside {minimum}..={maximum}")]
    LeafSize {
        /// Entries found in the leaf.
        size: usize,
        /// Smallest permitted entry count for this leaf.
        minimum: usize,
        /// Largest permitted entry count for this leaf.
        maximum: usize,
    },

    /// An interior node holds a child count outside its permitted bounds.
    #[error("interior node has {children} children, outside {minimum}..={maximum}")]
    InteriorSize {
        /// Children found in the node.
        children: usize,
        /// Smallest permitted child count for this node.
        minimum: usize,
        /// Largest permitted child count for this node.
        maximum: usize,
    },

    /// A leaf's key and value sequences have different lengths.
    #[error("leaf has {keys} keys but {values} values")]
    LeafArity {
        /// Keys found in the leaf.
        keys: usize,
        /// Values found in the leaf.
        values: usize,
    },

    /// An interior node's child count is not one more than its key count.
    #[error("interior node has {keys} keys but {children} children")]
    InteriorArity {
        /// Separator keys found in the node.
        keys: usize,
        /// Children found in the node.
        children: usize,
    },

    /// Keys within a single node are not strictly increasing.
    #[error("keys within a node are not strictly increasing")]
    KeyOrder,

    /// A key lies outside the separator window of the subtree holding it.
    #[error("a key escapes the separator window of its subtree")]
    SeparatorWindow,

    /// A leaf was found at a depth different from the tree's height.
    #[error("leaf found at depth {found}, expected {expected}")]
    LeafDepth {
        /// Depth at which the leaf was encountered.
        found: usize,
        /// Height recorded on the tree handle.
        expected: usize,
    },

    /// The handle's entry count disagrees with the stored entries.
    #[error("handle records {recorded} entries but leaves hold {counted}")]
    EntryCount {
        /// Count carried on the tree handle.
        recorded: usize,
        /// Entries actually found in the leaves.
        counted: usize,
    },
}

/// Checks every structural invariant of `tree`.
pub(crate) fn validate_tree<K: Ord, V>(tree: &BpTree<K, V>) -> Result<(), ValidationError> {
    let mut counted = 0;
    check_node(
        &tree.root,
        tree.order,
        0,
        tree.depth,
        None,
        None,
        true,
        &mut counted,
    )?;
    if counted != tree.length {
        return Err(ValidationError::EntryCount {
            recorded: tree.length,
            counted,
        });
    }
    Ok(())
}

/// Keys must be strictly increasing and confined to the half-open window
/// `[lower, upper)` inherited from the separators above.
fn check_keys<K: Ord>(
    keys: &[K],
    lower: Option<&K>,
    upper: Option<&K>,
) -> Result<(), ValidationError> {
    for pair in keys.windows(2) {
        if pair[0] >= pair[1] {
            return Err(ValidationError::KeyOrder);
        }
    }
    for key in keys {
        if lower.is_some_and(|bound| key < bound) || upper.is_some_and(|bound| key >= bound) {
            return Err(ValidationError::SeparatorWindow);
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn check_node<K: Ord, V>(
    node: &NodeRef<K, V>,
    order: usize,
    depth: usize,
    expected_depth: usize,
    lower: Option<&K>,
    upper: Option<&K>,
    is_root: bool,
    counted: &mut usize,
) -> Result<(), ValidationError> {
    match node.as_ref() {
        Node::Leaf(leaf) => {
            if leaf.keys.len() != leaf.values.len() {
                return Err(ValidationError::LeafArity {
                    keys: leaf.keys.len(),
                    values: leaf.values.len(),
                });
            }
            if depth != expected_depth {
                return Err(ValidationError::LeafDepth {
                    found: depth,
                    expected: expected_depth,
                });
            }

            let minimum = if is_root { 0 } else { (order - 1).div_ceil(2) };
            let maximum = order - 1;
            if leaf.size() < minimum || leaf.size() > maximum {
                return Err(ValidationError::LeafSize {
                    size: leaf.size(),
                    minimum,
                    maximum,
                });
            }

            check_keys(&leaf.keys, lower, upper)?;
            *counted += leaf.size();
            Ok(())
        }
        Node::Interior(interior) => {
            if interior.keys.len() + 1 != interior.children.len() {
                return Err(ValidationError::InteriorArity {
                    keys: interior.keys.len(),
                    children: interior.children.len(),
                });
            }

            let minimum = if is_root { 2 } else { order.div_ceil(2) };
            let maximum = order;
            if interior.size() < minimum || interior.size() > maximum {
                return Err(ValidationError::InteriorSize {
                    children: interior.size(),
                    minimum,
                    maximum,
                });
            }

            check_keys(&interior.keys, lower, upper)?;

            for (index, child) in interior.children.iter().enumerate() {
                let child_lower = if index == 0 {
                    lower
                } else {
                    Some(&interior.keys[index - 1])
                };
                let child_upper = if index == interior.keys.len() {
                    upper
                } else {
                    Some(&interior.keys[index])
                };
                check_node(
                    child,
                    order,
                    depth + 1,
                    expected_depth,
                    child_lower,
                    child_upper,
                    false,
                    counted,
                )?;
            }
            Ok(())
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interior::InteriorNode;
    use crate::leaf::LeafNode;
    use crate::node::ReferenceCounter;
    use rstest::rstest;

    fn leaf_ref(order: usize, keys: &[i32]) -> NodeRef<i32, i32> {
        let mut leaf = LeafNode::new(order);
        for key in keys {
            leaf.insert(*key, key * 10);
        }
        ReferenceCounter::new(Node::Leaf(leaf))
    }

    /// Hand-built two-level tree so the tests control every field.
    fn two_level_tree(separators: &[i32], leaves: &[&[i32]]) -> BpTree<i32, i32> {
        let order = 3;
        let mut root = InteriorNode::new(order);
        root.keys.extend_from_slice(separators);
        let mut length = 0;
        for keys in leaves {
            length += keys.len();
            root.children.push(leaf_ref(order, keys));
        }
        BpTree {
            root: ReferenceCounter::new(Node::Interior(root)),
            order,
            length,
            depth: 1,
        }
    }

    #[rstest]
    fn accepts_an_empty_tree() {
        let tree: BpTree<i32, i32> = BpTree::new(3);
        assert_eq!(validate_tree(&tree), Ok(()));
    }

    #[rstest]
    fn accepts_a_well_formed_tree() {
        let tree = two_level_tree(&[3, 5], &[&[1, 2], &[3, 4], &[5, 6]]);
        assert_eq!(validate_tree(&tree), Ok(()));
    }

    #[rstest]
    fn rejects_a_key_outside_its_window() {
        // 9 belongs right of separator 5 but sits in the middle leaf.
        let tree = two_level_tree(&[3, 5], &[&[1, 2], &[3, 9], &[5, 6]]);
        assert_eq!(
            validate_tree(&tree),
            Err(ValidationError::SeparatorWindow)
        );
    }

    #[rstest]
    fn rejects_an_underfull_leaf() {
        let tree = two_level_tree(&[3, 5], &[&[1, 2], &[], &[5, 6]]);
        assert_eq!(
            validate_tree(&tree),
            Err(ValidationError::LeafSize {
                size: 0,
                minimum: 1,
                maximum: 2,
            })
        );
    }

    #[rstest]
    fn rejects_a_wrong_entry_count() {
        let mut tree = two_level_tree(&[3, 5], &[&[1, 2], &[3, 4], &[5, 6]]);
        tree.length = 99;
        assert_eq!(
            validate_tree(&tree),
            Err(ValidationError::EntryCount {
                recorded: 99,
                counted: 6,
            })
        );
    }

    #[rstest]
    fn rejects_a_wrong_depth() {
        let mut tree = two_level_tree(&[3, 5], &[&[1, 2], &[3, 4], &[5, 6]]);
        tree.depth = 2;
        assert_eq!(
            validate_tree(&tree),
            Err(ValidationError::LeafDepth {
                found: 1,
                expected: 2,
            })
        );
    }

    #[rstest]
    fn rejects_a_root_interior_without_enough_children() {
        let tree = two_level_tree(&[], &[&[1, 2]]);
        assert_eq!(
            validate_tree(&tree),
            Err(ValidationError::InteriorSize {
                children: 1,
                minimum: 2,
                maximum: 3,
            })
        );
    }

    #[rstest]
    fn rejects_unsorted_keys() {
        let order = 3;
        let mut leaf = LeafNode::new(order);
        // Bypass ordered insertion to fabricate the corruption.
        leaf.keys.extend_from_slice(&[2, 1]);
        leaf.values.extend_from_slice(&[20, 10]);
        let tree = BpTree {
            root: ReferenceCounter::new(Node::Leaf(leaf)),
            order,
            length: 2,
            depth: 0,
        };
        assert_eq!(validate_tree(&tree), Err(ValidationError::KeyOrder));
    }

    #[rstest]
    fn error_messages_name_the_violation() {
        let error = ValidationError::LeafSize {
            size: 0,
            minimum: 1,
            maximum: 2,
        };
        assert_eq!(format!("{error}"), "leaf holds 0 entries, outside 1..=2");
    }
}
