//! Persistent B+Tree map with path copying.
//!
//! This module provides [`BpTree`], an immutable ordered map in which every
//! modification returns a new tree while the original stays fully usable.
//!
//! # Overview
//!
//! A `BpTree` of order `m` keeps entries in leaves of up to `m - 1`
//! (key, value) pairs, indexed by interior nodes of up to `m` children.
//! All leaves sit at the same depth, so every operation is O(log N):
//!
//! - O(log N) get
//! - O(log N) insert, in time *and* in allocated nodes
//! - O(log N) remove, likewise
//! - O(1) len, is_empty, order, depth, and cloning a handle
//!
//! # Persistence
//!
//! Updates never mutate a node reachable from a published tree. A
//! modification descends to the target leaf recording the interior
//! ancestors on a [`DescentPath`], rewrites a copy of the leaf, and walks
//! the path back up copying each ancestor once while splicing in the
//! rewritten child. Siblings outside the path are shared by reference
//! between the old and new versions. A leaf grown to `m` entries splits,
//! promoting a separator upward (possibly growing a new root); a leaf
//! shrunk below half full redistributes with a sibling or merges into one
//! (possibly collapsing the root).
//!
//! # Examples
//!
//! ```rust
//! use bptree::BpTree;
//!
//! let empty: BpTree<i32, &str> = BpTree::new(4);
//! let (first, _) = empty.insert(1, "one");
//! let (second, _) = first.insert(2, "two");
//!
//! // Every version remains intact.
//! assert_eq!(empty.len(), 0);
//! assert_eq!(first.len(), 1);
//! assert_eq!(second.len(), 2);
//! assert_eq!(second.get(&1), Some(&"one"));
//! ```

use std::fmt;

use crate::debug::{debug_checks_enabled, invariant};
use crate::interior::InteriorNode;
use crate::key::BptKey;
use crate::leaf::LeafNode;
use crate::node::{Node, NodeRef, ReferenceCounter};
use crate::path::DescentPath;
use crate::validate::{self, ValidationError};

// =============================================================================
// BpTree Definition
// =============================================================================

/// A persistent (immutable) B+Tree map.
///
/// The order is fixed at construction and bounds the fan-out of every
/// node. Handles are cheap to clone and safe to keep across later
/// updates; a handle always observes the version it was created from.
///
/// # Examples
///
/// ```rust
/// use bptree::BpTree;
///
/// let tree: BpTree<i32, &str> = BpTree::new(3);
/// let (tree, inserted) = tree.insert(1, "one");
/// assert!(inserted);
/// assert_eq!(tree.get(&1), Some(&"one"));
/// ```
pub struct BpTree<K, V> {
    pub(crate) root: NodeRef<K, V>,
    pub(crate) order: usize,
    pub(crate) length: usize,
    pub(crate) depth: usize,
}

impl<K, V> BpTree<K, V> {
    /// Creates an empty tree of the given order.
    ///
    /// The order controls the number of separator keys and children in
    /// interior nodes and the number of entries in leaves: nodes fluctuate
    /// between roughly half full and `order - 1` entries. An order of 32
    /// reaches two billion entries within seven levels.
    ///
    /// # Panics
    ///
    /// Panics when `order < 3`; smaller orders cannot satisfy the
    /// half-full bounds.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use bptree::BpTree;
    ///
    /// let tree: BpTree<i32, String> = BpTree::new(32);
    /// assert!(tree.is_empty());
    /// assert_eq!(tree.order(), 32);
    /// ```
    #[must_use]
    pub fn new(order: usize) -> Self {
        assert!(order >= 3, "bptree: order must be at least 3, got {order}");
        Self {
            root: ReferenceCounter::new(Node::Leaf(LeafNode::new(order))),
            order,
            length: 0,
            depth: 0,
        }
    }

    /// Returns the order this tree was constructed with.
    #[inline]
    #[must_use]
    pub const fn order(&self) -> usize {
        self.order
    }

    /// Returns the height of the tree: 0 while the root is a leaf, one
    /// more per interior level.
    #[inline]
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Returns the number of entries.
    ///
    /// # Complexity
    ///
    /// O(1); the count is carried on the handle.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.length
    }

    /// Returns `true` if the tree holds no entries.
    ///
    /// Equivalently, the root is a leaf with no entries; the two
    /// definitions agree on every reachable tree and their agreement is
    /// checked when diagnostics are enabled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let empty_by_count = self.length == 0;
        if debug_checks_enabled() {
            let empty_by_root = match self.root.as_ref() {
                Node::Leaf(leaf) => leaf.size() == 0,
                Node::Interior(_) => false,
            };
            invariant(
                empty_by_count == empty_by_root,
                "entry count and root leaf emptiness disagree",
            );
        }
        empty_by_count
    }

    /// Returns the entry with the smallest key.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use bptree::BpTree;
    ///
    /// let (tree, _) = BpTree::<i32, &str>::new(3).insert(2, "two");
    /// let (tree, _) = tree.insert(1, "one");
    /// assert_eq!(tree.min_entry(), Some((&1, &"one")));
    /// ```
    #[must_use]
    pub fn min_entry(&self) -> Option<(&K, &V)> {
        let mut node = self.root.as_ref();
        loop {
            match node {
                Node::Leaf(leaf) => return leaf.first_entry(),
                Node::Interior(interior) => node = interior.children[0].as_ref(),
            }
        }
    }

    /// Returns the entry with the largest key.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use bptree::BpTree;
    ///
    /// let (tree, _) = BpTree::<i32, &str>::new(3).insert(2, "two");
    /// let (tree, _) = tree.insert(5, "five");
    /// assert_eq!(tree.max_entry(), Some((&5, &"five")));
    /// ```
    #[must_use]
    pub fn max_entry(&self) -> Option<(&K, &V)> {
        let mut node = self.root.as_ref();
        loop {
            match node {
                Node::Leaf(leaf) => return leaf.last_entry(),
                Node::Interior(interior) => {
                    node = interior.children[interior.size() - 1].as_ref();
                }
            }
        }
    }

    /// Observable-sharing equivalence: `true` only when both handles hold
    /// the identical root node, confirmed by a lock-step traversal that
    /// every corresponding child is the identical reference.
    ///
    /// This is a structural-sharing check, not value equality; two trees
    /// built independently from the same entries are *not* equivalent. Use
    /// `==` to compare trees as key-to-value mappings.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use bptree::BpTree;
    ///
    /// let (tree, _) = BpTree::<i32, i32>::new(3).insert(1, 10);
    ///
    /// // Removing an absent key hands back the same version.
    /// let (untouched, removed) = tree.remove(&2);
    /// assert!(removed.is_none());
    /// assert!(tree.equivalent(&untouched));
    ///
    /// // Any real update produces a distinct version.
    /// let (updated, _) = tree.insert(2, 20);
    /// assert!(!tree.equivalent(&updated));
    /// ```
    #[must_use]
    pub fn equivalent(&self, other: &Self) -> bool {
        if !ReferenceCounter::ptr_eq(&self.root, &other.root) {
            return false;
        }
        nodes_identical(&self.root, &other.root)
    }
}

impl<K: BptKey, V: Clone> BpTree<K, V> {
    /// Returns a reference to the value stored for `key`.
    ///
    /// # Complexity
    ///
    /// O(log N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use bptree::BpTree;
    ///
    /// let (tree, _) = BpTree::<i32, &str>::new(3).insert(1, "one");
    /// assert_eq!(tree.get(&1), Some(&"one"));
    /// assert_eq!(tree.get(&2), None);
    /// ```
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        let mut node = self.root.as_ref();
        loop {
            match node {
                Node::Leaf(leaf) => return leaf.get(key),
                Node::Interior(interior) => node = interior.child_for(key).as_ref(),
            }
        }
    }

    /// Inserts an entry, returning the new tree and `true` when the key
    /// was absent. Inserting an existing key replaces its value in the new
    /// version, returns `false`, and leaves the count unchanged.
    ///
    /// # Complexity
    ///
    /// O(log N) time and O(log N) newly allocated nodes; everything off
    /// the descent path is shared with `self`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use bptree::BpTree;
    ///
    /// let (tree, inserted) = BpTree::<i32, &str>::new(3).insert(1, "one");
    /// assert!(inserted);
    ///
    /// let (updated, inserted) = tree.insert(1, "ONE");
    /// assert!(!inserted);
    /// assert_eq!(updated.len(), 1);
    /// assert_eq!(tree.get(&1), Some(&"one"));    // Original unchanged
    /// assert_eq!(updated.get(&1), Some(&"ONE")); // New version
    /// ```
    #[must_use]
    pub fn insert(&self, key: K, value: V) -> (Self, bool) {
        let mut tree = self.clone();
        let (old_leaf, mut path) = self.find_leaf(&key);

        let mut new_leaf = old_leaf.as_leaf().clone();
        let inserted = new_leaf.insert(key, value);
        if inserted {
            tree.length += 1;
        }

        if new_leaf.is_too_big() {
            let (right_leaf, split_key) = new_leaf.split();
            tree.insert_up(
                old_leaf,
                Node::Leaf(new_leaf),
                split_key,
                Node::Leaf(right_leaf),
                &mut path,
            );
        } else {
            tree.copy_up(old_leaf, Node::Leaf(new_leaf), &mut path);
        }

        (tree, inserted)
    }

    /// Removes the entry for `key`, returning the new tree and the removed
    /// value. When the key is absent the returned handle shares this
    /// tree's root unchanged and the value is `None`.
    ///
    /// # Complexity
    ///
    /// O(log N) time and allocated nodes.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use bptree::BpTree;
    ///
    /// let (tree, _) = BpTree::<i32, &str>::new(3).insert(1, "one");
    /// let (smaller, removed) = tree.remove(&1);
    /// assert_eq!(removed, Some("one"));
    /// assert!(smaller.is_empty());
    /// assert_eq!(tree.len(), 1); // Original unchanged
    /// ```
    #[must_use]
    pub fn remove(&self, key: &K) -> (Self, Option<V>) {
        let (old_leaf, mut path) = self.find_leaf(key);

        let mut new_leaf = old_leaf.as_leaf().clone();
        let Some(value) = new_leaf.remove(key) else {
            return (self.clone(), None);
        };

        let mut tree = self.clone();
        tree.length -= 1;

        // A root leaf may underflow freely; the tree is simply small.
        if path.is_empty() {
            invariant(
                ReferenceCounter::ptr_eq(&self.root, &old_leaf),
                "leaf with an empty path is not the root",
            );
            tree.root = ReferenceCounter::new(Node::Leaf(new_leaf));
            return (tree, Some(value));
        }

        if !new_leaf.is_too_small() {
            tree.copy_up(old_leaf, Node::Leaf(new_leaf), &mut path);
            return (tree, Some(value));
        }

        let old_parent = path.pop();
        let parent = old_parent.as_interior();

        if let Some((left_ref, left_key)) = parent.left_sibling(&old_leaf) {
            if left_ref.size() > left_ref.half_full_size() {
                let mut new_left = left_ref.as_leaf().clone();
                new_leaf.steal_left(&mut new_left);

                let mut new_parent = parent.clone();
                new_parent.replace_key(&left_key, new_leaf.leftmost_key().clone());
                new_parent.replace_child(&left_ref, ReferenceCounter::new(Node::Leaf(new_left)));
                new_parent.replace_child(&old_leaf, ReferenceCounter::new(Node::Leaf(new_leaf)));

                tree.copy_up(old_parent, Node::Interior(new_parent), &mut path);
                return (tree, Some(value));
            }
        }

        if let Some((right_ref, right_key)) = parent.right_sibling(&old_leaf) {
            if right_ref.size() > right_ref.half_full_size() {
                let mut new_right = right_ref.as_leaf().clone();
                new_leaf.steal_right(&mut new_right);

                let mut new_parent = parent.clone();
                new_parent.replace_key(&right_key, new_right.leftmost_key().clone());
                new_parent.replace_child(&right_ref, ReferenceCounter::new(Node::Leaf(new_right)));
                new_parent.replace_child(&old_leaf, ReferenceCounter::new(Node::Leaf(new_leaf)));

                tree.copy_up(old_parent, Node::Interior(new_parent), &mut path);
                return (tree, Some(value));
            }
        }

        // Neither sibling can donate; merge, into the left sibling when
        // one exists, else the right sibling into the deficit leaf.
        let (old_merged, new_merged, dead) =
            if let Some((left_ref, _)) = parent.left_sibling(&old_leaf) {
                let mut new_left = left_ref.as_leaf().clone();
                new_left.merge_right(&new_leaf);
                (left_ref, Node::Leaf(new_left), old_leaf)
            } else if let Some((right_ref, _)) = parent.right_sibling(&old_leaf) {
                new_leaf.merge_right(right_ref.as_leaf());
                (old_leaf, Node::Leaf(new_leaf), right_ref)
            } else {
                panic!("bptree: underflowed leaf has no siblings; impossible at order >= 3");
            };

        tree.remove_up(old_parent, old_merged, new_merged, dead, &mut path);
        (tree, Some(value))
    }

    /// Checks every structural invariant of this tree: fan-out bounds,
    /// strictly increasing keys, separator consistency, uniform leaf
    /// depth, and count accuracy.
    ///
    /// Intended for tests and debugging; the cost is O(N).
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] encountered. Any error means
    /// a bug in the tree implementation, never a misuse of the API.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use bptree::BpTree;
    ///
    /// let (tree, _) = BpTree::<i32, i32>::new(3).insert(1, 10);
    /// assert!(tree.validate().is_ok());
    /// ```
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate::validate_tree(self)
    }

    // =========================================================================
    // Descent
    // =========================================================================

    /// Descends to the unique leaf that would hold `key`, recording every
    /// interior ancestor on the returned path.
    fn find_leaf(&self, key: &K) -> (NodeRef<K, V>, DescentPath<K, V>) {
        let mut path = DescentPath::with_capacity(self.depth);
        let mut current = ReferenceCounter::clone(&self.root);
        loop {
            let next = match current.as_ref() {
                Node::Leaf(_) => break,
                Node::Interior(interior) => ReferenceCounter::clone(interior.child_for(key)),
            };
            path.push(current);
            current = next;
        }
        (current, path)
    }

    // =========================================================================
    // Upward Walks
    // =========================================================================

    /// Climbs the path propagating a split: at each level the parent is
    /// copied, the old child swapped for its rewritten left half, and the
    /// (separator, right half) pair spliced in. A parent that becomes too
    /// big splits in turn; a split that outruns the path grows a new root.
    fn insert_up(
        &mut self,
        mut old_child: NodeRef<K, V>,
        mut new_child: Node<K, V>,
        mut split_key: K,
        mut split_node: Node<K, V>,
        path: &mut DescentPath<K, V>,
    ) {
        loop {
            if path.is_empty() {
                invariant(
                    ReferenceCounter::ptr_eq(&self.root, &old_child),
                    "split propagated past a node that is not the root",
                );
                self.grow_root(split_key, new_child, split_node);
                return;
            }

            let old_parent = path.pop();
            let mut new_parent = old_parent.as_interior().clone();
            new_parent.replace_child(&old_child, ReferenceCounter::new(new_child));
            new_parent.insert(split_key, ReferenceCounter::new(split_node));

            if new_parent.is_too_big() {
                let (right_node, middle_key) = new_parent.split();
                old_child = old_parent;
                new_child = Node::Interior(new_parent);
                split_key = middle_key;
                split_node = Node::Interior(right_node);
            } else {
                self.copy_up(old_parent, Node::Interior(new_parent), path);
                return;
            }
        }
    }

    /// Climbs the remaining path copying each ancestor once and swapping
    /// in the rewritten child, then publishes the topmost copy as the new
    /// root.
    fn copy_up(
        &mut self,
        mut old_child: NodeRef<K, V>,
        mut new_child: Node<K, V>,
        path: &mut DescentPath<K, V>,
    ) {
        while !path.is_empty() {
            let old_parent = path.pop();
            let mut new_parent = old_parent.as_interior().clone();
            new_parent.replace_child(&old_child, ReferenceCounter::new(new_child));
            old_child = old_parent;
            new_child = Node::Interior(new_parent);
        }
        invariant(
            ReferenceCounter::ptr_eq(&self.root, &old_child),
            "copy walk ended at a node that is not the root",
        );
        self.publish_root(new_child);
    }

    /// Climbs the path resolving interior underflow after a merge one
    /// level below. The parent is copied, the merged node swapped in and
    /// the dead child dropped; if the parent itself underflows it steals
    /// from a sibling through the grandparent or merges again, repeating
    /// upward.
    fn remove_up(
        &mut self,
        mut old_parent: NodeRef<K, V>,
        mut old_merged: NodeRef<K, V>,
        mut new_merged: Node<K, V>,
        mut dead: NodeRef<K, V>,
        path: &mut DescentPath<K, V>,
    ) {
        loop {
            let mut new_parent = old_parent.as_interior().clone();
            new_parent.replace_child(&old_merged, ReferenceCounter::new(new_merged));
            new_parent.remove_child(&dead);

            if path.is_empty() {
                invariant(
                    ReferenceCounter::ptr_eq(&self.root, &old_parent),
                    "merge walk with an empty path is not at the root",
                );
                self.publish_root(Node::Interior(new_parent));
                return;
            }

            if !new_parent.is_too_small() {
                self.copy_up(old_parent, Node::Interior(new_parent), path);
                return;
            }

            let old_grandparent = path.pop();
            let grandparent = old_grandparent.as_interior();

            if let Some((left_ref, left_key)) = grandparent.left_sibling(&old_parent) {
                if left_ref.size() > left_ref.half_full_size() {
                    let mut new_left = left_ref.as_interior().clone();
                    new_parent.steal_left(&mut new_left);

                    let mut new_grandparent = grandparent.clone();
                    new_grandparent.replace_key(&left_key, new_parent.leftmost_key().clone());
                    new_grandparent
                        .replace_child(&left_ref, ReferenceCounter::new(Node::Interior(new_left)));
                    new_grandparent.replace_child(
                        &old_parent,
                        ReferenceCounter::new(Node::Interior(new_parent)),
                    );

                    self.copy_up(old_grandparent, Node::Interior(new_grandparent), path);
                    return;
                }
            }

            if let Some((right_ref, right_key)) = grandparent.right_sibling(&old_parent) {
                if right_ref.size() > right_ref.half_full_size() {
                    let mut new_right = right_ref.as_interior().clone();
                    new_parent.steal_right(&mut new_right);

                    let mut new_grandparent = grandparent.clone();
                    new_grandparent.replace_key(&right_key, new_right.leftmost_key().clone());
                    new_grandparent
                        .replace_child(&right_ref, ReferenceCounter::new(Node::Interior(new_right)));
                    new_grandparent.replace_child(
                        &old_parent,
                        ReferenceCounter::new(Node::Interior(new_parent)),
                    );

                    self.copy_up(old_grandparent, Node::Interior(new_grandparent), path);
                    return;
                }
            }

            if let Some((left_ref, _)) = grandparent.left_sibling(&old_parent) {
                let mut new_left = left_ref.as_interior().clone();
                new_left.merge_right(&new_parent);
                old_merged = left_ref;
                new_merged = Node::Interior(new_left);
                dead = ReferenceCounter::clone(&old_parent);
            } else if let Some((right_ref, _)) = grandparent.right_sibling(&old_parent) {
                new_parent.merge_right(right_ref.as_interior());
                old_merged = ReferenceCounter::clone(&old_parent);
                new_merged = Node::Interior(new_parent);
                dead = right_ref;
            } else {
                panic!("bptree: underflowed interior node has no siblings; impossible at order >= 3");
            }

            old_parent = old_grandparent;
        }
    }

    // =========================================================================
    // Root Transitions
    // =========================================================================

    /// Installs `node` as the root. An interior root left without
    /// separators hands the tree over to its sole child, shrinking the
    /// depth by one.
    fn publish_root(&mut self, node: Node<K, V>) {
        match node {
            Node::Interior(mut interior) if interior.keys.is_empty() => {
                invariant(
                    interior.size() == 1,
                    "separator-less root must hold exactly one child",
                );
                self.depth -= 1;
                self.root = interior.children.swap_remove(0);
            }
            node => self.root = ReferenceCounter::new(node),
        }
    }

    /// Grows a new interior root over the two halves of a split that
    /// reached the old root, increasing the depth by one.
    fn grow_root(&mut self, key: K, left: Node<K, V>, right: Node<K, V>) {
        let mut root = InteriorNode::new(self.order);
        root.keys.push(key);
        root.children.push(ReferenceCounter::new(left));
        root.children.push(ReferenceCounter::new(right));
        self.root = ReferenceCounter::new(Node::Interior(root));
        self.depth += 1;
    }
}

/// Lock-step identity traversal backing [`BpTree::equivalent`].
fn nodes_identical<K, V>(left: &NodeRef<K, V>, right: &NodeRef<K, V>) -> bool {
    if !ReferenceCounter::ptr_eq(left, right) {
        return false;
    }
    match (left.as_ref(), right.as_ref()) {
        (Node::Leaf(_), Node::Leaf(_)) => true,
        (Node::Interior(ours), Node::Interior(theirs)) => ours
            .children
            .iter()
            .zip(theirs.children.iter())
            .all(|(our_child, their_child)| nodes_identical(our_child, their_child)),
        _ => false,
    }
}

/// In-order entry collection shared by `Display` and `PartialEq`.
fn collect_entries<'tree, K, V>(
    node: &'tree Node<K, V>,
    entries: &mut Vec<(&'tree K, &'tree V)>,
) {
    match node {
        Node::Leaf(leaf) => entries.extend(leaf.keys.iter().zip(leaf.values.iter())),
        Node::Interior(interior) => {
            for child in &interior.children {
                collect_entries(child, entries);
            }
        }
    }
}

// =============================================================================
// Standard Trait Implementations
// =============================================================================

impl<K, V> Clone for BpTree<K, V> {
    /// Cloning a handle shares the root; it is O(1) and allocation-free.
    fn clone(&self) -> Self {
        Self {
            root: ReferenceCounter::clone(&self.root),
            order: self.order,
            length: self.length,
            depth: self.depth,
        }
    }
}

/// Value equality of the two trees as key-to-value mappings, independent
/// of their internal shapes. Contrast with [`BpTree::equivalent`], which
/// compares observable sharing.
impl<K: PartialEq, V: PartialEq> PartialEq for BpTree<K, V> {
    fn eq(&self, other: &Self) -> bool {
        if self.length != other.length {
            return false;
        }
        let mut ours = Vec::with_capacity(self.length);
        collect_entries(&self.root, &mut ours);
        let mut theirs = Vec::with_capacity(other.length);
        collect_entries(&other.root, &mut theirs);
        ours == theirs
    }
}

impl<K: Eq, V: Eq> Eq for BpTree<K, V> {}

impl<K: fmt::Display, V: fmt::Display> fmt::Display for BpTree<K, V> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries = Vec::with_capacity(self.length);
        collect_entries(&self.root, &mut entries);

        write!(formatter, "{{")?;
        let mut first = true;
        for (key, value) in entries {
            if first {
                first = false;
            } else {
                write!(formatter, ", ")?;
            }
            write!(formatter, "{key}: {value}")?;
        }
        write!(formatter, "}}")
    }
}

/// Structural dump: one line per node, indented by level, keys rendered
/// through the key contract.
impl<K: fmt::Display, V> fmt::Debug for BpTree<K, V> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            formatter,
            "BpTree {{ order: {}, length: {}, depth: {} }}",
            self.order, self.length, self.depth
        )?;
        fmt_node(&self.root, 0, formatter)
    }
}

fn fmt_node<K: fmt::Display, V>(
    node: &Node<K, V>,
    level: usize,
    formatter: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    for _ in 0..level {
        write!(formatter, "  ")?;
    }
    match node {
        Node::Leaf(leaf) => {
            write!(formatter, "leaf [")?;
            for (index, key) in leaf.keys.iter().enumerate() {
                if index > 0 {
                    write!(formatter, ", ")?;
                }
                write!(formatter, "{key}")?;
            }
            writeln!(formatter, "]")
        }
        Node::Interior(interior) => {
            write!(formatter, "node [")?;
            for (index, key) in interior.keys.iter().enumerate() {
                if index > 0 {
                    write!(formatter, ", ")?;
                }
                write!(formatter, "{key}")?;
            }
            writeln!(formatter, "]")?;
            for child in &interior.children {
                fmt_node(child, level + 1, formatter)?;
            }
            Ok(())
        }
    }
}

// =============================================================================
// Serde Support
// =============================================================================

#[cfg(feature = "serde")]
struct EntrySeq<'tree, K, V>(&'tree BpTree<K, V>);

#[cfg(feature = "serde")]
impl<K, V> serde::Serialize for EntrySeq<'_, K, V>
where
    K: serde::Serialize,
    V: serde::Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeSeq;
        let mut entries = Vec::with_capacity(self.0.length);
        collect_entries(&self.0.root, &mut entries);
        let mut sequence = serializer.serialize_seq(Some(entries.len()))?;
        for entry in entries {
            sequence.serialize_element(&entry)?;
        }
        sequence.end()
    }
}

#[cfg(feature = "serde")]
impl<K, V> serde::Serialize for BpTree<K, V>
where
    K: serde::Serialize,
    V: serde::Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("BpTree", 2)?;
        state.serialize_field("order", &self.order)?;
        state.serialize_field("entries", &EntrySeq(self))?;
        state.end()
    }
}

#[cfg(feature = "serde")]
struct BpTreeVisitor<K, V> {
    key_marker: std::marker::PhantomData<K>,
    value_marker: std::marker::PhantomData<V>,
}

#[cfg(feature = "serde")]
impl<'de, K, V> serde::de::Visitor<'de> for BpTreeVisitor<K, V>
where
    K: serde::Deserialize<'de> + BptKey,
    V: serde::Deserialize<'de> + Clone,
{
    type Value = BpTree<K, V>;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("a struct with an order and a sequence of entries")
    }

    fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
    where
        A: serde::de::MapAccess<'de>,
    {
        use serde::de::Error;

        let mut order: Option<usize> = None;
        let mut entries: Option<Vec<(K, V)>> = None;
        while let Some(field) = access.next_key::<String>()? {
            match field.as_str() {
                "order" => order = Some(access.next_value()?),
                "entries" => entries = Some(access.next_value()?),
                _ => {
                    let _: serde::de::IgnoredAny = access.next_value()?;
                }
            }
        }

        let order = order.ok_or_else(|| A::Error::missing_field("order"))?;
        if order < 3 {
            return Err(A::Error::custom("order must be at least 3"));
        }

        let mut tree = BpTree::new(order);
        for (key, value) in entries.unwrap_or_default() {
            tree = tree.insert(key, value).0;
        }
        Ok(tree)
    }

    fn visit_seq<A>(self, mut access: A) -> Result<Self::Value, A::Error>
    where
        A: serde::de::SeqAccess<'de>,
    {
        use serde::de::Error;

        let order: usize = access
            .next_element()?
            .ok_or_else(|| A::Error::invalid_length(0, &self))?;
        if order < 3 {
            return Err(A::Error::custom("order must be at least 3"));
        }
        let entries: Vec<(K, V)> = access
            .next_element()?
            .ok_or_else(|| A::Error::invalid_length(1, &self))?;

        let mut tree = BpTree::new(order);
        for (key, value) in entries {
            tree = tree.insert(key, value).0;
        }
        Ok(tree)
    }
}

#[cfg(feature = "serde")]
impl<'de, K, V> serde::Deserialize<'de> for BpTree<K, V>
where
    K: serde::Deserialize<'de> + BptKey,
    V: serde::Deserialize<'de> + Clone,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_struct(
            "BpTree",
            &["order", "entries"],
            BpTreeVisitor {
                key_marker: std::marker::PhantomData,
                value_marker: std::marker::PhantomData,
            },
        )
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn new_creates_an_empty_tree() {
        let tree: BpTree<i32, String> = BpTree::new(3);
        assert!(tree.is_empty());
        assert_eq!(tree.len(), 0);
        assert_eq!(tree.depth(), 0);
        assert_eq!(tree.order(), 3);
    }

    #[rstest]
    #[should_panic(expected = "order must be at least 3")]
    fn orders_below_three_are_rejected() {
        let _ = BpTree::<i32, i32>::new(2);
    }

    #[rstest]
    fn insert_and_get() {
        let tree = BpTree::new(3);
        let (tree, first) = tree.insert(1, "one");
        let (tree, second) = tree.insert(2, "two");

        assert!(first);
        assert!(second);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.get(&1), Some(&"one"));
        assert_eq!(tree.get(&2), Some(&"two"));
        assert_eq!(tree.get(&3), None);
    }

    #[rstest]
    fn insert_existing_key_replaces_without_growing() {
        let (tree, _) = BpTree::<i32, &str>::new(3).insert(1, "one");
        let (updated, inserted) = tree.insert(1, "ONE");

        assert!(!inserted);
        assert_eq!(updated.len(), 1);
        assert_eq!(tree.get(&1), Some(&"one"));
        assert_eq!(updated.get(&1), Some(&"ONE"));
    }

    #[rstest]
    fn get_on_an_empty_tree_misses() {
        let tree: BpTree<i32, i32> = BpTree::new(5);
        assert_eq!(tree.get(&42), None);
    }

    #[rstest]
    fn remove_returns_the_value_and_shrinks() {
        let (tree, _) = BpTree::<i32, &str>::new(3).insert(1, "one");
        let (tree, _) = tree.insert(2, "two");

        let (smaller, removed) = tree.remove(&1);
        assert_eq!(removed, Some("one"));
        assert_eq!(smaller.len(), 1);
        assert_eq!(smaller.get(&1), None);
        assert_eq!(smaller.get(&2), Some(&"two"));
    }

    #[rstest]
    fn remove_missing_key_shares_the_root() {
        let (tree, _) = BpTree::<i32, i32>::new(3).insert(1, 10);
        let (unchanged, removed) = tree.remove(&99);

        assert_eq!(removed, None);
        assert_eq!(unchanged.len(), 1);
        assert!(tree.equivalent(&unchanged));
    }

    #[rstest]
    fn remove_on_an_empty_tree_misses() {
        let tree: BpTree<i32, i32> = BpTree::new(3);
        let (unchanged, removed) = tree.remove(&1);
        assert_eq!(removed, None);
        assert!(unchanged.is_empty());
        assert_eq!(unchanged.depth(), 0);
    }

    #[rstest]
    fn root_split_raises_the_depth() {
        let mut tree = BpTree::new(3);
        for key in 1..=2 {
            tree = tree.insert(key, key * 10).0;
        }
        assert_eq!(tree.depth(), 0);

        tree = tree.insert(3, 30).0;
        assert_eq!(tree.depth(), 1);
        for key in 1..=3 {
            assert_eq!(tree.get(&key), Some(&(key * 10)));
        }
        tree.validate().expect("split tree must stay valid");
    }

    #[rstest]
    fn root_collapse_lowers_the_depth() {
        let mut tree = BpTree::new(3);
        for key in 1..=4 {
            tree = tree.insert(key, key).0;
        }
        assert_eq!(tree.depth(), 1);

        for key in (2..=4).rev() {
            tree = tree.remove(&key).0;
            tree.validate().expect("tree must stay valid while shrinking");
        }
        assert_eq!(tree.depth(), 0);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.get(&1), Some(&1));
    }

    #[rstest]
    fn single_entry_lifecycle() {
        let empty: BpTree<i32, i32> = BpTree::new(3);
        let (one, _) = empty.insert(7, 70);
        assert_eq!(one.depth(), 0);
        assert_eq!(one.len(), 1);

        let (back_to_empty, removed) = one.remove(&7);
        assert_eq!(removed, Some(70));
        assert!(back_to_empty.is_empty());
    }

    #[rstest]
    fn older_versions_observe_their_own_entries() {
        let mut versions = vec![BpTree::new(3)];
        for key in 0..50 {
            let next = versions.last().unwrap().insert(key, key * 2).0;
            versions.push(next);
        }

        for (age, version) in versions.iter().enumerate() {
            assert_eq!(version.len(), age);
            for key in 0..50 {
                let expected = if key < age as i32 { Some(key * 2) } else { None };
                assert_eq!(version.get(&key).copied(), expected);
            }
        }
    }

    #[rstest]
    fn min_and_max_entries() {
        let tree: BpTree<i32, i32> = BpTree::new(3);
        assert_eq!(tree.min_entry(), None);
        assert_eq!(tree.max_entry(), None);

        let mut tree = tree;
        for key in [5, 1, 9, 3, 7] {
            tree = tree.insert(key, key * 10).0;
        }
        assert_eq!(tree.min_entry(), Some((&1, &10)));
        assert_eq!(tree.max_entry(), Some((&9, &90)));
    }

    #[rstest]
    fn equivalent_is_sharing_not_value_equality() {
        let mut first = BpTree::new(3);
        let mut second = BpTree::new(3);
        for key in 1..=5 {
            first = first.insert(key, key).0;
            second = second.insert(key, key).0;
        }

        // Same mapping, separately built: equal but not equivalent.
        assert_eq!(first, second);
        assert!(!first.equivalent(&second));

        // A cloned handle shares everything.
        assert!(first.equivalent(&first.clone()));
    }

    #[rstest]
    fn mapping_equality_ignores_insertion_order() {
        let mut forward = BpTree::new(4);
        let mut backward = BpTree::new(4);
        for key in 1..=20 {
            forward = forward.insert(key, key).0;
        }
        for key in (1..=20).rev() {
            backward = backward.insert(key, key).0;
        }
        assert_eq!(forward, backward);
    }

    #[rstest]
    fn display_renders_entries_in_key_order() {
        let mut tree = BpTree::new(3);
        for (key, value) in [(3, "three"), (1, "one"), (2, "two")] {
            tree = tree.insert(key, value).0;
        }
        assert_eq!(format!("{tree}"), "{1: one, 2: two, 3: three}");
    }

    #[rstest]
    fn display_renders_the_empty_tree() {
        let tree: BpTree<i32, i32> = BpTree::new(3);
        assert_eq!(format!("{tree}"), "{}");
    }

    #[rstest]
    fn debug_dump_shows_the_structure() {
        let mut tree = BpTree::new(3);
        for key in 1..=4 {
            tree = tree.insert(key, key).0;
        }
        let dump = format!("{tree:?}");
        assert!(dump.starts_with("BpTree { order: 3, length: 4, depth: 1 }"));
        assert!(dump.contains("node ["));
        assert!(dump.contains("leaf ["));
    }
}
