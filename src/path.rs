//! The descent path.
//!
//! Every mutation descends from the root to a leaf and records the interior
//! ancestors it passed through, newest on top. Rebalancing then consumes
//! the path bottom-up, copying each recorded ancestor exactly once. The
//! path holds references to the old, read-only ancestors; the rewritten
//! parents are allocated fresh as the walk climbs. An explicit stack is
//! used instead of recursion because steal and merge need to pop, inspect,
//! and keep consuming arbitrary prefixes of it.

use crate::node::NodeRef;

/// Last-in/first-out record of the interior nodes visited during descent.
pub(crate) struct DescentPath<K, V> {
    stack: Vec<NodeRef<K, V>>,
}

impl<K, V> DescentPath<K, V> {
    /// An empty path sized for a tree of the given depth.
    pub(crate) fn with_capacity(depth: usize) -> Self {
        Self {
            stack: Vec::with_capacity(depth),
        }
    }

    pub(crate) fn push(&mut self, node: NodeRef<K, V>) {
        self.stack.push(node);
    }

    /// Pops the most recently visited ancestor. Popping an exhausted path
    /// means the rebalance walked above the root, which is fatal.
    pub(crate) fn pop(&mut self) -> NodeRef<K, V> {
        match self.stack.pop() {
            Some(node) => node,
            None => panic!("bptree: descent path exhausted above the root"),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}
