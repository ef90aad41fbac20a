//! Leaf nodes: ordered (key, value) entries.
//!
//! A leaf stores up to `order - 1` entries; reaching `order` entries makes
//! it too big and forces a split. A non-root leaf underflows when it drops
//! below `ceil((order - 1) / 2)` entries. Mutating operations here run only
//! on hot copies owned by an in-flight update; published leaves are never
//! touched.

/// Ordered sequence of keys paired one-to-one with values.
pub(crate) struct LeafNode<K, V> {
    order: usize,
    pub(crate) keys: Vec<K>,
    pub(crate) values: Vec<V>,
}

impl<K, V> LeafNode<K, V> {
    /// Creates an empty leaf. Capacity is one slot beyond the legal
    /// maximum so the leaf can reach the too-big state and be split.
    pub(crate) fn new(order: usize) -> Self {
        Self {
            order,
            keys: Vec::with_capacity(order),
            values: Vec::with_capacity(order),
        }
    }

    pub(crate) fn size(&self) -> usize {
        self.values.len()
    }

    /// Minimum entry count for a non-root leaf: `ceil((order - 1) / 2)`.
    pub(crate) const fn half_full_size(&self) -> usize {
        self.order / 2
    }

    /// A leaf with `order` entries has outgrown its bounds and must split.
    pub(crate) fn is_too_big(&self) -> bool {
        self.keys.len() == self.order
    }

    pub(crate) fn is_too_small(&self) -> bool {
        self.size() < self.half_full_size()
    }

    /// First key of the leaf; callers guarantee the leaf is non-empty.
    pub(crate) fn leftmost_key(&self) -> &K {
        &self.keys[0]
    }

    pub(crate) fn first_entry(&self) -> Option<(&K, &V)> {
        Some((self.keys.first()?, self.values.first()?))
    }

    pub(crate) fn last_entry(&self) -> Option<(&K, &V)> {
        Some((self.keys.last()?, self.values.last()?))
    }
}

impl<K: Ord, V> LeafNode<K, V> {
    pub(crate) fn get(&self, key: &K) -> Option<&V> {
        match self.keys.binary_search(key) {
            Ok(index) => Some(&self.values[index]),
            Err(_) => None,
        }
    }

    /// Inserts an entry at its ordered position, or replaces the value in
    /// place when the key is already present. Returns `true` when a new
    /// entry was added, `false` on an in-place update.
    pub(crate) fn insert(&mut self, key: K, value: V) -> bool {
        match self.keys.binary_search(&key) {
            Ok(index) => {
                self.values[index] = value;
                false
            }
            Err(index) => {
                self.keys.insert(index, key);
                self.values.insert(index, value);
                true
            }
        }
    }

    /// Removes the entry for `key`, returning its value, or `None` when
    /// the key is absent (the leaf is left untouched).
    pub(crate) fn remove(&mut self, key: &K) -> Option<V> {
        match self.keys.binary_search(key) {
            Ok(index) => {
                self.keys.remove(index);
                Some(self.values.remove(index))
            }
            Err(_) => None,
        }
    }
}

impl<K: Clone, V> LeafNode<K, V> {
    /// Splits a too-big leaf, keeping the lower `floor(order / 2)` entries
    /// and moving the rest into a fresh right leaf. Returns the right leaf
    /// and the separator key, which is the right leaf's first key: the
    /// right side is the larger half exactly so that the promoted
    /// separator is a real key of the subtree it fronts. Draining in place
    /// keeps the receiver's allocation for later growth.
    pub(crate) fn split(&mut self) -> (Self, K) {
        let split_index = self.keys.len() / 2;
        let mut right = Self::new(self.order);
        right.keys.extend(self.keys.drain(split_index..));
        right.values.extend(self.values.drain(split_index..));
        let separator = right.keys[0].clone();
        (right, separator)
    }
}

impl<K, V> LeafNode<K, V> {
    /// Moves the left sibling's last entry to the front of this leaf.
    /// Callers check first that the donor is above half full.
    pub(crate) fn steal_left(&mut self, left: &mut Self) {
        let key = left.keys.remove(left.keys.len() - 1);
        let value = left.values.remove(left.values.len() - 1);
        self.keys.insert(0, key);
        self.values.insert(0, value);
    }

    /// Moves the right sibling's first entry to the back of this leaf.
    pub(crate) fn steal_right(&mut self, right: &mut Self) {
        let key = right.keys.remove(0);
        let value = right.values.remove(0);
        self.keys.push(key);
        self.values.push(value);
    }
}

impl<K: Clone, V: Clone> LeafNode<K, V> {
    /// Appends every entry of the right sibling; the tree then drops the
    /// sibling from the parent.
    pub(crate) fn merge_right(&mut self, right: &Self) {
        self.keys.extend(right.keys.iter().cloned());
        self.values.extend(right.values.iter().cloned());
    }
}

impl<K: Clone, V: Clone> Clone for LeafNode<K, V> {
    /// Copies preserve the full capacity so a hot copy can grow to the
    /// too-big state without reallocating.
    fn clone(&self) -> Self {
        let mut copy = Self::new(self.order);
        copy.keys.extend(self.keys.iter().cloned());
        copy.values.extend(self.values.iter().cloned());
        copy
    }
}

// =============================================================================
// Tests
// =============================================================================
