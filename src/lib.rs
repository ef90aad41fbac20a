//! # bptree
//!
//! A persistent (copy-on-write) B+Tree map with structural sharing.
//!
//! ## Overview
//!
//! [`BpTree`] maps totally-ordered keys to opaque values. Every `insert`
//! and `remove` returns a new tree; the version it was applied to stays
//! intact and readable forever. Updates copy only the root-to-leaf path
//! they touch, so each one costs O(log N) in time *and* in allocated
//! nodes, with everything else shared between versions.
//!
//! "Persistent" here always means version persistence, never durability:
//! the tree lives in memory and nothing is written to disk.
//!
//! ## Example
//!
//! ```rust
//! use bptree::BpTree;
//!
//! let empty: BpTree<i32, &str> = BpTree::new(8);
//! let (tree, _) = empty.insert(1, "one");
//! let (tree, _) = tree.insert(2, "two");
//!
//! assert_eq!(tree.get(&1), Some(&"one"));
//! assert_eq!(tree.len(), 2);
//!
//! // Updates never disturb existing versions.
//! let (smaller, removed) = tree.remove(&1);
//! assert_eq!(removed, Some("one"));
//! assert_eq!(tree.len(), 2);
//! assert_eq!(smaller.len(), 1);
//! ```
//!
//! ## Keys
//!
//! Any `Clone + Ord + Display` type is a key; see [`BptKey`]. The provided
//! [`StringKey`] orders text length-first, then byte-lexicographically.
//!
//! ## Feature flags
//!
//! - `arc`: share nodes through `Arc` instead of `Rc`, so distinct threads
//!   may read different (or the same) versions concurrently. A single
//!   update still has one writer; only publication crosses threads.
//! - `serde`: serialization of trees as an order plus an entry sequence.
//!
//! ## Diagnostics
//!
//! Setting the `BPTREE_DEBUG` environment variable to `t`, `true`, `yes`,
//! or `on` (case-insensitive) enables redundant internal invariant checks;
//! a failed check panics, since it can only indicate a bug in the tree.
//! The O(N) structural checker is always available as
//! [`BpTree::validate`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod debug;
mod interior;
mod key;
mod leaf;
mod node;
mod path;
mod tree;
mod validate;

pub use key::{BptKey, StringKey};
pub use tree::BpTree;
pub use validate::ValidationError;
