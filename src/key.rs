//! The key contract and the provided reference key.
//!
//! The tree orders entries exclusively through the capabilities named by
//! [`BptKey`]: total equality, a strict total order, and a human-readable
//! rendering used in diagnostics. Any type satisfying the standard traits
//! gets the contract for free through the blanket implementation, so `i32`,
//! `String`, or a custom ordered type all work as keys out of the box.
//!
//! [`StringKey`] is the provided reference key: text ordered length-first,
//! then byte-lexicographically among strings of equal length. This atypical
//! collation makes incrementally generated strings (`"a"`, `"b"`, ...,
//! `"z"`, `"aa"`, ...) strictly increasing, which plain lexicographic
//! ordering does not. Callers who want ordinary string ordering should key
//! on `String` directly.

use std::cmp::Ordering;
use std::fmt;

// =============================================================================
// Key Contract
// =============================================================================

/// Capabilities the tree requires from a key type.
///
/// `Ord` supplies the strict total order used for descent and in-node
/// placement, `Clone` lets separator keys be copied into interior nodes,
/// and `Display` renders keys in structural dumps. Keys of a single tree
/// are one concrete type, so comparing keys of different types is a compile
/// error rather than a runtime condition.
///
/// A blanket implementation covers every eligible type; there is nothing to
/// implement by hand.
pub trait BptKey: Clone + Ord + fmt::Display {}

impl<T> BptKey for T where T: Clone + Ord + fmt::Display {}

// =============================================================================
// StringKey
// =============================================================================

/// A text key ordered length-first, then byte-lexicographically.
///
/// Shorter strings compare less than longer strings; strings of equal
/// length compare as byte strings.
///
/// # Examples
///
/// ```rust
/// use bptree::StringKey;
///
/// // Length dominates the comparison.
/// assert!(StringKey::from("b") < StringKey::from("aa"));
///
/// // Equal lengths fall back to byte order.
/// assert!(StringKey::from("abc") < StringKey::from("abd"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StringKey(String);

impl StringKey {
    /// Creates a key from anything convertible to a `String`.
    #[inline]
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Returns the underlying text.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialOrd for StringKey {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StringKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl fmt::Display for StringKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<String> for StringKey {
    #[inline]
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl From<&str> for StringKey {
    #[inline]
    fn from(text: &str) -> Self {
        Self(text.to_string())
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
    #[case::shorter_before_longer("b", "aa")]
    #[case::empty_before_anything("", "a")]
    #[case::equal_length_byte_order("abc", "abd")]
    #[case::single_characters("a", "b")]
    fn orders_keys(#[case] smaller: &str, #[case] larger: &str) {
        assert!(StringKey::from(smaller) < StringKey::from(larger));
        assert!(StringKey::from(larger) > StringKey::from(smaller));
    }

    #[rstest]
    fn equal_keys_compare_equal() {
        assert_eq!(StringKey::from("same"), StringKey::from("same"));
        assert_eq!(
            StringKey::from("same").cmp(&StringKey::from("same")),
            Ordering::Equal
        );
    }

    #[rstest]
    fn length_first_order_differs_from_lexicographic() {
        // "z" > "aa" lexicographically, but shorter sorts first here.
        assert!(StringKey::from("z") < StringKey::from("aa"));
    }

    #[rstest]
    fn renders_the_underlying_text() {
        let key = StringKey::new("hello");
        assert_eq!(format!("{key}"), "hello");
        assert_eq!(key.as_str(), "hello");
    }
}
