//! Process-wide diagnostics toggle.
//!
//! Redundant internal invariant checks are gated behind the `BPTREE_DEBUG`
//! environment variable. The variable is read once per process; `t`,
//! `true`, `yes`, and `on` (any capitalization) enable the checks, anything
//! else leaves them off. A failed check aborts with a panic, since it can
//! only mean a bug in the tree itself.

use std::sync::OnceLock;

static DEBUG_CHECKS: OnceLock<bool> = OnceLock::new();

fn parse_toggle(value: &str) -> bool {
    matches!(
        value.to_lowercase().as_str(),
        "t" | "true" | "yes" | "on"
    )
}

/// Whether `BPTREE_DEBUG` enabled the internal checks for this process.
pub(crate) fn debug_checks_enabled() -> bool {
    *DEBUG_CHECKS.get_or_init(|| {
        std::env::var("BPTREE_DEBUG")
            .map(|value| parse_toggle(&value))
            .unwrap_or(false)
    })
}

/// Panics with `message` when `condition` is false and checks are enabled.
pub(crate) fn invariant(condition: bool, message: &str) {
    if !condition && debug_checks_enabled() {
        panic!("bptree invariant violated: {message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::short_form("t", true)]
    #[case::long_form("true", true)]
    #[case::yes("yes", true)]
    #[case::on("on", true)]
    #[case::uppercase("TRUE", true)]
    #[case::mixed_case("Yes", true)]
    #[case::off("off", false)]
    #[case::zero("0", false)]
    #[case::one("1", false)]
    #[case::empty("", false)]
    fn parses_toggle_values(#[case] value: &str, #[case] expected: bool) {
        assert_eq!(parse_toggle(value), expected);
    }

    #[rstest]
    fn invariant_is_silent_on_success() {
        // Must never panic regardless of the toggle state.
        invariant(true, "unreachable");
    }
}
