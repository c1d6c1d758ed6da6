//! Sentence-boundary flush policy.
//!
//! Flushes whenever a fragment contains a sentence terminator. This gives
//! roughly one database write per sentence instead of one per token while
//! keeping persisted text fresh for reloads and second observers.

use crate::flush::traits::FlushPolicy;

/// Default sentence terminators.
pub const DEFAULT_TERMINATORS: &[char] = &['.', '!', '?'];

/// Flushes when the newest fragment contains a terminator character.
///
/// # Examples
///
/// ```
/// use ptstream::flush::{FlushPolicy, SentencePolicy};
///
/// let policy = SentencePolicy::with_terminators(&[';']);
/// assert!(policy.should_flush("a;", "a;"));
/// assert!(!policy.should_flush("a.", "a."));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentencePolicy {
    terminators: Vec<char>,
}

impl SentencePolicy {
    /// Creates a policy with the default terminators (`.`, `!`, `?`).
    #[must_use]
    pub fn new() -> Self {
        Self {
            terminators: DEFAULT_TERMINATORS.to_vec(),
        }
    }

    /// Creates a policy with custom terminators.
    #[must_use]
    pub fn with_terminators(terminators: &[char]) -> Self {
        Self {
            terminators: terminators.to_vec(),
        }
    }

    /// Returns the configured terminators.
    #[must_use]
    pub fn terminators(&self) -> &[char] {
        &self.terminators
    }
}

impl Default for SentencePolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl FlushPolicy for SentencePolicy {
    fn should_flush(&self, fragment: &str, _pending: &str) -> bool {
        fragment.contains(self.terminators.as_slice())
    }

    fn name(&self) -> &'static str {
        "sentence"
    }

    fn description(&self) -> &'static str {
        "Flush when a fragment contains a sentence terminator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("Hello", false ; "no terminator")]
    #[test_case("World.", true ; "period")]
    #[test_case("Really!", true ; "exclamation")]
    #[test_case("why?", true ; "question")]
    #[test_case(" ... ", true ; "ellipsis")]
    #[test_case("", false ; "empty fragment")]
    #[test_case("3,14", false ; "comma")]
    fn test_default_terminators(fragment: &str, expected: bool) {
        let policy = SentencePolicy::new();
        assert_eq!(policy.should_flush(fragment, fragment), expected);
    }

    #[test]
    fn test_decision_ignores_pending() {
        let policy = SentencePolicy::new();
        // A terminator earlier in pending text does not trigger a flush.
        assert!(!policy.should_flush("more", "Done. more"));
    }

    #[test]
    fn test_custom_terminators() {
        let policy = SentencePolicy::with_terminators(&['\n', '。']);
        assert!(policy.should_flush("line\n", "line\n"));
        assert!(policy.should_flush("終わり。", "終わり。"));
        assert!(!policy.should_flush("end.", "end."));
        assert_eq!(policy.terminators(), &['\n', '。']);
    }

    #[test]
    fn test_name() {
        assert_eq!(SentencePolicy::default().name(), "sentence");
        assert!(!SentencePolicy::default().description().is_empty());
    }
}
