//! Flush policy trait definition.
//!
//! A flush policy decides, for every fragment a producer appends, whether
//! the accumulated unflushed text should be persisted now. Policies are
//! pure: the caller owns the accumulator and hands it in for inspection.

use std::fmt::Debug;

/// Trait for deciding when accumulated text becomes a chunk.
///
/// Implementations must be deterministic and free of side effects so the
/// same fragment sequence always yields the same chunk boundaries.
///
/// # Examples
///
/// ```
/// use ptstream::flush::{FlushPolicy, SentencePolicy};
///
/// let policy = SentencePolicy::new();
/// assert!(!policy.should_flush("Hello ", "Hello "));
/// assert!(policy.should_flush("World.", "Hello World."));
/// ```
pub trait FlushPolicy: Send + Sync + Debug {
    /// Returns true if `pending` should be persisted now.
    ///
    /// # Arguments
    ///
    /// * `fragment` - The fragment just appended by the producer.
    /// * `pending` - All unflushed text, already including `fragment`.
    fn should_flush(&self, fragment: &str, pending: &str) -> bool;

    /// Returns the name of the policy.
    fn name(&self) -> &'static str;

    /// Returns a description of the policy.
    fn description(&self) -> &'static str {
        "No description available"
    }
}
