//! Pattern-based flush policy and policy composition.

use crate::error::{FlushError, Result};
use crate::flush::traits::FlushPolicy;
use regex::Regex;

/// Flushes when the newest fragment matches a regular expression.
///
/// # Examples
///
/// ```
/// use ptstream::flush::{FlushPolicy, RegexPolicy};
///
/// let policy = RegexPolicy::new(r"\n\n").unwrap();
/// assert!(policy.should_flush("end\n\n", "end\n\n"));
/// assert!(!policy.should_flush("end\n", "end\n"));
/// ```
#[derive(Debug, Clone)]
pub struct RegexPolicy {
    pattern: Regex,
}

impl RegexPolicy {
    /// Compiles a pattern-based policy.
    ///
    /// # Errors
    ///
    /// Returns [`FlushError::Regex`] if the pattern does not compile, or
    /// [`FlushError::InvalidConfig`] if it is empty.
    pub fn new(pattern: &str) -> Result<Self> {
        if pattern.is_empty() {
            return Err(FlushError::InvalidConfig {
                reason: "regex pattern must not be empty".to_string(),
            }
            .into());
        }
        let pattern = Regex::new(pattern).map_err(FlushError::from)?;
        Ok(Self { pattern })
    }

    /// Returns the source pattern.
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

impl FlushPolicy for RegexPolicy {
    fn should_flush(&self, fragment: &str, _pending: &str) -> bool {
        self.pattern.is_match(fragment)
    }

    fn name(&self) -> &'static str {
        "regex"
    }

    fn description(&self) -> &'static str {
        "Flush when a fragment matches a regular expression"
    }
}

/// Flushes when any of its member policies would.
#[derive(Debug, Default)]
pub struct AnyPolicy {
    policies: Vec<Box<dyn FlushPolicy>>,
}

impl AnyPolicy {
    /// Creates an empty combination (never flushes until members are added).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a member policy.
    #[must_use]
    pub fn with(mut self, policy: Box<dyn FlushPolicy>) -> Self {
        self.policies.push(policy);
        self
    }

    /// Returns the number of member policies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Returns true if there are no member policies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl FlushPolicy for AnyPolicy {
    fn should_flush(&self, fragment: &str, pending: &str) -> bool {
        self.policies
            .iter()
            .any(|p| p.should_flush(fragment, pending))
    }

    fn name(&self) -> &'static str {
        "any"
    }

    fn description(&self) -> &'static str {
        "Flush when any member policy would"
    }
}
