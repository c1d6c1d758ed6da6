//! Size-based flush policies.

use crate::error::{FlushError, Result};
use crate::flush::traits::FlushPolicy;

/// Flushes once the unflushed text reaches a byte threshold.
///
/// Bounds how much text can be lost if the process dies mid-stream,
/// independently of punctuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteThresholdPolicy {
    max_pending: usize,
}

impl ByteThresholdPolicy {
    /// Creates a policy flushing at `max_pending` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`FlushError::InvalidConfig`] if `max_pending` is zero.
    pub fn new(max_pending: usize) -> Result<Self> {
        if max_pending == 0 {
            return Err(FlushError::InvalidConfig {
                reason: "byte threshold must be > 0".to_string(),
            }
            .into());
        }
        Ok(Self { max_pending })
    }

    /// Returns the threshold in bytes.
    #[must_use]
    pub const fn max_pending(&self) -> usize {
        self.max_pending
    }
}

impl FlushPolicy for ByteThresholdPolicy {
    fn should_flush(&self, _fragment: &str, pending: &str) -> bool {
        pending.len() >= self.max_pending
    }

    fn name(&self) -> &'static str {
        "bytes"
    }

    fn description(&self) -> &'static str {
        "Flush when unflushed text reaches a byte threshold"
    }
}

/// Flushes after every fragment.
///
/// One chunk per append; useful when fragments are already coarse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EveryFragmentPolicy;

impl FlushPolicy for EveryFragmentPolicy {
    fn should_flush(&self, _fragment: &str, _pending: &str) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "every"
    }

    fn description(&self) -> &'static str {
        "Flush after every fragment"
    }
}
