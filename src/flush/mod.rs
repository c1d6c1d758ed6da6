//! Flush policies for ptstream.
//!
//! A flush policy batches produced text into durable writes. Available
//! policies:
//!
//! - **sentence**: flush when a fragment contains `.`, `!` or `?` (default)
//! - **bytes**: flush when unflushed text reaches N bytes
//! - **regex**: flush when a fragment matches a pattern
//! - **every**: flush after each fragment
//!
//! Policies combine with `+` in [`create_policy`], e.g. `sentence+bytes:2048`.

pub mod pattern;
pub mod sentence;
pub mod size;
pub mod traits;

pub use pattern::{AnyPolicy, RegexPolicy};
pub use sentence::{DEFAULT_TERMINATORS, SentencePolicy};
pub use size::{ByteThresholdPolicy, EveryFragmentPolicy};
pub use traits::FlushPolicy;

use crate::error::{FlushError, Result};

/// Default policy specification.
pub const DEFAULT_POLICY: &str = "sentence";

/// Creates the default flush policy (sentence).
#[must_use]
pub fn default_policy() -> SentencePolicy {
    SentencePolicy::new()
}

/// Creates a flush policy from a specification string.
///
/// # Arguments
///
/// * `spec` - One of `sentence`, `sentence:<chars>`, `bytes:<n>`,
///   `regex:<pattern>`, `every`, or several joined with `+`. A `regex:`
///   part must come last since its pattern may itself contain `+`. Outside
///   of `regex:`, `+` always separates policies, so it cannot be a
///   `sentence:` terminator; use `regex:\+` to flush on it.
///
/// # Errors
///
/// Returns [`FlushError::UnknownPolicy`] for unrecognized names and
/// [`FlushError::InvalidConfig`] for bad parameters.
///
/// # Examples
///
/// ```
/// use ptstream::flush::create_policy;
///
/// let policy = create_policy("sentence+bytes:1024").unwrap();
/// assert_eq!(policy.name(), "any");
/// ```
pub fn create_policy(spec: &str) -> Result<Box<dyn FlushPolicy>> {
    let spec = spec.trim();
    let (simple, regex) = spec.find("regex:").map_or((spec, None), |pos| {
        (&spec[..pos], Some(&spec[pos + "regex:".len()..]))
    });

    let mut parts: Vec<Box<dyn FlushPolicy>> = simple
        .split('+')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_single)
        .collect::<Result<_>>()?;

    if let Some(pattern) = regex {
        parts.push(Box::new(RegexPolicy::new(pattern)?));
    }

    match parts.len() {
        0 => Err(FlushError::UnknownPolicy {
            name: spec.to_string(),
        }
        .into()),
        1 => Ok(parts.remove(0)),
        _ => Ok(Box::new(
            parts
                .into_iter()
                .fold(AnyPolicy::new(), AnyPolicy::with),
        )),
    }
}

fn parse_single(spec: &str) -> Result<Box<dyn FlushPolicy>> {
    let (name, arg) = spec
        .split_once(':')
        .map_or((spec, None), |(n, a)| (n, Some(a)));

    match (name.to_lowercase().as_str(), arg) {
        ("sentence", None) => Ok(Box::new(SentencePolicy::new())),
        ("sentence", Some(chars)) => {
            let terminators: Vec<char> = chars.chars().collect();
            if terminators.is_empty() {
                return Err(FlushError::InvalidConfig {
                    reason: "sentence policy needs at least one terminator \
                             ('+' separates policies and cannot be one)"
                        .to_string(),
                }
                .into());
            }
            Ok(Box::new(SentencePolicy::with_terminators(&terminators)))
        }
        ("bytes", Some(n)) => {
            let n = n.trim().parse::<usize>().map_err(|e| FlushError::InvalidConfig {
                reason: format!("invalid byte threshold '{n}': {e}"),
            })?;
            Ok(Box::new(ByteThresholdPolicy::new(n)?))
        }
        ("bytes", None) => Err(FlushError::InvalidConfig {
            reason: "bytes policy needs a threshold, e.g. bytes:1024".to_string(),
        }
        .into()),
        ("every", None) => Ok(Box::new(EveryFragmentPolicy)),
        _ => Err(FlushError::UnknownPolicy {
            name: spec.to_string(),
        }
        .into()),
    }
}

/// Lists available flush policy names.
#[must_use]
pub fn available_policies() -> Vec<&'static str> {
    vec!["sentence", "bytes", "regex", "every"]
}
