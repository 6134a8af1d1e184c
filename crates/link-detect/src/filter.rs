//! Discovery filters
//!
//! A filter is a set of identity patterns. `*` matches every device, a
//! pattern ending in `*` matches by prefix, anything else must equal the
//! device identity. Comparison ignores ASCII case, so `usb\vid_1a86&pid_7523`
//! and `USB\VID_1A86&PID_7523` are the same pattern.

use serde::{Deserialize, Serialize};

use crate::error::DetectError;

/// Wildcard pattern matching every device
pub const WILDCARD: &str = "*";

/// Identity patterns supplied with a `discover` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryFilters {
    /// Identity patterns; `pnpid` is the legacy wire name
    #[serde(alias = "pnpid")]
    pub patterns: Vec<String>,
}

impl DiscoveryFilters {
    pub fn new(patterns: Vec<String>) -> Self {
        Self { patterns }
    }

    /// Reject filters that could never match anything
    pub fn validate(&self) -> Result<(), DetectError> {
        if self.patterns.is_empty() {
            return Err(DetectError::EmptyFilters);
        }
        Ok(())
    }

    /// Check whether any pattern matches the identity string
    pub fn matches(&self, identity: &str) -> bool {
        self.patterns
            .iter()
            .any(|pattern| pattern_matches(pattern, identity))
    }
}

fn pattern_matches(pattern: &str, identity: &str) -> bool {
    if pattern == WILDCARD {
        return true;
    }

    match pattern.strip_suffix('*') {
        Some(prefix) => identity
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix)),
        None => identity.eq_ignore_ascii_case(pattern),
    }
}
