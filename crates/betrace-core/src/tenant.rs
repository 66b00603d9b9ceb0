//! The opaque tenant identifier threaded through every component.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An opaque tenant identifier.
///
/// `spec.md` §3 requires tenant id to be an opaque string; this newtype
/// keeps it from being accidentally compared against a trace id or rule id,
/// both of which are also plain strings.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct TenantId(String);

impl TenantId {
    /// Wraps a raw tenant id string.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the raw tenant id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TenantId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl From<&str> for TenantId {
    fn from(raw: &str) -> Self {
        Self(raw.to_owned())
    }
}
