//! Type-safe provider identifier
//!
//! Provides type safety for provider IDs used throughout the routing system,
//! particularly in exclusion sets for retry logic.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Stable identifier of a configured provider
///
/// Construction does not validate against the registry; unknown IDs surface
/// as `HealthError::UnknownProvider` when used with registry methods.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    /// Create a ProviderId from anything string-like
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ProviderId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ProviderId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl AsRef<str> for ProviderId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Providers that must not be selected for the remainder of a call
pub type ExclusionSet = HashSet<ProviderId>;
