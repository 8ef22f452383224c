//! Per-call correlation ID
//!
//! Every `Router::execute` call gets a fresh UUID that is attached to all of
//! its log lines and returned in the [`RoutedResponse`](super::RoutedResponse).

use serde::Serialize;
use uuid::Uuid;

/// Correlation ID for one logical call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CallId(Uuid);

impl CallId {
    /// Generate a new random call ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_ids_are_unique() {
        let a = CallId::new();
        let b = CallId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string(), a.as_uuid().to_string());
    }
}
