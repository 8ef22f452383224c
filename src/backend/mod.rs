//! Backend client boundary
//!
//! Every provider is reached through a [`BackendClient`]. The router treats
//! the work and the response content as opaque; it only looks at latency and
//! at the failure message, which feeds the classifier.

pub mod http;

pub use http::HttpBackend;

use crate::models::ProviderId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Opaque unit of work routed to a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Work {
    payload: serde_json::Value,
}

impl Work {
    pub fn new(payload: serde_json::Value) -> Self {
        Self { payload }
    }

    /// Minimal fixed payload used by active health probes
    pub fn probe() -> Self {
        Self {
            payload: serde_json::json!({ "probe": "ping", "max_tokens": 1 }),
        }
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }
}

impl From<serde_json::Value> for Work {
    fn from(payload: serde_json::Value) -> Self {
        Self::new(payload)
    }
}

/// Successful backend call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendResponse {
    pub content: String,
    pub latency: Duration,
}

impl BackendResponse {
    pub fn new(content: impl Into<String>, latency: Duration) -> Self {
        Self {
            content: content.into(),
            latency,
        }
    }
}

/// Failed backend call
///
/// Only the message is interpreted, by the classifier. Adapters should keep
/// vendor status lines and error codes in it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct BackendFailure {
    pub message: String,
}

impl BackendFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A provider capable of performing routed work
///
/// Implementations must honour `timeout` as an upper bound on the call; the
/// router additionally enforces it from the outside.
#[async_trait]
pub trait BackendClient: Send + Sync {
    async fn call(&self, work: &Work, timeout: Duration) -> Result<BackendResponse, BackendFailure>;
}

/// One configured provider: identity, client and timeout
///
/// `configured_valid == false` entries are skipped at router construction
/// (e.g. a provider whose API key is missing from the environment).
#[derive(Clone)]
pub struct ProviderSpec {
    id: ProviderId,
    client: Arc<dyn BackendClient>,
    timeout: Duration,
    configured_valid: bool,
}

impl ProviderSpec {
    pub fn new(id: impl Into<ProviderId>, client: Arc<dyn BackendClient>, timeout: Duration) -> Self {
        Self {
            id: id.into(),
            client,
            timeout,
            configured_valid: true,
        }
    }

    /// Mark whether this entry should be registered
    pub fn with_configured_valid(mut self, valid: bool) -> Self {
        self.configured_valid = valid;
        self
    }

    pub fn id(&self) -> &ProviderId {
        &self.id
    }

    pub fn client(&self) -> &Arc<dyn BackendClient> {
        &self.client
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_configured_valid(&self) -> bool {
        self.configured_valid
    }
}

impl fmt::Debug for ProviderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSpec")
            .field("id", &self.id)
            .field("timeout", &self.timeout)
            .field("configured_valid", &self.configured_valid)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl BackendClient for Echo {
        async fn call(&self, work: &Work, _timeout: Duration) -> Result<BackendResponse, BackendFailure> {
            Ok(BackendResponse::new(work.payload().to_string(), Duration::from_millis(1)))
        }
    }

    #[tokio::test]
    async fn test_backend_client_is_object_safe() {
        let client: Arc<dyn BackendClient> = Arc::new(Echo);
        let work = Work::new(serde_json::json!({"q": 1}));
        let response = client.call(&work, Duration::from_secs(1)).await.unwrap();
        assert_eq!(response.content, r#"{"q":1}"#);
    }

    #[test]
    fn test_provider_spec_defaults_to_valid() {
        let spec = ProviderSpec::new("a", Arc::new(Echo), Duration::from_secs(3));
        assert!(spec.is_configured_valid());
        assert_eq!(spec.id().as_str(), "a");
        assert_eq!(spec.timeout(), Duration::from_secs(3));

        let spec = spec.with_configured_valid(false);
        assert!(!spec.is_configured_valid());
    }

    #[test]
    fn test_backend_failure_displays_message() {
        let failure = BackendFailure::new("HTTP 429 Too Many Requests");
        assert_eq!(failure.to_string(), "HTTP 429 Too Many Requests");
    }

    #[test]
    fn test_work_serializes_transparently() {
        let work = Work::new(serde_json::json!({"prompt": "hi"}));
        assert_eq!(serde_json::to_string(&work).unwrap(), r#"{"prompt":"hi"}"#);
    }
}
