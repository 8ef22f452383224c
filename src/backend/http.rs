//! HTTP backend adapter
//!
//! POSTs the work payload as JSON to a provider URL. Failures are flattened
//! into messages that keep the HTTP status line and response body, so the
//! classifier sees "429 Too Many Requests", "401 Unauthorized", "503 ..." and
//! vendor error codes such as `insufficient_quota`.

use super::{BackendClient, BackendFailure, BackendResponse, Work};
use crate::error::{RouterError, RouterResult};
use async_trait::async_trait;
use std::time::{Duration, Instant};

/// Longest response body excerpt kept in a failure message
const MAX_ERROR_BODY_CHARS: usize = 500;

/// [`BackendClient`] speaking JSON over HTTP
#[derive(Debug, Clone)]
pub struct HttpBackend {
    url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpBackend {
    /// Create an adapter for `url`, optionally sending `api_key` as a bearer token
    ///
    /// # Errors
    ///
    /// Returns `RouterError::HttpClient` if the underlying client cannot be
    /// built (TLS backend initialisation failure).
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> RouterResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| RouterError::HttpClient(e.to_string()))?;

        Ok(Self {
            url: url.into(),
            api_key,
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl BackendClient for HttpBackend {
    async fn call(&self, work: &Work, timeout: Duration) -> Result<BackendResponse, BackendFailure> {
        let started = Instant::now();

        let mut request = self.client.post(&self.url).timeout(timeout).json(work.payload());
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            tracing::debug!(url = %self.url, error = %e, "HTTP backend request failed");
            describe_transport_error(&e)
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| describe_transport_error(&e))?;

        if !status.is_success() {
            tracing::debug!(
                url = %self.url,
                status = %status,
                "HTTP backend returned error status"
            );
            let excerpt: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            return Err(BackendFailure::new(format!("HTTP {}: {}", status, excerpt)));
        }

        Ok(BackendResponse::new(body, started.elapsed()))
    }
}

fn describe_transport_error(error: &reqwest::Error) -> BackendFailure {
    if error.is_timeout() {
        BackendFailure::new(format!("request timed out: {}", error))
    } else if error.is_connect() {
        BackendFailure::new(format!("connection failed: {}", error))
    } else {
        BackendFailure::new(format!("request failed: {}", error))
    }
}
