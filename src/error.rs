//! Error types for switchyard
//!
//! [`RouterError`] covers configuration and administrative failures.
//! [`AggregatedFailure`] is the only error `Router::execute` surfaces: it
//! summarises every attempt made for the call so callers never see a
//! backend-specific error.

use crate::classifier::ErrorKind;
use crate::models::{HealthError, ProviderId};
use serde::Serialize;
use std::fmt;

/// Main error type for the library
#[derive(thiserror::Error, Debug)]
pub enum RouterError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read config file {path}: {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ConfigParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration in {path}: {reason}")]
    ConfigValidationFailed { path: String, reason: String },

    #[error("Unknown provider: {0}")]
    UnknownProvider(ProviderId),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<HealthError> for RouterError {
    fn from(err: HealthError) -> Self {
        match err {
            HealthError::UnknownProvider(id) => RouterError::UnknownProvider(id),
        }
    }
}

/// Convenience type alias for Results
pub type RouterResult<T> = Result<T, RouterError>;

/// Why a call gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionReason {
    /// No healthy, untried provider was left to select
    NoAvailableProvider,
    /// The attempt budget (`max_retries + 1`) was spent
    RetriesExhausted,
    /// The work itself was rejected; other providers would reject it too
    InvalidRequest,
    /// The caller's deadline expired
    DeadlineExceeded,
}

impl ExhaustionReason {
    /// Prometheus label value
    pub fn as_label(&self) -> &'static str {
        match self {
            ExhaustionReason::NoAvailableProvider => "no_available_provider",
            ExhaustionReason::RetriesExhausted => "retries_exhausted",
            ExhaustionReason::InvalidRequest => "invalid_request",
            ExhaustionReason::DeadlineExceeded => "deadline_exceeded",
        }
    }
}

impl fmt::Display for ExhaustionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ExhaustionReason::NoAvailableProvider => "no available provider",
            ExhaustionReason::RetriesExhausted => "all retry attempts exhausted",
            ExhaustionReason::InvalidRequest => "request rejected as invalid",
            ExhaustionReason::DeadlineExceeded => "caller deadline exceeded",
        };
        f.write_str(text)
    }
}

/// One failed attempt within a call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedAttempt {
    pub provider_id: ProviderId,
    pub error_kind: ErrorKind,
    pub message: String,
}

/// Final failure of a call after every retry/switch option was used
#[derive(thiserror::Error, Debug, Clone, Serialize)]
#[error(
    "{reason} after {} attempt(s); last error: {}",
    .attempts.len(),
    .last_error.as_deref().unwrap_or("none")
)]
pub struct AggregatedFailure {
    reason: ExhaustionReason,
    attempts: Vec<FailedAttempt>,
    last_error: Option<String>,
}

impl AggregatedFailure {
    pub fn new(reason: ExhaustionReason, attempts: Vec<FailedAttempt>) -> Self {
        let last_error = attempts.last().map(|a| a.message.clone());
        Self {
            reason,
            attempts,
            last_error,
        }
    }

    pub fn reason(&self) -> ExhaustionReason {
        self.reason
    }

    /// Every failed attempt, in order
    pub fn attempts(&self) -> &[FailedAttempt] {
        &self.attempts
    }

    /// Providers attempted, in first-attempt order, without duplicates
    pub fn attempted_providers(&self) -> Vec<ProviderId> {
        let mut seen = Vec::new();
        for attempt in &self.attempts {
            if !seen.contains(&attempt.provider_id) {
                seen.push(attempt.provider_id.clone());
            }
        }
        seen
    }

    /// Classified kind of each failed attempt, in order
    pub fn error_kinds(&self) -> Vec<ErrorKind> {
        self.attempts.iter().map(|a| a.error_kind).collect()
    }

    /// Raw message of the final failed attempt
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}
