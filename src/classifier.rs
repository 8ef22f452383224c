//! Failure classification for backend errors
//!
//! Maps a raw failure message onto a fixed [`ErrorKind`] taxonomy. The kind
//! drives remediation in the router: fatal kinds disable the provider, rate
//! limits force a switch with extra backoff, everything else counts toward
//! the consecutive-failure threshold.
//!
//! Matching is a case-insensitive substring search over ordered keyword
//! groups. The first group that matches wins.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classified failure kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    QuotaExceeded,
    RateLimit,
    Authentication,
    NetworkError,
    Timeout,
    InvalidRequest,
    ServerError,
    Unknown,
}

impl ErrorKind {
    /// All kinds, in classification priority order
    pub const ALL: [ErrorKind; 8] = [
        ErrorKind::QuotaExceeded,
        ErrorKind::RateLimit,
        ErrorKind::Authentication,
        ErrorKind::Timeout,
        ErrorKind::NetworkError,
        ErrorKind::InvalidRequest,
        ErrorKind::ServerError,
        ErrorKind::Unknown,
    ];

    /// Kinds that take a provider out of rotation until reset or a passing probe
    pub fn disables_provider(&self) -> bool {
        matches!(self, ErrorKind::QuotaExceeded | ErrorKind::Authentication)
    }

    /// Kinds that move the call to another provider regardless of failure count
    pub fn forces_switch(&self) -> bool {
        self.disables_provider() || matches!(self, ErrorKind::RateLimit)
    }

    /// Prometheus label value
    pub fn as_label(&self) -> &'static str {
        match self {
            ErrorKind::QuotaExceeded => "quota_exceeded",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Authentication => "authentication",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::ServerError => "server_error",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::QuotaExceeded => "QuotaExceeded",
            ErrorKind::RateLimit => "RateLimit",
            ErrorKind::Authentication => "Authentication",
            ErrorKind::NetworkError => "NetworkError",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::InvalidRequest => "InvalidRequest",
            ErrorKind::ServerError => "ServerError",
            ErrorKind::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

// Timeout is checked before NetworkError: "connection timed out" is a timeout.
const KEYWORD_GROUPS: &[(ErrorKind, &[&str])] = &[
    (
        ErrorKind::QuotaExceeded,
        &[
            "quota",
            "insufficient_quota",
            "billing",
            "credits",
            "usage limit",
        ],
    ),
    (
        ErrorKind::RateLimit,
        &[
            "rate limit",
            "too many requests",
            "throttle",
            "rate_limit_exceeded",
        ],
    ),
    (
        ErrorKind::Authentication,
        &[
            "authentication",
            "unauthorized",
            "invalid api key",
            "api_key",
        ],
    ),
    (
        ErrorKind::Timeout,
        &["timeout", "timed out", "deadline exceeded"],
    ),
    (
        ErrorKind::NetworkError,
        &["connection", "network", "dns", "unreachable"],
    ),
    (
        ErrorKind::InvalidRequest,
        &["invalid request", "bad request", "validation error"],
    ),
    (
        ErrorKind::ServerError,
        &[
            "server error",
            "internal error",
            "500",
            "502",
            "503",
            "504",
        ],
    ),
];

/// Classify a raw failure message
///
/// Never fails: input matching no keyword group yields [`ErrorKind::Unknown`].
///
/// # Examples
///
/// ```
/// use switchyard::classifier::{classify, ErrorKind};
///
/// assert_eq!(classify("Invalid API key provided"), ErrorKind::Authentication);
/// assert_eq!(classify("something odd happened"), ErrorKind::Unknown);
/// ```
pub fn classify(message: &str) -> ErrorKind {
    let lowered = message.to_lowercase();
    KEYWORD_GROUPS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lowered.contains(k)))
        .map(|(kind, _)| *kind)
        .unwrap_or(ErrorKind::Unknown)
}
