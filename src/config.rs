//! Configuration management for switchyard
//!
//! Parses TOML configuration files into router settings and provider
//! entries, and builds HTTP-backed [`ProviderSpec`]s from them.

use crate::backend::{HttpBackend, ProviderSpec};
use crate::error::{RouterError, RouterResult};
use crate::events::DEFAULT_EVENT_LOG_CAPACITY;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound for any timeout, in seconds
const MAX_TIMEOUT_SECONDS: u64 = 300;

/// Upper bound for `max_retries`
const MAX_RETRIES_LIMIT: u32 = 10;

/// Immutable router behaviour settings
#[derive(Debug, Clone, PartialEq)]
pub struct RouterSettings {
    /// Attempts per call are capped at `max_retries + 1`
    pub max_retries: u32,
    /// Base unit for retry and rate-limit backoff
    pub retry_base_delay: Duration,
    /// Minimum spacing between active probe rounds
    pub health_check_interval: Duration,
    /// Upper bound on a single probe call
    pub probe_timeout: Duration,
    pub event_log_capacity: usize,
    /// Switch events included in a status report
    pub status_event_limit: usize,
    /// Surface `InvalidRequest` immediately instead of trying other providers
    pub fail_fast_on_invalid_request: bool,
    /// Spawn a due probe round from the request path
    pub opportunistic_probes: bool,
}

impl RouterSettings {
    /// Check bounds that keep the call loop and the probe schedule finite
    ///
    /// `Router::new` rejects settings that fail this check; `Config::validate`
    /// applies it to the `[router]` section.
    pub fn validate(&self) -> RouterResult<()> {
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(RouterError::Config(format!(
                "router.max_retries cannot exceed {}, got {}",
                MAX_RETRIES_LIMIT, self.max_retries
            )));
        }

        if self.health_check_interval.is_zero() {
            return Err(RouterError::Config(
                "router.health_check_interval must be greater than 0".to_string(),
            ));
        }

        if self.probe_timeout.is_zero() {
            return Err(RouterError::Config(
                "router.probe_timeout must be greater than 0".to_string(),
            ));
        }
        if self.probe_timeout > Duration::from_secs(MAX_TIMEOUT_SECONDS) {
            return Err(RouterError::Config(format!(
                "router.probe_timeout cannot exceed {} seconds, got {:?}",
                MAX_TIMEOUT_SECONDS, self.probe_timeout
            )));
        }

        if self.event_log_capacity == 0 {
            return Err(RouterError::Config(
                "router.event_log_capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_base_delay: Duration::from_millis(default_retry_base_delay_ms()),
            health_check_interval: Duration::from_secs(default_health_check_interval()),
            probe_timeout: Duration::from_secs(default_probe_timeout()),
            event_log_capacity: DEFAULT_EVENT_LOG_CAPACITY,
            status_event_limit: default_status_event_limit(),
            fail_fast_on_invalid_request: true,
            opportunistic_probes: true,
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub router: RouterConfig,
    pub providers: Vec<ProviderEndpoint>,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// `[router]` section
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouterConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_seconds: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_seconds: u64,
    #[serde(default = "default_event_log_capacity")]
    pub event_log_capacity: usize,
    #[serde(default = "default_status_event_limit")]
    pub status_event_limit: usize,
    #[serde(default = "default_true")]
    pub fail_fast_on_invalid_request: bool,
    #[serde(default = "default_true")]
    pub opportunistic_probes: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            health_check_interval_seconds: default_health_check_interval(),
            probe_timeout_seconds: default_probe_timeout(),
            event_log_capacity: default_event_log_capacity(),
            status_event_limit: default_status_event_limit(),
            fail_fast_on_invalid_request: true,
            opportunistic_probes: true,
        }
    }
}

impl RouterConfig {
    /// Convert to runtime settings
    pub fn settings(&self) -> RouterSettings {
        RouterSettings {
            max_retries: self.max_retries,
            retry_base_delay: Duration::from_millis(self.retry_base_delay_ms),
            health_check_interval: Duration::from_secs(self.health_check_interval_seconds),
            probe_timeout: Duration::from_secs(self.probe_timeout_seconds),
            event_log_capacity: self.event_log_capacity,
            status_event_limit: self.status_event_limit,
            fail_fast_on_invalid_request: self.fail_fast_on_invalid_request,
            opportunistic_probes: self.opportunistic_probes,
        }
    }
}

/// One `[[providers]]` entry
///
/// Fields are private; instances come from deserialization and are checked
/// by `Config::validate()`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderEndpoint {
    id: String,
    base_url: String,
    #[serde(default = "default_provider_timeout")]
    timeout_seconds: u64,
    /// Environment variable holding the bearer token, if the provider needs one
    #[serde(default)]
    api_key_env: Option<String>,
    #[serde(default = "default_true")]
    enabled: bool,
}

impl ProviderEndpoint {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn api_key_env(&self) -> Option<&str> {
        self.api_key_env.as_deref()
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Resolve the API key from the environment
    ///
    /// `Ok(None)` when no key is configured; `Err` names the missing variable.
    fn resolve_api_key(&self) -> Result<Option<String>, String> {
        match &self.api_key_env {
            None => Ok(None),
            Some(var) => match std::env::var(var) {
                Ok(value) if !value.trim().is_empty() => Ok(Some(value)),
                _ => Err(var.clone()),
            },
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_health_check_interval() -> u64 {
    60
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_event_log_capacity() -> usize {
    DEFAULT_EVENT_LOG_CAPACITY
}

fn default_status_event_limit() -> usize {
    10
}

fn default_provider_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> RouterResult<Self> {
        let path_display = path.as_ref().display().to_string();

        let content = std::fs::read_to_string(path.as_ref()).map_err(|source| {
            RouterError::ConfigFileRead {
                path: path_display.clone(),
                source,
            }
        })?;

        let config: Self =
            toml::from_str(&content).map_err(|source| RouterError::ConfigParseFailed {
                path: path_display.clone(),
                source,
            })?;

        config
            .validate()
            .map_err(|e| RouterError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        Ok(config)
    }

    /// Runtime settings from the `[router]` section
    pub fn settings(&self) -> RouterSettings {
        self.router.settings()
    }

    /// Validate configuration after parsing
    ///
    /// Called by `from_file()` and `from_str()`.
    pub fn validate(&self) -> RouterResult<()> {
        if self.providers.is_empty() {
            return Err(RouterError::Config(
                "at least one [[providers]] entry is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for provider in &self.providers {
            if provider.id.trim().is_empty() {
                return Err(RouterError::Config(
                    "provider id cannot be empty".to_string(),
                ));
            }

            if !seen.insert(provider.id.as_str()) {
                return Err(RouterError::Config(format!(
                    "duplicate provider id '{}'",
                    provider.id
                )));
            }

            if !provider.base_url.starts_with("http://") && !provider.base_url.starts_with("https://")
            {
                return Err(RouterError::Config(format!(
                    "provider '{}' has invalid base_url '{}'. \
                    base_url must start with 'http://' or 'https://'.",
                    provider.id, provider.base_url
                )));
            }

            validate_timeout(
                &format!("providers.{}.timeout_seconds", provider.id),
                provider.timeout_seconds,
            )?;
        }

        self.router.settings().validate()?;

        Ok(())
    }

    /// Build one HTTP-backed [`ProviderSpec`] per configured provider
    ///
    /// Disabled providers and providers whose `api_key_env` variable is unset
    /// come back with `is_configured_valid() == false`; the router skips them.
    pub fn provider_specs(&self) -> RouterResult<Vec<ProviderSpec>> {
        self.providers
            .iter()
            .map(|provider| {
                let (api_key, key_ok) = match provider.resolve_api_key() {
                    Ok(key) => (key, true),
                    Err(var) => {
                        tracing::warn!(
                            provider_id = %provider.id,
                            env_var = %var,
                            "API key environment variable not set; provider will not be registered"
                        );
                        (None, false)
                    }
                };

                let client = HttpBackend::new(provider.base_url.clone(), api_key)?;
                Ok(ProviderSpec::new(provider.id.as_str(), Arc::new(client), provider.timeout())
                    .with_configured_valid(provider.enabled && key_ok))
            })
            .collect()
    }
}

fn validate_timeout(field: &str, seconds: u64) -> RouterResult<()> {
    if seconds == 0 {
        return Err(RouterError::Config(format!(
            "{} must be greater than 0",
            field
        )));
    }
    if seconds > MAX_TIMEOUT_SECONDS {
        return Err(RouterError::Config(format!(
            "{} cannot exceed {} seconds, got {}",
            field, MAX_TIMEOUT_SECONDS, seconds
        )));
    }
    Ok(())
}

impl FromStr for Config {
    type Err = RouterError;

    fn from_str(toml_str: &str) -> Result<Self, Self::Err> {
        let config: Config =
            toml::from_str(toml_str).map_err(|source| RouterError::ConfigParseFailed {
                path: "<string>".to_string(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }
}
