//! Health tracking for providers
//!
//! [`ProviderHealth`] is the per-provider record of success/failure history.
//! [`ProviderRegistry`] owns every record and is the single point of mutation:
//! all writes go through its methods under one lock, and readers receive
//! copies rather than live references.

use crate::classifier::ErrorKind;
use crate::models::provider_id::ProviderId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

/// Weight given to a new latency sample in the moving average
pub const LATENCY_EWMA_WEIGHT: f64 = 0.2;

/// A provider with this many consecutive failures is unhealthy
pub const UNHEALTHY_CONSECUTIVE_FAILURES: u32 = 3;

/// Success rate is only enforced once a provider has this many requests
pub const MIN_REQUESTS_FOR_SUCCESS_RATE: u64 = 5;

/// Minimum success rate for a provider past the warm-up window
pub const MIN_SUCCESS_RATE: f64 = 0.5;

/// Errors from health tracking operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HealthError {
    /// Provider ID not found in the registry
    #[error("Unknown provider: {0}")]
    UnknownProvider(ProviderId),
}

/// Health status for a single provider
///
/// All fields are private; state transitions happen only through the
/// registry so the invariants below hold for every observable snapshot:
/// - `successful_requests <= total_requests`, so the success rate is in `[0, 1]`
/// - `is_available` is cleared only by a provider-disabling error kind
#[derive(Clone, Debug, Serialize)]
pub struct ProviderHealth {
    provider_id: ProviderId,
    is_available: bool,
    consecutive_failures: u32,
    total_requests: u64,
    successful_requests: u64,
    average_response_time_ms: f64,
    last_error: Option<String>,
    last_error_kind: Option<ErrorKind>,
    last_success_time: Option<DateTime<Utc>>,
    last_error_time: Option<DateTime<Utc>>,
}

impl ProviderHealth {
    /// Create a fresh record: available, no history
    pub fn new(provider_id: ProviderId) -> Self {
        Self {
            provider_id,
            is_available: true,
            consecutive_failures: 0,
            total_requests: 0,
            successful_requests: 0,
            average_response_time_ms: 0.0,
            last_error: None,
            last_error_kind: None,
            last_success_time: None,
            last_error_time: None,
        }
    }

    pub fn provider_id(&self) -> &ProviderId {
        &self.provider_id
    }

    pub fn is_available(&self) -> bool {
        self.is_available
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests
    }

    pub fn successful_requests(&self) -> u64 {
        self.successful_requests
    }

    /// Fraction of requests that succeeded; 1.0 before any request
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            1.0
        } else {
            self.successful_requests as f64 / self.total_requests as f64
        }
    }

    /// Moving average of successful call latency in milliseconds (0.0 before any success)
    pub fn average_response_time_ms(&self) -> f64 {
        self.average_response_time_ms
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_error_kind(&self) -> Option<ErrorKind> {
        self.last_error_kind
    }

    pub fn last_success_time(&self) -> Option<DateTime<Utc>> {
        self.last_success_time
    }

    pub fn last_error_time(&self) -> Option<DateTime<Utc>> {
        self.last_error_time
    }

    /// Eligibility for selection
    ///
    /// Available, fewer than 3 consecutive failures, and either still in the
    /// 5-request warm-up window or succeeding at least half the time.
    pub fn is_healthy(&self) -> bool {
        self.is_available
            && self.consecutive_failures < UNHEALTHY_CONSECUTIVE_FAILURES
            && (self.total_requests < MIN_REQUESTS_FOR_SUCCESS_RATE
                || self.success_rate() >= MIN_SUCCESS_RATE)
    }

    pub(crate) fn apply_success(&mut self, latency: Duration) {
        let sample_ms = latency.as_secs_f64() * 1000.0;

        self.total_requests = self.total_requests.saturating_add(1);
        self.successful_requests = self.successful_requests.saturating_add(1);
        self.consecutive_failures = 0;
        self.is_available = true;
        self.average_response_time_ms = if self.successful_requests == 1 {
            sample_ms
        } else {
            (1.0 - LATENCY_EWMA_WEIGHT) * self.average_response_time_ms
                + LATENCY_EWMA_WEIGHT * sample_ms
        };
        self.last_success_time = Some(Utc::now());
    }

    pub(crate) fn apply_failure(&mut self, kind: ErrorKind, message: &str) {
        self.total_requests = self.total_requests.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_error = Some(message.to_string());
        self.last_error_kind = Some(kind);
        self.last_error_time = Some(Utc::now());

        if kind.disables_provider() {
            self.is_available = false;
        }
    }
}

/// Registry of configured providers and their health
///
/// Provider order is fixed at construction and is the tie-break order used
/// by selection. All mutating methods take the write lock for the duration
/// of a single in-memory update only.
#[derive(Debug)]
pub struct ProviderRegistry {
    order: Vec<ProviderId>,
    health: RwLock<HashMap<ProviderId, ProviderHealth>>,
}

impl ProviderRegistry {
    /// Create a registry with every provider starting healthy
    ///
    /// Duplicate IDs keep their first position.
    pub fn new(providers: impl IntoIterator<Item = ProviderId>) -> Self {
        let mut order = Vec::new();
        let mut health = HashMap::new();

        for id in providers {
            if health.contains_key(&id) {
                tracing::warn!(provider_id = %id, "Ignoring duplicate provider registration");
                continue;
            }
            health.insert(id.clone(), ProviderHealth::new(id.clone()));
            order.push(id);
        }

        tracing::info!(
            total_providers = order.len(),
            "ProviderRegistry initialized with all providers starting as healthy"
        );

        Self {
            order,
            health: RwLock::new(health),
        }
    }

    /// Provider IDs in registration order
    pub fn provider_ids(&self) -> &[ProviderId] {
        &self.order
    }

    pub fn contains(&self, provider_id: &ProviderId) -> bool {
        self.order.contains(provider_id)
    }

    /// Record a successful call
    ///
    /// Resets consecutive failures, re-enables the provider, and folds the
    /// latency into the moving average. Returns the updated record.
    pub async fn record_success(
        &self,
        provider_id: &ProviderId,
        latency: Duration,
    ) -> Result<ProviderHealth, HealthError> {
        let mut status = self.health.write().await;
        let health = status
            .get_mut(provider_id)
            .ok_or_else(|| HealthError::UnknownProvider(provider_id.clone()))?;

        let was_unavailable = !health.is_available;
        health.apply_success(latency);

        if was_unavailable {
            tracing::info!(
                provider_id = %provider_id,
                "Provider recovered to available state"
            );
        } else {
            tracing::debug!(
                provider_id = %provider_id,
                latency_ms = latency.as_millis() as u64,
                average_response_time_ms = health.average_response_time_ms,
                "Provider success recorded"
            );
        }

        Ok(health.clone())
    }

    /// Record a failed call
    ///
    /// Provider-disabling kinds (quota, authentication) mark the provider
    /// unavailable unconditionally. Returns the updated record.
    pub async fn record_failure(
        &self,
        provider_id: &ProviderId,
        kind: ErrorKind,
        message: &str,
    ) -> Result<ProviderHealth, HealthError> {
        let mut status = self.health.write().await;
        let health = status
            .get_mut(provider_id)
            .ok_or_else(|| HealthError::UnknownProvider(provider_id.clone()))?;

        let was_available = health.is_available;
        health.apply_failure(kind, message);

        if was_available && !health.is_available {
            tracing::warn!(
                provider_id = %provider_id,
                error_kind = %kind,
                "Provider disabled until reset or successful health probe"
            );
        } else {
            tracing::debug!(
                provider_id = %provider_id,
                error_kind = %kind,
                consecutive_failures = health.consecutive_failures,
                "Provider failure recorded"
            );
        }

        Ok(health.clone())
    }

    /// Clear all history and re-enable the provider
    ///
    /// Idempotent: resetting twice leaves the same state as resetting once.
    pub async fn reset(&self, provider_id: &ProviderId) -> Result<(), HealthError> {
        let mut status = self.health.write().await;
        let health = status
            .get_mut(provider_id)
            .ok_or_else(|| HealthError::UnknownProvider(provider_id.clone()))?;

        *health = ProviderHealth::new(provider_id.clone());
        tracing::info!(provider_id = %provider_id, "Provider health reset");
        Ok(())
    }

    /// Check if a provider is currently eligible for selection
    ///
    /// Unknown providers are considered unhealthy.
    pub async fn is_healthy(&self, provider_id: &ProviderId) -> bool {
        let status = self.health.read().await;
        status
            .get(provider_id)
            .map(ProviderHealth::is_healthy)
            .unwrap_or(false)
    }

    /// Copy of a single provider's record
    pub async fn get(&self, provider_id: &ProviderId) -> Option<ProviderHealth> {
        let status = self.health.read().await;
        status.get(provider_id).cloned()
    }

    /// Consistent copy of every record, in registration order
    pub async fn snapshot(&self) -> Vec<ProviderHealth> {
        let status = self.health.read().await;
        self.order
            .iter()
            .filter_map(|id| status.get(id).cloned())
            .collect()
    }

    /// IDs of providers currently eligible for selection, in registration order
    pub async fn healthy_providers(&self) -> Vec<ProviderId> {
        let status = self.health.read().await;
        self.order
            .iter()
            .filter(|id| status.get(*id).is_some_and(ProviderHealth::is_healthy))
            .cloned()
            .collect()
    }
}
