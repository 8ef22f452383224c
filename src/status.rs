//! Read-only status projection
//!
//! [`StatusReporter`] combines a registry snapshot, the current provider hint
//! and the newest switch events into a serializable [`StatusReport`]. It has
//! no side effects.

use crate::classifier::ErrorKind;
use crate::events::{EventLog, SwitchEvent};
use crate::models::{ProviderHealth, ProviderId, ProviderRegistry};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Per-provider health summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderSummary {
    pub provider_id: ProviderId,
    pub is_available: bool,
    pub is_healthy: bool,
    pub success_rate: f64,
    pub consecutive_failures: u32,
    pub total_requests: u64,
    pub average_response_time_ms: f64,
    pub last_error: Option<String>,
    pub last_error_kind: Option<ErrorKind>,
}

impl From<&ProviderHealth> for ProviderSummary {
    fn from(health: &ProviderHealth) -> Self {
        Self {
            provider_id: health.provider_id().clone(),
            is_available: health.is_available(),
            is_healthy: health.is_healthy(),
            success_rate: health.success_rate(),
            consecutive_failures: health.consecutive_failures(),
            total_requests: health.total_requests(),
            average_response_time_ms: health.average_response_time_ms(),
            last_error: health.last_error().map(str::to_string),
            last_error_kind: health.last_error_kind(),
        }
    }
}

/// Snapshot of router state for external consumers
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub generated_at: DateTime<Utc>,
    pub current_provider: ProviderId,
    pub providers: Vec<ProviderSummary>,
    pub recent_switches: Vec<SwitchEvent>,
}

impl StatusReport {
    /// Summary for one provider
    pub fn provider(&self, provider_id: &str) -> Option<&ProviderSummary> {
        self.providers
            .iter()
            .find(|p| p.provider_id.as_str() == provider_id)
    }
}

/// Builds [`StatusReport`]s from shared router state
#[derive(Debug, Clone)]
pub struct StatusReporter {
    registry: Arc<ProviderRegistry>,
    events: Arc<EventLog>,
    current: Arc<RwLock<ProviderId>>,
}

impl StatusReporter {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        events: Arc<EventLog>,
        current: Arc<RwLock<ProviderId>>,
    ) -> Self {
        Self {
            registry,
            events,
            current,
        }
    }

    /// Produce a report with at most `recent_events` switch events
    pub async fn report(&self, recent_events: usize) -> StatusReport {
        let current_provider = self.current.read().await.clone();
        let providers = self
            .registry
            .snapshot()
            .await
            .iter()
            .map(ProviderSummary::from)
            .collect();
        let recent_switches = self.events.recent(recent_events).await;

        StatusReport {
            generated_at: Utc::now(),
            current_provider,
            providers,
            recent_switches,
        }
    }
}
