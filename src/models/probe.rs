//! Active health probing
//!
//! A probe round sends a minimal payload to every registered provider and
//! feeds each outcome through the same `record_success` / `record_failure`
//! path as real traffic. This is the only automatic way a disabled provider
//! becomes available again.
//!
//! Rounds run at most once per interval. Callers drive scheduling through
//! [`HealthProbe::run_if_due`]; the router either calls it from a background
//! task or spawns it opportunistically from the request path.

use crate::backend::{ProviderSpec, Work};
use crate::classifier::{ErrorKind, classify};
use crate::metrics::Metrics;
use crate::models::health::ProviderRegistry;
use crate::models::provider_id::ProviderId;
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Result of probing one provider
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub provider_id: ProviderId,
    /// Latency on success, classified kind on failure
    pub outcome: Result<Duration, ErrorKind>,
}

impl ProbeResult {
    pub fn passed(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Results of one probe round, in registration order
#[derive(Debug, Clone, Default)]
pub struct ProbeReport {
    pub results: Vec<ProbeResult>,
}

impl ProbeReport {
    pub fn result_for(&self, provider_id: &ProviderId) -> Option<&ProbeResult> {
        self.results.iter().find(|r| &r.provider_id == provider_id)
    }
}

/// Periodic active checker for registered providers
pub struct HealthProbe {
    registry: Arc<ProviderRegistry>,
    targets: Vec<ProviderSpec>,
    interval: Duration,
    probe_timeout: Duration,
    last_check: Mutex<Instant>,
    metrics: Arc<Metrics>,
}

impl HealthProbe {
    /// Create a probe; the first round becomes due one `interval` from now
    pub fn new(
        registry: Arc<ProviderRegistry>,
        targets: Vec<ProviderSpec>,
        interval: Duration,
        probe_timeout: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            registry,
            targets,
            interval,
            probe_timeout,
            last_check: Mutex::new(Instant::now()),
            metrics,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether a round would run at `now`
    pub async fn is_due(&self, now: Instant) -> bool {
        let last = *self.last_check.lock().await;
        now.saturating_duration_since(last) >= self.interval
    }

    /// Earliest instant at which the next round is due
    pub async fn next_due(&self) -> Instant {
        *self.last_check.lock().await + self.interval
    }

    /// Run a probe round if one is due at `now`
    ///
    /// The due-check and the claim of the slot happen under one lock, so
    /// concurrent callers start at most one round per interval. Returns
    /// `None` when not due.
    pub async fn run_if_due(&self, now: Instant) -> Option<ProbeReport> {
        {
            let mut last = self.last_check.lock().await;
            if now.saturating_duration_since(*last) < self.interval {
                return None;
            }
            *last = now;
        }

        Some(self.run_round().await)
    }

    /// Probe every target now, ignoring the schedule
    pub async fn run_round(&self) -> ProbeReport {
        tracing::debug!(targets = self.targets.len(), "Running health probe round");

        let results = join_all(self.targets.iter().map(|spec| self.probe_one(spec))).await;

        let failed = results.iter().filter(|r| !r.passed()).count();
        tracing::info!(
            probed = results.len(),
            failed = failed,
            "Health probe round completed"
        );

        ProbeReport { results }
    }

    async fn probe_one(&self, spec: &ProviderSpec) -> ProbeResult {
        let timeout = spec.timeout().min(self.probe_timeout);
        let work = Work::probe();

        let outcome = match tokio::time::timeout(timeout, spec.client().call(&work, timeout)).await {
            Ok(Ok(response)) => Ok(response.latency),
            Ok(Err(failure)) => Err(failure.message),
            Err(_) => Err(format!("health probe timed out after {}ms", timeout.as_millis())),
        };

        let outcome = match outcome {
            Ok(latency) => {
                if let Err(e) = self.registry.record_success(spec.id(), latency).await {
                    tracing::error!(provider_id = %spec.id(), error = %e, "Probe success not recorded");
                }
                Ok(latency)
            }
            Err(message) => {
                let kind = classify(&message);
                tracing::debug!(
                    provider_id = %spec.id(),
                    error_kind = %kind,
                    error = %message,
                    "Health probe failed"
                );
                if let Err(e) = self.registry.record_failure(spec.id(), kind, &message).await {
                    tracing::error!(provider_id = %spec.id(), error = %e, "Probe failure not recorded");
                }
                Err(kind)
            }
        };

        if let Err(e) = self.metrics.record_probe(spec.id(), outcome.err()) {
            tracing::error!(error = %e, "Metrics recording failed (non-fatal)");
        }
        if let Some(health) = self.registry.get(spec.id()).await {
            if let Err(e) = self
                .metrics
                .set_provider_available(spec.id(), health.is_available())
            {
                tracing::error!(error = %e, "Metrics recording failed (non-fatal)");
            }
        }

        ProbeResult {
            provider_id: spec.id().clone(),
            outcome,
        }
    }
}

/// Handle to a background probe task
///
/// The task is aborted on [`ProbeHandle::shutdown`] or when the handle is
/// dropped, so it never outlives its owner.
#[derive(Debug)]
pub struct ProbeHandle {
    handle: JoinHandle<()>,
}

impl ProbeHandle {
    pub(crate) fn new(handle: JoinHandle<()>) -> Self {
        Self { handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the background task
    pub fn shutdown(self) {
        self.handle.abort();
    }
}

impl Drop for ProbeHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
