//! Prometheus metrics collection for switchyard
//!
//! This module provides metrics instrumentation for tracking:
//! - Attempts by provider and outcome (success or classified error kind)
//! - Successful attempt latency by provider
//! - Provider switches by triggering error kind
//! - Calls that gave up, by exhaustion reason
//! - Active probe results and provider availability
//!
//! Label values come from closed enums (`ErrorKind`, `ExhaustionReason`) or
//! from configured provider IDs, so cardinality is bounded by configuration.
//! The embedding application exposes [`Metrics::gather_text`] however it likes.

use crate::classifier::ErrorKind;
use crate::error::ExhaustionReason;
use crate::models::ProviderId;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Outcome label for successful attempts and probes
const SUCCESS_LABEL: &str = "success";

/// Error kind label for switches not caused by a failure (admin override)
const NO_ERROR_LABEL: &str = "none";

/// Metrics collector for the router
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,
    attempts_total: IntCounterVec,
    attempt_latency: HistogramVec,
    switches_total: IntCounterVec,
    exhausted_total: IntCounterVec,
    probe_results_total: IntCounterVec,
    provider_available: IntGaugeVec,
}

impl Metrics {
    /// Create a new Metrics instance
    ///
    /// Registers all metrics with a new Prometheus registry.
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails (e.g., duplicate names).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Cardinality: N providers × (1 success + 8 error kinds)
        let attempts_total = IntCounterVec::new(
            Opts::new(
                "switchyard_attempts_total",
                "Total backend attempts by provider and outcome",
            ),
            &["provider", "outcome"],
        )?;

        let attempt_latency = HistogramVec::new(
            HistogramOpts::new(
                "switchyard_attempt_latency_ms",
                "Latency of successful backend attempts in milliseconds",
            )
            .buckets(vec![
                10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0,
            ]),
            &["provider"],
        )?;

        let switches_total = IntCounterVec::new(
            Opts::new(
                "switchyard_switches_total",
                "Total provider switches by the error kind that triggered them",
            ),
            &["error_kind"],
        )?;

        let exhausted_total = IntCounterVec::new(
            Opts::new(
                "switchyard_exhausted_total",
                "Total calls that returned an aggregated failure, by reason",
            ),
            &["reason"],
        )?;

        let probe_results_total = IntCounterVec::new(
            Opts::new(
                "switchyard_probe_results_total",
                "Total active health probe results by provider and outcome",
            ),
            &["provider", "outcome"],
        )?;

        // 1 = available, 0 = disabled until reset or passing probe
        let provider_available = IntGaugeVec::new(
            Opts::new(
                "switchyard_provider_available",
                "Whether a provider is currently available for selection",
            ),
            &["provider"],
        )?;

        registry.register(Box::new(attempts_total.clone()))?;
        registry.register(Box::new(attempt_latency.clone()))?;
        registry.register(Box::new(switches_total.clone()))?;
        registry.register(Box::new(exhausted_total.clone()))?;
        registry.register(Box::new(probe_results_total.clone()))?;
        registry.register(Box::new(provider_available.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            attempts_total,
            attempt_latency,
            switches_total,
            exhausted_total,
            probe_results_total,
            provider_available,
        })
    }

    /// Record a successful attempt and its latency
    ///
    /// # Errors
    ///
    /// Returns an error if `latency_ms` is NaN, infinite or negative; such
    /// values would corrupt every histogram percentile.
    pub fn record_attempt_success(
        &self,
        provider: &ProviderId,
        latency_ms: f64,
    ) -> Result<(), prometheus::Error> {
        if !latency_ms.is_finite() || latency_ms < 0.0 {
            return Err(prometheus::Error::Msg(format!(
                "Histogram value must be finite and non-negative, got: {}",
                latency_ms
            )));
        }

        self.attempts_total
            .get_metric_with_label_values(&[provider.as_str(), SUCCESS_LABEL])?
            .inc();
        self.attempt_latency
            .get_metric_with_label_values(&[provider.as_str()])?
            .observe(latency_ms);
        Ok(())
    }

    /// Record a failed attempt
    pub fn record_attempt_failure(
        &self,
        provider: &ProviderId,
        kind: ErrorKind,
    ) -> Result<(), prometheus::Error> {
        self.attempts_total
            .get_metric_with_label_values(&[provider.as_str(), kind.as_label()])?
            .inc();
        Ok(())
    }

    /// Record a provider switch
    pub fn record_switch(&self, kind: Option<ErrorKind>) -> Result<(), prometheus::Error> {
        let label = kind.map(|k| k.as_label()).unwrap_or(NO_ERROR_LABEL);
        self.switches_total
            .get_metric_with_label_values(&[label])?
            .inc();
        Ok(())
    }

    /// Record a call that gave up
    pub fn record_exhausted(&self, reason: ExhaustionReason) -> Result<(), prometheus::Error> {
        self.exhausted_total
            .get_metric_with_label_values(&[reason.as_label()])?
            .inc();
        Ok(())
    }

    /// Record one provider's probe result
    pub fn record_probe(
        &self,
        provider: &ProviderId,
        outcome: Option<ErrorKind>,
    ) -> Result<(), prometheus::Error> {
        let label = outcome.map(|k| k.as_label()).unwrap_or(SUCCESS_LABEL);
        self.probe_results_total
            .get_metric_with_label_values(&[provider.as_str(), label])?
            .inc();
        Ok(())
    }

    /// Publish a provider's availability flag
    pub fn set_provider_available(
        &self,
        provider: &ProviderId,
        available: bool,
    ) -> Result<(), prometheus::Error> {
        self.provider_available
            .get_metric_with_label_values(&[provider.as_str()])?
            .set(i64::from(available));
        Ok(())
    }

    /// Attempts recorded for a provider with the given outcome (`None` = success)
    pub fn attempts_count(&self, provider: &ProviderId, outcome: Option<ErrorKind>) -> u64 {
        let label = outcome.map(|k| k.as_label()).unwrap_or(SUCCESS_LABEL);
        self.attempts_total
            .get_metric_with_label_values(&[provider.as_str(), label])
            .map(|c| c.get())
            .unwrap_or(0)
    }

    /// Switches recorded for a triggering error kind (`None` = admin override)
    pub fn switches_count(&self, kind: Option<ErrorKind>) -> u64 {
        let label = kind.map(|k| k.as_label()).unwrap_or(NO_ERROR_LABEL);
        self.switches_total
            .get_metric_with_label_values(&[label])
            .map(|c| c.get())
            .unwrap_or(0)
    }

    /// Calls that gave up for the given reason
    pub fn exhausted_count(&self, reason: ExhaustionReason) -> u64 {
        self.exhausted_total
            .get_metric_with_label_values(&[reason.as_label()])
            .map(|c| c.get())
            .unwrap_or(0)
    }

    /// Probe results recorded for a provider (`None` = success)
    pub fn probe_count(&self, provider: &ProviderId, outcome: Option<ErrorKind>) -> u64 {
        let label = outcome.map(|k| k.as_label()).unwrap_or(SUCCESS_LABEL);
        self.probe_results_total
            .get_metric_with_label_values(&[provider.as_str(), label])
            .map(|c| c.get())
            .unwrap_or(0)
    }

    /// Encode all metrics in Prometheus text exposition format
    ///
    /// # Errors
    ///
    /// Returns an error if metric encoding fails.
    pub fn gather_text(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();

        tracing::debug!(
            metric_family_count = metric_families.len(),
            "Encoding metrics to Prometheus text format"
        );

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&metric_families, &mut buffer)?;

        String::from_utf8(buffer).map_err(|e| {
            tracing::error!(
                invalid_byte_index = e.utf8_error().valid_up_to(),
                "Prometheus encoder produced invalid UTF-8"
            );
            prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e))
        })
    }
}
