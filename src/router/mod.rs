//! Health-aware provider router
//!
//! [`Router`] is an explicit value holding every piece of shared state: the
//! provider registry, the switch event log, the current-provider hint and the
//! probe scheduler. Cloning it is cheap and every clone sees the same state,
//! so it can be handed to as many concurrent callers as needed.

mod call_id;
mod execute;


pub use call_id::CallId;
pub use execute::{ExecuteOptions, RoutedResponse, SWITCH_AFTER_CONSECUTIVE_FAILURES};

use crate::backend::ProviderSpec;
use crate::config::{Config, RouterSettings};
use crate::error::{RouterError, RouterResult};
use crate::events::{EventLog, SwitchEvent};
use crate::metrics::Metrics;
use crate::models::{
    ExclusionSet, HealthProbe, ProbeHandle, ProbeReport, ProviderId, ProviderRegistry,
    select_next,
};
use crate::status::{StatusReport, StatusReporter};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Routes work across interchangeable providers
#[derive(Clone)]
pub struct Router {
    settings: Arc<RouterSettings>,
    providers: Arc<HashMap<ProviderId, ProviderSpec>>,
    registry: Arc<ProviderRegistry>,
    events: Arc<EventLog>,
    /// First selection candidate for new calls
    current: Arc<RwLock<ProviderId>>,
    probe: Arc<HealthProbe>,
    reporter: StatusReporter,
    metrics: Arc<Metrics>,
}

impl Router {
    /// Build a router from settings and provider entries
    ///
    /// Entries with `is_configured_valid() == false` are skipped. The first
    /// registered provider becomes the initial current provider.
    ///
    /// # Errors
    ///
    /// Returns `RouterError::Config` if the settings fail
    /// [`RouterSettings::validate`], if no valid provider remains, or if two
    /// valid entries share an ID.
    pub fn new(settings: RouterSettings, providers: Vec<ProviderSpec>) -> RouterResult<Self> {
        settings.validate()?;

        let mut specs: Vec<ProviderSpec> = Vec::with_capacity(providers.len());
        for spec in providers {
            if !spec.is_configured_valid() {
                tracing::warn!(
                    provider_id = %spec.id(),
                    "Skipping provider that is not validly configured"
                );
                continue;
            }
            if specs.iter().any(|s| s.id() == spec.id()) {
                return Err(RouterError::Config(format!(
                    "duplicate provider id '{}'",
                    spec.id()
                )));
            }
            specs.push(spec);
        }

        let first = specs
            .first()
            .map(|s| s.id().clone())
            .ok_or_else(|| RouterError::Config("no validly configured providers".to_string()))?;

        let metrics = Arc::new(Metrics::new().map_err(|e| {
            RouterError::Internal(format!("failed to register metrics: {}", e))
        })?);

        let registry = Arc::new(ProviderRegistry::new(specs.iter().map(|s| s.id().clone())));
        let events = Arc::new(EventLog::new(settings.event_log_capacity));
        let current = Arc::new(RwLock::new(first));
        let probe = Arc::new(HealthProbe::new(
            registry.clone(),
            specs.clone(),
            settings.health_check_interval,
            settings.probe_timeout,
            metrics.clone(),
        ));
        let reporter = StatusReporter::new(registry.clone(), events.clone(), current.clone());

        for spec in &specs {
            if let Err(e) = metrics.set_provider_available(spec.id(), true) {
                tracing::error!(error = %e, "Metrics recording failed (non-fatal)");
            }
        }

        tracing::info!(
            providers = ?registry.provider_ids(),
            max_retries = settings.max_retries,
            health_check_interval_secs = settings.health_check_interval.as_secs(),
            "Router initialized"
        );

        let providers = specs
            .into_iter()
            .map(|spec| (spec.id().clone(), spec))
            .collect();

        Ok(Self {
            settings: Arc::new(settings),
            providers: Arc::new(providers),
            registry,
            events,
            current,
            probe,
            reporter,
            metrics,
        })
    }

    /// Build a router with HTTP backends from a parsed [`Config`]
    pub fn from_config(config: &Config) -> RouterResult<Self> {
        Self::new(config.settings(), config.provider_specs()?)
    }

    /// Structured snapshot of provider health and recent switches
    pub async fn get_status(&self) -> StatusReport {
        self.reporter.report(self.settings.status_event_limit).await
    }

    /// Providers currently eligible for selection, in registration order
    pub async fn list_available_providers(&self) -> Vec<ProviderId> {
        self.registry.healthy_providers().await
    }

    /// Provider tried first by the next call
    pub async fn current_provider(&self) -> ProviderId {
        self.current.read().await.clone()
    }

    /// Administratively set the current provider
    ///
    /// The target does not have to be healthy; if it is not, selection falls
    /// through to the best healthy provider as usual.
    ///
    /// # Errors
    ///
    /// Returns `RouterError::UnknownProvider` if `target` is not registered.
    pub async fn force_switch(
        &self,
        target: &ProviderId,
        reason: impl Into<String>,
    ) -> RouterResult<()> {
        if !self.registry.contains(target) {
            return Err(RouterError::UnknownProvider(target.clone()));
        }

        if !self.registry.is_healthy(target).await {
            tracing::warn!(
                provider_id = %target,
                "Forcing switch to a provider that is currently unhealthy"
            );
        }

        let mut current = self.current.write().await;
        if &*current == target {
            tracing::debug!(provider_id = %target, "Forced switch target is already current");
            return Ok(());
        }

        self.events
            .append(SwitchEvent::new(
                current.clone(),
                target.clone(),
                format!("manual: {}", reason.into()),
                None,
            ))
            .await;
        if let Err(e) = self.metrics.record_switch(None) {
            tracing::error!(error = %e, "Metrics recording failed (non-fatal)");
        }
        *current = target.clone();
        Ok(())
    }

    /// Clear a provider's failure state
    ///
    /// # Errors
    ///
    /// Returns `RouterError::UnknownProvider` if the provider is not registered.
    pub async fn reset_provider(&self, provider_id: &ProviderId) -> RouterResult<()> {
        self.registry.reset(provider_id).await?;
        if let Err(e) = self.metrics.set_provider_available(provider_id, true) {
            tracing::error!(error = %e, "Metrics recording failed (non-fatal)");
        }
        tracing::info!(provider_id = %provider_id, "Provider health reset");
        Ok(())
    }

    /// Run a probe round if one is due at `now`
    ///
    /// After a round, if the current provider is unhealthy and a healthy
    /// alternative exists, the current provider is switched to it.
    pub async fn run_health_probe_if_due(&self, now: std::time::Instant) -> Option<ProbeReport> {
        let report = self.probe.run_if_due(now).await?;
        self.switch_from_unhealthy_current().await;
        Some(report)
    }

    /// Spawn a background task that probes once per health check interval
    ///
    /// The task stops when the returned handle is shut down or dropped.
    pub fn start_health_probe(&self) -> ProbeHandle {
        let router = self.clone();

        tracing::info!(
            interval_secs = self.settings.health_check_interval.as_secs_f64(),
            "Starting background health probe"
        );

        ProbeHandle::new(tokio::spawn(async move {
            loop {
                // Rounds claimed from the request path move the next due time
                let due = router.probe.next_due().await;
                tokio::time::sleep_until(tokio::time::Instant::from_std(due)).await;
                router
                    .run_health_probe_if_due(std::time::Instant::now())
                    .await;
            }
        }))
    }

    /// Start a due probe round without waiting for it
    async fn spawn_probe_if_due(&self) {
        if !self.settings.opportunistic_probes
            || !self.probe.is_due(std::time::Instant::now()).await
        {
            return;
        }

        let router = self.clone();
        tokio::spawn(async move {
            router
                .run_health_probe_if_due(std::time::Instant::now())
                .await;
        });
    }

    async fn switch_from_unhealthy_current(&self) {
        let mut current = self.current.write().await;
        let snapshot = self.registry.snapshot().await;

        let Some(health) = snapshot.iter().find(|h| h.provider_id() == &*current) else {
            return;
        };
        if health.is_healthy() {
            return;
        }

        let exclude: ExclusionSet = [current.clone()].into_iter().collect();
        let Some(next) = select_next(&snapshot, &exclude, None) else {
            tracing::warn!(
                provider_id = %*current,
                "Current provider is unhealthy and no alternative is available"
            );
            return;
        };

        let kind = health.last_error_kind();
        self.events
            .append(SwitchEvent::new(
                current.clone(),
                next.clone(),
                format!("health check: {} is unhealthy", *current),
                kind,
            ))
            .await;
        if let Err(e) = self.metrics.record_switch(kind) {
            tracing::error!(error = %e, "Metrics recording failed (non-fatal)");
        }
        *current = next;
    }

    pub fn settings(&self) -> &RouterSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn events(&self) -> &Arc<EventLog> {
        &self.events
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("settings", &self.settings)
            .field("providers", &self.registry.provider_ids())
            .finish_non_exhaustive()
    }
}
