//! The routed call loop
//!
//! One `execute` call tries providers strictly one after another:
//!
//! 1. Pick a candidate: the current-provider hint first, then the best-ranked
//!    healthy provider not yet tried in this call. Providers that only failed
//!    softly stay eligible as a last resort.
//! 2. Invoke it with the provider timeout (clipped to the caller deadline).
//! 3. Classify any failure, record it in the registry, and decide:
//!    - `Authentication`, `QuotaExceeded`, `RateLimit`, or a second
//!      consecutive failure: switch away and never return to it in this call.
//!    - anything else: back off and retry, preferring untried providers.
//! 4. Stop after `max_retries + 1` attempts or when no candidate is left, and
//!    return an [`AggregatedFailure`] describing every attempt.

use super::{CallId, Router};
use crate::backend::Work;
use crate::classifier::{ErrorKind, classify};
use crate::error::{AggregatedFailure, ExhaustionReason, FailedAttempt};
use crate::events::SwitchEvent;
use crate::models::{ExclusionSet, ProviderId, select_next};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Consecutive failures after which a provider is switched away from
pub const SWITCH_AFTER_CONSECUTIVE_FAILURES: u32 = 2;

/// Failure text kept in switch event reasons
const REASON_EXCERPT_CHARS: usize = 200;

/// Per-call options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Overall budget for the call, including backoff sleeps
    pub deadline: Option<Duration>,
}

impl ExecuteOptions {
    pub fn with_deadline(deadline: Duration) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }
}

/// Successful routed call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutedResponse {
    pub call_id: CallId,
    /// Provider that produced the response
    pub provider_id: ProviderId,
    pub content: String,
    pub latency: Duration,
    /// Attempts made, including the successful one
    pub attempts: u32,
}

/// What happened to the provider after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureAction {
    /// Same provider may be tried again in this call
    Retry,
    /// Provider is out for the rest of this call
    Switch,
}

impl Router {
    /// Route `work` to a healthy provider, retrying and switching on failure
    ///
    /// Never returns a backend-specific error: every failure mode ends in an
    /// [`AggregatedFailure`] listing the attempts made.
    pub async fn execute(
        &self,
        work: &Work,
        options: ExecuteOptions,
    ) -> Result<RoutedResponse, AggregatedFailure> {
        self.spawn_probe_if_due().await;

        let call_id = CallId::new();
        let deadline = options.deadline.map(|d| Instant::now() + d);
        let max_attempts = self.settings.max_retries.saturating_add(1);

        let mut attempts: Vec<FailedAttempt> = Vec::new();
        // Soft exclusion: providers already tried in this call
        let mut tried = ExclusionSet::new();
        // Hard exclusion: providers switched away from in this call
        let mut switched_away = ExclusionSet::new();

        let preferred = self.current.read().await.clone();
        let mut next = self.pick(&tried, &switched_away, Some(&preferred)).await;
        let mut attempt: u32 = 0;

        tracing::debug!(
            call_id = %call_id,
            preferred = %preferred,
            max_attempts = max_attempts,
            "Starting routed call"
        );

        loop {
            let Some(provider_id) = next.take() else {
                return Err(self.exhausted(call_id, ExhaustionReason::NoAvailableProvider, attempts));
            };
            let Some(spec) = self.providers.get(&provider_id) else {
                tracing::error!(
                    call_id = %call_id,
                    provider_id = %provider_id,
                    "Selected provider has no registered client"
                );
                return Err(self.exhausted(call_id, ExhaustionReason::NoAvailableProvider, attempts));
            };
            attempt += 1;

            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            if remaining == Some(Duration::ZERO) {
                return Err(self.exhausted(call_id, ExhaustionReason::DeadlineExceeded, attempts));
            }
            let budget = remaining.map_or(spec.timeout(), |r| r.min(spec.timeout()));
            let clipped_by_deadline = budget < spec.timeout();

            tracing::debug!(
                call_id = %call_id,
                provider_id = %provider_id,
                attempt = attempt,
                max_attempts = max_attempts,
                timeout_ms = budget.as_millis() as u64,
                "Attempting provider"
            );

            let message =
                match tokio::time::timeout(budget, spec.client().call(work, budget)).await {
                    Ok(Ok(response)) => {
                        self.on_success(&provider_id, response.latency).await;
                        tracing::info!(
                            call_id = %call_id,
                            provider_id = %provider_id,
                            attempt = attempt,
                            latency_ms = response.latency.as_millis() as u64,
                            "Routed call succeeded"
                        );
                        return Ok(RoutedResponse {
                            call_id,
                            provider_id,
                            content: response.content,
                            latency: response.latency,
                            attempts: attempt,
                        });
                    }
                    Ok(Err(failure)) => failure.message,
                    // The caller ran out of time, not the provider: leave its health alone
                    Err(_elapsed) if clipped_by_deadline => {
                        tracing::warn!(
                            call_id = %call_id,
                            provider_id = %provider_id,
                            attempt = attempt,
                            "Caller deadline reached during attempt"
                        );
                        return Err(self.exhausted(
                            call_id,
                            ExhaustionReason::DeadlineExceeded,
                            attempts,
                        ));
                    }
                    Err(_elapsed) => format!(
                        "request to {} timed out after {}ms",
                        provider_id,
                        budget.as_millis()
                    ),
                };

            let kind = classify(&message);
            let consecutive = self.on_failure(&provider_id, kind, &message).await;

            tracing::warn!(
                call_id = %call_id,
                provider_id = %provider_id,
                attempt = attempt,
                max_attempts = max_attempts,
                error_kind = %kind,
                consecutive_failures = consecutive,
                error = %message,
                "Attempt failed"
            );

            attempts.push(FailedAttempt {
                provider_id: provider_id.clone(),
                error_kind: kind,
                message: message.clone(),
            });
            tried.insert(provider_id.clone());

            if kind == ErrorKind::InvalidRequest && self.settings.fail_fast_on_invalid_request {
                return Err(self.exhausted(call_id, ExhaustionReason::InvalidRequest, attempts));
            }

            let action = failure_action(kind, consecutive);
            if action == FailureAction::Switch {
                switched_away.insert(provider_id.clone());
            }

            if attempt >= max_attempts {
                return Err(self.exhausted(call_id, ExhaustionReason::RetriesExhausted, attempts));
            }

            next = self.pick(&tried, &switched_away, None).await;
            let Some(to) = next.as_ref() else {
                return Err(self.exhausted(call_id, ExhaustionReason::NoAvailableProvider, attempts));
            };

            if to != &provider_id {
                let reason = format!(
                    "{} on {}: {}",
                    kind,
                    provider_id,
                    message.chars().take(REASON_EXCERPT_CHARS).collect::<String>()
                );
                self.events
                    .append(SwitchEvent::new(provider_id.clone(), to.clone(), reason, Some(kind)))
                    .await;
                if let Err(e) = self.metrics.record_switch(Some(kind)) {
                    tracing::error!(error = %e, "Metrics recording failed (non-fatal)");
                }
            }

            let delay = backoff_delay(self.settings.retry_base_delay, kind, action, attempt);
            if !delay.is_zero() {
                if deadline.is_some_and(|d| Instant::now() + delay >= d) {
                    return Err(self.exhausted(call_id, ExhaustionReason::DeadlineExceeded, attempts));
                }
                tracing::debug!(
                    call_id = %call_id,
                    delay_ms = delay.as_millis() as u64,
                    "Backing off before next attempt"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// Choose the next provider for this call
    ///
    /// Untried providers win; if none is left, a provider that only failed
    /// softly may be tried again.
    async fn pick(
        &self,
        tried: &ExclusionSet,
        switched_away: &ExclusionSet,
        preferred: Option<&ProviderId>,
    ) -> Option<ProviderId> {
        let snapshot = self.registry.snapshot().await;
        let untried: ExclusionSet = tried.union(switched_away).cloned().collect();

        select_next(&snapshot, &untried, preferred)
            .or_else(|| select_next(&snapshot, switched_away, None))
    }

    async fn on_success(&self, provider_id: &ProviderId, latency: Duration) {
        if let Err(e) = self.registry.record_success(provider_id, latency).await {
            tracing::error!(provider_id = %provider_id, error = %e, "Success not recorded");
        }
        if let Err(e) = self
            .metrics
            .record_attempt_success(provider_id, latency.as_secs_f64() * 1000.0)
        {
            tracing::error!(error = %e, "Metrics recording failed (non-fatal)");
        }
        if let Err(e) = self.metrics.set_provider_available(provider_id, true) {
            tracing::error!(error = %e, "Metrics recording failed (non-fatal)");
        }

        *self.current.write().await = provider_id.clone();
    }

    /// Record a failed attempt; returns the provider's consecutive failure count
    async fn on_failure(&self, provider_id: &ProviderId, kind: ErrorKind, message: &str) -> u32 {
        if let Err(e) = self.metrics.record_attempt_failure(provider_id, kind) {
            tracing::error!(error = %e, "Metrics recording failed (non-fatal)");
        }

        match self.registry.record_failure(provider_id, kind, message).await {
            Ok(health) => {
                if let Err(e) = self
                    .metrics
                    .set_provider_available(provider_id, health.is_available())
                {
                    tracing::error!(error = %e, "Metrics recording failed (non-fatal)");
                }
                health.consecutive_failures()
            }
            Err(e) => {
                tracing::error!(provider_id = %provider_id, error = %e, "Failure not recorded");
                0
            }
        }
    }

    fn exhausted(
        &self,
        call_id: CallId,
        reason: ExhaustionReason,
        attempts: Vec<FailedAttempt>,
    ) -> AggregatedFailure {
        if let Err(e) = self.metrics.record_exhausted(reason) {
            tracing::error!(error = %e, "Metrics recording failed (non-fatal)");
        }

        let failure = AggregatedFailure::new(reason, attempts);
        tracing::error!(
            call_id = %call_id,
            reason = %reason,
            attempts = failure.attempts().len(),
            attempted_providers = ?failure.attempted_providers(),
            last_error = failure.last_error().unwrap_or("none"),
            "Routed call failed"
        );
        failure
    }
}

fn failure_action(kind: ErrorKind, consecutive_failures: u32) -> FailureAction {
    if kind.forces_switch() || consecutive_failures >= SWITCH_AFTER_CONSECUTIVE_FAILURES {
        FailureAction::Switch
    } else {
        FailureAction::Retry
    }
}

/// Sleep before the next attempt
///
/// Retries back off linearly; switches go straight to the next provider,
/// except after a rate limit, which waits twice the base delay.
fn backoff_delay(base: Duration, kind: ErrorKind, action: FailureAction, attempt: u32) -> Duration {
    match action {
        FailureAction::Retry => base.saturating_mul(attempt),
        FailureAction::Switch if kind == ErrorKind::RateLimit => base.saturating_mul(2),
        FailureAction::Switch => Duration::ZERO,
    }
}
