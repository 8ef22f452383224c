//! Provider selection
//!
//! Chooses the next provider for an attempt from a registry snapshot.
//! Selection is a pure function: it never mutates health state and is safe
//! to call concurrently.
//!
//! Tests are organized in sibling modules:
//! - tests_ranking: success-rate / latency ordering and tie-breaks
//! - tests_exclusion: exclusion set, unhealthy filtering, preferred hint

use crate::models::health::ProviderHealth;
use crate::models::provider_id::{ExclusionSet, ProviderId};
use std::cmp::Ordering;

/// Healthy, non-excluded providers ordered best first
///
/// Ordering: success rate descending, then average response time ascending.
/// The sort is stable, so ties keep registration order (the snapshot order).
pub fn rank<'a>(snapshot: &'a [ProviderHealth], exclude: &ExclusionSet) -> Vec<&'a ProviderHealth> {
    let mut candidates: Vec<&ProviderHealth> = snapshot
        .iter()
        .filter(|h| h.is_healthy() && !exclude.contains(h.provider_id()))
        .collect();

    candidates.sort_by(|a, b| compare(a, b));
    candidates
}

fn compare(a: &ProviderHealth, b: &ProviderHealth) -> Ordering {
    b.success_rate()
        .total_cmp(&a.success_rate())
        .then_with(|| {
            a.average_response_time_ms()
                .total_cmp(&b.average_response_time_ms())
        })
}

/// Select the next provider for an attempt
///
/// - Filters out unhealthy providers and providers in `exclude`
/// - Returns `preferred` if it survives filtering (the router's current provider)
/// - Otherwise returns the best-ranked candidate
///
/// Returns `None` when no provider is both healthy and non-excluded.
///
/// # Performance
/// O(n log n) in the number of configured providers; no locks are taken.
pub fn select_next(
    snapshot: &[ProviderHealth],
    exclude: &ExclusionSet,
    preferred: Option<&ProviderId>,
) -> Option<ProviderId> {
    let candidates = rank(snapshot, exclude);

    if candidates.is_empty() {
        tracing::debug!(
            total_providers = snapshot.len(),
            excluded_count = exclude.len(),
            "No available providers - all providers either unhealthy or excluded"
        );
        return None;
    }

    if let Some(preferred) = preferred {
        if candidates.iter().any(|h| h.provider_id() == preferred) {
            tracing::debug!(provider_id = %preferred, "Selected preferred provider");
            return Some(preferred.clone());
        }
    }

    let best = candidates[0];
    tracing::debug!(
        provider_id = %best.provider_id(),
        success_rate = best.success_rate(),
        average_response_time_ms = best.average_response_time_ms(),
        available_providers = candidates.len(),
        "Selected provider by ranking"
    );
    Some(best.provider_id().clone())
}

#[cfg(test)]
mod tests_exclusion;
#[cfg(test)]
mod tests_ranking;

/// Shared test helper: health records built by replaying outcomes
///
/// Each entry is `(id, successes, failures)`; successes use `latency_ms`.
#[cfg(test)]
pub(crate) fn health_with(id: &str, successes: u32, failures: u32, latency_ms: u64) -> ProviderHealth {
    use crate::classifier::ErrorKind;
    use std::time::Duration;

    let mut health = ProviderHealth::new(ProviderId::from(id));
    for _ in 0..failures {
        health.apply_failure(ErrorKind::ServerError, "500");
    }
    for _ in 0..successes {
        health.apply_success(Duration::from_millis(latency_ms));
    }
    health
}
