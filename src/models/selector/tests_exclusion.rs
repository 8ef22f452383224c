//! Exclusion and filtering tests
//!
//! Excluded and unhealthy providers are never returned; the preferred hint
//! only applies when it survives filtering.

use super::*;
use crate::classifier::ErrorKind;
use proptest::prelude::*;

#[test]
fn test_exclusion_filters_providers() {
    let snapshot = vec![health_with("a", 1, 0, 10), health_with("b", 1, 0, 20)];
    let mut exclude = ExclusionSet::new();
    exclude.insert(ProviderId::from("a"));

    assert_eq!(
        select_next(&snapshot, &exclude, None),
        Some(ProviderId::from("b"))
    );
}

#[test]
fn test_exclusion_all_providers_returns_none() {
    let snapshot = vec![health_with("a", 1, 0, 10), health_with("b", 1, 0, 20)];
    let exclude: ExclusionSet = ["a", "b"].into_iter().map(ProviderId::from).collect();

    assert_eq!(select_next(&snapshot, &exclude, None), None);
}

#[test]
fn test_unhealthy_providers_are_skipped() {
    let mut disabled = health_with("a", 5, 0, 10);
    disabled.apply_failure(ErrorKind::Authentication, "unauthorized");
    let failing = health_with("b", 0, 3, 0);
    let ok = health_with("c", 0, 0, 0);

    let snapshot = vec![disabled, failing, ok];
    assert_eq!(
        select_next(&snapshot, &ExclusionSet::new(), None),
        Some(ProviderId::from("c"))
    );
}

#[test]
fn test_no_healthy_providers_returns_none() {
    let snapshot = vec![health_with("a", 0, 3, 0), health_with("b", 0, 4, 0)];
    assert_eq!(select_next(&snapshot, &ExclusionSet::new(), None), None);
    assert_eq!(select_next(&[], &ExclusionSet::new(), None), None);
}

#[test]
fn test_preferred_provider_is_first_candidate() {
    let snapshot = vec![health_with("a", 5, 0, 10), health_with("b", 1, 1, 900)];
    let preferred = ProviderId::from("b");

    assert_eq!(
        select_next(&snapshot, &ExclusionSet::new(), Some(&preferred)),
        Some(preferred)
    );
}

#[test]
fn test_preferred_provider_ignored_when_excluded_or_unhealthy() {
    let snapshot = vec![health_with("a", 1, 0, 10), health_with("b", 0, 3, 0)];

    let unhealthy = ProviderId::from("b");
    assert_eq!(
        select_next(&snapshot, &ExclusionSet::new(), Some(&unhealthy)),
        Some(ProviderId::from("a"))
    );

    let excluded = ProviderId::from("a");
    let mut exclude = ExclusionSet::new();
    exclude.insert(excluded.clone());
    assert_eq!(select_next(&snapshot, &exclude, Some(&excluded)), None);
}

#[test]
fn test_selection_never_returns_excluded_or_unhealthy() {
    let snapshot = vec![
        health_with("a", 2, 0, 10),
        health_with("b", 0, 3, 0),
        health_with("c", 4, 1, 30),
        health_with("d", 0, 0, 0),
    ];
    let ids = ["a", "b", "c", "d"];

    // every subset of exclusions
    for mask in 0u8..16 {
        let exclude: ExclusionSet = ids
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << *i) != 0)
            .map(|(_, id)| ProviderId::from(*id))
            .collect();

        if let Some(selected) = select_next(&snapshot, &exclude, None) {
            assert!(!exclude.contains(&selected), "selected excluded {}", selected);
            let health = snapshot
                .iter()
                .find(|h| h.provider_id() == &selected)
                .unwrap();
            assert!(health.is_healthy(), "selected unhealthy {}", selected);
        }
    }
}

fn arbitrary_snapshot() -> impl Strategy<Value = Vec<ProviderHealth>> {
    prop::collection::vec((0u32..8, 0u32..8, 0u64..500, any::<bool>()), 0..8).prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(i, (successes, failures, latency_ms, disabled))| {
                let mut health = health_with(&format!("p{}", i), successes, failures, latency_ms);
                if disabled {
                    health.apply_failure(ErrorKind::QuotaExceeded, "insufficient_quota");
                }
                health
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn prop_selection_respects_exclusion_and_health(
        snapshot in arbitrary_snapshot(),
        mask in any::<u8>(),
        preferred in prop::option::of(0usize..8),
    ) {
        let exclude: ExclusionSet = snapshot
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << *i) != 0)
            .map(|(_, h)| h.provider_id().clone())
            .collect();
        let preferred = preferred.map(|i| ProviderId::new(format!("p{}", i)));
        let eligible: Vec<&ProviderHealth> = snapshot
            .iter()
            .filter(|h| h.is_healthy() && !exclude.contains(h.provider_id()))
            .collect();

        match select_next(&snapshot, &exclude, preferred.as_ref()) {
            Some(selected) => {
                prop_assert!(!exclude.contains(&selected));
                let health = snapshot.iter().find(|h| h.provider_id() == &selected);
                prop_assert!(health.is_some_and(|h| h.is_healthy()));
                if let Some(p) = preferred.as_ref().filter(|p| eligible.iter().any(|h| h.provider_id() == *p)) {
                    prop_assert_eq!(&selected, p);
                }
            }
            None => prop_assert!(eligible.is_empty()),
        }
    }
}
