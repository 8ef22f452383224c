//! Ranking tests
//!
//! Success rate dominates, latency breaks rate ties, registration order
//! breaks full ties.

use super::*;

#[test]
fn test_higher_success_rate_wins() {
    // a: 1/2, b: 2/2
    let snapshot = vec![health_with("a", 1, 1, 10), health_with("b", 2, 0, 500)];
    let selected = select_next(&snapshot, &ExclusionSet::new(), None);
    assert_eq!(selected, Some(ProviderId::from("b")));
}

#[test]
fn test_lower_latency_breaks_rate_tie() {
    let snapshot = vec![
        health_with("slow", 3, 0, 900),
        health_with("fast", 3, 0, 50),
        health_with("medium", 3, 0, 300),
    ];

    let order: Vec<_> = rank(&snapshot, &ExclusionSet::new())
        .into_iter()
        .map(|h| h.provider_id().to_string())
        .collect();
    assert_eq!(order, vec!["fast", "medium", "slow"]);
}

#[test]
fn test_full_tie_keeps_registration_order() {
    let snapshot = vec![
        health_with("a", 0, 0, 0),
        health_with("b", 0, 0, 0),
        health_with("c", 0, 0, 0),
    ];

    for _ in 0..10 {
        assert_eq!(
            select_next(&snapshot, &ExclusionSet::new(), None),
            Some(ProviderId::from("a")),
            "selection must be deterministic"
        );
    }
}

#[test]
fn test_failed_provider_ranks_behind_fresh_ones() {
    // a has one failure (rate 0.0) but is still healthy
    let snapshot = vec![
        health_with("a", 0, 1, 0),
        health_with("b", 0, 0, 0),
        health_with("c", 0, 0, 0),
    ];
    assert_eq!(
        select_next(&snapshot, &ExclusionSet::new(), None),
        Some(ProviderId::from("b"))
    );
}
