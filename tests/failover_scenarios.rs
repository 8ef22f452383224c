//! End-to-end failover behaviour of `Router::execute`
//!
//! Covers authentication switch, rate-limit switch, exhaustion on repeated
//! timeouts and the status report produced afterwards.

mod common;

use common::{Scripted, Step, fast_settings, router_with, work};
use switchyard::{ErrorKind, ExecuteOptions, ExhaustionReason, ProviderId};

#[tokio::test]
async fn test_authentication_failure_switches_to_next_provider() {
    let a = Scripted::always(Step::Fail("401: invalid api key"));
    let b = Scripted::always(Step::Respond("from b"));
    let c = Scripted::always(Step::Respond("from c"));
    let router = router_with(fast_settings(2), &[("a", a.clone()), ("b", b.clone()), ("c", c.clone())]);

    let response = router
        .execute(&work(), ExecuteOptions::default())
        .await
        .expect("b should answer");

    assert_eq!(response.provider_id.as_str(), "b");
    assert_eq!(response.content, "from b");
    assert_eq!(response.attempts, 2);
    assert_eq!(a.calls(), 1);
    assert_eq!(c.calls(), 0);

    let a_health = router.registry().get(&ProviderId::from("a")).await.unwrap();
    assert!(!a_health.is_available());
    assert_eq!(a_health.last_error_kind(), Some(ErrorKind::Authentication));

    let events = router.events().all().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].from_provider_id().as_str(), "a");
    assert_eq!(events[0].to_provider_id().as_str(), "b");
    assert!(events[0].reason().contains("Authentication"));
    assert_eq!(events[0].error_kind(), Some(ErrorKind::Authentication));
}

#[tokio::test]
async fn test_status_after_authentication_switch() {
    let router = router_with(
        fast_settings(2),
        &[
            ("a", Scripted::always(Step::Fail("invalid api key"))),
            ("b", Scripted::always(Step::Respond("ok"))),
            ("c", Scripted::always(Step::Respond("ok"))),
        ],
    );
    router.execute(&work(), ExecuteOptions::default()).await.unwrap();

    let status = router.get_status().await;
    let a = status.provider("a").unwrap();
    assert!(!a.is_available);
    assert_eq!(a.last_error_kind, Some(ErrorKind::Authentication));
    assert_eq!(status.provider("b").unwrap().success_rate, 1.0);
    assert_eq!(status.recent_switches.len(), 1);
    assert_eq!(status.current_provider.as_str(), "b");

    assert_eq!(
        router.list_available_providers().await,
        vec![ProviderId::from("b"), ProviderId::from("c")]
    );
}

#[tokio::test]
async fn test_rate_limit_switches_without_disabling() {
    let a = Scripted::new(
        [Step::Fail("rate limit exceeded"), Step::Fail("rate limit exceeded")],
        Step::Respond("from a"),
    );
    let b = Scripted::always(Step::Respond("from b"));
    let router = router_with(fast_settings(2), &[("a", a.clone()), ("b", b.clone())]);
    let a_id = ProviderId::from("a");

    let first = router.execute(&work(), ExecuteOptions::default()).await.unwrap();
    assert_eq!(first.provider_id.as_str(), "b");

    let health = router.registry().get(&a_id).await.unwrap();
    assert_eq!(health.consecutive_failures(), 1);
    assert!(health.is_available());
    assert_eq!(router.metrics().switches_count(Some(ErrorKind::RateLimit)), 1);

    // b is now current; force a back to exercise its second rate limit and recovery
    router.force_switch(&a_id, "retry a").await.unwrap();
    let second = router.execute(&work(), ExecuteOptions::default()).await.unwrap();
    assert_eq!(second.provider_id.as_str(), "b");
    assert_eq!(
        router.registry().get(&a_id).await.unwrap().consecutive_failures(),
        2
    );

    router.force_switch(&a_id, "retry a").await.unwrap();
    let third = router.execute(&work(), ExecuteOptions::default()).await.unwrap();
    assert_eq!(third.provider_id.as_str(), "a");

    let health = router.registry().get(&a_id).await.unwrap();
    assert_eq!(health.consecutive_failures(), 0);
    assert!(health.is_available());
}

#[tokio::test]
async fn test_all_providers_timing_out_exhausts_retries() {
    let router = router_with(
        fast_settings(2),
        &[
            ("a", Scripted::always(Step::Fail("connection timed out"))),
            ("b", Scripted::always(Step::Fail("connection timed out"))),
            ("c", Scripted::always(Step::Fail("connection timed out"))),
        ],
    );

    let failure = router
        .execute(&work(), ExecuteOptions::default())
        .await
        .expect_err("every provider fails");

    assert_eq!(failure.reason(), ExhaustionReason::RetriesExhausted);
    assert_eq!(failure.attempts().len(), 3);
    assert_eq!(
        failure.attempted_providers(),
        vec![ProviderId::from("a"), ProviderId::from("b"), ProviderId::from("c")]
    );
    assert_eq!(failure.error_kinds(), vec![ErrorKind::Timeout; 3]);
    assert_eq!(failure.last_error(), Some("connection timed out"));
    assert_eq!(
        router.metrics().exhausted_count(ExhaustionReason::RetriesExhausted),
        1
    );
}

#[tokio::test]
async fn test_single_provider_retries_then_switches_away() {
    let a = Scripted::new([Step::Fail("HTTP 503 Service Unavailable")], Step::Respond("ok"));
    let router = router_with(fast_settings(3), &[("a", a.clone())]);

    let response = router.execute(&work(), ExecuteOptions::default()).await.unwrap();
    assert_eq!(response.attempts, 2);
    assert_eq!(a.calls(), 2);
    assert!(router.events().is_empty().await, "no switch when staying on a");

    let b = Scripted::always(Step::Fail("HTTP 500 internal server error"));
    let router = router_with(fast_settings(3), &[("b", b.clone())]);
    let failure = router.execute(&work(), ExecuteOptions::default()).await.unwrap_err();

    // Second consecutive failure switches away and nothing else is left
    assert_eq!(failure.reason(), ExhaustionReason::NoAvailableProvider);
    assert_eq!(b.calls(), 2);
}

#[tokio::test]
async fn test_zero_healthy_providers_fails_without_calling_backends() {
    let a = Scripted::always(Step::Respond("ok"));
    let router = router_with(fast_settings(2), &[("a", a.clone())]);
    router
        .registry()
        .record_failure(&ProviderId::from("a"), ErrorKind::QuotaExceeded, "insufficient_quota")
        .await
        .unwrap();

    let failure = router.execute(&work(), ExecuteOptions::default()).await.unwrap_err();
    assert_eq!(failure.reason(), ExhaustionReason::NoAvailableProvider);
    assert!(failure.attempts().is_empty());
    assert_eq!(failure.last_error(), None);
    assert_eq!(a.calls(), 0);
}

#[tokio::test]
async fn test_invalid_request_fails_fast() {
    let a = Scripted::always(Step::Fail("HTTP 400: invalid request, missing field"));
    let b = Scripted::always(Step::Respond("ok"));
    let router = router_with(fast_settings(3), &[("a", a), ("b", b.clone())]);

    let failure = router.execute(&work(), ExecuteOptions::default()).await.unwrap_err();
    assert_eq!(failure.reason(), ExhaustionReason::InvalidRequest);
    assert_eq!(failure.error_kinds(), vec![ErrorKind::InvalidRequest]);
    assert_eq!(b.calls(), 0);
}

#[tokio::test]
async fn test_invalid_request_tries_others_when_fail_fast_disabled() {
    let mut settings = fast_settings(3);
    settings.fail_fast_on_invalid_request = false;
    let router = router_with(
        settings,
        &[
            ("a", Scripted::always(Step::Fail("bad request"))),
            ("b", Scripted::always(Step::Respond("ok"))),
        ],
    );

    let response = router.execute(&work(), ExecuteOptions::default()).await.unwrap();
    assert_eq!(response.provider_id.as_str(), "b");
}

#[tokio::test]
async fn test_success_updates_current_provider() {
    let router = router_with(
        fast_settings(2),
        &[
            ("a", Scripted::always(Step::Fail("quota exceeded"))),
            ("b", Scripted::always(Step::Respond("ok"))),
        ],
    );
    assert_eq!(router.current_provider().await.as_str(), "a");

    router.execute(&work(), ExecuteOptions::default()).await.unwrap();
    assert_eq!(router.current_provider().await.as_str(), "b");

    // Next call goes straight to b
    let response = router.execute(&work(), ExecuteOptions::default()).await.unwrap();
    assert_eq!(response.attempts, 1);
    assert_eq!(router.events().len().await, 1);
}
