//! Contract Test: Resolver Retry Bound
//!
//! Constraints verified:
//! - An always-failing source is asked exactly `retry_attempts` times
//! - Exhaustion leaves the cache untouched and emits one Error event
//! - Invalid answers count as failed attempts
//! - The next cycle tries again

mod common;

use common::*;
use std::net::Ipv4Addr;
use tide_core::{DnsOutcome, NotificationEvent};

#[tokio::test(start_paused = true)]
async fn failing_source_is_tried_exactly_retry_attempts_times() {
    let h = Harness::new(
        StaticIpSource::failing(),
        MockDnsUpdater::new(),
        CountingCacheStore::with_ip("1.1.1.1"),
        minimal_config(),
    )
    .await;

    let outcome = h.engine.trigger_cycle_now().await;

    assert_eq!(h.source.calls(), 3);
    assert_eq!(outcome.observed_ip, None);
    assert_eq!(outcome.dns, DnsOutcome::NotNeeded);
    assert!(outcome.error.is_some());

    assert_eq!(h.updater.update_calls(), 0);
    assert_eq!(h.store.saves(), 0);
    assert_eq!(h.store.current_ip().await, "1.1.1.1");
    assert_eq!(h.engine.observed_ip(), "1.1.1.1", "failed resolution keeps state");

    match h.notifier.events().as_slice() {
        [NotificationEvent::Error { message, last_known_ip }] => {
            assert!(message.contains("failed to resolve IP"));
            assert_eq!(*last_known_ip, Some(Ipv4Addr::new(1, 1, 1, 1)));
        }
        other => panic!("expected one Error event, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn failure_before_first_observation_has_no_last_known_ip() {
    let h = Harness::new(
        StaticIpSource::failing(),
        MockDnsUpdater::new(),
        CountingCacheStore::new(),
        minimal_config(),
    )
    .await;

    h.engine.trigger_cycle_now().await;

    assert!(matches!(
        h.notifier.events().as_slice(),
        [NotificationEvent::Error { last_known_ip: None, .. }]
    ));
    assert_eq!(h.engine.observed_ip(), "");
}

#[tokio::test(start_paused = true)]
async fn invalid_answers_count_as_failures() {
    let mut config = minimal_config();
    config.retry_attempts = 2;

    let h = Harness::new(
        StaticIpSource::new(Some("2001:db8::1")),
        MockDnsUpdater::new(),
        CountingCacheStore::new(),
        config,
    )
    .await;

    let outcome = h.engine.trigger_cycle_now().await;

    assert_eq!(h.source.calls(), 2);
    assert_eq!(outcome.observed_ip, None);
    assert_eq!(h.updater.update_calls(), 0);
    assert_eq!(h.store.saves(), 0);
}

#[tokio::test(start_paused = true)]
async fn next_cycle_recovers_after_exhaustion() {
    let h = Harness::new(
        StaticIpSource::failing(),
        MockDnsUpdater::new(),
        CountingCacheStore::with_ip("1.1.1.1"),
        minimal_config(),
    )
    .await;

    h.engine.trigger_cycle_now().await;

    h.source.set_answer(Some("2.2.2.2"));
    let outcome = h.engine.trigger_cycle_now().await;

    assert!(outcome.dns_updated());
    assert_eq!(h.source.calls(), 4);
    assert_eq!(h.store.current_ip().await, "2.2.2.2");
}
