mod common;

use common::test_helpers::{capture_logs, harness, harness_with_store, logged, reference_config};
use gatekeeper::{
    AdmissionConfig, AdmissionEngine, IdentityKind, IdentityRecord, InMemoryRecordStore,
    RecordSet,
};
use std::time::Duration;

#[tokio::test]
async fn first_sighting_is_admitted_and_tracked_once() {
    let h = harness(reference_config()).await;

    assert!(h.engine.allow("192.168.0.7", None).await.unwrap());
    assert_eq!(h.engine.len(), 1);

    let stored = h.store.records();
    assert_eq!(stored.len(), 1);
    let record = &stored["192.168.0.7"];
    assert_eq!(record.kind, IdentityKind::Address);
    assert!(!record.blocked);
    assert_eq!(record.last_seen, h.now());
}

#[tokio::test]
async fn ceiling_calls_pass_and_the_next_blocks() {
    let config = AdmissionConfig::new(Duration::from_secs(3), 5);
    let h = harness(config).await;

    for i in 0..5 {
        assert!(h.engine.allow("10.1.1.1", None).await.unwrap(), "call {i} within ceiling");
        h.clock.advance(Duration::from_millis(10));
    }
    assert!(!h.engine.allow("10.1.1.1", None).await.unwrap());

    let record = h.engine.record("10.1.1.1").unwrap();
    assert!(record.blocked);
    assert_eq!(record.blocked_until, h.now() + 3_000);
}

#[tokio::test]
async fn address_scenario_blocks_then_recovers_after_unblock_pass() {
    let h = harness(reference_config()).await;

    assert!(h.engine.allow("127.0.0.1", None).await.unwrap());
    h.clock.advance(Duration::from_millis(100));
    assert!(!h.engine.allow("127.0.0.1", None).await.unwrap());

    let stored = h.store.records();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored["127.0.0.1"].kind, IdentityKind::Address);
    assert!(stored["127.0.0.1"].blocked);

    h.clock.advance(Duration::from_secs(6));
    h.engine.unblock_expired().await.unwrap();
    assert!(h.engine.allow("127.0.0.1", None).await.unwrap());

    let stored = h.store.records();
    assert_eq!(stored.len(), 1);
    assert!(!stored["127.0.0.1"].blocked);
}

#[tokio::test]
async fn token_scenario_blocks_the_token_not_the_address() {
    let h = harness(reference_config()).await;

    assert!(h.engine.allow("127.0.0.1", Some("abc123")).await.unwrap());
    h.clock.advance(Duration::from_millis(100));
    assert!(h.engine.allow("127.0.0.1", Some("abc123")).await.unwrap());
    h.clock.advance(Duration::from_millis(100));
    assert!(!h.engine.allow("127.0.0.1", Some("abc123")).await.unwrap());

    let stored = h.store.records();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored["abc123"].kind, IdentityKind::Token);
    assert!(stored["abc123"].blocked);
    assert!(h.engine.record("127.0.0.1").is_none());

    // The same address without the token is tracked separately.
    assert!(h.engine.allow("127.0.0.1", None).await.unwrap());

    h.clock.advance(Duration::from_secs(6));
    h.engine.unblock_expired().await.unwrap();
    assert!(h.engine.allow("127.0.0.1", Some("abc123")).await.unwrap());
    assert!(!h.store.records()["abc123"].blocked);
}

#[tokio::test]
async fn unknown_token_falls_back_to_address() {
    let h = harness(reference_config()).await;
    assert!(h.engine.allow("10.0.0.9", Some("unknown")).await.unwrap());
    assert!(h.engine.record("unknown").is_none());
    assert_eq!(h.engine.record("10.0.0.9").unwrap().kind, IdentityKind::Address);
}

#[tokio::test]
async fn idle_identity_is_evicted_and_readmitted_as_unseen() {
    let h = harness(reference_config()).await;

    assert!(h.engine.allow("10.0.0.1", None).await.unwrap());
    assert!(!h.engine.allow("10.0.0.1", None).await.unwrap());
    h.clock.advance(Duration::from_secs(60));
    assert!(h.engine.allow("10.0.0.2", None).await.unwrap());

    h.clock.advance(Duration::from_secs(121));
    let evicted = h.engine.evict_idle().await.unwrap();
    assert_eq!(evicted, vec!["10.0.0.1".to_string()]);
    assert!(!h.store.records().contains_key("10.0.0.1"));
    assert!(h.engine.record("10.0.0.2").is_some());

    // Fresh bucket, no lingering block.
    assert!(h.engine.allow("10.0.0.1", None).await.unwrap());
    assert!(!h.engine.record("10.0.0.1").unwrap().blocked);
}

#[tokio::test]
async fn exactly_idle_threshold_is_kept() {
    let h = harness(reference_config()).await;
    h.engine.allow("10.0.0.1", None).await.unwrap();
    h.clock.advance(Duration::from_secs(180));
    assert!(h.engine.evict_idle().await.unwrap().is_empty());
    h.clock.advance(Duration::from_millis(1));
    assert_eq!(h.engine.evict_idle().await.unwrap().len(), 1);
}

#[tokio::test]
async fn bootstrap_rebuilds_buckets_from_current_config() {
    let now = 1_700_000_000_000;
    let mut seeded = RecordSet::new();
    let mut blocked = IdentityRecord::new("127.0.0.1", IdentityKind::Address, 99, now);
    blocked.block(now - 60_000);
    seeded.insert(blocked.id.clone(), blocked);
    seeded.insert("abc123".into(), IdentityRecord::new("abc123", IdentityKind::Token, 99, now));
    seeded.insert("gone".into(), IdentityRecord::new("gone", IdentityKind::Token, 99, now));

    let h = harness_with_store(reference_config(), InMemoryRecordStore::with_records(seeded)).await;
    assert_eq!(h.engine.len(), 3);
    assert_eq!(h.engine.record("127.0.0.1").unwrap().limiter.capacity(), 1);
    assert_eq!(h.engine.record("abc123").unwrap().limiter.capacity(), 2);
    assert_eq!(h.engine.record("gone").unwrap().limiter.capacity(), 0, "token no longer configured");

    // Expired blocks loaded from storage are lifted by the next unblock pass.
    assert_eq!(h.engine.unblock_expired().await.unwrap(), vec!["127.0.0.1".to_string()]);
    assert!(!h.store.records()["127.0.0.1"].blocked);
}

#[tokio::test]
async fn save_failures_surface_and_memory_stays_authoritative() {
    let h = harness(reference_config()).await;
    assert!(h.engine.allow("10.0.0.1", None).await.unwrap());

    h.store.set_failing(true);
    let err = h.engine.allow("10.0.0.1", None).await.unwrap_err();
    assert!(err.is_retryable());
    assert!(h.engine.record("10.0.0.1").unwrap().blocked);
    assert!(!h.store.records()["10.0.0.1"].blocked, "store is behind");

    h.store.set_failing(false);
    h.engine.flush().await.unwrap();
    assert!(h.store.records()["10.0.0.1"].blocked);
    assert!(!h.engine.is_dirty());
}

#[tokio::test]
async fn concurrent_requests_for_one_identity_lose_no_updates() {
    let config = AdmissionConfig::new(Duration::from_secs(3), 5);
    let h = harness(config).await;

    let mut handles = Vec::new();
    for _ in 0..50 {
        let engine = h.engine.clone();
        handles.push(tokio::spawn(async move { engine.allow("10.9.9.9", None).await.unwrap() }));
    }
    let results = futures::future::join_all(handles).await;
    let admitted = results.into_iter().filter(|r| *r.as_ref().expect("join error")).count();

    assert_eq!(admitted, 5);
    assert!(h.engine.record("10.9.9.9").unwrap().blocked);
    assert!(h.store.records()["10.9.9.9"].blocked);
}

#[tokio::test]
async fn failed_load_is_logged_and_engine_starts_empty() {
    let (buffer, _guard) = capture_logs();
    let mut seeded = RecordSet::new();
    seeded.insert("10.0.0.1".into(), IdentityRecord::new("10.0.0.1", IdentityKind::Address, 1, 0));
    let store = InMemoryRecordStore::with_records(seeded);
    store.set_failing(true);

    let engine = AdmissionEngine::builder(reference_config())
        .store(store.clone())
        .build()
        .await
        .unwrap();
    assert!(engine.is_empty());

    let logs = logged(&buffer);
    assert!(logs.contains("failed to load identity records"), "logs: {logs}");
    assert!(logs.contains("gatekeeper::engine"));
}
