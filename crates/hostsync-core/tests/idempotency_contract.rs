//! Contract Test: Idempotency
//!
//! Re-delivered, unchanged objects (resyncs) are no-ops: they neither
//! change the store nor cause a flush.

mod common;

use common::*;
use hostsync_core::{EngineEvent, ResourceEvent};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn resync_of_unchanged_objects_does_not_flush() {
    let (subscription, tx) = route_subscription();
    let (sink, mut flushes) = RecordingSink::new();
    let engine = RunningEngine::start(vec![subscription], Arc::new(sink), minimal_config());

    let ingress = valid_ingress("ns", "a", &["a.example.com"]);
    tx.send(ResourceEvent::Added(ingress.clone())).unwrap();
    flushes.next().await;

    for _ in 0..3 {
        tx.send(ResourceEvent::Modified(ingress.clone())).unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
    }

    assert!(flushes.next_within(Duration::from_secs(30)).await.is_none());
    assert_eq!(flushes.count(), 1);
    assert_eq!(engine.store.len().await, 1);

    tokio_test::assert_ok!(engine.stop().await);
}

#[tokio::test(start_paused = true)]
async fn deleting_unknown_object_does_not_flush() {
    let (subscription, tx) = route_subscription();
    let (sink, mut flushes) = RecordingSink::new();
    let engine = RunningEngine::start(vec![subscription], Arc::new(sink), minimal_config());

    tx.send(ResourceEvent::Deleted(valid_ingress("ns", "never-seen", &["x.example.com"])))
        .unwrap();

    assert!(flushes.next_within(Duration::from_secs(30)).await.is_none());

    tokio_test::assert_ok!(engine.stop().await);
}

#[tokio::test(start_paused = true)]
async fn only_real_changes_are_reported() {
    let (subscription, tx) = route_subscription();
    let (sink, mut flushes) = RecordingSink::new();
    let mut engine = RunningEngine::start(vec![subscription], Arc::new(sink), minimal_config());

    let ingress = valid_ingress("ns", "a", &["a.example.com"]);
    tx.send(ResourceEvent::Added(ingress.clone())).unwrap();
    tx.send(ResourceEvent::Modified(ingress)).unwrap();
    flushes.next().await;

    let mut changes = 0;
    while let Ok(event) = engine.events.try_recv() {
        if matches!(event, EngineEvent::EntryChanged { .. }) {
            changes += 1;
        }
    }
    assert_eq!(changes, 1);

    tokio_test::assert_ok!(engine.stop().await);
}
