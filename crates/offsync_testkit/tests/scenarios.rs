//! End-to-end scenarios across storage, engine and delivery.

use offsync_engine::{
    resolver_fn, EngineConfig, MockDelivery, OfflineEngine, StorageConfig,
};
use offsync_protocol::{
    ChangeType, ConflictPolicy, DeliveryOutcome, ItemStatus, Resolution, SkipReason,
};
use offsync_testkit::prelude::*;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn queued_item_survives_restart_without_sync() {
    let harness = EngineHarness::durable(MockDelivery::new());
    let engine = harness.start();

    let first = engine
        .queue_change(ChangeType::Create, "order", "ORD-1", json!({"title": "A"}))
        .unwrap();
    let second = engine
        .queue_change(ChangeType::Update, "order", "ORD-1", json!({"title": "B"}))
        .unwrap();
    assert_eq!(engine.pending_items().unwrap().len(), 2);

    let engine = harness.restart(engine);
    let ids: Vec<_> = engine.pending_items().unwrap().into_iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![first, second]);
    assert_eq!(engine.status().pending_sync_count, 2);
    assert_eq!(harness.delivery.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn concurrent_syncs_run_one_pass() {
    let delivery = Arc::new(MockDelivery::new());
    delivery.set_delay(Some(Duration::from_millis(500)));
    let engine = memory_engine(Arc::clone(&delivery));
    for n in 0..3 {
        engine
            .queue_change(ChangeType::Update, "order", &format!("ORD-{n}"), json!({}))
            .unwrap();
    }

    let (a, b) = tokio::join!(engine.sync(), engine.sync());
    let (ran, skipped) = if a.was_skipped() { (b, a) } else { (a, b) };

    assert_eq!(ran.synced_count, 3);
    assert_eq!(skipped.skipped, Some(SkipReason::AlreadyInProgress));
    assert!(!skipped.success);
    assert_eq!(delivery.call_count(), 3);
}

#[tokio::test]
async fn delivered_items_never_come_back() {
    let harness = EngineHarness::durable(FakeRemote::new());
    let engine = harness.start();
    let mut ids = Vec::new();
    for n in 0..5 {
        ids.push(
            engine
                .queue_change(ChangeType::Create, "order", &format!("ORD-{n}"), json!({"n": n}))
                .unwrap(),
        );
    }

    assert_eq!(engine.sync().await.synced_count, 5);
    let engine = harness.restart(engine);
    let again = engine.sync().await;
    assert_eq!(again.attempted(), 0);

    for id in ids {
        assert_eq!(harness.delivery.applied_count(id), 1);
        assert!(engine.get_item(id).unwrap().is_none());
    }
}

#[tokio::test]
async fn remote_resolution_replaces_local_snapshot() {
    let harness = EngineHarness::durable(FakeRemote::new());
    harness.delivery.seed("order", "ORD-1", json!({"title": "v1"}));
    harness.delivery.seed("order", "ORD-1", json!({"title": "from another device"}));

    let calls = Arc::new(AtomicUsize::new(0));
    let engine = harness.start();
    let counter = Arc::clone(&calls);
    engine.set_conflict_resolver(resolver_fn(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Resolution::Remote
    }));

    engine
        .save_local("order", "ORD-1", json!({"title": "mine", "_rev": 1}))
        .unwrap();
    let id = engine
        .queue_change(ChangeType::Update, "order", "ORD-1", json!({"title": "mine", "_rev": 1}))
        .unwrap();

    let result = engine.sync().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.conflicts.len(), 1);
    assert!(result.success);

    let remote = harness.delivery.entity("order", "ORD-1").unwrap();
    let local = engine.get_local("order", "ORD-1").unwrap().unwrap();
    assert_eq!(local.snapshot, result.conflicts[0].remote_version);
    assert_eq!(local.snapshot, remote.snapshot);
    assert!(engine.get_item(id).unwrap().is_none());
}

#[tokio::test]
async fn merge_resolution_lands_on_remote() {
    let harness = EngineHarness::durable(FakeRemote::new());
    harness
        .delivery
        .seed("order", "ORD-1", json!({"title": "v1", "status": "open"}));
    harness
        .delivery
        .seed("order", "ORD-1", json!({"title": "v1", "status": "shipped"}));

    let engine = harness.start();
    engine.set_conflict_resolver(ConflictPolicy::Merge);
    engine
        .queue_change(ChangeType::Update, "order", "ORD-1", json!({"title": "renamed", "_rev": 1}))
        .unwrap();

    // The conflict merges and re-queues; the next pass carries the server
    // revision and is accepted.
    let first = engine.sync().await;
    assert_eq!(first.conflicts.len(), 1);
    let second = engine.sync().await;
    assert_eq!(second.synced_count, 1);

    let remote = harness.delivery.entity("order", "ORD-1").unwrap();
    assert_eq!(
        remote.snapshot,
        json!({"title": "renamed", "status": "shipped", "_rev": 3})
    );
}

#[tokio::test]
async fn cache_expires_and_leaves_the_store() {
    let harness = EngineHarness::durable(MockDelivery::new());
    let engine = harness.start();

    engine.cache("k", json!({"v": 1}), Duration::from_secs(1)).unwrap();
    assert_eq!(engine.get_cached("k").unwrap(), Some(json!({"v": 1})));

    harness.clock.advance(Duration::from_millis(1001));
    assert_eq!(engine.get_cached("k").unwrap(), None);

    let engine = harness.restart(engine);
    let stats = engine.store_stats().unwrap();
    let cache_rows = stats
        .collections
        .iter()
        .find(|(name, _)| name == offsync_engine::CACHE)
        .map(|(_, rows)| *rows);
    assert_eq!(cache_rows, Some(0));
}

#[tokio::test]
async fn conflict_without_resolver_waits_for_a_human() {
    let harness = EngineHarness::durable(FakeRemote::new());
    harness.delivery.seed("order", "ORD-1", json!({}));
    harness.delivery.seed("order", "ORD-1", json!({}));
    let engine = harness.start();

    let id = engine
        .queue_change(ChangeType::Update, "order", "ORD-1", json!({"_rev": 1}))
        .unwrap();
    let result = engine.sync().await;
    assert!(!result.success);

    let item = engine.get_item(id).unwrap().unwrap();
    assert_eq!(item.status, ItemStatus::Failed);
    assert!(item.last_error.unwrap().contains("manual resolution"));

    // Still parked after a restart, and skipped by later passes.
    let engine = harness.restart(engine);
    assert_eq!(engine.sync().await.attempted(), 0);
    assert_eq!(engine.status().awaiting_resolution_count, 1);

    engine.requeue(id).unwrap();
    assert_eq!(engine.pending_items().unwrap().len(), 1);
}

#[tokio::test]
async fn offline_edit_syncs_when_connectivity_returns() {
    let harness = EngineHarness::with_config(MockDelivery::new(), |config| {
        config.with_auto_sync_on_queue(true)
    });
    harness.network.set_online(false);
    let engine = harness.start();
    let mut results = engine.subscribe_sync_results();

    engine.save_local("order", "ORD-1", json!({"title": "A"})).unwrap();
    engine
        .queue_change(ChangeType::Update, "order", "ORD-1", json!({"title": "A"}))
        .unwrap();
    assert_eq!(
        engine.get_local("order", "ORD-1").unwrap().unwrap().snapshot,
        json!({"title": "A"})
    );

    let offline = engine.sync().await;
    assert!(!offline.success);
    assert_eq!(offline.errors, vec!["Offline".to_string()]);

    harness.network.set_online(true);
    let result = tokio::time::timeout(Duration::from_secs(5), results.recv())
        .await
        .expect("no pass after coming online")
        .unwrap();
    assert!(result.success);
    assert_eq!(result.synced_count, 1);
    assert_eq!(result.failed_count, 0);
    assert!(engine.queued_items().unwrap().is_empty());
}

#[tokio::test]
async fn unreachable_remote_keeps_items_for_later() {
    let harness = EngineHarness::durable(FakeRemote::new());
    harness.delivery.set_reachable(false);
    let engine = harness.start();
    engine
        .queue_change(ChangeType::Create, "comment", "C-1", json!({"body": "hi"}))
        .unwrap();

    let result = engine.sync().await;
    assert_eq!(result.failed_count, 1);
    let engine = harness.restart(engine);
    assert_eq!(engine.pending_items().unwrap()[0].retry_count, 1);

    harness.delivery.set_reachable(true);
    assert_eq!(engine.sync().await.synced_count, 1);
    assert!(harness.delivery.entity("comment", "C-1").is_some());
}

#[tokio::test]
async fn random_batches_drain_completely() {
    use proptest::strategy::{Strategy, ValueTree};
    use proptest::test_runner::TestRunner;

    let mut runner = TestRunner::deterministic();
    for _ in 0..16 {
        let changes = queued_changes_strategy(12)
            .new_tree(&mut runner)
            .unwrap()
            .current();
        let delivery = Arc::new(MockDelivery::new());
        let engine = memory_engine(Arc::clone(&delivery));
        for change in &changes {
            engine
                .queue_change(
                    change.change_type,
                    &change.resource_kind,
                    &change.resource_id,
                    change.payload.clone(),
                )
                .unwrap();
        }

        let result = engine.sync().await;
        assert_eq!(result.synced_count, changes.len());
        assert!(engine.queued_items().unwrap().is_empty());

        let delivered: Vec<_> = delivery.calls().into_iter().map(|i| i.payload).collect();
        let queued: Vec<_> = changes.into_iter().map(|c| c.payload).collect();
        assert_eq!(delivered, queued);
    }
}

#[tokio::test]
async fn scripted_outcomes_never_lose_items() {
    use proptest::strategy::{Strategy, ValueTree};
    use proptest::test_runner::TestRunner;

    let mut runner = TestRunner::deterministic();
    for _ in 0..16 {
        let outcomes = proptest::collection::vec(delivery_outcome_strategy(), 1..8)
            .new_tree(&mut runner)
            .unwrap()
            .current();
        let delivery = Arc::new(MockDelivery::new());
        let engine = OfflineEngine::builder(
            EngineConfig::new(StorageConfig::memory_only())
                .with_auto_sync_on_queue(false)
                .with_auto_retry(false),
            Arc::clone(&delivery),
        )
        .resolver(ConflictPolicy::LocalWins)
        .build()
        .unwrap();

        for (n, outcome) in outcomes.iter().enumerate() {
            let id = format!("ID-{n}");
            delivery.push_outcome(id.clone(), outcome.clone());
            engine
                .queue_change(ChangeType::Update, "order", &id, json!({"n": n}))
                .unwrap();
        }

        let first = engine.sync().await;
        let remaining = engine.queued_items().unwrap().len();
        assert_eq!(first.synced_count + remaining, outcomes.len());

        // Scripts are one-shot; the default accepts everything left.
        let second = engine.sync().await;
        assert_eq!(second.synced_count, remaining);
        assert!(engine.queued_items().unwrap().is_empty());
    }
}

#[tokio::test]
async fn status_reflects_queue_and_connectivity() {
    let harness = EngineHarness::durable(MockDelivery::with_default(DeliveryOutcome::transient(
        "503",
    )));
    let engine = harness.start();
    let mut status = engine.watch_status();

    engine
        .queue_change(ChangeType::Delete, "order", "ORD-1", json!(null))
        .unwrap();
    harness.network.set_online(false);

    let snapshot = tokio::time::timeout(
        Duration::from_secs(5),
        status.wait_for(|s| !s.is_online && s.pending_sync_count == 1),
    )
    .await
    .expect("status never caught up")
    .unwrap()
    .clone();
    assert!(snapshot.storage_mode.is_durable());
    assert!(snapshot.storage_used > 0);
    assert!(!snapshot.sync_in_progress);
}

#[tokio::test]
async fn lock_held_elsewhere_degrades_to_memory() {
    let harness = EngineHarness::durable(MockDelivery::new());
    let _engine = harness.start();

    let second = OfflineEngine::builder(harness.config().clone(), MockDelivery::new())
        .build()
        .unwrap();
    assert!(!second.storage_mode().is_durable());
    second
        .queue_change(ChangeType::Create, "order", "ORD-1", json!({}))
        .unwrap();
    assert_eq!(second.pending_items().unwrap().len(), 1);
}
