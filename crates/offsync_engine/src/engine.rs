//! The engine facade.

use crate::cache::CacheManager;
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::conflict::{ConflictResolver, FieldMerge, MergeStrategy};
use crate::delivery::RemoteDelivery;
use crate::error::{EngineError, EngineResult};
use crate::local::LocalStore;
use crate::network::{NetworkEvent, NetworkMonitor};
use crate::queue::{QueueCounts, SyncQueue};
use crate::status::{self, StatusAggregator, Subscription};
use crate::store::{EngineStore, StoreStats, METADATA};
use chrono::{DateTime, Utc};
use offsync_protocol::{
    CacheEntry, ChangeType, ConflictInfo, DeliveryOutcome, ItemId, LocalEntityRecord, Payload,
    Resolution, ResourceKey, SkipReason, StatusSnapshot, StorageMode, SyncQueueItem, SyncResult,
};
use offsync_storage::CompactionStats;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const LAST_SYNC_TIME: &str = "last_sync_time";
const RESULT_CHANNEL_CAPACITY: usize = 16;

/// An offline-first sync engine.
///
/// Callers queue mutations and read and write optimistic local snapshots at
/// any time; the engine persists them and delivers queued mutations to the
/// remote whenever it is reachable. Cloning is cheap and every clone drives
/// the same engine. Background tasks stop when the last clone is dropped or
/// on [`OfflineEngine::shutdown`].
///
/// # Example
///
/// ```rust,no_run
/// use offsync_engine::{EngineConfig, MockDelivery, OfflineEngine, StorageConfig};
/// use offsync_protocol::ChangeType;
/// use serde_json::json;
///
/// # async fn run() -> offsync_engine::EngineResult<()> {
/// let engine = OfflineEngine::builder(
///     EngineConfig::new(StorageConfig::at("app-data")).with_auto_sync_on_queue(false),
///     MockDelivery::new(),
/// )
/// .build()?;
///
/// engine.save_local("order", "ORD-1", json!({"title": "A"}))?;
/// engine.queue_change(ChangeType::Update, "order", "ORD-1", json!({"title": "A"}))?;
///
/// let result = engine.force_sync().await;
/// println!("synced {} items", result.synced_count);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct OfflineEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    store: Arc<EngineStore>,
    queue: SyncQueue,
    local: LocalStore,
    cache: CacheManager,
    network: NetworkMonitor,
    delivery: Arc<dyn RemoteDelivery>,
    resolver: RwLock<Option<Arc<dyn ConflictResolver>>>,
    merge: RwLock<Arc<dyn MergeStrategy>>,
    clock: Arc<dyn Clock>,
    sync_in_progress: AtomicBool,
    status: StatusAggregator,
    results: broadcast::Sender<SyncResult>,
    last_result: RwLock<Option<SyncResult>>,
    retry: Mutex<RetryState>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

#[derive(Default)]
struct RetryState {
    consecutive_failures: u32,
    timer: Option<JoinHandle<()>>,
}

/// Counters a pass keeps beyond what it reports.
#[derive(Default)]
struct PassOutcome {
    result: SyncResult,
    transient_failures: usize,
}

/// Whether an item is done for this pass or still owes a delivery.
enum ItemFate {
    Finished,
    Unfinished,
}

/// Holds the single-flight flag for the duration of a pass.
struct SyncGuard<'a>(&'a AtomicBool);

impl<'a> SyncGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Builds an [`OfflineEngine`].
pub struct EngineBuilder {
    config: EngineConfig,
    delivery: Arc<dyn RemoteDelivery>,
    network: Option<NetworkMonitor>,
    clock: Option<Arc<dyn Clock>>,
    resolver: Option<Arc<dyn ConflictResolver>>,
    merge: Option<Arc<dyn MergeStrategy>>,
}

impl EngineBuilder {
    /// Uses an existing connectivity source. Defaults to a monitor that
    /// starts online.
    pub fn network(mut self, network: NetworkMonitor) -> Self {
        self.network = Some(network);
        self
    }

    /// Uses a custom clock. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Installs a conflict resolver. Without one every conflict is manual.
    pub fn resolver(mut self, resolver: impl ConflictResolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Replaces the default [`FieldMerge`] strategy.
    pub fn merge_strategy(mut self, merge: impl MergeStrategy + 'static) -> Self {
        self.merge = Some(Arc::new(merge));
        self
    }

    /// Opens storage, recovers interrupted items and starts background tasks.
    ///
    /// Storage that cannot be opened is not an error: the engine runs
    /// memory-only and reports it in [`StatusSnapshot::storage_mode`].
    /// Must be called within a Tokio runtime.
    pub fn build(self) -> EngineResult<OfflineEngine> {
        let config = self.config;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let network = self.network.unwrap_or_default();
        let merge = self
            .merge
            .unwrap_or_else(|| Arc::new(FieldMerge::new(config.reserved_field_prefix.clone())));

        let store = Arc::new(EngineStore::open(&config.storage));
        let queue = SyncQueue::open(Arc::clone(&store))?;
        let cache = CacheManager::open(Arc::clone(&store), Arc::clone(&clock))?;
        let local = LocalStore::new(Arc::clone(&store));

        let (status, refresh_rx) = StatusAggregator::new(StatusSnapshot {
            is_online: network.is_online(),
            storage_mode: store.mode().clone(),
            ..StatusSnapshot::default()
        });
        let (results, _) = broadcast::channel(RESULT_CHANNEL_CAPACITY);

        let inner = Arc::new(EngineInner {
            config,
            store,
            queue,
            local,
            cache,
            network,
            delivery: self.delivery,
            resolver: RwLock::new(self.resolver),
            merge: RwLock::new(merge),
            clock,
            sync_in_progress: AtomicBool::new(false),
            status,
            results,
            last_result: RwLock::new(None),
            retry: Mutex::new(RetryState::default()),
            tasks: Mutex::new(Vec::new()),
        });

        inner.spawn_background(refresh_rx);
        inner.status.request_refresh();

        let counts = inner.queue.counts()?;
        info!(
            durable = inner.store.mode().is_durable(),
            pending = counts.pending,
            awaiting_resolution = counts.awaiting_resolution,
            online = inner.network.is_online(),
            "engine started"
        );
        Ok(OfflineEngine { inner })
    }
}

impl OfflineEngine {
    /// Starts building an engine that delivers through `delivery`.
    pub fn builder(config: EngineConfig, delivery: impl RemoteDelivery + 'static) -> EngineBuilder {
        EngineBuilder {
            config,
            delivery: Arc::new(delivery),
            network: None,
            clock: None,
            resolver: None,
            merge: None,
        }
    }

    // Queue

    /// Persists a mutation for delivery and returns its id.
    ///
    /// Succeeds whether or not the remote is reachable. When online (and
    /// `auto_sync_on_queue` is set) a pass is started in the background.
    pub fn queue_change(
        &self,
        change_type: ChangeType,
        resource_kind: &str,
        resource_id: &str,
        payload: Payload,
    ) -> EngineResult<ItemId> {
        let now = self.inner.clock.now();
        let item = self
            .inner
            .queue
            .enqueue(change_type, resource_kind, resource_id, payload, now)?;
        self.inner.status.request_refresh();
        self.trigger_sync_if_online();
        Ok(item.id)
    }

    /// Items the next pass would attempt, in enqueue order.
    pub fn pending_items(&self) -> EngineResult<Vec<SyncQueueItem>> {
        self.inner.queue.eligible()
    }

    /// Every stored queue item, in enqueue order.
    pub fn queued_items(&self) -> EngineResult<Vec<SyncQueueItem>> {
        self.inner.queue.all()
    }

    /// One queue item.
    pub fn get_item(&self, id: ItemId) -> EngineResult<Option<SyncQueueItem>> {
        self.inner.queue.get(id)
    }

    /// Puts a failed or parked item back in line with `retry_count = 0`.
    pub fn requeue(&self, id: ItemId) -> EngineResult<SyncQueueItem> {
        let item = self.inner.queue.requeue(id)?;
        self.inner.status.request_refresh();
        self.trigger_sync_if_online();
        Ok(item)
    }

    /// Re-queues every item parked for manual resolution.
    pub fn requeue_parked(&self) -> EngineResult<usize> {
        let count = self.inner.queue.requeue_parked()?;
        if count > 0 {
            info!(count, "re-queued parked items");
            self.inner.status.request_refresh();
            self.trigger_sync_if_online();
        }
        Ok(count)
    }

    /// Drops a queued mutation without delivering it.
    pub fn discard(&self, id: ItemId) -> EngineResult<SyncQueueItem> {
        let item = self.inner.queue.discard(id)?;
        self.inner.status.request_refresh();
        Ok(item)
    }

    fn trigger_sync_if_online(&self) {
        if self.inner.config.auto_sync_on_queue && self.inner.network.is_online() {
            let engine = self.clone();
            tokio::spawn(async move {
                engine.sync().await;
            });
        }
    }

    // Local snapshots

    /// Writes the optimistic local snapshot of an entity.
    pub fn save_local(
        &self,
        resource_kind: &str,
        resource_id: &str,
        snapshot: Payload,
    ) -> EngineResult<LocalEntityRecord> {
        self.inner.local.save(
            ResourceKey::new(resource_kind, resource_id),
            snapshot,
            self.inner.clock.now(),
        )
    }

    /// Reads the local snapshot of an entity.
    pub fn get_local(
        &self,
        resource_kind: &str,
        resource_id: &str,
    ) -> EngineResult<Option<LocalEntityRecord>> {
        self.inner
            .local
            .get(&ResourceKey::new(resource_kind, resource_id))
    }

    /// Every local snapshot of one kind, ordered by id.
    pub fn get_all_local(&self, resource_kind: &str) -> EngineResult<Vec<LocalEntityRecord>> {
        self.inner.local.get_all(resource_kind)
    }

    /// Removes the local snapshot of an entity. Returns whether it existed.
    pub fn delete_local(&self, resource_kind: &str, resource_id: &str) -> EngineResult<bool> {
        self.inner
            .local
            .delete(&ResourceKey::new(resource_kind, resource_id))
    }

    // Sync

    /// Runs one sync pass over a snapshot of the eligible items.
    ///
    /// Returns at once if another pass is running or the engine is offline.
    /// Never fails: per-item problems are reported in the result.
    pub async fn sync(&self) -> SyncResult {
        let Some(guard) = SyncGuard::acquire(&self.inner.sync_in_progress) else {
            debug!("sync skipped: already in progress");
            return SyncResult::skipped(SkipReason::AlreadyInProgress);
        };
        if !self.inner.network.is_online() {
            debug!("sync skipped: offline");
            return SyncResult::skipped(SkipReason::Offline);
        }

        self.inner.status.request_refresh();
        let pass = self.inner.run_pass().await;
        drop(guard);

        self.inner.after_pass(&pass);
        *self.inner.last_result.write() = Some(pass.result.clone());
        // No receivers is fine.
        let _ = self.inner.results.send(pass.result.clone());
        self.inner.status.request_refresh();
        pass.result
    }

    /// Same as [`Self::sync`], for an explicit user-initiated trigger.
    pub async fn force_sync(&self) -> SyncResult {
        info!("forced sync requested");
        self.sync().await
    }

    /// Receives the result of every pass that runs from now on.
    pub fn subscribe_sync_results(&self) -> broadcast::Receiver<SyncResult> {
        self.inner.results.subscribe()
    }

    /// The result of the most recent pass that ran.
    pub fn last_sync_result(&self) -> Option<SyncResult> {
        self.inner.last_result.read().clone()
    }

    /// Installs or replaces the conflict resolver.
    pub fn set_conflict_resolver(&self, resolver: impl ConflictResolver + 'static) {
        *self.inner.resolver.write() = Some(Arc::new(resolver));
    }

    /// Removes the conflict resolver; conflicts become manual again.
    pub fn clear_conflict_resolver(&self) {
        *self.inner.resolver.write() = None;
    }

    /// Replaces the merge strategy used for [`Resolution::Merge`].
    pub fn set_merge_strategy(&self, merge: impl MergeStrategy + 'static) {
        *self.inner.merge.write() = Arc::new(merge);
    }

    // Cache

    /// Caches `data` under `key` for `ttl`.
    pub fn cache(&self, key: &str, data: Payload, ttl: Duration) -> EngineResult<CacheEntry> {
        self.inner.cache.put(key, data, ttl)
    }

    /// Caches `data` under `key` for the configured default TTL.
    pub fn cache_default(&self, key: &str, data: Payload) -> EngineResult<CacheEntry> {
        self.inner
            .cache
            .put(key, data, self.inner.config.default_cache_ttl)
    }

    /// Returns cached data, or `None` if absent or expired.
    pub fn get_cached(&self, key: &str) -> EngineResult<Option<Payload>> {
        self.inner.cache.get(key)
    }

    /// Returns the whole cache row, or `None` if absent or expired.
    pub fn get_cache_entry(&self, key: &str) -> EngineResult<Option<CacheEntry>> {
        self.inner.cache.get_entry(key)
    }

    /// Removes one cache row.
    pub fn invalidate_cache(&self, key: &str) -> EngineResult<bool> {
        self.inner.cache.invalidate(key)
    }

    /// Removes every expired cache row.
    pub fn clear_expired_cache(&self) -> EngineResult<usize> {
        self.inner.cache.clear_expired()
    }

    /// Removes every cache row.
    pub fn clear_cache(&self) -> EngineResult<usize> {
        self.inner.cache.clear()
    }

    // Status

    /// Computes a fresh status snapshot.
    pub fn status(&self) -> StatusSnapshot {
        self.inner.compute_status()
    }

    /// A receiver that always holds the latest published snapshot.
    pub fn watch_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.inner.status.watch()
    }

    /// Calls `listener` with every published snapshot until the returned
    /// [`Subscription`] is dropped.
    ///
    /// Listeners run on the status task. A panicking listener misses that
    /// snapshot but stays registered, and the others are still called.
    pub fn on_status_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&StatusSnapshot) + Send + Sync + 'static,
    {
        self.inner.status.subscribe(listener)
    }

    /// The connectivity source.
    pub fn network(&self) -> &NetworkMonitor {
        &self.inner.network
    }

    /// Current connectivity.
    pub fn is_online(&self) -> bool {
        self.inner.network.is_online()
    }

    /// Durable or memory-only.
    pub fn storage_mode(&self) -> &StorageMode {
        self.inner.store.mode()
    }

    // Maintenance

    /// Size and row counts of the store.
    pub fn store_stats(&self) -> EngineResult<StoreStats> {
        self.inner.store.stats()
    }

    /// Rewrites the store file without superseded records. `None` when
    /// memory-only.
    pub fn compact(&self) -> EngineResult<Option<CompactionStats>> {
        let stats = self.inner.store.compact()?;
        self.inner.status.request_refresh();
        Ok(stats)
    }

    /// Removes every queued mutation, local snapshot, cache row and the
    /// recorded last sync time.
    pub fn clear_all(&self) -> EngineResult<()> {
        let queued = self.inner.queue.clear()?;
        let entities = self.inner.local.clear()?;
        let cached = self.inner.cache.clear()?;
        self.inner.store.clear(METADATA)?;
        *self.inner.last_result.write() = None;
        self.inner.reset_retry();

        info!(queued, entities, cached, "all engine data cleared");
        self.inner.status.request_refresh();
        Ok(())
    }

    /// Stops background tasks: the network watcher, status notifier, cache
    /// sweeper and any pending retry. Explicit calls keep working.
    pub fn shutdown(&self) {
        self.inner.stop_background();
        info!("engine shut down");
    }
}

impl std::fmt::Debug for OfflineEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineEngine")
            .field("storage_mode", self.inner.store.mode())
            .field("online", &self.inner.network.is_online())
            .field(
                "sync_in_progress",
                &self.inner.sync_in_progress.load(Ordering::Acquire),
            )
            .finish_non_exhaustive()
    }
}

impl EngineInner {
    fn spawn_background(self: &Arc<Self>, refresh_rx: tokio::sync::mpsc::UnboundedReceiver<()>) {
        let mut tasks = Vec::new();

        let weak = Arc::downgrade(self);
        tasks.push(tokio::spawn(status::run_notifier(refresh_rx, move || {
            let inner = weak.upgrade()?;
            let snapshot = inner.compute_status();
            inner.status.publish(snapshot);
            Some(())
        })));

        tasks.push(tokio::spawn(watch_network(
            Arc::downgrade(self),
            self.network.events(),
        )));

        if let Some(interval) = self.config.cache_sweep_interval {
            tasks.push(tokio::spawn(sweep_cache(Arc::downgrade(self), interval)));
        }

        *self.tasks.lock() = tasks;
    }

    fn stop_background(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.reset_retry();
    }

    fn compute_status(&self) -> StatusSnapshot {
        let counts = self.queue.counts().unwrap_or_else(|e| {
            warn!(error = %e, "could not count queue items");
            QueueCounts::default()
        });

        StatusSnapshot {
            is_online: self.network.is_online(),
            pending_sync_count: counts.pending,
            awaiting_resolution_count: counts.awaiting_resolution,
            last_sync_time: self.last_sync_time(),
            storage_used: self.store.size_bytes(),
            storage_quota: self.store.quota_bytes(),
            sync_in_progress: self.sync_in_progress.load(Ordering::Acquire),
            storage_mode: self.store.mode().clone(),
        }
    }

    fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        self.store
            .get(METADATA, LAST_SYNC_TIME)
            .unwrap_or_else(|e| {
                warn!(error = %e, "could not read last sync time");
                None
            })
    }

    async fn run_pass(&self) -> PassOutcome {
        let started = Instant::now();
        let mut pass = PassOutcome::default();

        let items = match self.queue.eligible() {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "could not load queue for sync");
                if e.is_retryable() {
                    pass.transient_failures += 1;
                }
                pass.result.errors.push(e.to_string());
                return pass;
            }
        };
        debug!(items = items.len(), "sync pass started");

        let mut blocked: HashSet<ResourceKey> = HashSet::new();
        for snapshot in items {
            let key = snapshot.resource_key();
            if self.config.preserve_resource_order && blocked.contains(&key) {
                debug!(
                    item_id = %snapshot.id,
                    resource_kind = %key.resource_kind,
                    resource_id = %key.resource_id,
                    "deferred behind unfinished item for same resource"
                );
                pass.result.deferred_count += 1;
                continue;
            }

            // Discarded or re-queued by a caller since the pass started.
            let item = match self.queue.get(snapshot.id) {
                Ok(Some(item)) if item.is_eligible() => item,
                Ok(_) => continue,
                Err(e) => {
                    self.record_item_error(snapshot.id, &e, &mut pass);
                    blocked.insert(key);
                    continue;
                }
            };

            let id = item.id;
            match self.process_item(item, &mut pass).await {
                Ok(ItemFate::Finished) => {}
                Ok(ItemFate::Unfinished) => {
                    blocked.insert(key);
                }
                Err(e) => {
                    self.record_item_error(id, &e, &mut pass);
                    self.release_stuck_item(id, &e);
                    blocked.insert(key);
                }
            }
        }

        if let Err(e) = self.store.put(METADATA, LAST_SYNC_TIME, &self.clock.now()) {
            warn!(error = %e, "could not record last sync time");
        }

        pass.result = std::mem::take(&mut pass.result).finish();
        info!(
            synced = pass.result.synced_count,
            failed = pass.result.failed_count,
            deferred = pass.result.deferred_count,
            conflicts = pass.result.conflicts.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "sync pass finished"
        );
        pass
    }

    async fn process_item(
        &self,
        mut item: SyncQueueItem,
        pass: &mut PassOutcome,
    ) -> EngineResult<ItemFate> {
        item.begin_attempt();
        self.queue.save(&item)?;
        debug!(
            item_id = %item.id,
            resource_kind = %item.resource_kind,
            resource_id = %item.resource_id,
            retry_count = item.retry_count,
            "delivering"
        );

        match self.deliver(&item).await {
            DeliveryOutcome::Success => {
                self.queue.remove(item.id)?;
                debug!(item_id = %item.id, "delivered");
                pass.result.synced_count += 1;
                Ok(ItemFate::Finished)
            }
            DeliveryOutcome::TransientError { message } => {
                item.record_failure(message.clone());
                self.queue.save(&item)?;
                warn!(
                    item_id = %item.id,
                    retry_count = item.retry_count,
                    error = %message,
                    "delivery failed, will retry on a later pass"
                );
                pass.result.failed_count += 1;
                pass.transient_failures += 1;
                pass.result.errors.push(format!("{}: {message}", item.id));
                Ok(ItemFate::Unfinished)
            }
            DeliveryOutcome::Conflict {
                remote_snapshot,
                remote_updated_at,
            } => {
                let key = item.resource_key();
                let last_local_update = match self.local.get(&key)? {
                    Some(record) => record.updated_at,
                    None => item.enqueued_at,
                };
                let conflict = ConflictInfo {
                    item_id: item.id,
                    resource_kind: item.resource_kind.clone(),
                    resource_id: item.resource_id.clone(),
                    local_version: item.payload.clone(),
                    remote_version: remote_snapshot,
                    last_local_update,
                    last_remote_update: remote_updated_at,
                };

                let resolver = self.resolver.read().clone();
                let resolution = match resolver {
                    Some(resolver) => resolver.resolve(&conflict).await,
                    None => Resolution::Manual,
                };
                debug!(item_id = %item.id, ?resolution, "conflict resolved");

                let fate = self.apply_resolution(item, &conflict, resolution, pass)?;
                pass.result.conflicts.push(conflict);
                Ok(fate)
            }
        }
    }

    async fn deliver(&self, item: &SyncQueueItem) -> DeliveryOutcome {
        let Some(limit) = self.config.delivery_timeout else {
            return self.delivery.deliver(item).await;
        };
        match tokio::time::timeout(limit, self.delivery.deliver(item)).await {
            Ok(outcome) => outcome,
            Err(_) => DeliveryOutcome::transient(EngineError::Timeout(limit).to_string()),
        }
    }

    fn apply_resolution(
        &self,
        mut item: SyncQueueItem,
        conflict: &ConflictInfo,
        resolution: Resolution,
        pass: &mut PassOutcome,
    ) -> EngineResult<ItemFate> {
        if resolution.requeues() {
            let merged = (resolution == Resolution::Merge).then(|| {
                self.merge
                    .read()
                    .merge(&item.payload, &conflict.remote_version)
            });
            if let Some(merged) = &merged {
                item.payload = merged.clone();
            }
            item.requeue();
            self.queue.save(&item)?;

            if let Some(merged) = merged {
                let key = item.resource_key();
                if self.local.get(&key)?.is_some() {
                    self.local.save(key, merged, self.clock.now())?;
                }
            }
            return Ok(ItemFate::Unfinished);
        }

        match resolution {
            Resolution::Remote => {
                let key = conflict.resource_key();
                if conflict.remote_deleted() {
                    self.local.delete(&key)?;
                } else {
                    self.local.save(
                        key,
                        conflict.remote_version.clone(),
                        conflict.last_remote_update,
                    )?;
                }
                self.queue.remove(item.id)?;
                Ok(ItemFate::Finished)
            }
            // Manual; the requeueing resolutions returned above.
            _ => {
                let reason = EngineError::ManualResolutionRequired(item.id);
                item.park(reason.to_string());
                self.queue.save(&item)?;
                warn!(
                    item_id = %item.id,
                    resource_kind = %item.resource_kind,
                    resource_id = %item.resource_id,
                    "conflict requires manual resolution"
                );
                pass.result.failed_count += 1;
                pass.result.errors.push(format!("{}: {reason}", item.id));
                Ok(ItemFate::Unfinished)
            }
        }
    }

    fn record_item_error(&self, id: ItemId, error: &EngineError, pass: &mut PassOutcome) {
        warn!(item_id = %id, error = %error, "queue write failed during sync");
        pass.result.failed_count += 1;
        pass.result.errors.push(format!("{id}: {error}"));
        if error.is_retryable() {
            pass.transient_failures += 1;
        }
    }

    /// Best effort: an item left `Syncing` would otherwise sit out every
    /// pass until the next restart.
    fn release_stuck_item(&self, id: ItemId, error: &EngineError) {
        if let Ok(Some(mut item)) = self.queue.get(id) {
            if item.recover_interrupted() {
                item.record_failure(error.to_string());
                if let Err(e) = self.queue.save(&item) {
                    warn!(item_id = %id, error = %e, "could not release item after failed write");
                }
            }
        }
    }

    fn after_pass(self: &Arc<Self>, pass: &PassOutcome) {
        let mut retry = self.retry.lock();
        if let Some(timer) = retry.timer.take() {
            timer.abort();
        }

        if pass.transient_failures == 0 {
            if pass.result.failed_count == 0 {
                retry.consecutive_failures = 0;
            }
            return;
        }

        retry.consecutive_failures += 1;
        let attempt = retry.consecutive_failures;
        if !self.config.auto_retry || !self.network.is_online() {
            return;
        }
        if attempt > self.config.retry.max_attempts {
            warn!(
                attempts = attempt - 1,
                "automatic retries exhausted, waiting for the next trigger"
            );
            return;
        }

        let delay = self.config.retry.delay_for_attempt(attempt);
        info!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "scheduling retry pass"
        );
        let weak = Arc::downgrade(self);
        retry.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                OfflineEngine { inner }.sync().await;
            }
        }));
    }

    fn reset_retry(&self) {
        let mut retry = self.retry.lock();
        retry.consecutive_failures = 0;
        if let Some(timer) = retry.timer.take() {
            timer.abort();
        }
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
        if let Some(timer) = self.retry.get_mut().timer.take() {
            timer.abort();
        }
    }
}

/// Starts a pass on every online edge and resets the retry schedule on
/// every edge.
async fn watch_network(weak: Weak<EngineInner>, mut events: crate::network::NetworkEvents) {
    while let Some(event) = events.next().await {
        let Some(inner) = weak.upgrade() else {
            break;
        };
        inner.reset_retry();
        inner.status.request_refresh();

        if event == NetworkEvent::Online {
            let engine = OfflineEngine { inner };
            tokio::spawn(async move {
                engine.sync().await;
            });
        }
    }
}

async fn sweep_cache(weak: Weak<EngineInner>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let Some(inner) = weak.upgrade() else {
            break;
        };
        if let Err(e) = inner.cache.clear_expired() {
            warn!(error = %e, "cache sweep failed");
        }
    }
}
