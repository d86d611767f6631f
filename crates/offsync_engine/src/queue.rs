//! Durable mutation queue.

use crate::error::{EngineError, EngineResult};
use crate::store::{EngineStore, SYNC_QUEUE};
use chrono::{DateTime, Utc};
use offsync_protocol::{ChangeType, ItemId, ItemStatus, Payload, SyncQueueItem};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Queue rows in the store, with enqueue ordering.
pub(crate) struct SyncQueue {
    store: Arc<EngineStore>,
    next_sequence: AtomicU64,
}

/// Item counts for status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct QueueCounts {
    pub(crate) pending: usize,
    pub(crate) awaiting_resolution: usize,
}

impl SyncQueue {
    /// Loads the queue, putting back any item an interrupted pass left in
    /// `Syncing`.
    pub(crate) fn open(store: Arc<EngineStore>) -> EngineResult<Self> {
        let queue = Self {
            store,
            next_sequence: AtomicU64::new(1),
        };

        let mut max_sequence = 0;
        let mut recovered = 0;
        for mut item in queue.all()? {
            max_sequence = max_sequence.max(item.sequence);
            if item.recover_interrupted() {
                queue.save(&item)?;
                recovered += 1;
            }
        }
        queue.next_sequence.store(max_sequence + 1, Ordering::SeqCst);

        if recovered > 0 {
            info!(recovered, "re-queued items interrupted mid-sync");
        }
        Ok(queue)
    }

    pub(crate) fn enqueue(
        &self,
        change_type: ChangeType,
        resource_kind: &str,
        resource_id: &str,
        payload: Payload,
        now: DateTime<Utc>,
    ) -> EngineResult<SyncQueueItem> {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let item = SyncQueueItem::new(change_type, resource_kind, resource_id, payload, now, sequence);
        self.save(&item)?;

        debug!(
            item_id = %item.id,
            change_type = %change_type,
            resource_kind,
            resource_id,
            "change queued"
        );
        Ok(item)
    }

    pub(crate) fn get(&self, id: ItemId) -> EngineResult<Option<SyncQueueItem>> {
        self.store.get(SYNC_QUEUE, &id.to_string())
    }

    pub(crate) fn save(&self, item: &SyncQueueItem) -> EngineResult<()> {
        self.store.put(SYNC_QUEUE, &item.id.to_string(), item)
    }

    /// Deletes a delivered or discarded item.
    pub(crate) fn remove(&self, id: ItemId) -> EngineResult<bool> {
        self.store.delete(SYNC_QUEUE, &id.to_string())
    }

    /// Every stored item in enqueue order.
    pub(crate) fn all(&self) -> EngineResult<Vec<SyncQueueItem>> {
        let mut items: Vec<SyncQueueItem> = self
            .store
            .all(SYNC_QUEUE)?
            .into_iter()
            .map(|(_, item)| item)
            .collect();
        items.sort_by_key(|item: &SyncQueueItem| item.sequence);
        Ok(items)
    }

    /// Items the next pass would attempt, in enqueue order.
    pub(crate) fn eligible(&self) -> EngineResult<Vec<SyncQueueItem>> {
        Ok(self.all()?.into_iter().filter(SyncQueueItem::is_eligible).collect())
    }

    pub(crate) fn counts(&self) -> EngineResult<QueueCounts> {
        let mut counts = QueueCounts::default();
        for item in self.all()? {
            if item.awaiting_resolution {
                counts.awaiting_resolution += 1;
            } else if item.status != ItemStatus::Completed {
                counts.pending += 1;
            }
        }
        Ok(counts)
    }

    /// Puts a failed or parked item back in line with a clean attempt count.
    pub(crate) fn requeue(&self, id: ItemId) -> EngineResult<SyncQueueItem> {
        let mut item = self.get(id)?.ok_or(EngineError::NotFound(id))?;
        if item.status == ItemStatus::Syncing {
            return Err(EngineError::InvalidState {
                id,
                status: item.status,
                action: "requeue",
            });
        }

        item.requeue();
        self.save(&item)?;
        debug!(item_id = %id, "item re-queued");
        Ok(item)
    }

    /// Re-queues every item parked for manual resolution.
    pub(crate) fn requeue_parked(&self) -> EngineResult<usize> {
        let mut count = 0;
        for mut item in self.all()? {
            if item.awaiting_resolution {
                item.requeue();
                self.save(&item)?;
                count += 1;
            }
        }
        Ok(count)
    }

    /// Drops an item without delivering it.
    pub(crate) fn discard(&self, id: ItemId) -> EngineResult<SyncQueueItem> {
        let item = self.get(id)?.ok_or(EngineError::NotFound(id))?;
        if item.status == ItemStatus::Syncing {
            return Err(EngineError::InvalidState {
                id,
                status: item.status,
                action: "discard",
            });
        }

        self.remove(id)?;
        info!(item_id = %id, resource_kind = %item.resource_kind, resource_id = %item.resource_id, "item discarded");
        Ok(item)
    }

    pub(crate) fn clear(&self) -> EngineResult<usize> {
        self.store.clear(SYNC_QUEUE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use serde_json::json;
    use tempfile::tempdir;

    fn queue() -> SyncQueue {
        SyncQueue::open(Arc::new(EngineStore::open(&StorageConfig::memory_only()))).unwrap()
    }

    fn enqueue(queue: &SyncQueue, id: &str) -> SyncQueueItem {
        queue
            .enqueue(ChangeType::Update, "order", id, json!({"id": id}), Utc::now())
            .unwrap()
    }

    #[test]
    fn items_come_back_in_enqueue_order() {
        let queue = queue();
        let ids: Vec<ItemId> = (0..5).map(|i| enqueue(&queue, &format!("ORD-{i}")).id).collect();

        let stored: Vec<ItemId> = queue.all().unwrap().iter().map(|item| item.id).collect();
        assert_eq!(stored, ids);
    }

    #[test]
    fn eligible_skips_syncing_and_parked() {
        let queue = queue();
        let mut syncing = enqueue(&queue, "A");
        let mut parked = enqueue(&queue, "B");
        let mut failed = enqueue(&queue, "C");
        enqueue(&queue, "D");

        syncing.begin_attempt();
        queue.save(&syncing).unwrap();
        parked.park("requires manual resolution");
        queue.save(&parked).unwrap();
        failed.record_failure("503");
        queue.save(&failed).unwrap();

        let eligible: Vec<String> = queue
            .eligible()
            .unwrap()
            .into_iter()
            .map(|item| item.resource_id)
            .collect();
        assert_eq!(eligible, vec!["C", "D"]);

        let counts = queue.counts().unwrap();
        assert_eq!(counts.pending, 3);
        assert_eq!(counts.awaiting_resolution, 1);
    }

    #[test]
    fn reopen_recovers_interrupted_items_and_sequence() {
        let temp = tempdir().unwrap();
        let config = StorageConfig::at(temp.path());
        let (interrupted_id, last_sequence) = {
            let queue = SyncQueue::open(Arc::new(EngineStore::open(&config))).unwrap();
            let mut item = enqueue(&queue, "A");
            let last = enqueue(&queue, "B");
            item.begin_attempt();
            queue.save(&item).unwrap();
            (item.id, last.sequence)
        };

        let queue = SyncQueue::open(Arc::new(EngineStore::open(&config))).unwrap();
        let item = queue.get(interrupted_id).unwrap().unwrap();
        assert_eq!(item.status, ItemStatus::Pending);
        assert_eq!(queue.eligible().unwrap().len(), 2);

        let next = enqueue(&queue, "C");
        assert_eq!(next.sequence, last_sequence + 1);
    }

    #[test]
    fn requeue_resets_parked_item() {
        let queue = queue();
        let mut item = enqueue(&queue, "A");
        item.record_failure("409");
        item.park("requires manual resolution");
        queue.save(&item).unwrap();

        let requeued = queue.requeue(item.id).unwrap();
        assert_eq!(requeued.status, ItemStatus::Pending);
        assert_eq!(requeued.retry_count, 0);
        assert!(!requeued.awaiting_resolution);

        assert!(matches!(
            queue.requeue(ItemId::new()),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn requeue_parked_touches_only_parked() {
        let queue = queue();
        let mut a = enqueue(&queue, "A");
        let mut b = enqueue(&queue, "B");
        a.park("requires manual resolution");
        queue.save(&a).unwrap();
        b.record_failure("503");
        queue.save(&b).unwrap();

        assert_eq!(queue.requeue_parked().unwrap(), 1);
        assert_eq!(queue.get(b.id).unwrap().unwrap().retry_count, 1);
    }

    #[test]
    fn discard_refuses_in_flight_item() {
        let queue = queue();
        let mut item = enqueue(&queue, "A");
        item.begin_attempt();
        queue.save(&item).unwrap();

        assert!(matches!(
            queue.discard(item.id),
            Err(EngineError::InvalidState { .. })
        ));

        item.record_failure("503");
        queue.save(&item).unwrap();
        queue.discard(item.id).unwrap();
        assert!(queue.get(item.id).unwrap().is_none());
    }
}
