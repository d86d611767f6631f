//! Optimistic local entity snapshots.

use crate::error::EngineResult;
use crate::store::{EngineStore, ENTITIES};
use chrono::{DateTime, Utc};
use offsync_protocol::{LocalEntityRecord, Payload, ResourceKey};
use std::sync::Arc;

/// Entity snapshots, independent of the queue.
pub(crate) struct LocalStore {
    store: Arc<EngineStore>,
}

impl LocalStore {
    pub(crate) fn new(store: Arc<EngineStore>) -> Self {
        Self { store }
    }

    pub(crate) fn save(
        &self,
        key: ResourceKey,
        snapshot: Payload,
        updated_at: DateTime<Utc>,
    ) -> EngineResult<LocalEntityRecord> {
        let store_key = entity_key(&key);
        let record = LocalEntityRecord::new(key, snapshot, updated_at);
        self.store.put(ENTITIES, &store_key, &record)?;
        Ok(record)
    }

    pub(crate) fn get(&self, key: &ResourceKey) -> EngineResult<Option<LocalEntityRecord>> {
        self.store.get(ENTITIES, &entity_key(key))
    }

    /// Every record of one kind, ordered by id.
    pub(crate) fn get_all(&self, resource_kind: &str) -> EngineResult<Vec<LocalEntityRecord>> {
        Ok(self
            .store
            .all::<LocalEntityRecord>(ENTITIES)?
            .into_iter()
            .map(|(_, record)| record)
            .filter(|record| record.resource_kind == resource_kind)
            .collect())
    }

    pub(crate) fn delete(&self, key: &ResourceKey) -> EngineResult<bool> {
        self.store.delete(ENTITIES, &entity_key(key))
    }

    pub(crate) fn clear(&self) -> EngineResult<usize> {
        self.store.clear(ENTITIES)
    }
}

/// Store key for an entity. The kind is length-prefixed so no kind/id pair
/// can collide with another.
fn entity_key(key: &ResourceKey) -> String {
    format!("{}/{}:{}", key.resource_kind.len(), key.resource_kind, key.resource_id)
}
