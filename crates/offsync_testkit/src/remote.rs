//! An in-memory authoritative remote.
//!
//! Unlike [`offsync_engine::MockDelivery`], which answers from a script,
//! [`FakeRemote`] keeps server-side state and decides outcomes the way a
//! versioned API would: a write whose base revision is older than the
//! server's comes back as a conflict carrying the server copy.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use offsync_engine::RemoteDelivery;
use offsync_protocol::{
    ChangeType, DeliveryOutcome, ItemId, Payload, ResourceKey, SyncQueueItem,
};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Payload field that carries the revision a change was based on.
pub const REVISION_FIELD: &str = "_rev";

/// A stored remote entity.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntity {
    /// Current snapshot, including [`REVISION_FIELD`].
    pub snapshot: Payload,
    /// Server revision, bumped on every accepted write.
    pub revision: u64,
    /// When the entity was last written.
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct RemoteState {
    entities: HashMap<ResourceKey, RemoteEntity>,
    tombstones: HashMap<ResourceKey, DateTime<Utc>>,
    applied: Vec<ItemId>,
    reachable: bool,
}

/// Versioned in-memory remote.
///
/// A change is accepted when its payload has no [`REVISION_FIELD`], or one
/// equal to the server revision. Anything older is a conflict. Deletes of
/// entities the server already removed conflict with a `null` snapshot.
#[derive(Debug)]
pub struct FakeRemote {
    state: Mutex<RemoteState>,
}

impl FakeRemote {
    /// Creates an empty, reachable remote.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RemoteState {
                reachable: true,
                ..RemoteState::default()
            }),
        }
    }

    /// Writes an entity server-side, as another client would.
    ///
    /// Returns the new revision.
    pub fn seed(&self, kind: &str, id: &str, snapshot: Payload) -> u64 {
        let mut state = self.state.lock();
        let key = ResourceKey::new(kind, id);
        state.tombstones.remove(&key);
        let revision = state.entities.get(&key).map_or(1, |e| e.revision + 1);
        state
            .entities
            .insert(key, RemoteEntity::new(snapshot, revision, Utc::now()));
        revision
    }

    /// Deletes an entity server-side, as another client would.
    pub fn seed_delete(&self, kind: &str, id: &str) {
        let mut state = self.state.lock();
        let key = ResourceKey::new(kind, id);
        if state.entities.remove(&key).is_some() {
            state.tombstones.insert(key, Utc::now());
        }
    }

    /// The server copy of an entity.
    pub fn entity(&self, kind: &str, id: &str) -> Option<RemoteEntity> {
        self.state
            .lock()
            .entities
            .get(&ResourceKey::new(kind, id))
            .cloned()
    }

    /// Makes every delivery fail with a transient error, or stop failing.
    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().reachable = reachable;
    }

    /// Ids of every accepted change, in order.
    pub fn applied(&self) -> Vec<ItemId> {
        self.state.lock().applied.clone()
    }

    /// How many times a change with this id was accepted.
    pub fn applied_count(&self, id: ItemId) -> usize {
        self.state.lock().applied.iter().filter(|a| **a == id).count()
    }
}

impl Default for FakeRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteEntity {
    fn new(mut snapshot: Payload, revision: u64, updated_at: DateTime<Utc>) -> Self {
        if let Payload::Object(fields) = &mut snapshot {
            fields.insert(REVISION_FIELD.to_owned(), Payload::from(revision));
        }
        Self {
            snapshot,
            revision,
            updated_at,
        }
    }
}

fn base_revision(payload: &Payload) -> Option<u64> {
    payload.get(REVISION_FIELD).and_then(Payload::as_u64)
}

#[async_trait]
impl RemoteDelivery for FakeRemote {
    async fn deliver(&self, item: &SyncQueueItem) -> DeliveryOutcome {
        let mut state = self.state.lock();
        if !state.reachable {
            return DeliveryOutcome::transient("connection refused");
        }

        let key = item.resource_key();
        let now = Utc::now();

        if let Some(deleted_at) = state.tombstones.get(&key) {
            if item.change_type != ChangeType::Create {
                return DeliveryOutcome::conflict(Payload::Null, *deleted_at);
            }
        }

        let current = state.entities.get(&key);
        if let (Some(current), Some(base)) = (current, base_revision(&item.payload)) {
            if base < current.revision {
                return DeliveryOutcome::conflict(current.snapshot.clone(), current.updated_at);
            }
        }

        match item.change_type {
            ChangeType::Delete => {
                state.entities.remove(&key);
                state.tombstones.insert(key, now);
            }
            ChangeType::Create | ChangeType::Update => {
                let revision = current.map_or(1, |e| e.revision + 1);
                state.tombstones.remove(&key);
                state
                    .entities
                    .insert(key, RemoteEntity::new(item.payload.clone(), revision, now));
            }
        }
        state.applied.push(item.id);
        DeliveryOutcome::Success
    }
}
