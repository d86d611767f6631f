//! Optimistic local entity snapshots.

use crate::item::{Payload, ResourceKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The local view of one entity, stored apart from the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalEntityRecord {
    /// Entity family.
    pub resource_kind: String,
    /// Entity id within its kind.
    pub resource_id: String,
    /// Current snapshot.
    pub snapshot: Payload,
    /// When the snapshot was written.
    pub updated_at: DateTime<Utc>,
}

impl LocalEntityRecord {
    /// Creates a record.
    pub fn new(key: ResourceKey, snapshot: Payload, updated_at: DateTime<Utc>) -> Self {
        Self {
            resource_kind: key.resource_kind,
            resource_id: key.resource_id,
            snapshot,
            updated_at,
        }
    }

    /// The entity this record describes.
    #[must_use]
    pub fn resource_key(&self) -> ResourceKey {
        ResourceKey::new(self.resource_kind.clone(), self.resource_id.clone())
    }
}
