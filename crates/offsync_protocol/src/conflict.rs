//! Conflict description and resolution choices.

use crate::item::{ItemId, Payload, ResourceKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A delivery that collided with a newer remote version.
///
/// Lives only for the duration of one resolution call; it is reported in
/// [`crate::SyncResult::conflicts`] but never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictInfo {
    /// Queue item whose delivery conflicted.
    pub item_id: ItemId,
    /// Entity family.
    pub resource_kind: String,
    /// Entity id within its kind.
    pub resource_id: String,
    /// Payload the item tried to deliver.
    pub local_version: Payload,
    /// Snapshot the remote holds.
    pub remote_version: Payload,
    /// When the local side last changed the entity.
    pub last_local_update: DateTime<Utc>,
    /// When the remote side last changed the entity.
    pub last_remote_update: DateTime<Utc>,
}

impl ConflictInfo {
    /// The entity in conflict.
    #[must_use]
    pub fn resource_key(&self) -> ResourceKey {
        ResourceKey::new(self.resource_kind.clone(), self.resource_id.clone())
    }

    /// Whether the remote side deleted the entity.
    #[must_use]
    pub fn remote_deleted(&self) -> bool {
        self.remote_version.is_null()
    }
}

/// Outcome chosen for a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    /// Re-deliver the local mutation unchanged.
    Local,
    /// Drop the local mutation and adopt the remote snapshot.
    Remote,
    /// Re-deliver a merge of both sides.
    Merge,
    /// Leave the item failed until someone re-queues it.
    Manual,
}

impl Resolution {
    /// Whether the item goes back in line with `retry_count = 0`.
    #[must_use]
    pub fn requeues(&self) -> bool {
        matches!(self, Resolution::Local | Resolution::Merge)
    }
}

/// Fixed rule for resolving every conflict the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConflictPolicy {
    /// Local mutation wins.
    LocalWins,
    /// Remote snapshot wins.
    RemoteWins,
    /// Merge both sides.
    Merge,
    /// Newer timestamp wins; ties go to the local side.
    LastWriteWins,
    /// Every conflict needs a human.
    #[default]
    Manual,
}

impl ConflictPolicy {
    /// Picks the resolution this policy gives `conflict`.
    pub fn resolution_for(&self, conflict: &ConflictInfo) -> Resolution {
        match self {
            ConflictPolicy::LocalWins => Resolution::Local,
            ConflictPolicy::RemoteWins => Resolution::Remote,
            ConflictPolicy::Merge => Resolution::Merge,
            ConflictPolicy::LastWriteWins => {
                if conflict.last_remote_update > conflict.last_local_update {
                    Resolution::Remote
                } else {
                    Resolution::Local
                }
            }
            ConflictPolicy::Manual => Resolution::Manual,
        }
    }
}
