//! Point-in-time engine health.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where the engine is keeping its data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum StorageMode {
    /// Backed by a store directory; survives restarts.
    Durable {
        /// Store directory.
        path: PathBuf,
    },
    /// Process memory only; everything is lost on exit.
    MemoryOnly {
        /// Why durable storage is not in use.
        reason: String,
    },
}

impl StorageMode {
    /// Returns true if writes survive a restart.
    #[must_use]
    pub fn is_durable(&self) -> bool {
        matches!(self, StorageMode::Durable { .. })
    }
}

impl Default for StorageMode {
    fn default() -> Self {
        StorageMode::MemoryOnly {
            reason: "no storage path configured".into(),
        }
    }
}

/// Engine health as seen by status subscribers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    /// Current connectivity.
    pub is_online: bool,
    /// Items a pass would still try to deliver.
    pub pending_sync_count: usize,
    /// Items parked for manual resolution.
    pub awaiting_resolution_count: usize,
    /// End of the last pass that ran.
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Bytes used by the store.
    pub storage_used: u64,
    /// Bytes available to the store, when known.
    pub storage_quota: Option<u64>,
    /// Whether a pass is running.
    pub sync_in_progress: bool,
    /// Durable or memory-only.
    pub storage_mode: StorageMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_memory_only() {
        let status = StatusSnapshot::default();
        assert!(!status.storage_mode.is_durable());
        assert_eq!(status.pending_sync_count, 0);
    }

    #[test]
    fn storage_mode_json_is_tagged() {
        let durable = StorageMode::Durable {
            path: PathBuf::from("/var/lib/app"),
        };
        let value = serde_json::to_value(&durable).unwrap();
        assert_eq!(value["mode"], "durable");
        assert!(durable.is_durable());

        let degraded = serde_json::to_value(StorageMode::MemoryOnly {
            reason: "locked".into(),
        })
        .unwrap();
        assert_eq!(degraded["mode"], "memoryOnly");
        assert_eq!(degraded["reason"], "locked");
    }
}
