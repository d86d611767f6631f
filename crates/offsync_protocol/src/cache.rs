//! Read cache rows.

use crate::item::Payload;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A disposable, independently expiring cache row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Caller-chosen key.
    pub key: String,
    /// Cached value.
    pub data: Payload,
    /// Absolute expiry.
    pub expires_at: DateTime<Utc>,
    /// Monotonic write stamp. Informational only.
    pub version: u64,
}

impl CacheEntry {
    /// Whether the entry must be treated as absent at `now`.
    ///
    /// An entry is still live at exactly `expires_at`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}
