//! Aggregate result of one sync pass.

use crate::conflict::ConflictInfo;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a pass did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// Another pass holds the single-flight guard.
    AlreadyInProgress,
    /// The network monitor reports no connectivity.
    Offline,
}

impl SkipReason {
    /// Message placed in [`SyncResult::errors`].
    #[must_use]
    pub fn message(&self) -> &'static str {
        match self {
            SkipReason::AlreadyInProgress => "Sync already in progress",
            SkipReason::Offline => "Offline",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// What a sync pass did.
///
/// `success` is true iff `failed_count == 0` and the pass actually ran.
/// Conflicts that were resolved automatically are not failures; conflicts
/// left for manual resolution are.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    /// Whether the pass ran and nothing failed.
    pub success: bool,
    /// Items delivered and removed.
    pub synced_count: usize,
    /// Items that ended the pass failed or awaiting manual resolution.
    pub failed_count: usize,
    /// Items left untouched behind an unfinished item for the same entity.
    pub deferred_count: usize,
    /// Every conflict encountered, resolved or not.
    pub conflicts: Vec<ConflictInfo>,
    /// One message per failure, or the skip reason.
    pub errors: Vec<String>,
    /// Set when the pass was not run at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<SkipReason>,
}

impl SyncResult {
    /// A result for a pass that never started.
    #[must_use]
    pub fn skipped(reason: SkipReason) -> Self {
        Self {
            success: false,
            errors: vec![reason.message().to_owned()],
            skipped: Some(reason),
            ..Self::default()
        }
    }

    /// Sets `success` from the counters once a pass has finished.
    #[must_use]
    pub fn finish(mut self) -> Self {
        self.success = self.failed_count == 0;
        self
    }

    /// Whether the pass was skipped.
    #[must_use]
    pub fn was_skipped(&self) -> bool {
        self.skipped.is_some()
    }

    /// Items the pass attempted to deliver.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.synced_count + self.failed_count
    }
}
