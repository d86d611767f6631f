//! Error types for the engine.

use offsync_protocol::{ItemId, ItemStatus};
use offsync_storage::StorageError;
use std::time::Duration;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in engine operations.
///
/// Connectivity never produces one of these: queueing and local reads and
/// writes go to the store whether or not the remote is reachable, and a sync
/// pass folds every per-item failure into its [`offsync_protocol::SyncResult`].
#[derive(Error, Debug)]
pub enum EngineError {
    /// The store rejected a read or write.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Remote delivery did not answer in time.
    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),

    /// No queue item with this id.
    #[error("queue item not found: {0}")]
    NotFound(ItemId),

    /// The item is not in a state that allows the operation.
    #[error("queue item {id} is {status}, cannot {action}")]
    InvalidState {
        /// Item id.
        id: ItemId,
        /// Its current status.
        status: ItemStatus,
        /// What was attempted.
        action: &'static str,
    },

    /// A conflict was left for a human to resolve.
    ///
    /// Displays without the id; it is the `last_error` text of a parked item.
    #[error("requires manual resolution")]
    ManualResolutionRequired(ItemId),
}

impl EngineError {
    /// Returns true if the operation may succeed if tried again later.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Timeout(_) => true,
            EngineError::Storage(e) => e.is_medium_failure(),
            _ => false,
        }
    }
}
