//! What a remote delivery attempt can report.

use crate::item::Payload;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of handing one queue item to the remote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeliveryOutcome {
    /// The remote accepted the mutation.
    Success,
    /// The remote holds a newer version.
    Conflict {
        /// The remote's current snapshot; `null` if the remote deleted it.
        remote_snapshot: Payload,
        /// When the remote last changed it.
        remote_updated_at: DateTime<Utc>,
    },
    /// Delivery failed in a way worth retrying later.
    TransientError {
        /// Human-readable reason.
        message: String,
    },
}

impl DeliveryOutcome {
    /// Shorthand for a transient error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientError {
            message: message.into(),
        }
    }

    /// Shorthand for a conflict.
    pub fn conflict(remote_snapshot: Payload, remote_updated_at: DateTime<Utc>) -> Self {
        Self::Conflict {
            remote_snapshot,
            remote_updated_at,
        }
    }

    /// Returns true for [`DeliveryOutcome::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}
