//! CLI command implementations.

pub mod clear;
pub mod compact;
pub mod inspect;
pub mod purge_cache;
pub mod requeue;

use async_trait::async_trait;
use offsync_engine::{
    EngineConfig, EngineError, NetworkMonitor, OfflineEngine, RemoteDelivery, StorageConfig,
};
use offsync_protocol::{DeliveryOutcome, StorageMode, SyncQueueItem};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// Errors reported by CLI commands.
#[derive(Error, Debug)]
pub enum CliError {
    /// Nothing at the given path looks like a store.
    #[error("no store found at {0:?}")]
    NoStore(PathBuf),

    /// The store exists but could not be opened durably.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// An engine operation failed.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// JSON output could not be produced.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The item id argument is not a UUID.
    #[error("invalid item id: {0}")]
    InvalidItemId(String),

    /// Unknown `--format` value.
    #[error("unknown output format {0:?} (expected text or json)")]
    UnknownFormat(String),

    /// A destructive command ran without confirmation.
    #[error("refusing to clear without --yes")]
    ConfirmationRequired,
}

/// Output format for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable.
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl FromStr for OutputFormat {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(CliError::UnknownFormat(s.to_owned())),
        }
    }
}

/// Stands in for the remote; maintenance commands never deliver.
struct UnavailableDelivery;

#[async_trait]
impl RemoteDelivery for UnavailableDelivery {
    async fn deliver(&self, _item: &SyncQueueItem) -> DeliveryOutcome {
        DeliveryOutcome::transient("delivery is not available from the maintenance tool")
    }
}

/// Opens the store at `path` offline, with every automatic pass disabled.
///
/// Fails instead of degrading to memory-only: a maintenance command that
/// silently worked on an empty in-memory store would report nonsense.
pub(crate) fn open_engine(path: &Path) -> Result<OfflineEngine, CliError> {
    if !path.is_dir() {
        return Err(CliError::NoStore(path.to_path_buf()));
    }

    let config = EngineConfig::new(StorageConfig::at(path))
        .with_auto_sync_on_queue(false)
        .with_auto_retry(false);
    let engine = OfflineEngine::builder(config, UnavailableDelivery)
        .network(NetworkMonitor::new(false))
        .build()?;

    match engine.storage_mode() {
        StorageMode::Durable { .. } => {
            debug!(path = %path.display(), "store opened");
            Ok(engine)
        }
        StorageMode::MemoryOnly { reason } => Err(CliError::Unavailable(reason.clone())),
    }
}
