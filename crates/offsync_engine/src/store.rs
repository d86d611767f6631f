//! Typed access to the engine's collections.

use crate::config::StorageConfig;
use crate::error::EngineResult;
use offsync_protocol::StorageMode;
use offsync_storage::{
    from_cbor, to_cbor, CompactionStats, DurableStore, LogStore, RecoveryReport, StoreDir,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

/// Queued mutations, keyed by item id.
pub const SYNC_QUEUE: &str = "sync_queue";
/// Local entity snapshots, keyed by `kind:id`.
pub const ENTITIES: &str = "entities";
/// Cache rows, keyed by cache key.
pub const CACHE: &str = "cache";
/// Engine bookkeeping such as the last sync time.
pub const METADATA: &str = "metadata";

/// Every collection the engine writes.
pub const COLLECTIONS: [&str; 4] = [SYNC_QUEUE, ENTITIES, CACHE, METADATA];

/// Size and contents of the store, for status and tooling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    /// Durable or memory-only.
    pub mode: StorageMode,
    /// Bytes on the medium, including superseded records.
    pub size_bytes: u64,
    /// Bytes a compaction would keep.
    pub live_bytes: u64,
    /// Row count per collection, in [`COLLECTIONS`] order.
    pub collections: Vec<(String, usize)>,
    /// Records replayed at open.
    pub recovered_records: usize,
    /// Bytes of torn tail dropped at open.
    pub truncated_bytes: u64,
}

/// The engine's view of the durable store.
///
/// Opening never fails: if the configured directory is unusable the engine
/// keeps running on an in-memory log and says so through [`Self::mode`].
pub(crate) struct EngineStore {
    log: LogStore,
    dir: Option<StoreDir>,
    mode: StorageMode,
    quota_bytes: Option<u64>,
}

impl EngineStore {
    pub(crate) fn open(config: &StorageConfig) -> Self {
        let Some(path) = &config.path else {
            info!("no storage path configured, running memory-only");
            return Self::memory_only(StorageMode::default(), config.quota_bytes);
        };

        let opened = StoreDir::open(path, true)
            .and_then(|dir| dir.open_store(config.sync_on_write).map(|log| (dir, log)));

        match opened {
            Ok((dir, log)) => {
                info!(path = %path.display(), keys = log.key_count(), "store opened");
                Self {
                    log,
                    dir: Some(dir),
                    mode: StorageMode::Durable { path: path.clone() },
                    quota_bytes: config.quota_bytes,
                }
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "durable storage unavailable, degrading to memory-only"
                );
                Self::memory_only(
                    StorageMode::MemoryOnly {
                        reason: format!("{}: {e}", path.display()),
                    },
                    config.quota_bytes,
                )
            }
        }
    }

    fn memory_only(mode: StorageMode, quota_bytes: Option<u64>) -> Self {
        Self {
            log: LogStore::in_memory(),
            dir: None,
            mode,
            quota_bytes,
        }
    }

    pub(crate) fn mode(&self) -> &StorageMode {
        &self.mode
    }

    pub(crate) fn get<T: DeserializeOwned>(&self, collection: &str, key: &str) -> EngineResult<Option<T>> {
        match self.log.get(collection, key)? {
            Some(bytes) => Ok(Some(from_cbor(&bytes)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn put<T: Serialize + ?Sized>(&self, collection: &str, key: &str, value: &T) -> EngineResult<()> {
        let bytes = to_cbor(value)?;
        self.log.put(collection, key, &bytes)?;
        Ok(())
    }

    pub(crate) fn delete(&self, collection: &str, key: &str) -> EngineResult<bool> {
        Ok(self.log.delete(collection, key)?)
    }

    /// Every decodable row in a collection, ordered by key.
    ///
    /// Rows that fail to decode are logged and skipped so one bad value
    /// cannot wedge the queue.
    pub(crate) fn all<T: DeserializeOwned>(&self, collection: &str) -> EngineResult<Vec<(String, T)>> {
        let rows = self.log.get_all(collection)?;
        let mut out = Vec::with_capacity(rows.len());
        for (key, bytes) in rows {
            match from_cbor(&bytes) {
                Ok(value) => out.push((key, value)),
                Err(e) => warn!(collection, key = %key, error = %e, "skipping undecodable row"),
            }
        }
        Ok(out)
    }

    pub(crate) fn clear(&self, collection: &str) -> EngineResult<usize> {
        Ok(self.log.clear(collection)?)
    }

    pub(crate) fn size_bytes(&self) -> u64 {
        self.log.size_bytes().unwrap_or(0)
    }

    /// Configured quota, or what the volume could still hold.
    pub(crate) fn quota_bytes(&self) -> Option<u64> {
        if self.quota_bytes.is_some() {
            return self.quota_bytes;
        }
        let dir = self.dir.as_ref()?;
        match dir.available_space() {
            Ok(free) => Some(free.saturating_add(self.size_bytes())),
            Err(e) => {
                warn!(error = %e, "could not read free space");
                None
            }
        }
    }

    /// Compacts the log file. `None` when memory-only.
    pub(crate) fn compact(&self) -> EngineResult<Option<CompactionStats>> {
        match &self.dir {
            Some(dir) => Ok(Some(dir.compact(&self.log)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn recovery(&self) -> RecoveryReport {
        self.log.recovery()
    }

    pub(crate) fn stats(&self) -> EngineResult<StoreStats> {
        let mut collections = Vec::with_capacity(COLLECTIONS.len());
        for name in COLLECTIONS {
            collections.push((name.to_owned(), self.log.get_all(name)?.len()));
        }
        let recovery = self.recovery();

        Ok(StoreStats {
            mode: self.mode.clone(),
            size_bytes: self.size_bytes(),
            live_bytes: self.log.live_bytes(),
            collections,
            recovered_records: recovery.records,
            truncated_bytes: recovery.truncated_bytes,
        })
    }
}
