//! Keyed collections over an append-only log.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use crate::memory::InMemoryBackend;
use crate::record::LogRecord;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Durable key/value storage split into named collections.
///
/// Every operation is atomic per key. There are no cross-key transactions;
/// callers that need ordering across keys must provide it themselves.
pub trait DurableStore: Send + Sync {
    /// Returns the value stored under `key`, if any.
    fn get(&self, collection: &str, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Returns every `(key, value)` pair in a collection, ordered by key.
    fn get_all(&self, collection: &str) -> StorageResult<Vec<(String, Vec<u8>)>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn put(&self, collection: &str, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Removes `key`. Returns whether it existed.
    fn delete(&self, collection: &str, key: &str) -> StorageResult<bool>;

    /// Removes every key in a collection. Returns how many were removed.
    fn clear(&self, collection: &str) -> StorageResult<usize>;

    /// Names of collections holding at least one key.
    fn collections(&self) -> Vec<String>;

    /// Bytes occupied on the medium, including superseded records.
    fn size_bytes(&self) -> StorageResult<u64>;

    /// Whether writes survive a process restart.
    fn is_persistent(&self) -> bool;
}

/// Location of the latest record for a key.
#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    offset: u64,
    len: usize,
}

struct LogInner {
    backend: Box<dyn StorageBackend>,
    index: BTreeMap<(String, String), IndexEntry>,
    next_sequence: u64,
}

impl LogInner {
    fn read_record(&self, entry: IndexEntry) -> StorageResult<LogRecord> {
        let data = self.backend.read_at(entry.offset, entry.len)?;
        LogRecord::decode(&data)
    }

    fn append(&mut self, record: &LogRecord, sync: bool) -> StorageResult<IndexEntry> {
        let encoded = record.encode()?;
        let offset = self.backend.append(&encoded)?;
        if sync {
            self.backend.sync()?;
        } else {
            self.backend.flush()?;
        }
        self.next_sequence = record.sequence + 1;
        Ok(IndexEntry {
            offset,
            len: encoded.len(),
        })
    }

    /// Copies the latest record of every key into `target` and syncs it.
    ///
    /// Returns the index those records would have in `target`.
    fn copy_live_records(
        &self,
        target: &mut dyn StorageBackend,
    ) -> StorageResult<BTreeMap<(String, String), IndexEntry>> {
        if target.size()? > 0 {
            target.truncate(0)?;
        }

        let mut index = BTreeMap::new();
        for (key, entry) in &self.index {
            let bytes = self.backend.read_at(entry.offset, entry.len)?;
            let offset = target.append(&bytes)?;
            index.insert(
                key.clone(),
                IndexEntry {
                    offset,
                    len: entry.len,
                },
            );
        }
        target.sync()?;
        Ok(index)
    }
}

/// Outcome of replaying a log at open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Records replayed successfully.
    pub records: usize,
    /// Bytes cut off the end of the log because they did not form a valid record.
    pub truncated_bytes: u64,
}

/// Outcome of a compaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionStats {
    /// Log size before compaction.
    pub bytes_before: u64,
    /// Log size after compaction.
    pub bytes_after: u64,
    /// Live records rewritten.
    pub records: usize,
}

/// A [`DurableStore`] kept as an append-only log of [`LogRecord`]s with an
/// in-memory index of the latest record per key.
///
/// # Crash safety
///
/// Records are written whole and then flushed (or fsynced with
/// `sync_on_write`). On open the log is replayed front to back; the first
/// record that is short or fails its checksum marks a torn tail, and the log
/// is truncated there so later appends start on a clean boundary.
pub struct LogStore {
    inner: RwLock<LogInner>,
    sync_on_write: bool,
    recovery: RecoveryReport,
}

impl LogStore {
    /// Opens a store over `backend`, replaying whatever it already holds.
    pub fn open(mut backend: Box<dyn StorageBackend>, sync_on_write: bool) -> StorageResult<Self> {
        let (index, next_sequence, recovery) = replay(backend.as_mut())?;
        debug!(
            records = recovery.records,
            keys = index.len(),
            "log store opened"
        );

        Ok(Self {
            inner: RwLock::new(LogInner {
                backend,
                index,
                next_sequence,
            }),
            sync_on_write,
            recovery,
        })
    }

    /// Creates an empty store that lives only in process memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            inner: RwLock::new(LogInner {
                backend: Box::new(InMemoryBackend::new()),
                index: BTreeMap::new(),
                next_sequence: 1,
            }),
            sync_on_write: false,
            recovery: RecoveryReport::default(),
        }
    }

    /// What replay found when this store was opened.
    #[must_use]
    pub fn recovery(&self) -> RecoveryReport {
        self.recovery
    }

    /// Number of live keys across all collections.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.inner.read().index.len()
    }

    /// Bytes held by the latest record of every live key.
    #[must_use]
    pub fn live_bytes(&self) -> u64 {
        self.inner
            .read()
            .index
            .values()
            .map(|entry| entry.len as u64)
            .sum()
    }

    /// Rewrites every live record into `target`, then switches to it once
    /// `commit` succeeds.
    ///
    /// `target` is cleared first. The store stays write-locked from the first
    /// copied record until the switch, so no write can land in the old
    /// backend after its records were copied. If copying or `commit` fails the
    /// store keeps its current backend and index, and `target` is dropped.
    pub fn compact_into<F>(
        &self,
        mut target: Box<dyn StorageBackend>,
        commit: F,
    ) -> StorageResult<CompactionStats>
    where
        F: FnOnce() -> StorageResult<()>,
    {
        let mut inner = self.inner.write();
        let bytes_before = inner.backend.size()?;

        let index = inner.copy_live_records(target.as_mut())?;
        let stats = CompactionStats {
            bytes_before,
            bytes_after: target.size()?,
            records: index.len(),
        };

        if let Err(err) = commit() {
            warn!(error = %err, "compaction not committed, keeping current log");
            return Err(err);
        }
        inner.backend = target;
        inner.index = index;

        debug!(
            before = stats.bytes_before,
            after = stats.bytes_after,
            records = stats.records,
            "log store compacted"
        );
        Ok(stats)
    }
}

impl DurableStore for LogStore {
    fn get(&self, collection: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let inner = self.inner.read();
        let Some(&entry) = inner.index.get(&(collection.to_owned(), key.to_owned())) else {
            return Ok(None);
        };
        Ok(Some(inner.read_record(entry)?.value))
    }

    fn get_all(&self, collection: &str) -> StorageResult<Vec<(String, Vec<u8>)>> {
        let inner = self.inner.read();
        let start = (collection.to_owned(), String::new());

        inner
            .index
            .range(start..)
            .take_while(|((c, _), _)| c == collection)
            .map(|((_, key), &entry)| Ok((key.clone(), inner.read_record(entry)?.value)))
            .collect()
    }

    fn put(&self, collection: &str, key: &str, value: &[u8]) -> StorageResult<()> {
        let mut inner = self.inner.write();
        let record = LogRecord::put(inner.next_sequence, collection, key, value.to_vec());
        let entry = inner.append(&record, self.sync_on_write)?;
        inner
            .index
            .insert((collection.to_owned(), key.to_owned()), entry);
        Ok(())
    }

    fn delete(&self, collection: &str, key: &str) -> StorageResult<bool> {
        let mut inner = self.inner.write();
        let index_key = (collection.to_owned(), key.to_owned());
        if !inner.index.contains_key(&index_key) {
            return Ok(false);
        }

        let record = LogRecord::tombstone(inner.next_sequence, collection, key);
        inner.append(&record, self.sync_on_write)?;
        inner.index.remove(&index_key);
        Ok(true)
    }

    fn clear(&self, collection: &str) -> StorageResult<usize> {
        let mut inner = self.inner.write();
        let keys: Vec<(String, String)> = inner
            .index
            .range((collection.to_owned(), String::new())..)
            .take_while(|((c, _), _)| c == collection)
            .map(|(k, _)| k.clone())
            .collect();

        for index_key in &keys {
            let record = LogRecord::tombstone(inner.next_sequence, &index_key.0, &index_key.1);
            inner.append(&record, false)?;
            inner.index.remove(index_key);
        }
        if self.sync_on_write && !keys.is_empty() {
            inner.backend.sync()?;
        }
        Ok(keys.len())
    }

    fn collections(&self) -> Vec<String> {
        let inner = self.inner.read();
        let mut names: Vec<String> = inner.index.keys().map(|(c, _)| c.clone()).collect();
        names.dedup();
        names
    }

    fn size_bytes(&self) -> StorageResult<u64> {
        self.inner.read().backend.size()
    }

    fn is_persistent(&self) -> bool {
        self.inner.read().backend.is_persistent()
    }
}

impl std::fmt::Debug for LogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStore")
            .field("keys", &self.key_count())
            .field("sync_on_write", &self.sync_on_write)
            .field("recovery", &self.recovery)
            .finish_non_exhaustive()
    }
}

/// Rebuilds the index from a backend, truncating a torn tail.
fn replay(
    backend: &mut dyn StorageBackend,
) -> StorageResult<(BTreeMap<(String, String), IndexEntry>, u64, RecoveryReport)> {
    let size = backend.size()?;
    let mut index = BTreeMap::new();
    let mut report = RecoveryReport::default();
    let mut max_sequence = 0u64;
    let mut offset = 0u64;

    while offset < size {
        if offset + LogRecord::LEN_PREFIX as u64 > size {
            break;
        }

        let prefix = backend.read_at(offset, LogRecord::LEN_PREFIX)?;
        let len = LogRecord::length_from_prefix([prefix[0], prefix[1], prefix[2], prefix[3]]);
        if len < LogRecord::HEADER_SIZE + LogRecord::CRC_SIZE || offset + len as u64 > size {
            break;
        }

        let data = backend.read_at(offset, len)?;
        let record = match LogRecord::decode(&data) {
            Ok(record) => record,
            Err(StorageError::ChecksumMismatch { .. } | StorageError::Corrupted(_)) => break,
            Err(e) => return Err(e),
        };

        max_sequence = max_sequence.max(record.sequence);
        let key = (record.collection, record.key);
        if record.flags.is_tombstone() {
            index.remove(&key);
        } else {
            index.insert(key, IndexEntry { offset, len });
        }

        report.records += 1;
        offset += len as u64;
    }

    if offset < size {
        report.truncated_bytes = size - offset;
        warn!(
            offset,
            truncated_bytes = report.truncated_bytes,
            "discarding torn tail of storage log"
        );
        backend.truncate(offset)?;
    }

    Ok((index, max_sequence + 1, report))
}
