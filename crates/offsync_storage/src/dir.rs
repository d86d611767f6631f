//! Store directory management.
//!
//! ```text
//! <store_path>/
//! ├─ LOCK                # Advisory lock for single-process access
//! ├─ store.log           # Append-only key/value log
//! └─ store.log.compact   # Present only while a compaction is in flight
//! ```

use crate::error::{StorageError, StorageResult};
use crate::file::FileBackend;
use crate::store::{CompactionStats, LogStore};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const LOCK_FILE: &str = "LOCK";
const LOG_FILE: &str = "store.log";
const COMPACT_FILE: &str = "store.log.compact";

/// An exclusively locked store directory.
///
/// Only one `StoreDir` can exist per directory at a time, across processes.
/// The lock is released when the value is dropped.
#[derive(Debug)]
pub struct StoreDir {
    path: PathBuf,
    _lock_file: File,
}

impl StoreDir {
    /// Opens a store directory, creating it if `create_if_missing` is set.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Locked`] if another process holds the directory
    /// - [`StorageError::Io`] if the path is missing, not a directory, or
    ///   unreadable
    pub fn open(path: &Path, create_if_missing: bool) -> StorageResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("store directory does not exist: {}", path.display()),
                )));
            }
        }

        if !path.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("path is not a directory: {}", path.display()),
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(path.display().to_string()));
        }

        // Leftover from a compaction that never finished; store.log is intact.
        let stale = path.join(COMPACT_FILE);
        if stale.exists() {
            debug!(path = %stale.display(), "removing stale compaction file");
            fs::remove_file(&stale)?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of the key/value log.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.path.join(LOG_FILE)
    }

    /// Opens the log in this directory as a [`LogStore`].
    pub fn open_store(&self, sync_on_write: bool) -> StorageResult<LogStore> {
        let backend = FileBackend::open(&self.log_path())?;
        LogStore::open(Box::new(backend), sync_on_write)
    }

    /// Compacts `store` into a fresh file and swaps it in for `store.log`.
    ///
    /// The new log is fully written and synced before the rename, so a crash
    /// at any point leaves either the old log or the new one in place. The
    /// store only switches to the new file once the rename has gone through;
    /// if it fails, the store keeps appending to `store.log` and the
    /// half-finished file is removed.
    pub fn compact(&self, store: &LogStore) -> StorageResult<CompactionStats> {
        let compact_path = self.path.join(COMPACT_FILE);
        if compact_path.exists() {
            fs::remove_file(&compact_path)?;
        }

        let target = FileBackend::open(&compact_path)?;
        let log_path = self.log_path();
        let result = store.compact_into(Box::new(target), || {
            fs::rename(&compact_path, &log_path)?;
            Ok(())
        });

        let stats = match result {
            Ok(stats) => stats,
            Err(err) => {
                if compact_path.exists() {
                    if let Err(cleanup) = fs::remove_file(&compact_path) {
                        warn!(error = %cleanup, "could not remove unused compaction file");
                    }
                }
                return Err(err);
            }
        };
        self.sync_directory()?;

        info!(
            before = stats.bytes_before,
            after = stats.bytes_after,
            "store log compacted"
        );
        Ok(stats)
    }

    /// Free bytes on the volume holding this directory.
    pub fn available_space(&self) -> StorageResult<u64> {
        Ok(fs2::available_space(&self.path)?)
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> StorageResult<()> {
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> StorageResult<()> {
        Ok(())
    }
}
