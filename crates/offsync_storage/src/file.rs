//! File-based storage backend for persistent storage.

use crate::backend::{ensure_shrinks, readable_range, StorageBackend};
use crate::error::StorageResult;
use parking_lot::Mutex;
use std::fmt::Debug;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// The file operations [`FileBackend`] needs.
trait LogFile: Read + Write + Seek + Send + Debug {
    fn set_len(&mut self, len: u64) -> io::Result<()>;
    fn sync_all(&mut self) -> io::Result<()>;
}

impl LogFile for File {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }

    fn sync_all(&mut self) -> io::Result<()> {
        File::sync_all(self)
    }
}

#[derive(Debug)]
struct OpenLog {
    file: Box<dyn LogFile>,
    /// Bytes of the file that belong to the log. Appends always start here.
    len: u64,
}

impl OpenLog {
    fn append(&mut self, data: &[u8]) -> io::Result<u64> {
        let offset = self.len;
        let written = self
            .file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.file.write_all(data));

        if let Err(err) = written {
            // Part of `data` may have reached the file.
            if let Err(rollback) = self.file.set_len(offset) {
                warn!(offset, error = %rollback, "could not cut back a partial append");
            }
            return Err(err);
        }

        self.len = offset + data.len() as u64;
        Ok(offset)
    }
}

/// A file-based storage backend.
///
/// Data survives process restarts.
///
/// # Durability
///
/// - `flush()` pushes buffered data to the OS
/// - `sync()` calls `fsync` so data and size are on disk
///
/// An append that fails partway is cut back off the file, so the next
/// append lands on the same offset the failed one was given.
///
/// The file itself is not locked; exclusive access is arbitrated by
/// [`crate::StoreDir`].
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    log: Mutex<OpenLog>,
}

impl FileBackend {
    /// Opens or creates a file backend at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let len = file.metadata()?.len();
        Ok(Self::over(path.to_path_buf(), Box::new(file), len))
    }

    fn over(path: PathBuf, file: Box<dyn LogFile>, len: u64) -> Self {
        Self {
            path,
            log: Mutex::new(OpenLog { file, len }),
        }
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let mut log = self.log.lock();
        readable_range(offset, len, log.len)?;

        let mut buffer = vec![0u8; len];
        if len > 0 {
            log.file.seek(SeekFrom::Start(offset))?;
            log.file.read_exact(&mut buffer)?;
        }
        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let log = self.log.get_mut();
        if data.is_empty() {
            return Ok(log.len);
        }
        Ok(log.append(data)?)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.log.get_mut().file.flush()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.log.lock().len)
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.log.get_mut().file.sync_all()?;
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let log = self.log.get_mut();
        ensure_shrinks(new_size, log.len)?;
        log.file.set_len(new_size)?;
        log.file.sync_all()?;
        log.len = new_size;
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        true
    }
}
