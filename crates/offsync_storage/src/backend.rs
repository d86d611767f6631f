//! Storage backend trait definition.

use crate::error::{StorageError, StorageResult};
use std::ops::Range;

/// A byte-level storage backend underneath the key/value log.
///
/// Backends are **opaque byte stores**: they append, read back, and make
/// bytes durable. Record framing, checksums and key indexing all live in
/// [`crate::LogStore`]; a backend never interprets what it stores.
///
/// # Invariants
///
/// - `append` returns the offset where data was written
/// - `read_at` returns exactly the bytes previously written at that offset
/// - `flush` pushes appended data to the medium, `sync` makes it survive power loss
/// - Backends must be `Send + Sync` so one store can be shared across tasks
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - ephemeral, used for memory-only mode and tests
/// - [`super::FileBackend`] - persistent, used by [`super::StoreDir`]
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range extends beyond the current size or an
    /// I/O error occurs.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends data to the end of the storage.
    ///
    /// Returns the offset where the data was written.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Flushes all pending writes to the medium.
    fn flush(&mut self) -> StorageResult<()>;

    /// Returns the current size of the storage in bytes.
    ///
    /// This is the offset where the next `append` will write.
    fn size(&self) -> StorageResult<u64>;

    /// Syncs all data and metadata to durable storage.
    ///
    /// Stronger than `flush`: file metadata (size) is durable as well.
    fn sync(&mut self) -> StorageResult<()>;

    /// Truncates the storage to the given size.
    ///
    /// Used to cut a torn tail record off the log after a crash.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_size` is greater than the current size or the
    /// truncation fails.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Whether data written here survives a process restart.
    fn is_persistent(&self) -> bool;
}

/// Validates a read of `len` bytes at `offset` against a store of `size`
/// bytes and returns it as an index range.
pub(crate) fn readable_range(offset: u64, len: usize, size: u64) -> StorageResult<Range<usize>> {
    match offset.checked_add(len as u64) {
        Some(end) if end <= size => Ok(offset as usize..end as usize),
        _ => Err(StorageError::ReadPastEnd { offset, len, size }),
    }
}

/// Rejects truncation that would grow the store.
pub(crate) fn ensure_shrinks(new_size: u64, size: u64) -> StorageResult<()> {
    if new_size > size {
        return Err(StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("truncate to {new_size} bytes would grow a {size} byte store"),
        )));
    }
    Ok(())
}
