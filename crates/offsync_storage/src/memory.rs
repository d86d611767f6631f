//! In-memory storage backend.

use crate::backend::{ensure_shrinks, readable_range, StorageBackend};
use crate::error::StorageResult;
use parking_lot::RwLock;

/// An in-memory storage backend.
///
/// Backs the engine's memory-only mode (no store directory, or the
/// directory could not be opened) and most unit tests. Nothing written here
/// survives the process.
///
/// # Example
///
/// ```rust
/// use offsync_storage::{StorageBackend, InMemoryBackend};
///
/// let mut backend = InMemoryBackend::new();
/// let offset = backend.append(b"queued").unwrap();
/// assert_eq!(offset, 0);
/// assert_eq!(backend.size().unwrap(), 6);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    data: RwLock<Vec<u8>>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory backend with pre-existing data.
    ///
    /// Useful for simulating a log left behind by a crashed process.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }

    /// Returns a copy of all data in the backend.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        let range = readable_range(offset, len, data.len() as u64)?;
        Ok(data[range].to_vec())
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        let data = self.data.get_mut();
        let offset = data.len() as u64;
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    // Nothing sits between the buffer and its readers.
    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let data = self.data.get_mut();
        ensure_shrinks(new_size, data.len() as u64)?;
        data.truncate(new_size as usize);
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        false
    }
}
