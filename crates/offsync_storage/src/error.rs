//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of storage.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current storage size.
        size: u64,
    },

    /// A log record failed structural validation.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// A log record's checksum did not match its contents.
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Checksum stored in the record.
        expected: u32,
        /// Checksum computed over the record bytes.
        actual: u32,
    },

    /// Another process holds the store directory lock.
    #[error("store directory is locked by another process: {0}")]
    Locked(String),

    /// A value could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// A collection or key exceeds the record format limits.
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

impl StorageError {
    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }

    /// Returns true if the error means the underlying medium is unusable,
    /// as opposed to a problem with a single value.
    #[must_use]
    pub fn is_medium_failure(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Locked(_))
    }
}
