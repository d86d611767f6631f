//! # Offsync Storage
//!
//! Durable key/value storage for the offsync engine.
//!
//! Two layers live here:
//!
//! - [`StorageBackend`] implementations are **opaque byte stores**
//!   (read, append, flush). [`InMemoryBackend`] is ephemeral,
//!   [`FileBackend`] survives restarts.
//! - [`LogStore`] frames keyed puts and deletes as checksummed
//!   [`LogRecord`]s on top of a backend and exposes them through the
//!   [`DurableStore`] collection API.
//!
//! [`StoreDir`] owns the on-disk layout and the cross-process lock.
//!
//! ## Example
//!
//! ```rust
//! use offsync_storage::{DurableStore, LogStore};
//!
//! let store = LogStore::in_memory();
//! store.put("metadata", "last_sync_time", b"0").unwrap();
//! assert_eq!(store.get("metadata", "last_sync_time").unwrap(), Some(b"0".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod codec;
mod dir;
mod error;
mod file;
mod memory;
mod record;
mod store;

pub use backend::StorageBackend;
pub use codec::{from_cbor, to_cbor};
pub use dir::StoreDir;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
pub use record::{compute_crc32, LogRecord, RecordFlags};
pub use store::{CompactionStats, DurableStore, LogStore, RecoveryReport};
