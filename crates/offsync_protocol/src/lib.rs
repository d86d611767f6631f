//! # Offsync Protocol
//!
//! Data model shared by the offsync engine, its tests and its tools.
//!
//! This crate provides:
//! - [`SyncQueueItem`] and its [`ItemStatus`] state machine
//! - [`ConflictInfo`], [`Resolution`] and fixed [`ConflictPolicy`] rules
//! - [`DeliveryOutcome`] reported by a remote delivery attempt
//! - [`CacheEntry`] and [`LocalEntityRecord`]
//! - [`SyncResult`] and [`StatusSnapshot`]
//!
//! This is a pure data crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod conflict;
mod delivery;
mod item;
mod local;
mod report;
mod status;

pub use cache::CacheEntry;
pub use conflict::{ConflictInfo, ConflictPolicy, Resolution};
pub use delivery::DeliveryOutcome;
pub use item::{ChangeType, ItemId, ItemStatus, Payload, ResourceKey, SyncQueueItem};
pub use local::LocalEntityRecord;
pub use report::{SkipReason, SyncResult};
pub use status::{StatusSnapshot, StorageMode};
