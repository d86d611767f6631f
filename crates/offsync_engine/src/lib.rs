//! # Offsync Engine
//!
//! Offline-first synchronization engine.
//!
//! This crate provides:
//! - A durable mutation queue that survives restarts
//! - Optimistic local entity snapshots
//! - Connectivity tracking with an optional heartbeat probe
//! - Single-flight sync passes with pluggable conflict resolution
//! - A TTL read cache
//! - Status snapshots pushed to subscribers
//!
//! ## Architecture
//!
//! Every write lands in the store first; the network is only consulted when
//! a pass runs. A pass snapshots the eligible queue items in enqueue order
//! and hands them, one at a time, to a [`RemoteDelivery`]. Each answer is
//! one of success, conflict or transient error:
//!
//! 1. Success removes the item
//! 2. A transient error leaves it `Failed` for a later pass
//! 3. A conflict goes to the [`ConflictResolver`], or is parked for a human
//!    when none is installed
//!
//! If the store cannot be opened the engine keeps running memory-only and
//! says so in [`offsync_protocol::StatusSnapshot::storage_mode`].
//!
//! ## Key Invariants
//!
//! - At most one pass runs at a time
//! - An item is removed only after the remote accepted it or a resolution
//!   made it moot
//! - Items for the same entity are delivered in enqueue order
//! - Nothing is delivered while offline

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod clock;
mod config;
mod conflict;
mod delivery;
mod engine;
mod error;
mod local;
mod network;
mod queue;
mod status;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EngineConfig, RetryConfig, StorageConfig};
pub use conflict::{resolver_fn, ConflictResolver, FieldMerge, FnResolver, MergeStrategy};
pub use delivery::{MockDelivery, RemoteDelivery};
pub use engine::{EngineBuilder, OfflineEngine};
pub use error::{EngineError, EngineResult};
pub use network::{
    probe_fn, ConnectivityProbe, FnProbe, HeartbeatMonitor, NetworkEvent, NetworkEvents,
    NetworkMonitor,
};
pub use offsync_storage::CompactionStats;
pub use status::Subscription;
pub use store::{StoreStats, CACHE, COLLECTIONS, ENTITIES, METADATA, SYNC_QUEUE};
