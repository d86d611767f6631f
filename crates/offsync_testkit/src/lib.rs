//! # Offsync Testkit
//!
//! Test utilities for the offsync engine.
//!
//! This crate provides:
//! - [`EngineHarness`], a durable engine in a temp directory that can be
//!   restarted in place
//! - [`FakeRemote`], an in-memory authoritative store that detects stale
//!   writes and answers with conflicts
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use offsync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn survives_restart() {
//!     let harness = EngineHarness::durable(FakeRemote::new());
//!     let engine = harness.start();
//!     // ... queue changes
//!     let engine = harness.restart(engine);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod remote;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::remote::*;
}

pub use fixtures::*;
pub use generators::*;
pub use remote::*;
