//! Test fixtures and engine helpers.
//!
//! Provides convenience functions for setting up engines over a temporary
//! store directory and restarting them in place.

use offsync_engine::{
    EngineConfig, ManualClock, NetworkMonitor, OfflineEngine, RemoteDelivery, StorageConfig,
};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// A durable engine setup with automatic cleanup.
///
/// The harness owns the store directory, the delivery, the connectivity
/// source and a manual clock, so an engine started from it can be dropped
/// and started again over the same data, simulating a process restart.
///
/// Automatic passes are off by default; tests call `sync()` explicitly.
/// Every method that starts an engine must run within a Tokio runtime.
pub struct EngineHarness<D> {
    /// The delivery handed to every engine.
    pub delivery: Arc<D>,
    /// Connectivity shared by every engine.
    pub network: NetworkMonitor,
    /// Clock shared by every engine.
    pub clock: Arc<ManualClock>,
    config: EngineConfig,
    temp_dir: TempDir,
}

impl<D: RemoteDelivery + 'static> EngineHarness<D> {
    /// Creates a harness over a fresh temp directory, online.
    pub fn durable(delivery: D) -> Self {
        Self::with_config(delivery, |config| config)
    }

    /// Creates a harness and lets `configure` adjust the engine settings.
    ///
    /// The storage path is always the harness directory.
    pub fn with_config<F>(delivery: D, configure: F) -> Self
    where
        F: FnOnce(EngineConfig) -> EngineConfig,
    {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = EngineConfig::new(StorageConfig::at(temp_dir.path()))
            .with_auto_sync_on_queue(false)
            .with_auto_retry(false);
        let mut config = configure(base);
        config.storage.path = Some(temp_dir.path().to_path_buf());

        Self {
            delivery: Arc::new(delivery),
            network: NetworkMonitor::new(true),
            clock: Arc::new(ManualClock::default()),
            config,
            temp_dir,
        }
    }

    /// The store directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// The configuration every engine is started with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Starts an engine over the harness directory.
    pub fn start(&self) -> OfflineEngine {
        let engine = OfflineEngine::builder(self.config.clone(), Arc::clone(&self.delivery))
            .network(self.network.clone())
            .clock(self.clock.clone())
            .build()
            .expect("Failed to start engine");
        assert!(
            engine.storage_mode().is_durable(),
            "harness engine fell back to memory-only: {:?}",
            engine.storage_mode()
        );
        engine
    }

    /// Drops `engine` and starts a new one over the same directory.
    ///
    /// `engine` must be the last handle; a clone kept elsewhere holds the
    /// directory lock.
    pub fn restart(&self, engine: OfflineEngine) -> OfflineEngine {
        engine.shutdown();
        drop(engine);
        self.start()
    }
}

/// Starts a memory-only engine with automatic passes off.
pub fn memory_engine<D: RemoteDelivery + 'static>(delivery: Arc<D>) -> OfflineEngine {
    OfflineEngine::builder(
        EngineConfig::new(StorageConfig::memory_only())
            .with_auto_sync_on_queue(false)
            .with_auto_retry(false),
        delivery,
    )
    .build()
    .expect("Failed to start engine")
}
