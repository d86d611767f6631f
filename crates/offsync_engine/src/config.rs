//! Configuration for the engine.

use rand::Rng;
use std::path::PathBuf;
use std::time::Duration;

/// Where and how the engine persists its data.
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    /// Store directory. `None` runs memory-only.
    pub path: Option<PathBuf>,
    /// Fsync after every write instead of only flushing to the OS.
    pub sync_on_write: bool,
    /// Quota reported in status. Defaults to free space on the volume.
    pub quota_bytes: Option<u64>,
}

impl StorageConfig {
    /// Durable storage in `path`.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// No persistence at all.
    pub fn memory_only() -> Self {
        Self::default()
    }

    /// Sets whether every write is fsynced.
    pub fn with_sync_on_write(mut self, sync: bool) -> Self {
        self.sync_on_write = sync;
        self
    }

    /// Sets the quota reported in status.
    pub fn with_quota_bytes(mut self, quota: u64) -> Self {
        self.quota_bytes = Some(quota);
        self
    }
}

/// Configuration for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Storage settings.
    pub storage: StorageConfig,
    /// Backoff for automatic follow-up passes.
    pub retry: RetryConfig,
    /// Bound on a single delivery call. `None` waits indefinitely.
    pub delivery_timeout: Option<Duration>,
    /// TTL used by [`crate::OfflineEngine::cache_default`].
    pub default_cache_ttl: Duration,
    /// Period of the expired-cache sweeper. `None` relies on lazy expiry.
    pub cache_sweep_interval: Option<Duration>,
    /// Field-name prefix the default merge strategy leaves to the remote.
    pub reserved_field_prefix: String,
    /// Start a pass when a change is queued while online.
    pub auto_sync_on_queue: bool,
    /// Schedule a follow-up pass after transient failures.
    pub auto_retry: bool,
    /// Defer later items for an entity once an earlier one is left unfinished.
    pub preserve_resource_order: bool,
}

impl EngineConfig {
    /// Creates a configuration with the given storage settings.
    pub fn new(storage: StorageConfig) -> Self {
        Self {
            storage,
            retry: RetryConfig::default(),
            delivery_timeout: Some(Duration::from_secs(30)),
            default_cache_ttl: Duration::from_secs(3600),
            cache_sweep_interval: None,
            reserved_field_prefix: "_".into(),
            auto_sync_on_queue: true,
            auto_retry: true,
            preserve_resource_order: true,
        }
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the delivery timeout.
    pub fn with_delivery_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    /// Sets the default cache TTL.
    pub fn with_default_cache_ttl(mut self, ttl: Duration) -> Self {
        self.default_cache_ttl = ttl;
        self
    }

    /// Enables the periodic expired-cache sweeper.
    pub fn with_cache_sweep_interval(mut self, interval: Duration) -> Self {
        self.cache_sweep_interval = Some(interval);
        self
    }

    /// Sets the reserved field prefix for the default merge strategy.
    pub fn with_reserved_field_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.reserved_field_prefix = prefix.into();
        self
    }

    /// Sets whether queueing a change starts a pass.
    pub fn with_auto_sync_on_queue(mut self, enabled: bool) -> Self {
        self.auto_sync_on_queue = enabled;
        self
    }

    /// Sets whether failing passes schedule a follow-up.
    pub fn with_auto_retry(mut self, enabled: bool) -> Self {
        self.auto_retry = enabled;
        self
    }

    /// Sets whether per-entity ordering is preserved within a pass.
    pub fn with_preserve_resource_order(mut self, enabled: bool) -> Self {
        self.preserve_resource_order = enabled;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(StorageConfig::default())
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of consecutive failing passes that get a follow-up.
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.add_jitter = jitter;
        self
    }

    /// Calculates the delay for a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // Add up to 25% jitter
            let jitter = delay_secs * 0.25 * rand::thread_rng().gen::<f64>();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_config_defaults() {
        let config = EngineConfig::default();
        assert!(config.storage.path.is_none());
        assert_eq!(config.delivery_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.default_cache_ttl, Duration::from_secs(3600));
        assert_eq!(config.reserved_field_prefix, "_");
        assert!(config.auto_sync_on_queue);
        assert!(config.preserve_resource_order);
    }

    #[test]
    fn engine_config_builder() {
        let config = EngineConfig::new(StorageConfig::at("/tmp/offsync").with_quota_bytes(1024))
            .with_delivery_timeout(None)
            .with_cache_sweep_interval(Duration::from_secs(60))
            .with_auto_retry(false)
            .with_reserved_field_prefix("$");

        assert_eq!(config.storage.path, Some(PathBuf::from("/tmp/offsync")));
        assert_eq!(config.storage.quota_bytes, Some(1024));
        assert_eq!(config.delivery_timeout, None);
        assert_eq!(config.cache_sweep_interval, Some(Duration::from_secs(60)));
        assert!(!config.auto_retry);
        assert_eq!(config.reserved_field_prefix, "$");
    }

    #[test]
    fn retry_config_no_retry() {
        let config = RetryConfig::no_retry();
        assert_eq!(config.max_attempts, 0);
    }

    #[test]
    fn retry_delay_calculation() {
        let config = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0);

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);

        let delay1 = config.delay_for_attempt(1);
        assert!(delay1 >= Duration::from_millis(100));
        assert!(delay1 <= Duration::from_millis(125));

        let delay2 = config.delay_for_attempt(2);
        assert!(delay2 >= Duration::from_millis(200));
    }

    #[test]
    fn retry_delay_without_jitter_is_exact() {
        let config = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_jitter(false);

        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn retry_delay_respects_max() {
        let config = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0);

        let delay = config.delay_for_attempt(5);
        assert!(delay <= Duration::from_millis(6250));
    }
}
