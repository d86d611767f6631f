//! TTL read cache on top of the store.

use crate::clock::{to_chrono, Clock};
use crate::error::EngineResult;
use crate::store::{EngineStore, CACHE};
use offsync_protocol::{CacheEntry, Payload};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Disposable cache rows with lazy expiry.
///
/// Writes are last-write-wins. Expired rows are deleted when read, or in
/// bulk by [`CacheManager::clear_expired`].
pub(crate) struct CacheManager {
    store: Arc<EngineStore>,
    clock: Arc<dyn Clock>,
    version: AtomicU64,
    // Serialises writes with expiry deletes so a fresh write is never
    // removed by a reader that saw the stale row.
    write_lock: Mutex<()>,
}

impl CacheManager {
    pub(crate) fn open(store: Arc<EngineStore>, clock: Arc<dyn Clock>) -> EngineResult<Self> {
        let highest = store
            .all::<CacheEntry>(CACHE)?
            .iter()
            .map(|(_, entry)| entry.version)
            .max()
            .unwrap_or(0);

        Ok(Self {
            store,
            clock,
            version: AtomicU64::new(highest + 1),
            write_lock: Mutex::new(()),
        })
    }

    pub(crate) fn put(&self, key: &str, data: Payload, ttl: Duration) -> EngineResult<CacheEntry> {
        let _guard = self.write_lock.lock();
        let entry = CacheEntry {
            key: key.to_owned(),
            data,
            expires_at: self.clock.now() + to_chrono(ttl),
            version: self.version.fetch_add(1, Ordering::SeqCst),
        };
        self.store.put(CACHE, key, &entry)?;
        Ok(entry)
    }

    /// Returns the cached data, or `None` on a miss or an expired row.
    pub(crate) fn get(&self, key: &str) -> EngineResult<Option<Payload>> {
        Ok(self.get_entry(key)?.map(|entry| entry.data))
    }

    pub(crate) fn get_entry(&self, key: &str) -> EngineResult<Option<CacheEntry>> {
        let Some(entry) = self.store.get::<CacheEntry>(CACHE, key)? else {
            return Ok(None);
        };
        if !entry.is_expired(self.clock.now()) {
            return Ok(Some(entry));
        }

        let _guard = self.write_lock.lock();
        let current = self.store.get::<CacheEntry>(CACHE, key)?;
        if current.as_ref().map(|c| c.version) == Some(entry.version) {
            self.store.delete(CACHE, key)?;
            debug!(key, "evicted expired cache entry");
            return Ok(None);
        }
        // Rewritten since the first read.
        Ok(current.filter(|c| !c.is_expired(self.clock.now())))
    }

    pub(crate) fn invalidate(&self, key: &str) -> EngineResult<bool> {
        let _guard = self.write_lock.lock();
        self.store.delete(CACHE, key)
    }

    /// Deletes every expired row. Returns how many were removed.
    pub(crate) fn clear_expired(&self) -> EngineResult<usize> {
        let _guard = self.write_lock.lock();
        let now = self.clock.now();
        let mut removed = 0;
        for (key, entry) in self.store.all::<CacheEntry>(CACHE)? {
            if entry.is_expired(now) {
                self.store.delete(CACHE, &key)?;
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, "cleared expired cache entries");
        }
        Ok(removed)
    }

    pub(crate) fn clear(&self) -> EngineResult<usize> {
        let _guard = self.write_lock.lock();
        self.store.clear(CACHE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::StorageConfig;
    use serde_json::json;

    fn cache() -> (CacheManager, Arc<ManualClock>, Arc<EngineStore>) {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(EngineStore::open(&StorageConfig::memory_only()));
        let cache = CacheManager::open(Arc::clone(&store), clock.clone()).unwrap();
        (cache, clock, store)
    }

    #[test]
    fn hit_then_expire() {
        let (cache, clock, store) = cache();
        cache.put("k", json!({"v": 1}), Duration::from_secs(1)).unwrap();
        assert_eq!(cache.get("k").unwrap(), Some(json!({"v": 1})));

        clock.advance(Duration::from_secs(1));
        assert!(cache.get("k").unwrap().is_some());

        clock.advance(Duration::from_millis(1));
        assert_eq!(cache.get("k").unwrap(), None);
        assert!(store.get::<CacheEntry>(CACHE, "k").unwrap().is_none());
    }

    #[test]
    fn versions_increase() {
        let (cache, _, _) = cache();
        let a = cache.put("k", json!(1), Duration::from_secs(60)).unwrap();
        let b = cache.put("k", json!(2), Duration::from_secs(60)).unwrap();
        assert!(b.version > a.version);
        assert_eq!(cache.get("k").unwrap(), Some(json!(2)));
    }

    #[test]
    fn version_seeded_from_store() {
        let (cache, clock, store) = cache();
        let last = cache.put("k", json!(1), Duration::from_secs(60)).unwrap();

        let reopened = CacheManager::open(store, clock).unwrap();
        let next = reopened.put("j", json!(2), Duration::from_secs(60)).unwrap();
        assert!(next.version > last.version);
    }

    #[test]
    fn clear_expired_counts() {
        let (cache, clock, _) = cache();
        cache.put("short", json!(1), Duration::from_secs(1)).unwrap();
        cache.put("long", json!(2), Duration::from_secs(100)).unwrap();

        clock.advance(Duration::from_secs(5));
        assert_eq!(cache.clear_expired().unwrap(), 1);
        assert_eq!(cache.get("long").unwrap(), Some(json!(2)));
        assert_eq!(cache.clear_expired().unwrap(), 0);
    }

    #[test]
    fn invalidate_and_clear() {
        let (cache, _, _) = cache();
        cache.put("a", json!(1), Duration::from_secs(60)).unwrap();
        cache.put("b", json!(2), Duration::from_secs(60)).unwrap();

        assert!(cache.invalidate("a").unwrap());
        assert!(!cache.invalidate("a").unwrap());
        assert_eq!(cache.clear().unwrap(), 1);
        assert_eq!(cache.get("b").unwrap(), None);
    }
}
