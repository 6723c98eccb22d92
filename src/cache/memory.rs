use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

use super::core::Cache;
use crate::error::CacheError;

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// In-process [`Cache`] bounded by an LRU policy.
///
/// A zero TTL stores the entry without expiry. When the cache is full the
/// least recently used key is evicted, which for dedup means a very old
/// message id may be processed again.
pub struct MemoryCache {
    entries: Mutex<LruCache<String, Entry>>,
    unavailable: AtomicBool,
}

impl MemoryCache {
    pub const DEFAULT_CAPACITY: usize = 100_000;

    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// Cache holding at most `capacity` keys (minimum 1).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Simulate a backend outage: every operation fails while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored entries, including expired ones not yet reclaimed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<(), CacheError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError("memory cache marked unavailable".to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.check_available()?;
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let expired = match entries.get(key) {
            Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        Ok(None)
    }

    fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CacheError> {
        self.check_available()?;
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if entries.get(key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }
        let expires_at = if ttl.is_zero() {
            None
        } else {
            now.checked_add(ttl)
        };
        entries.put(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_set_if_absent_only_once() {
        let cache = MemoryCache::new();
        assert!(cache.set_if_absent("k", "a", Duration::from_secs(60)).unwrap());
        assert!(!cache.set_if_absent("k", "b", Duration::from_secs(60)).unwrap());
        assert_eq!(cache.get("k").unwrap().as_deref(), Some("a"));
    }

    #[test]
    fn test_expired_entry_is_replaced() {
        let cache = MemoryCache::new();
        assert!(cache.set_if_absent("k", "a", Duration::from_millis(20)).unwrap());
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(cache.get("k").unwrap(), None);
        assert!(cache.set_if_absent("k", "b", Duration::from_millis(20)).unwrap());
        assert_eq!(cache.get("k").unwrap().as_deref(), Some("b"));
    }

    #[test]
    fn test_zero_ttl_never_expires() {
        let cache = MemoryCache::new();
        assert!(cache.set_if_absent("k", "a", Duration::ZERO).unwrap());
        std::thread::sleep(Duration::from_millis(5));
        assert!(!cache.set_if_absent("k", "b", Duration::ZERO).unwrap());
    }

    #[test]
    fn test_capacity_evicts_least_recent() {
        let cache = MemoryCache::with_capacity(2);
        let ttl = Duration::from_secs(60);
        cache.set_if_absent("a", "1", ttl).unwrap();
        cache.set_if_absent("b", "2", ttl).unwrap();
        cache.set_if_absent("c", "3", ttl).unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a").unwrap(), None);
    }

    #[test]
    fn test_unavailable_backend_errors() {
        let cache = MemoryCache::new();
        cache.set_unavailable(true);
        assert!(cache.get("k").is_err());
        assert!(cache.set_if_absent("k", "v", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_concurrent_set_if_absent_single_winner() {
        let cache = Arc::new(MemoryCache::new());
        let winners = Arc::new(AtomicUsize::new(0));
        let threads: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                let winners = Arc::clone(&winners);
                std::thread::spawn(move || {
                    if cache
                        .set_if_absent("mid:1", &i.to_string(), Duration::from_secs(60))
                        .unwrap()
                    {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }
}
