//! TTL'd request→response cache keyed by `hash(url)` (C2).
//!
//! Split out as its own component, separate from the optimizer that composes
//! it. A cryptographic digest buys nothing for a cache key that's never
//! compared across processes, so this uses `DefaultHasher` instead of pulling
//! in an `md5`/`sha2` dependency.

use crate::clock::{Clock, MonotonicClock};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct Entry<V> {
    value: V,
    inserted_at_millis: u64,
}

/// Generic TTL'd cache keyed by the URL's hash, shared by [`super::optimizer::ConnectionPoolOptimizer`].
pub struct TokenCache<V: Clone + Send + Sync> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<u64, Entry<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone + Send + Sync> TokenCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, clock: Arc::new(MonotonicClock::default()), entries: Mutex::new(HashMap::new()), hits: AtomicU64::new(0), misses: AtomicU64::new(0) }
    }

    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    fn hash_key(url: &str) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        url.hash(&mut hasher);
        hasher.finish()
    }

    /// Returns the cached value for `url` if present and not yet expired.
    pub fn get(&self, url: &str) -> Option<V> {
        let key = Self::hash_key(url);
        let now = self.clock.now_millis();
        let entries = self.entries.lock().expect("token cache mutex poisoned");
        match entries.get(&key) {
            Some(entry) if now.saturating_sub(entry.inserted_at_millis) < self.ttl.as_millis() as u64 => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn put(&self, url: &str, value: V) {
        let key = Self::hash_key(url);
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock().expect("token cache mutex poisoned");
        entries.insert(key, Entry { value, inserted_at_millis: now });
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Percentage of lookups that were hits; `0.0` when nothing has been looked up yet.
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64 as TestAtomicU64;

    #[derive(Debug, Clone)]
    struct ManualClock {
        now: Arc<TestAtomicU64>,
    }
    impl ManualClock {
        fn new() -> Self {
            Self { now: Arc::new(TestAtomicU64::new(0)) }
        }
        fn advance(&self, millis: u64) {
            self.now.fetch_add(millis, Ordering::SeqCst);
        }
    }
    impl Clock for ManualClock {
        fn now_millis(&self) -> u64 {
            self.now.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn miss_then_hit_after_put() {
        let cache: TokenCache<String> = TokenCache::new(Duration::from_secs(60));
        assert!(cache.get("https://example.com/a").is_none());
        cache.put("https://example.com/a", "cached".to_string());
        assert_eq!(cache.get("https://example.com/a").unwrap(), "cached");
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn entry_expires_after_ttl() {
        let clock = ManualClock::new();
        let cache: TokenCache<String> = TokenCache::new(Duration::from_secs(1)).with_clock(clock.clone());
        cache.put("https://example.com/a", "v".to_string());
        clock.advance(1_001);
        assert!(cache.get("https://example.com/a").is_none());
    }

    #[test]
    fn distinct_urls_hash_to_distinct_keys() {
        let cache: TokenCache<u32> = TokenCache::new(Duration::from_secs(60));
        cache.put("https://a.example.com", 1);
        cache.put("https://b.example.com", 2);
        assert_eq!(cache.get("https://a.example.com"), Some(1));
        assert_eq!(cache.get("https://b.example.com"), Some(2));
    }

    #[test]
    fn hit_ratio_is_percentage() {
        let cache: TokenCache<u32> = TokenCache::new(Duration::from_secs(60));
        cache.put("u", 1);
        cache.get("u");
        cache.get("u");
        cache.get("missing");
        assert!((cache.hit_ratio() - (2.0 / 3.0 * 100.0)).abs() < 1e-9);
    }
}
