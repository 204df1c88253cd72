//! Time-bounded cache of memory-search results.
//!
//! Memory content changes far less often than conversation cadence, so
//! the cached lookup path used during context building tolerates up to
//! `ttl` of staleness. Expired entries are purged lazily after each
//! write, never by a background timer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use super::RetrievalKey;

/// Default staleness bound for cached search results.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);

struct CacheEntry {
    texts: Vec<String>,
    inserted_at: Instant,
}

/// TTL cache keyed by `(owner, query, limit)`.
///
/// Cloning shares the underlying map; the cache is bounded by the
/// distinct keys seen within a TTL window.
#[derive(Clone)]
pub struct RetrievalCache {
    ttl: Duration,
    entries: Arc<DashMap<RetrievalKey, CacheEntry>>,
}

impl RetrievalCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Arc::new(DashMap::new()),
        }
    }

    /// A fresh-enough cached value, or `None` on miss/expiry.
    ///
    /// Expired entries are left in place for the next write-time sweep.
    pub fn get(&self, key: &RetrievalKey) -> Option<Vec<String>> {
        let entry = self.entries.get(key)?;
        if entry.inserted_at.elapsed() < self.ttl {
            Some(entry.texts.clone())
        } else {
            None
        }
    }

    /// Insert a value, then sweep expired entries.
    pub fn insert(&self, key: RetrievalKey, texts: Vec<String>) {
        self.entries.insert(
            key,
            CacheEntry {
                texts,
                inserted_at: Instant::now(),
            },
        );
        self.sweep();
    }

    fn sweep(&self) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| entry.inserted_at.elapsed() < ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for RetrievalCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(query: &str) -> RetrievalKey {
        RetrievalKey {
            owner_id: "u1".to_string(),
            query: query.to_string(),
            limit: 5,
        }
    }

    #[test]
    fn hit_within_ttl() {
        let cache = RetrievalCache::new(Duration::from_secs(60));
        cache.insert(key("q"), vec!["memory".to_string()]);
        assert_eq!(cache.get(&key("q")), Some(vec!["memory".to_string()]));
    }

    #[test]
    fn miss_on_distinct_key() {
        let cache = RetrievalCache::new(Duration::from_secs(60));
        cache.insert(key("q"), vec!["memory".to_string()]);
        assert!(cache.get(&key("other")).is_none());

        let other_owner = RetrievalKey {
            owner_id: "u2".to_string(),
            query: "q".to_string(),
            limit: 5,
        };
        assert!(cache.get(&other_owner).is_none());
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let cache = RetrievalCache::new(Duration::from_millis(10));
        cache.insert(key("q"), vec!["memory".to_string()]);
        std::thread::sleep(Duration::from_millis(25));
        assert!(cache.get(&key("q")).is_none());
    }

    #[test]
    fn write_sweeps_expired_entries() {
        let cache = RetrievalCache::new(Duration::from_millis(10));
        cache.insert(key("old"), vec!["stale".to_string()]);
        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(cache.len(), 1);

        cache.insert(key("new"), vec!["fresh".to_string()]);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key("new")).is_some());
    }
}
