use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::time::{Duration, Instant};

/// Front-side cache for composite root lookups. Entries are hints: a miss is always resolved
/// against the backend, and absent roots are never cached.
pub trait LookupCache: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: String, ttl: Duration);

    fn delete(&self, key: &str);

    fn clear(&self);

    /// Returns the statistics gathered since the previous call and starts over.
    fn take_stats(&self) -> CacheStats;
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CacheStats {
    pub lookups: u64,
    pub hits: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            self.hits as f64 / self.lookups as f64
        }
    }
}

/// A bounded in-process cache with per-entry time to live.
pub struct TtlCache {
    capacity: usize,
    entries: Mutex<HashMap<String, CacheEntry>>,
    lookups: AtomicU64,
    hits: AtomicU64,
}

struct CacheEntry {
    value: String,
    expires_at: Instant,
}

impl TtlCache {
    pub fn new(capacity: usize) -> TtlCache {
        TtlCache {
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
            lookups: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LookupCache for TtlCache {
    fn get(&self, key: &str) -> Option<String> {
        self.lookups.fetch_add(1, Ordering::Relaxed);

        let mut entries = self.lock();
        let now = Instant::now();

        match entries.get(key) {
            Some(entry) if entry.expires_at > now => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: &str, value: String, ttl: Duration) {
        let mut entries = self.lock();
        let now = Instant::now();

        if entries.len() >= self.capacity && !entries.contains_key(key) {
            entries.retain(|_, entry| entry.expires_at > now);
        }
        if entries.len() >= self.capacity && !entries.contains_key(key) {
            // Evict whatever would have expired first.
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.expires_at)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }

        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: now + ttl,
            },
        );
    }

    fn delete(&self, key: &str) {
        self.lock().remove(key);
    }

    fn clear(&self) {
        self.lock().clear();
    }

    fn take_stats(&self) -> CacheStats {
        CacheStats {
            lookups: self.lookups.swap(0, Ordering::Relaxed),
            hits: self.hits.swap(0, Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time;

    #[tokio::test]
    async fn get_set_delete() {
        let cache = TtlCache::new(10);

        assert_eq!(cache.get("a"), None);
        cache.set("a", "a_token".to_string(), Duration::from_secs(60));
        assert_eq!(cache.get("a"), Some("a_token".to_string()));

        cache.delete("a");
        assert_eq!(cache.get("a"), None);

        cache.set("b", "b_token".to_string(), Duration::from_secs(60));
        cache.set("c", "c_token".to_string(), Duration::from_secs(60));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn entries_expire() {
        time::pause();

        let cache = TtlCache::new(10);
        cache.set("a", "a_token".to_string(), Duration::from_secs(5));

        time::advance(Duration::from_secs(5)).await;

        assert_eq!(cache.get("a"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn capacity_is_bounded() {
        let cache = TtlCache::new(2);

        cache.set("a", "1".to_string(), Duration::from_secs(10));
        cache.set("b", "2".to_string(), Duration::from_secs(20));
        cache.set("c", "3".to_string(), Duration::from_secs(30));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("c"), Some("3".to_string()));
    }

    #[tokio::test]
    async fn stats_are_reset_when_taken() {
        let cache = TtlCache::new(10);
        cache.set("a", "1".to_string(), Duration::from_secs(10));

        cache.get("a");
        cache.get("a");
        cache.get("b");
        cache.get("c");

        let stats = cache.take_stats();
        assert_eq!(stats, CacheStats { lookups: 4, hits: 2 });
        assert_eq!(stats.hit_rate(), 0.5);
        assert_eq!(cache.take_stats(), CacheStats::default());
    }
}
