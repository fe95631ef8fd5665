//! In-memory TTL cache for scrape results.
//!
//! Entries are checked against their deadline on every read, so an expired
//! value is never served even if the background sweep has not run yet. The
//! sweep only reclaims memory.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use threadscope_core::{Handle, Post, Profile};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Cache key for a profile.
pub fn profile_key(handle: &Handle) -> String {
    format!("profile:{handle}")
}

/// Cache key for a post list of a given size.
pub fn posts_key(handle: &Handle, limit: u32) -> String {
    format!("posts:{handle}:{limit}")
}

/// A value stored by the scraper facade.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Profile(Profile),
    Posts(Vec<Post>),
}

/// Cache counters reported by the health endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub keys: usize,
    pub hits: u64,
    pub misses: u64,
    pub ttl_secs: u64,
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Keyed store whose entries expire a fixed time after insertion.
pub struct TtlCache<V> {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A live value for `key`. Expired entries are removed and count as a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.entries();
        let value = match entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        };
        drop(entries);

        let counter = if value.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        value
    }

    /// Store `value` under `key`, replacing any previous entry.
    pub fn insert(&self, key: impl Into<String>, value: V) {
        let expires_at = Instant::now() + self.ttl;
        self.entries()
            .insert(key.into(), Entry { value, expires_at });
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.entries().remove(key).map(|entry| entry.value)
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    /// Drop everything and reset the counters.
    pub fn clear(&self) {
        self.entries().clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            keys: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            ttl_secs: self.ttl.as_secs(),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> TtlCache<V> {
    /// Sweep on a fixed interval until the cache is dropped.
    ///
    /// The task holds only a weak reference, so it never keeps the cache alive.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        let period = interval.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let removed = cache.sweep();
                if removed > 0 {
                    tracing::debug!(removed, remaining = cache.len(), "Cache sweep");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys() {
        let handle = Handle::parse("@alice").expect("valid handle");
        assert_eq!(profile_key(&handle), "profile:alice");
        assert_eq!(posts_key(&handle, 30), "posts:alice:30");
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_within_ttl_and_after_expiry() {
        let cache = TtlCache::new(Duration::from_secs(300));
        cache.insert("k", 1);

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(cache.get("k"), Some(1));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert_eq!(stats.ttl_secs, 300);
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_overwrites_and_refreshes() {
        let cache = TtlCache::new(Duration::from_secs(10));
        cache.insert("k", "old");
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.insert("k", "new");
        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(cache.get("k"), Some("new"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_expired() {
        let cache = TtlCache::new(Duration::from_secs(10));
        cache.insert("a", 1);
        tokio::time::advance(Duration::from_secs(6)).await;
        cache.insert("b", 2);
        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("b"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweeper() {
        let cache = Arc::new(TtlCache::new(Duration::from_secs(5)));
        let sweeper = cache.spawn_sweeper(Duration::from_secs(60));
        cache.insert("a", 1);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(cache.len(), 0);

        drop(cache);
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(sweeper.is_finished());
    }

    #[tokio::test]
    async fn test_clear_resets_everything() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("a", 1);
        let _ = cache.get("a");
        let _ = cache.get("missing");
        cache.clear();
        assert_eq!(
            cache.stats(),
            CacheStats {
                keys: 0,
                hits: 0,
                misses: 0,
                ttl_secs: 60,
            }
        );
    }
}
