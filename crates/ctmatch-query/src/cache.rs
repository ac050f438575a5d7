//! Read-through cache for trial-search responses.
//!
//! The query client only calls `get` and `set`, keyed by the exact request
//! body it is about to send. Key derivation beyond that, expiry, and eviction
//! are up to the implementation.
//!
//! - [`MemoryQueryCache`]: in-memory DashMap with a per-entry TTL, swept on
//!   capacity and by an optional background task
//! - [`NoopQueryCache`]: never hits, discards stores

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use ctmatch_core::TrialResponse;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default upper bound on cached responses.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Cache for trial-search responses, keyed by request body.
#[async_trait]
pub trait QueryCache: Send + Sync {
    /// Get the cached response for `key`, or `None` on a miss.
    async fn get(&self, key: &str) -> Option<Vec<TrialResponse>>;

    /// Store the response for `key`.
    async fn set(&self, key: String, value: Vec<TrialResponse>);

    /// Get cache statistics for monitoring.
    fn stats(&self) -> CacheStats {
        CacheStats::default()
    }
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries currently in the cache.
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    /// Number of entries dropped because their TTL ran out.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

struct CachedEntry {
    trials: Arc<Vec<TrialResponse>>,
    expires_at: Instant,
}

/// In-memory response cache with TTL-based expiry.
///
/// Expired entries are removed on read, when a store finds the cache at
/// capacity, and by the task from [`MemoryQueryCache::spawn_cleanup`].
/// Safe to share across concurrent requests.
pub struct MemoryQueryCache {
    cache: DashMap<String, CachedEntry>,
    ttl: Duration,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl MemoryQueryCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_max_entries(ttl, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_max_entries(ttl: Duration, max_entries: usize) -> Self {
        Self {
            cache: DashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Remove expired entries, returning how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        self.cache.retain(|_, entry| {
            if entry.expires_at <= now {
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        }

        removed
    }

    /// Run `cleanup_expired` every `period` until the cache is dropped.
    pub fn spawn_cleanup(cache: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(cache);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else {
                    break;
                };
                let removed = cache.cleanup_expired();
                if removed > 0 {
                    debug!(removed, remaining = cache.len(), "Expired cached responses removed");
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[async_trait]
impl QueryCache for MemoryQueryCache {
    async fn get(&self, key: &str) -> Option<Vec<TrialResponse>> {
        let now = Instant::now();

        if let Some(entry) = self.cache.get(key) {
            if entry.expires_at > now {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.trials.as_ref().clone());
            }
            drop(entry);
            if self
                .cache
                .remove_if(key, |_, entry| entry.expires_at <= now)
                .is_some()
            {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    async fn set(&self, key: String, value: Vec<TrialResponse>) {
        if self.cache.len() >= self.max_entries && !self.cache.contains_key(&key) {
            self.cleanup_expired();
            if self.cache.len() >= self.max_entries {
                warn!(max_entries = self.max_entries, "Query cache at capacity, skipping store");
                return;
            }
        }
        let entry = CachedEntry {
            trials: Arc::new(value),
            expires_at: Instant::now() + self.ttl,
        };
        self.cache.insert(key, entry);
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.cache.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Cache used when caching is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopQueryCache;

#[async_trait]
impl QueryCache for NoopQueryCache {
    async fn get(&self, _key: &str) -> Option<Vec<TrialResponse>> {
        None
    }

    async fn set(&self, _key: String, _value: Vec<TrialResponse>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trial(id: &str) -> TrialResponse {
        TrialResponse {
            trial_id: Some(id.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = MemoryQueryCache::new(Duration::from_secs(60));
        cache.set("body".into(), vec![trial("NCT1")]).await;

        let cached = cache.get("body").await.unwrap();
        assert_eq!(cached, vec![trial("NCT1")]);
        assert!(cache.get("other").await.is_none());

        let stats = cache.stats();
        assert_eq!(stats.size, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate(), 50.0);
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let cache = MemoryQueryCache::new(Duration::from_millis(10));
        cache.set("body".into(), vec![trial("NCT1")]).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(cache.get("body").await.is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let cache = MemoryQueryCache::new(Duration::from_millis(10));
        cache.set("a".into(), vec![]).await;
        cache.set("b".into(), vec![]).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(cache.cleanup_expired(), 2);
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn test_store_at_capacity_sweeps_expired() {
        let cache = MemoryQueryCache::with_max_entries(Duration::from_millis(5), 100);
        for i in 0..100 {
            cache.set(format!("body-{i}"), vec![]).await;
        }
        assert_eq!(cache.len(), 100);
        tokio::time::sleep(Duration::from_millis(30)).await;

        cache.set("fresh".into(), vec![trial("NCT1")]).await;
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().evictions, 100);
        assert!(cache.get("fresh").await.is_some());
    }

    #[tokio::test]
    async fn test_store_at_capacity_keeps_live_entries() {
        let cache = MemoryQueryCache::with_max_entries(Duration::from_secs(60), 2);
        cache.set("a".into(), vec![]).await;
        cache.set("b".into(), vec![]).await;
        cache.set("c".into(), vec![]).await;
        assert_eq!(cache.len(), 2);
        assert!(cache.get("c").await.is_none());

        // Refreshing an existing key is always allowed.
        cache.set("a".into(), vec![trial("NCT1")]).await;
        assert_eq!(cache.get("a").await, Some(vec![trial("NCT1")]));
    }

    #[tokio::test]
    async fn test_background_cleanup() {
        let cache = Arc::new(MemoryQueryCache::new(Duration::from_millis(5)));
        let task = MemoryQueryCache::spawn_cleanup(&cache, Duration::from_millis(10));
        for i in 0..1000 {
            cache.set(format!("body-{i}"), vec![]).await;
        }
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cache.len(), 0);

        drop(cache);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        let cache = Arc::new(MemoryQueryCache::new(Duration::from_secs(60)));
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move {
                    let key = format!("body-{}", i % 4);
                    cache.set(key.clone(), vec![trial("NCT1")]).await;
                    cache.get(&key).await
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().is_some());
        }
        assert_eq!(cache.len(), 4);
    }

    #[tokio::test]
    async fn test_noop_cache_never_hits() {
        let cache = NoopQueryCache;
        cache.set("body".into(), vec![trial("NCT1")]).await;
        assert!(cache.get("body").await.is_none());
        assert_eq!(cache.stats(), CacheStats::default());
    }
}
