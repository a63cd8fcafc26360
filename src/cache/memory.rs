//! In-process cache backend.

use std::{
    collections::HashMap,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde_json::Value;
use tokio::{sync::RwLock, time::Instant};

use super::{Cache, CacheKey, CacheResult, CachedItem, duration_millis};
use crate::middleware::BoxFuture;

/// Entry limit used by [`MemoryCache::new`].
pub const DEFAULT_MAX_ENTRIES: usize = 100_000;

/// How often a write sweeps out every expired entry.
const SWEEP_PERIOD: Duration = Duration::from_secs(60);

struct Entry {
    item: Value,
    stored: u64,
    ttl: Duration,
    // `None` when `stored + ttl` overflows the clock: never expires.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

struct Store {
    entries: HashMap<CacheKey, Entry>,
    last_sweep: Instant,
}

impl Store {
    fn sweep(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        self.last_sweep = now;
        before - self.entries.len()
    }

    // Drops the live entry closest to expiry. Entries that never expire go last.
    fn evict_one(&mut self) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| (entry.expires_at.is_none(), entry.expires_at))
            .map(|(key, _)| key.clone());
        if let Some(key) = victim {
            self.entries.remove(&key);
            tracing::debug!(key = %key, "cache full, evicted entry");
        }
    }
}

/// Non-persistent, single-node [`Cache`] backed by a `HashMap`.
///
/// Expired entries are dropped when looked up, and writes sweep all of them
/// out once a minute or whenever the cache is full. A full cache that is still
/// full after the sweep evicts the entry closest to expiry, so it never holds
/// more than its entry limit. Expiry uses the Tokio clock, so tests running
/// with a paused clock can step past a ttl deterministically.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use rttp_caching::cache::{Cache, CacheKey, MemoryCache};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), rttp_caching::cache::CacheError> {
/// let cache = MemoryCache::new();
/// let key = CacheKey::new("one", "app");
///
/// cache.set(key.clone(), serde_json::json!({ "one": true }), Duration::from_secs(1)).await?;
/// let hit = cache.get(&key).await?.expect("entry is live");
/// assert_eq!(hit.item["one"], true);
/// assert_eq!(hit.ttl, 1000);
/// # Ok(())
/// # }
/// ```
pub struct MemoryCache {
    store: RwLock<Store>,
    max_entries: usize,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }

    /// Creates a cache holding at most `max_entries` entries (at least one).
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            store: RwLock::new(Store {
                entries: HashMap::new(),
                last_sweep: Instant::now(),
            }),
            max_entries: max_entries.max(1),
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub async fn len(&self) -> usize {
        self.store.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.read().await.entries.is_empty()
    }

    pub async fn clear(&self) {
        self.store.write().await.entries.clear();
    }

    /// Drops every expired entry, returning how many were removed.
    pub async fn purge_expired(&self) -> usize {
        self.store.write().await.sweep(Instant::now())
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(duration_millis)
        .unwrap_or_default()
}

impl Cache for MemoryCache {
    fn get<'a>(&'a self, key: &'a CacheKey) -> BoxFuture<'a, CacheResult<Option<CachedItem>>> {
        Box::pin(async move {
            let now = Instant::now();
            {
                let store = self.store.read().await;
                match store.entries.get(key) {
                    None => return Ok(None),
                    Some(entry) if !entry.is_expired(now) => {
                        return Ok(Some(CachedItem {
                            item: entry.item.clone(),
                            stored: entry.stored,
                            ttl: duration_millis(entry.ttl),
                        }));
                    }
                    Some(_) => {}
                }
            }

            // Re-check under the write lock: a concurrent `set` may have refreshed it.
            let mut store = self.store.write().await;
            if store.entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
                store.entries.remove(key);
                tracing::trace!(key = %key, "evicted expired cache entry");
            }
            Ok(None)
        })
    }

    fn set<'a>(
        &'a self,
        key: CacheKey,
        value: Value,
        ttl: Duration,
    ) -> BoxFuture<'a, CacheResult<()>> {
        Box::pin(async move {
            let now = Instant::now();
            let entry = Entry {
                item: value,
                stored: unix_millis(),
                ttl,
                expires_at: now.checked_add(ttl),
            };

            let mut store = self.store.write().await;
            let full = store.entries.len() >= self.max_entries;
            if full || now.duration_since(store.last_sweep) >= SWEEP_PERIOD {
                let swept = store.sweep(now);
                if swept > 0 {
                    tracing::trace!(swept, "swept expired cache entries");
                }
            }
            if !store.entries.contains_key(&key) && store.entries.len() >= self.max_entries {
                store.evict_one();
            }
            store.entries.insert(key, entry);
            Ok(())
        })
    }

    fn delete<'a>(&'a self, key: &'a CacheKey) -> BoxFuture<'a, CacheResult<()>> {
        Box::pin(async move {
            self.store.write().await.entries.remove(key);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(id: &str) -> CacheKey {
        CacheKey::new(id, "test")
    }

    #[tokio::test]
    async fn miss_on_unknown_key() {
        let cache = MemoryCache::new();
        assert!(cache.get(&key("nope")).await.unwrap().is_none());
        assert!(!cache.has(&key("nope")).await.unwrap());
    }

    #[tokio::test]
    async fn segments_are_isolated() {
        let cache = MemoryCache::new();
        cache
            .set(CacheKey::new("id", "a"), json!(true), Duration::from_secs(60))
            .await
            .unwrap();
        assert!(cache.has(&CacheKey::new("id", "a")).await.unwrap());
        assert!(!cache.has(&CacheKey::new("id", "b")).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn entry_expires_after_ttl() {
        let cache = MemoryCache::new();
        cache
            .set(key("etag"), json!(true), Duration::from_millis(50))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_millis(49)).await;
        assert!(cache.get(&key("etag")).await.unwrap().is_some());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(cache.get(&key("etag")).await.unwrap().is_none());
        // lazily evicted by the lookup
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn set_refreshes_ttl() {
        let cache = MemoryCache::new();
        cache
            .set(key("etag"), json!(true), Duration::from_millis(100))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_millis(80)).await;
        cache
            .set(key("etag"), json!(true), Duration::from_millis(100))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_millis(80)).await;
        assert!(cache.has(&key("etag")).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_only_expired() {
        let cache = MemoryCache::new();
        cache
            .set(key("short"), json!(1), Duration::from_millis(10))
            .await
            .unwrap();
        cache
            .set(key("long"), json!(2), Duration::from_secs(10))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_millis(20)).await;

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.purge_expired().await, 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn writes_sweep_entries_whose_ttl_ran_out() {
        let cache = MemoryCache::new();
        for i in 0..1_000 {
            cache
                .set(key(&format!("etag-{i}")), json!(true), Duration::from_millis(10))
                .await
                .unwrap();
        }
        assert_eq!(cache.len().await, 1_000);

        tokio::time::advance(Duration::from_secs(60 * 60)).await;
        cache
            .set(key("fresh"), json!(true), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(cache.len().await, 1);
        assert!(cache.has(&key("fresh")).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn full_cache_sweeps_before_growing() {
        let cache = MemoryCache::with_max_entries(3);
        for id in ["a", "b", "c"] {
            cache
                .set(key(id), json!(true), Duration::from_millis(10))
                .await
                .unwrap();
        }
        tokio::time::advance(Duration::from_millis(20)).await;

        cache
            .set(key("d"), json!(true), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn full_cache_evicts_soonest_expiring() {
        let cache = MemoryCache::with_max_entries(2);
        cache
            .set(key("short"), json!(1), Duration::from_secs(10))
            .await
            .unwrap();
        cache
            .set(key("long"), json!(2), Duration::from_secs(60))
            .await
            .unwrap();
        cache
            .set(key("new"), json!(3), Duration::from_secs(30))
            .await
            .unwrap();

        assert_eq!(cache.len().await, 2);
        assert!(!cache.has(&key("short")).await.unwrap());
        assert!(cache.has(&key("long")).await.unwrap());
        assert!(cache.has(&key("new")).await.unwrap());
    }

    #[tokio::test]
    async fn overwrite_at_capacity_keeps_other_entries() {
        let cache = MemoryCache::with_max_entries(2);
        for id in ["a", "b", "a"] {
            cache
                .set(key(id), json!(id), Duration::from_secs(60))
                .await
                .unwrap();
        }
        assert_eq!(cache.len().await, 2);
        assert!(cache.has(&key("b")).await.unwrap());
    }

    #[tokio::test]
    async fn delete_and_clear() {
        let cache = MemoryCache::new();
        cache
            .set(key("a"), json!("x"), Duration::from_secs(1))
            .await
            .unwrap();
        cache
            .set(key("b"), json!("y"), Duration::from_secs(1))
            .await
            .unwrap();
        cache.delete(&key("a")).await.unwrap();
        assert!(!cache.has(&key("a")).await.unwrap());
        cache.clear().await;
        assert!(cache.is_empty().await);
    }
}
