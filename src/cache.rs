//! Memoization Layer, spec.md §4.7.
//!
//! Two implementations behind one `MemoCache` trait, per the Design Notes'
//! "the canonical semantics is the Redis-backed one; a simpler in-memory
//! implementation is a legitimate fallback". `RedisMemoCache` is selected
//! when `REDIS_URL` is configured; otherwise `InMemoryMemoCache` (`moka`,
//! the same crate the `abiolaogu-SASE-SDWAN` sibling example uses for this
//! exact TTL'd-async-cache shape) is used.
//!
//! `MemoCache` itself stores raw `serde_json::Value` + age so it stays
//! object-safe (`Arc<dyn MemoCache>`); the generic, type-checked
//! get-or-compute-with-stale-while-revalidate logic lives in the free
//! function `memoize` built on top of it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Error;

/// A snapshot of hit/miss/key counters, exposed for observability.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub total_keys: u64,
}

/// Derives a stable cache key from a resource type and id by hashing with
/// `sha2::Sha256` (the same crate used for ETag derivation in `http.rs`).
pub fn cache_key(resource_type: &str, resource_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(resource_type.as_bytes());
    hasher.update(b":");
    hasher.update(resource_id.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A raw cache entry: its JSON value and how long ago it was stored.
pub struct RawEntry {
    pub value: serde_json::Value,
    pub age: Duration,
}

#[async_trait]
pub trait MemoCache: Send + Sync {
    async fn get_raw(&self, key: &str) -> Result<Option<RawEntry>, Error>;

    /// `ttl` here is the *storage* lifetime (including stale-grace), not
    /// the freshness TTL `memoize` reasons about -- backends expire the
    /// key outright once this elapses.
    async fn set_raw(&self, key: &str, value: serde_json::Value, ttl: Duration) -> Result<(), Error>;

    async fn invalidate(&self, resource_type: &str, resource_id: &str);

    fn stats(&self) -> CacheStats;
}

/// How long a stale entry may still be served while a refresh runs in the
/// background.
const STALE_GRACE: Duration = Duration::from_secs(60);
const REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetch `key` from `cache`, computing and storing via `compute` on a
/// miss. A hit younger than `ttl` is returned as-is. A hit older than `ttl`
/// but within `ttl + STALE_GRACE` is returned immediately while `compute`
/// re-runs detached in the background (stale-while-revalidate, spec.md
/// §4.7 / Design Notes). Entries older than that are treated as a miss.
pub async fn memoize<T, F, Fut>(
    cache: Arc<dyn MemoCache>,
    key: &str,
    ttl: Duration,
    compute: F,
) -> Result<T, Error>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<T, Error>> + Send + 'static,
{
    if let Some(entry) = cache.get_raw(key).await? {
        let value: T = serde_json::from_value(entry.value).map_err(|e| Error::Other(e.into()))?;

        if entry.age <= ttl {
            return Ok(value);
        }
        if entry.age <= ttl + STALE_GRACE {
            spawn_refresh(cache.clone(), key.to_string(), ttl, compute);
            return Ok(value);
        }
    }

    let fresh = compute().await?;
    let json = serde_json::to_value(&fresh).map_err(|e| Error::Other(e.into()))?;
    cache.set_raw(key, json, ttl + STALE_GRACE).await?;
    Ok(fresh)
}

fn spawn_refresh<T, F, Fut>(cache: Arc<dyn MemoCache>, key: String, ttl: Duration, compute: F)
where
    T: Serialize + Send + Sync + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<T, Error>> + Send + 'static,
{
    // Detached: a slow refresh must not hold up (or be cancelled by) the
    // request that triggered it, per spec.md §5's "long-running background
    // tasks" guidance.
    tokio::spawn(async move {
        match tokio::time::timeout(REFRESH_TIMEOUT, compute()).await {
            Ok(Ok(fresh)) => {
                if let Ok(json) = serde_json::to_value(&fresh) {
                    let _ = cache.set_raw(&key, json, ttl + STALE_GRACE).await;
                }
            }
            Ok(Err(e)) => tracing::warn!(key, error = %e, "background cache refresh failed"),
            Err(_) => tracing::warn!(key, "background cache refresh timed out"),
        }
    });
}

// ---------------------------------------------------------------------
// In-memory fallback
// ---------------------------------------------------------------------

struct StoredEntry {
    value: serde_json::Value,
    stored_at: std::time::Instant,
}

pub struct InMemoryMemoCache {
    inner: moka::future::Cache<String, Arc<StoredEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl InMemoryMemoCache {
    pub fn new(max_capacity: u64) -> InMemoryMemoCache {
        InMemoryMemoCache {
            inner: moka::future::Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(STALE_GRACE * 10)
                .build(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl MemoCache for InMemoryMemoCache {
    async fn get_raw(&self, key: &str) -> Result<Option<RawEntry>, Error> {
        match self.inner.get(key).await {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(RawEntry {
                    value: entry.value.clone(),
                    age: entry.stored_at.elapsed(),
                }))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn set_raw(&self, key: &str, value: serde_json::Value, _ttl: Duration) -> Result<(), Error> {
        self.inner
            .insert(
                key.to_string(),
                Arc::new(StoredEntry {
                    value,
                    stored_at: std::time::Instant::now(),
                }),
            )
            .await;
        Ok(())
    }

    async fn invalidate(&self, resource_type: &str, resource_id: &str) {
        self.inner.invalidate(&cache_key(resource_type, resource_id)).await;
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            total_keys: self.inner.entry_count(),
        }
    }
}

// ---------------------------------------------------------------------
// Redis-backed canonical implementation
// ---------------------------------------------------------------------

#[derive(serde::Serialize, serde::Deserialize)]
struct StoredValue {
    value: serde_json::Value,
    stored_at_unix_secs: u64,
}

pub struct RedisMemoCache {
    conn: redis::aio::ConnectionManager,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl RedisMemoCache {
    pub async fn connect(redis_url: &str) -> Result<RedisMemoCache, Error> {
        let client = redis::Client::open(redis_url).map_err(|e| Error::Other(e.into()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| Error::Other(e.into()))?;
        Ok(RedisMemoCache {
            conn,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    fn now_unix() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

#[async_trait]
impl MemoCache for RedisMemoCache {
    async fn get_raw(&self, key: &str) -> Result<Option<RawEntry>, Error> {
        use redis::AsyncCommands;

        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await.map_err(|e| Error::Other(e.into()))?;

        match raw {
            Some(raw) => {
                let stored: StoredValue =
                    serde_json::from_str(&raw).map_err(|e| Error::Other(e.into()))?;
                self.hits.fetch_add(1, Ordering::Relaxed);
                let age = Duration::from_secs(
                    Self::now_unix().saturating_sub(stored.stored_at_unix_secs),
                );
                Ok(Some(RawEntry {
                    value: stored.value,
                    age,
                }))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn set_raw(&self, key: &str, value: serde_json::Value, ttl: Duration) -> Result<(), Error> {
        use redis::AsyncCommands;
        let stored = StoredValue {
            value,
            stored_at_unix_secs: Self::now_unix(),
        };
        let serialized = serde_json::to_string(&stored).map_err(|e| Error::Other(e.into()))?;
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(key, serialized, ttl.as_secs())
            .await
            .map_err(|e| Error::Other(e.into()))?;
        Ok(())
    }

    async fn invalidate(&self, resource_type: &str, resource_id: &str) {
        use redis::AsyncCommands;
        let key = cache_key(resource_type, resource_id);
        let mut conn = self.conn.clone();
        let _: Result<(), _> = conn.del(key).await;
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            // Redis has no cheap O(1) key count scoped to our namespace.
            total_keys: 0,
        }
    }
}

/// Build the configured cache backend: Redis when `redis_url` is set,
/// otherwise the in-memory fallback.
pub async fn build(redis_url: Option<&str>) -> Result<Arc<dyn MemoCache>, Error> {
    match redis_url {
        Some(url) => Ok(Arc::new(RedisMemoCache::connect(url).await?)),
        None => Ok(Arc::new(InMemoryMemoCache::new(10_000))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_stable_for_same_input() {
        assert_eq!(cache_key("asn", "AS2914"), cache_key("asn", "AS2914"));
    }

    #[test]
    fn cache_key_differs_by_resource_type() {
        assert_ne!(cache_key("asn", "2914"), cache_key("prefix", "2914"));
    }

    #[tokio::test]
    async fn memoize_computes_on_miss_and_hits_after() {
        let cache: Arc<dyn MemoCache> = Arc::new(InMemoryMemoCache::new(100));
        let calls = Arc::new(AtomicU64::new(0));

        let calls2 = calls.clone();
        let value: u32 = memoize(cache.clone(), "k1", Duration::from_secs(60), move || {
            let calls = calls2.clone();
            async move {
                calls.fetch_add(1, Ordering::Relaxed);
                Ok(42u32)
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 42);

        let calls3 = calls.clone();
        let value2: u32 = memoize(cache.clone(), "k1", Duration::from_secs(60), move || {
            let calls = calls3.clone();
            async move {
                calls.fetch_add(1, Ordering::Relaxed);
                Ok(43u32)
            }
        })
        .await
        .unwrap();
        assert_eq!(value2, 42);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn memoize_stats_track_hits_and_misses() {
        let cache: Arc<dyn MemoCache> = Arc::new(InMemoryMemoCache::new(100));
        let _: u32 = memoize(cache.clone(), "k2", Duration::from_secs(60), || async { Ok(1u32) })
            .await
            .unwrap();
        let _: u32 = memoize(cache.clone(), "k2", Duration::from_secs(60), || async { Ok(2u32) })
            .await
            .unwrap();
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn invalidate_forces_recompute() {
        let cache: Arc<dyn MemoCache> = Arc::new(InMemoryMemoCache::new(100));
        let key = cache_key("asn", "AS2914");
        let _: u32 = memoize(cache.clone(), &key, Duration::from_secs(60), || async { Ok(1u32) })
            .await
            .unwrap();
        cache.invalidate("asn", "AS2914").await;
        let value: u32 = memoize(cache.clone(), &key, Duration::from_secs(60), || async { Ok(2u32) })
            .await
            .unwrap();
        assert_eq!(value, 2);
    }
}
