//! The cache store contract.
//!
//! [`RawStore`] is what a backend implements: a handful of primitives that
//! move whole [`CacheEntry`] values in and out of the storage medium.
//! [`CacheStore`] layers everything else on top exactly once (argument
//! validation, entry construction, lazy eviction, typed accessors and
//! statistics) so every backend observes identical expiry semantics.
//!
//! ## Expiry
//!
//! Expiry is lazy. A stale entry stays physically present until the next
//! `get` of its key (or a sweep, see [`crate::sweeper`]) notices it, treats
//! it as absent and removes it. `put_if_absent` applies the same liveness
//! check before deciding whether a key is free.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;

use crate::clock::{Clock, SystemClock};
use crate::entry::CacheEntry;
use crate::error::{CacheError, CacheResult};

/// Storage primitives implemented by each cache backend.
///
/// Backends never decide expiry on their own; they only store and return
/// entries. The one exception is [`RawStore::put_raw_if_absent`], which must
/// treat an existing entry that is expired at `entry.created_at` as absent
/// and must perform its check-then-insert as one indivisible step.
#[async_trait]
pub trait RawStore: Send + Sync {
    /// Short backend name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Fetch the stored entry, live or not.
    async fn get_raw(&self, key: &str) -> CacheResult<Option<CacheEntry<String>>>;

    /// Unconditionally store `entry` under `key`.
    async fn put_raw(&self, key: &str, entry: CacheEntry<String>) -> CacheResult<()>;

    /// Store `entry` only if no live entry exists for `key`.
    ///
    /// Returns `true` if the entry was stored.
    async fn put_raw_if_absent(&self, key: &str, entry: CacheEntry<String>) -> CacheResult<bool>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn delete_raw(&self, key: &str) -> CacheResult<()>;

    /// Remove `key` only if its current entry is expired at `now`.
    ///
    /// Returns `true` if something was removed. The default re-reads the
    /// entry and deletes it; backends that can check and remove atomically
    /// should override this so a fresh entry written concurrently is never
    /// evicted by mistake.
    async fn evict_expired_raw(&self, key: &str, now: OffsetDateTime) -> CacheResult<bool> {
        match self.get_raw(key).await? {
            Some(entry) if entry.is_expired_at(now) => {
                self.delete_raw(key).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Keys currently stored, used by the sweeper.
    ///
    /// Default implementation returns nothing (for backends like Redis
    /// that expire keys natively).
    async fn keys(&self) -> CacheResult<Vec<String>> {
        Ok(Vec::new())
    }

    /// Number of physically stored entries, if the backend can tell cheaply.
    fn len(&self) -> Option<usize> {
        None
    }

    /// Release backend resources on shutdown.
    async fn shutdown(&self) -> CacheResult<()> {
        Ok(())
    }
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries physically stored, when known.
    pub size: Option<usize>,
    /// Number of reads that returned a live value.
    pub hits: u64,
    /// Number of reads that found nothing (including stale entries).
    pub misses: u64,
    /// Number of stale entries removed on read or sweep.
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

/// A string-valued key/value cache with TTL semantics over any [`RawStore`].
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use quire_cache::{CacheResult, CacheStore, InMemoryStore};
///
/// # async fn demo() -> CacheResult<()> {
/// let cache = CacheStore::new(InMemoryStore::new());
/// cache.put("code", "482913", Some(Duration::from_secs(300))).await?;
/// assert_eq!(cache.get("code").await?.as_deref(), Some("482913"));
/// # Ok(())
/// # }
/// ```
pub struct CacheStore<S> {
    backend: S,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<S: RawStore> CacheStore<S> {
    /// Create a store over `backend` using wall-clock time.
    pub fn new(backend: S) -> Self {
        Self::with_clock(backend, Arc::new(SystemClock))
    }

    /// Create a store over `backend` with an explicit time source.
    pub fn with_clock(backend: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// The backend this store delegates to.
    pub fn backend(&self) -> &S {
        &self.backend
    }

    /// Current time according to the store's clock.
    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    /// Get the live value for `key`.
    ///
    /// A stale entry is reported as absent and removed as a side effect.
    pub async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let key = validate_key(key)?;
        let now = self.clock.now();

        match self.backend.get_raw(key).await? {
            Some(entry) if entry.is_expired_at(now) => {
                tracing::warn!(key = %key, "cache key has expired");
                if self.backend.evict_expired_raw(key, now).await? {
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                }
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(entry.data))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    /// Store `value` under `key`, replacing any existing entry.
    ///
    /// `ttl` of `None` or zero stores a value that never expires. A `ttl`
    /// reaching past the representable date range is rejected.
    pub async fn put(
        &self,
        key: &str,
        value: impl Into<String>,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let key = validate_key(key)?;
        let entry = CacheEntry::new(value.into(), self.clock.now(), ttl)?;
        self.backend.put_raw(key, entry).await?;
        tracing::debug!(key = %key, ttl_ms = ?ttl.map(|ttl| ttl.as_millis()), "cache put");
        Ok(())
    }

    /// Store `value` only if `key` has no live entry.
    ///
    /// Returns `true` if the value was stored, `false` if a live entry was
    /// already present. This is atomic with respect to other callers on the
    /// same backend.
    pub async fn put_if_absent(
        &self,
        key: &str,
        value: impl Into<String>,
        ttl: Option<Duration>,
    ) -> CacheResult<bool> {
        let key = validate_key(key)?;
        let entry = CacheEntry::new(value.into(), self.clock.now(), ttl)?;
        let inserted = self.backend.put_raw_if_absent(key, entry).await?;
        if inserted {
            tracing::debug!(key = %key, "cache put if absent succeeded");
        } else {
            tracing::debug!(key = %key, "cache key already present, put if absent skipped");
        }
        Ok(inserted)
    }

    /// Remove `key`. Deleting an absent key is a no-op.
    pub async fn delete(&self, key: &str) -> CacheResult<()> {
        let key = validate_key(key)?;
        self.backend.delete_raw(key).await?;
        tracing::debug!(key = %key, "cache key removed");
        Ok(())
    }

    /// Get the value for `key` decoded from JSON into `T`.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        match self.get(key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| CacheError::serialization(key, e.to_string())),
            None => Ok(None),
        }
    }

    /// Store `value` encoded as JSON.
    ///
    /// Values that encode to JSON `null` are rejected.
    pub async fn put_as<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let raw = encode_value(key, value)?;
        self.put(key, raw, ttl).await
    }

    /// JSON-encoding counterpart of [`CacheStore::put_if_absent`].
    pub async fn put_if_absent_as<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> CacheResult<bool> {
        let raw = encode_value(key, value)?;
        self.put_if_absent(key, raw, ttl).await
    }

    /// Force the read-time expiry check on every stored key.
    ///
    /// Returns the number of stale entries removed. Keys that vanish or are
    /// rewritten while the sweep runs are left alone.
    pub async fn sweep(&self) -> CacheResult<usize> {
        let keys = self.backend.keys().await?;
        let mut removed = 0;

        for key in keys {
            let now = self.clock.now();
            let Some(entry) = self.backend.get_raw(&key).await? else {
                continue;
            };
            if entry.is_expired_at(now) && self.backend.evict_expired_raw(&key, now).await? {
                tracing::debug!(key = %key, "deleted the cache for expiration");
                removed += 1;
            }
        }

        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        }

        Ok(removed)
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.backend.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Release backend resources.
    pub async fn shutdown(&self) -> CacheResult<()> {
        tracing::info!(backend = self.backend.name(), "shutting down cache store");
        self.backend.shutdown().await
    }
}

fn validate_key(key: &str) -> CacheResult<&str> {
    if key.trim().is_empty() {
        return Err(CacheError::invalid_argument("Cache key must not be blank"));
    }
    Ok(key)
}

fn encode_value<T: Serialize + ?Sized>(key: &str, value: &T) -> CacheResult<String> {
    let json =
        serde_json::to_value(value).map_err(|e| CacheError::serialization(key, e.to_string()))?;
    if json.is_null() {
        return Err(CacheError::invalid_argument("Cache value must not be null"));
    }
    Ok(json.to_string())
}
