//! Networked cache backend over Redis.
//!
//! Entries are stored as their JSON encoding. Entries with a TTL are also
//! given a native Redis expiry of the same length (`PX`), so Redis drops
//! stale keys on its own and no sweeper is needed. `put_raw_if_absent` is
//! a single `SET ... NX PX ...` command, which Redis executes atomically for
//! every instance sharing the server.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Connection, Pool};
use redis::AsyncCommands;

use crate::entry::CacheEntry;
use crate::error::{CacheError, CacheResult};
use crate::store::RawStore;

const BACKEND: &str = "redis";

fn unavailable(e: impl std::fmt::Display) -> CacheError {
    CacheError::backend_unavailable(BACKEND, e.to_string())
}

/// Connection settings for [`RedisStore::connect`].
#[derive(Debug, Clone)]
pub struct RedisOptions {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
    /// Connection pool size
    pub pool_size: usize,
    /// Wait/create/recycle timeout for pooled connections
    pub timeout: Duration,
    /// Prepended to every cache key
    pub key_prefix: String,
}

impl Default for RedisOptions {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: 10,
            timeout: Duration::from_millis(5000),
            key_prefix: String::new(),
        }
    }
}

/// Redis-backed cache store using a `deadpool-redis` connection pool.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
    key_prefix: String,
}

impl RedisStore {
    /// Wrap an existing pool.
    pub fn new(pool: Pool, key_prefix: impl Into<String>) -> Self {
        Self {
            pool,
            key_prefix: key_prefix.into(),
        }
    }

    /// Build a pool from `options` and verify a connection can be obtained.
    pub async fn connect(options: &RedisOptions) -> CacheResult<Self> {
        tracing::info!(url = %redact(&options.url), "connecting to Redis");

        let mut redis_config = deadpool_redis::Config::from_url(&options.url);
        if let Some(ref mut pool_config) = redis_config.pool {
            pool_config.max_size = options.pool_size;
            pool_config.timeouts.wait = Some(options.timeout);
            pool_config.timeouts.create = Some(options.timeout);
            pool_config.timeouts.recycle = Some(options.timeout);
        }

        let pool = redis_config
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .map_err(unavailable)?;

        let store = Self::new(pool, options.key_prefix.clone());
        store.connection().await?;
        tracing::info!("connected to Redis successfully");
        Ok(store)
    }

    /// Check if Redis is reachable (for health checks).
    pub async fn is_available(&self) -> bool {
        self.pool.get().await.is_ok()
    }

    async fn connection(&self) -> CacheResult<Connection> {
        self.pool.get().await.map_err(|e| {
            tracing::warn!(error = %e, "failed to get Redis connection");
            unavailable(e)
        })
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    fn encode(key: &str, entry: &CacheEntry<String>) -> CacheResult<String> {
        serde_json::to_string(entry).map_err(|e| CacheError::serialization(key, e.to_string()))
    }

    /// Native expiry in milliseconds, or `None` for entries that never expire.
    fn expiry_millis(entry: &CacheEntry<String>) -> Option<u64> {
        entry
            .remaining_ttl(entry.created_at)
            .map(|ttl| u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1))
    }
}

#[async_trait]
impl RawStore for RedisStore {
    fn name(&self) -> &'static str {
        BACKEND
    }

    async fn get_raw(&self, key: &str) -> CacheResult<Option<CacheEntry<String>>> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.get(self.full_key(key)).await.map_err(|e| {
            tracing::warn!(key = %key, error = %e, "Redis GET error");
            unavailable(e)
        })?;

        raw.map(|raw| {
            serde_json::from_str(&raw).map_err(|e| CacheError::serialization(key, e.to_string()))
        })
        .transpose()
    }

    async fn put_raw(&self, key: &str, entry: CacheEntry<String>) -> CacheResult<()> {
        let value = Self::encode(key, &entry)?;
        let full_key = self.full_key(key);
        let mut conn = self.connection().await?;

        let result = match Self::expiry_millis(&entry) {
            Some(millis) => conn.pset_ex::<_, _, ()>(&full_key, value, millis).await,
            None => conn.set::<_, _, ()>(&full_key, value).await,
        };
        result.map_err(|e| {
            tracing::warn!(key = %key, error = %e, "Redis SET error");
            unavailable(e)
        })?;

        tracing::debug!(key = %key, "redis cache put");
        Ok(())
    }

    async fn put_raw_if_absent(&self, key: &str, entry: CacheEntry<String>) -> CacheResult<bool> {
        let value = Self::encode(key, &entry)?;
        let mut conn = self.connection().await?;

        let mut cmd = redis::cmd("SET");
        cmd.arg(self.full_key(key)).arg(value).arg("NX");
        if let Some(millis) = Self::expiry_millis(&entry) {
            cmd.arg("PX").arg(millis);
        }

        let reply: Option<String> = cmd.query_async(&mut conn).await.map_err(|e| {
            tracing::warn!(key = %key, error = %e, "Redis SET NX error");
            unavailable(e)
        })?;

        let inserted = reply.is_some();
        if !inserted {
            tracing::warn!(
                key = %key,
                "failed to put the cache, the key is already present"
            );
        }
        Ok(inserted)
    }

    async fn delete_raw(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(self.full_key(key)).await.map_err(|e| {
            tracing::warn!(key = %key, error = %e, "Redis DEL error");
            unavailable(e)
        })
    }
}

/// Hide the password part of a Redis URL before logging it.
fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    #[test]
    fn test_expiry_millis() {
        let now = OffsetDateTime::now_utc();

        let forever = CacheEntry::new("v".to_string(), now, None).unwrap();
        assert_eq!(RedisStore::expiry_millis(&forever), None);

        let five_secs = CacheEntry::new("v".to_string(), now, Some(Duration::from_secs(5))).unwrap();
        assert_eq!(RedisStore::expiry_millis(&five_secs), Some(5000));

        let tiny = CacheEntry::new("v".to_string(), now, Some(Duration::from_micros(10))).unwrap();
        assert_eq!(RedisStore::expiry_millis(&tiny), Some(1));
    }

    #[test]
    fn test_redact() {
        assert_eq!(
            redact("redis://:secret@localhost:6379"),
            "redis://***@localhost:6379"
        );
        assert_eq!(redact("redis://localhost:6379"), "redis://localhost:6379");
    }

    #[test]
    fn test_default_options() {
        let options = RedisOptions::default();
        assert_eq!(options.url, "redis://localhost:6379");
        assert_eq!(options.pool_size, 10);
        assert_eq!(options.timeout, Duration::from_millis(5000));
        assert!(options.key_prefix.is_empty());
    }
}
