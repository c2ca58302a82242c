//! Cache bootstrap.
//!
//! Picks the configured backend once at startup, wraps it in a shared
//! [`CacheStore`] and starts the sweeper for backends that need one.

use std::sync::Arc;

use quire_cache::{
    BackendKind, CacheBackend, CacheError, CacheStore, InMemoryStore, LevelStore, RedisStore,
    SweeperHandle, spawn_sweeper,
};

use crate::config::{AppConfig, RedisSettings};

/// The cache store shared by every service.
pub type SharedCache = Arc<CacheStore<CacheBackend>>;

/// Owner of the running cache: the shared store plus its sweeper.
pub struct CacheHandle {
    store: SharedCache,
    sweeper: Option<SweeperHandle>,
}

impl CacheHandle {
    /// The shared store, to hand out to consumers.
    pub fn store(&self) -> &SharedCache {
        &self.store
    }

    /// Backend actually in use (may differ from config after a fallback).
    pub fn kind(&self) -> BackendKind {
        self.store.backend().kind()
    }

    pub fn has_sweeper(&self) -> bool {
        self.sweeper.is_some()
    }

    /// Stop the sweeper, then release the backend.
    pub async fn shutdown(mut self) -> Result<(), CacheError> {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.stop().await;
        }
        self.store.shutdown().await
    }
}

/// Create the cache store based on configuration.
///
/// ## Backends
///
/// - **memory**: process-local map, swept periodically
/// - **level**: embedded on-disk store at `level.path`, swept periodically
/// - **redis**: shared server; keys expire natively, no sweeper
///
/// ## Graceful Degradation
///
/// If Redis cannot be reached and `redis.fallback_to_memory` is set, the
/// memory store is used instead so the server can still start.
pub async fn create_cache_store(config: &AppConfig) -> Result<CacheHandle, CacheError> {
    let kind = config.cache.backend_kind()?;

    let backend: CacheBackend = match kind {
        BackendKind::Memory => InMemoryStore::new().into(),
        BackendKind::Level => {
            LevelStore::open(&config.level.path, config.level.map_size_mb)?.into()
        }
        BackendKind::Redis => connect_redis(&config.redis).await?,
    };

    let store = Arc::new(CacheStore::new(backend));
    let sweeper = store
        .backend()
        .needs_sweeper()
        .then(|| spawn_sweeper(store.clone(), config.cache.sweep_interval()));

    tracing::info!(
        configured = %kind,
        backend = %store.backend().kind(),
        sweeper = sweeper.is_some(),
        "cache store ready"
    );

    Ok(CacheHandle { store, sweeper })
}

async fn connect_redis(settings: &RedisSettings) -> Result<CacheBackend, CacheError> {
    let options = settings.options().map_err(CacheError::invalid_argument)?;

    match RedisStore::connect(&options).await {
        Ok(store) => Ok(store.into()),
        Err(e) if settings.fallback_to_memory => {
            tracing::warn!(
                error = %e,
                "Failed to connect to Redis. Falling back to memory cache."
            );
            Ok(InMemoryStore::new().into())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_memory_backend_starts_sweeper() {
        let handle = create_cache_store(&AppConfig::default()).await.unwrap();
        assert_eq!(handle.kind(), BackendKind::Memory);
        assert!(handle.has_sweeper());

        let store = handle.store().clone();
        store.put("k", "v", None).await.unwrap();

        handle.shutdown().await.unwrap();
        assert_eq!(store.stats().size, Some(0));
    }

    #[tokio::test]
    async fn test_level_backend_persists_across_handles() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.cache.backend = "level".into();
        config.level.path = dir.path().join("cache");
        config.level.map_size_mb = 10;

        let handle = create_cache_store(&config).await.unwrap();
        assert_eq!(handle.kind(), BackendKind::Level);
        handle
            .store()
            .put("k", "v", Some(Duration::from_secs(600)))
            .await
            .unwrap();
        handle.shutdown().await.unwrap();

        let reopened = create_cache_store(&config).await.unwrap();
        assert_eq!(
            reopened.store().get("k").await.unwrap().as_deref(),
            Some("v")
        );
        reopened.shutdown().await.unwrap();
    }

    fn unreachable_redis(fallback: bool) -> AppConfig {
        let mut config = AppConfig::default();
        config.cache.backend = "redis".into();
        config.redis.url = "redis://127.0.0.1:1".into();
        config.redis.timeout_ms = 200;
        config.redis.fallback_to_memory = fallback;
        config
    }

    #[tokio::test]
    async fn test_unreachable_redis_falls_back_to_memory() {
        let handle = create_cache_store(&unreachable_redis(true)).await.unwrap();
        assert_eq!(handle.kind(), BackendKind::Memory);
        assert!(handle.has_sweeper());
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_redis_without_fallback_fails() {
        let err = create_cache_store(&unreachable_redis(false))
            .await
            .err()
            .expect("startup should fail");
        assert!(err.is_backend_unavailable());
    }

    #[tokio::test]
    async fn test_unknown_backend_fails() {
        let mut config = AppConfig::default();
        config.cache.backend = "memcached".into();
        let err = create_cache_store(&config).await.err().expect("should fail");
        assert!(err.is_invalid_argument());
    }
}
