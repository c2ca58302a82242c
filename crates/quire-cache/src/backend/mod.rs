//! Cache backend implementations.
//!
//! ## Backends
//!
//! - **Memory**: process-local `DashMap`, lost on restart
//! - **Level**: embedded LMDB file, survives restarts of a single instance
//! - **Redis**: networked store shared by every instance
//!
//! The backend is chosen once at startup; [`CacheBackend`] then dispatches
//! each primitive to the selected variant.

pub mod level;
pub mod memory;
pub mod redis;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::entry::CacheEntry;
use crate::error::{CacheError, CacheResult};
use crate::store::RawStore;

pub use level::LevelStore;
pub use memory::InMemoryStore;
pub use self::redis::{RedisOptions, RedisStore};

/// Backend selector as it appears in configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Memory,
    Level,
    Redis,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Level => "level",
            Self::Redis => "redis",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "level" => Ok(Self::Level),
            "redis" => Ok(Self::Redis),
            other => Err(CacheError::invalid_argument(format!(
                "unknown cache backend '{other}', expected one of memory, level, redis"
            ))),
        }
    }
}

/// The configured cache backend.
#[derive(Clone)]
pub enum CacheBackend {
    /// Single-instance: local DashMap only
    Memory(InMemoryStore),

    /// Single-instance, persisted to disk
    Level(LevelStore),

    /// Multi-instance: shared Redis server
    Redis(RedisStore),
}

impl CacheBackend {
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Memory(_) => BackendKind::Memory,
            Self::Level(_) => BackendKind::Level,
            Self::Redis(_) => BackendKind::Redis,
        }
    }

    /// Whether this backend relies on the periodic sweeper to reclaim stale entries.
    pub fn needs_sweeper(&self) -> bool {
        !matches!(self, Self::Redis(_))
    }

    fn inner(&self) -> &dyn RawStore {
        match self {
            Self::Memory(store) => store,
            Self::Level(store) => store,
            Self::Redis(store) => store,
        }
    }
}

impl From<InMemoryStore> for CacheBackend {
    fn from(store: InMemoryStore) -> Self {
        Self::Memory(store)
    }
}

impl From<LevelStore> for CacheBackend {
    fn from(store: LevelStore) -> Self {
        Self::Level(store)
    }
}

impl From<RedisStore> for CacheBackend {
    fn from(store: RedisStore) -> Self {
        Self::Redis(store)
    }
}

#[async_trait]
impl RawStore for CacheBackend {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    async fn get_raw(&self, key: &str) -> CacheResult<Option<CacheEntry<String>>> {
        self.inner().get_raw(key).await
    }

    async fn put_raw(&self, key: &str, entry: CacheEntry<String>) -> CacheResult<()> {
        self.inner().put_raw(key, entry).await
    }

    async fn put_raw_if_absent(&self, key: &str, entry: CacheEntry<String>) -> CacheResult<bool> {
        self.inner().put_raw_if_absent(key, entry).await
    }

    async fn delete_raw(&self, key: &str) -> CacheResult<()> {
        self.inner().delete_raw(key).await
    }

    async fn evict_expired_raw(&self, key: &str, now: OffsetDateTime) -> CacheResult<bool> {
        self.inner().evict_expired_raw(key, now).await
    }

    async fn keys(&self) -> CacheResult<Vec<String>> {
        self.inner().keys().await
    }

    fn len(&self) -> Option<usize> {
        self.inner().len()
    }

    async fn shutdown(&self) -> CacheResult<()> {
        self.inner().shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CacheStore;
    use std::time::Duration;

    #[test]
    fn test_backend_kind_parsing() {
        assert_eq!("memory".parse::<BackendKind>().unwrap(), BackendKind::Memory);
        assert_eq!(" Level ".parse::<BackendKind>().unwrap(), BackendKind::Level);
        assert_eq!("REDIS".parse::<BackendKind>().unwrap(), BackendKind::Redis);

        let err = "memcached".parse::<BackendKind>().unwrap_err();
        assert!(err.is_invalid_argument());
        assert_eq!(BackendKind::default(), BackendKind::Memory);
        assert_eq!(BackendKind::Level.to_string(), "level");
    }

    #[tokio::test]
    async fn test_enum_dispatch_to_memory() {
        let backend = CacheBackend::from(InMemoryStore::new());
        assert_eq!(backend.kind(), BackendKind::Memory);
        assert_eq!(backend.name(), "memory");
        assert!(backend.needs_sweeper());

        let cache = CacheStore::new(backend);
        assert!(
            cache
                .put_if_absent("k", "v", Some(Duration::from_secs(5)))
                .await
                .unwrap()
        );
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(cache.stats().size, Some(1));
    }

    #[tokio::test]
    async fn test_enum_dispatch_to_level() {
        let dir = tempfile::TempDir::new().unwrap();
        let backend = CacheBackend::from(LevelStore::open(dir.path(), 10).unwrap());
        assert_eq!(backend.kind(), BackendKind::Level);

        let cache = CacheStore::new(backend);
        cache.put("k", "v", None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }
}
