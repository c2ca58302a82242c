//! In-process cache backend over a concurrent map.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use time::OffsetDateTime;

use crate::entry::CacheEntry;
use crate::error::CacheResult;
use crate::store::RawStore;

/// In-memory backend using `DashMap`.
///
/// Clones share the same map, so a single instance built at startup can be
/// handed to every consumer in the process. Nothing survives a restart:
/// [`RawStore::shutdown`] clears the map.
///
/// `put_raw_if_absent` serializes through one instance-wide mutex. The map
/// makes single reads and writes safe on its own, but "read the current
/// entry, decide, then write" must not interleave with another caller doing
/// the same. Code holding that mutex never calls back into the store.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<DashMap<String, CacheEntry<String>>>,
    insert_lock: Arc<Mutex<()>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[async_trait]
impl RawStore for InMemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get_raw(&self, key: &str) -> CacheResult<Option<CacheEntry<String>>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn put_raw(&self, key: &str, entry: CacheEntry<String>) -> CacheResult<()> {
        let previous = self.entries.insert(key.to_string(), entry);
        tracing::debug!(key = %key, replaced = previous.is_some(), "memory cache put");
        Ok(())
    }

    async fn put_raw_if_absent(&self, key: &str, entry: CacheEntry<String>) -> CacheResult<bool> {
        let _guard = self.insert_lock.lock();

        let present = self
            .entries
            .get(key)
            .is_some_and(|existing| !existing.is_expired_at(entry.created_at));
        if present {
            tracing::warn!(
                key = %key,
                "failed to put the cache, the key is already present"
            );
            return Ok(false);
        }

        self.entries.insert(key.to_string(), entry);
        Ok(true)
    }

    async fn delete_raw(&self, key: &str) -> CacheResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn evict_expired_raw(&self, key: &str, now: OffsetDateTime) -> CacheResult<bool> {
        Ok(self
            .entries
            .remove_if(key, |_, entry| entry.is_expired_at(now))
            .is_some())
    }

    async fn keys(&self) -> CacheResult<Vec<String>> {
        Ok(self.entries.iter().map(|entry| entry.key().clone()).collect())
    }

    fn len(&self) -> Option<usize> {
        Some(self.entries.len())
    }

    async fn shutdown(&self) -> CacheResult<()> {
        let cleared = self.entries.len();
        self.clear();
        tracing::debug!(cleared, "memory cache cleared");
        Ok(())
    }
}
