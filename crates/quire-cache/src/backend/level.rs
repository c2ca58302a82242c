//! Embedded on-disk cache backend.
//!
//! Uses the heed crate (Rust bindings for LMDB) as a memory-mapped
//! key/value file. Each entry is stored as its JSON encoding under the raw
//! cache key.
//!
//! # Thread Safety
//!
//! LMDB serializes write transactions, so `put_raw_if_absent` reads the
//! current entry and writes the new one inside a single write transaction,
//! which makes the check-then-insert atomic for every handle opened on the
//! same environment.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};
use time::OffsetDateTime;

use crate::entry::CacheEntry;
use crate::error::{CacheError, CacheResult};
use crate::store::RawStore;

const BACKEND: &str = "level";

fn unavailable(e: impl std::fmt::Display) -> CacheError {
    CacheError::backend_unavailable(BACKEND, e.to_string())
}

/// LMDB-backed cache store.
#[derive(Clone)]
pub struct LevelStore {
    env: Env,
    db: Database<Str, Bytes>,
    path: PathBuf,
}

impl LevelStore {
    /// Open (or create) the store in `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where the LMDB files are kept
    /// * `max_size_mb` - Maximum size of the memory map in megabytes
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `max_size_mb` does not fit in a byte
    /// count, and `BackendUnavailable` if the directory cannot be created or
    /// the environment cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> CacheResult<Self> {
        let map_size = max_size_mb.checked_mul(1024 * 1024).ok_or_else(|| {
            CacheError::invalid_argument(format!("map size of {max_size_mb} MB is too large"))
        })?;
        let path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&path).map_err(unavailable)?;

        // SAFETY: the environment is opened once per store and the files are
        // not truncated or remapped by anything else while it is open.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(1)
                .open(&path)
        }
        .map_err(unavailable)?;

        let mut wtxn = env.write_txn().map_err(unavailable)?;
        let db: Database<Str, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(unavailable)?;
        wtxn.commit().map_err(unavailable)?;

        tracing::info!(path = %path.display(), max_size_mb, "opened level cache store");

        Ok(Self { env, db, path })
    }

    /// Directory holding the LMDB files.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn decode(key: &str, bytes: &[u8]) -> CacheResult<CacheEntry<String>> {
        serde_json::from_slice(bytes).map_err(|e| CacheError::serialization(key, e.to_string()))
    }

    fn encode(key: &str, entry: &CacheEntry<String>) -> CacheResult<Vec<u8>> {
        serde_json::to_vec(entry).map_err(|e| CacheError::serialization(key, e.to_string()))
    }
}

#[async_trait]
impl RawStore for LevelStore {
    fn name(&self) -> &'static str {
        BACKEND
    }

    async fn get_raw(&self, key: &str) -> CacheResult<Option<CacheEntry<String>>> {
        let rtxn = self.env.read_txn().map_err(unavailable)?;
        match self.db.get(&rtxn, key).map_err(unavailable)? {
            Some(bytes) => Self::decode(key, bytes).map(Some),
            None => Ok(None),
        }
    }

    async fn put_raw(&self, key: &str, entry: CacheEntry<String>) -> CacheResult<()> {
        let bytes = Self::encode(key, &entry)?;

        let mut wtxn = self.env.write_txn().map_err(unavailable)?;
        self.db.put(&mut wtxn, key, &bytes).map_err(unavailable)?;
        wtxn.commit().map_err(unavailable)?;

        tracing::debug!(key = %key, "level cache put");
        Ok(())
    }

    async fn put_raw_if_absent(&self, key: &str, entry: CacheEntry<String>) -> CacheResult<bool> {
        let bytes = Self::encode(key, &entry)?;

        let mut wtxn = self.env.write_txn().map_err(unavailable)?;
        let present = match self.db.get(&wtxn, key).map_err(unavailable)? {
            // An undecodable entry is garbage, not a live lock.
            Some(existing) => Self::decode(key, existing)
                .map(|existing| !existing.is_expired_at(entry.created_at))
                .unwrap_or(false),
            None => false,
        };

        if present {
            wtxn.abort();
            tracing::warn!(
                key = %key,
                "failed to put the cache, the key is already present"
            );
            return Ok(false);
        }

        self.db.put(&mut wtxn, key, &bytes).map_err(unavailable)?;
        wtxn.commit().map_err(unavailable)?;
        Ok(true)
    }

    async fn delete_raw(&self, key: &str) -> CacheResult<()> {
        let mut wtxn = self.env.write_txn().map_err(unavailable)?;
        self.db.delete(&mut wtxn, key).map_err(unavailable)?;
        wtxn.commit().map_err(unavailable)?;
        Ok(())
    }

    async fn evict_expired_raw(&self, key: &str, now: OffsetDateTime) -> CacheResult<bool> {
        let mut wtxn = self.env.write_txn().map_err(unavailable)?;
        let expired = match self.db.get(&wtxn, key).map_err(unavailable)? {
            Some(bytes) => Self::decode(key, bytes)
                .map(|entry| entry.is_expired_at(now))
                .unwrap_or(true),
            None => false,
        };

        if !expired {
            wtxn.abort();
            return Ok(false);
        }

        let deleted = self.db.delete(&mut wtxn, key).map_err(unavailable)?;
        wtxn.commit().map_err(unavailable)?;
        Ok(deleted)
    }

    async fn keys(&self) -> CacheResult<Vec<String>> {
        let rtxn = self.env.read_txn().map_err(unavailable)?;
        let mut keys = Vec::new();
        for result in self.db.iter(&rtxn).map_err(unavailable)? {
            let (key, _) = result.map_err(unavailable)?;
            keys.push(key.to_string());
        }
        Ok(keys)
    }

    fn len(&self) -> Option<usize> {
        let rtxn = self.env.read_txn().ok()?;
        self.db
            .len(&rtxn)
            .ok()
            .and_then(|len| usize::try_from(len).ok())
    }

    async fn shutdown(&self) -> CacheResult<()> {
        self.env.force_sync().map_err(unavailable)?;
        tracing::debug!(path = %self.path.display(), "level cache flushed");
        Ok(())
    }
}
