//! Quire cache layer.
//!
//! A string-valued key/value store with TTL semantics over interchangeable
//! backends, plus a lock built on the store's atomic put-if-absent.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────────────────┐
//! │  CacheLock   │──▶│ CacheStore<S>                │
//! └──────────────┘   │  validation, expiry, typing  │
//!                    └──────────────┬───────────────┘
//!                                   │ RawStore
//!            ┌──────────────────────┼──────────────────────┐
//!            ▼                      ▼                      ▼
//!     InMemoryStore            LevelStore             RedisStore
//!     (DashMap)                (LMDB)                 (deadpool-redis)
//! ```
//!
//! Backends implement only the [`RawStore`] primitives. [`CacheStore`] adds
//! everything else once, so expiry behaves identically on every backend.
//! Memory and level stores rely on [`spawn_sweeper`] to reclaim idle stale
//! entries; Redis expires keys natively.

pub mod backend;
pub mod clock;
pub mod entry;
pub mod error;
pub mod lock;
pub mod store;
pub mod sweeper;

pub use backend::{
    BackendKind, CacheBackend, InMemoryStore, LevelStore, RedisOptions, RedisStore,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::CacheEntry;
pub use error::{CacheError, CacheResult, ErrorCategory};
pub use lock::{CacheLock, Guarded, LOCK_MARKER, LockError, LockParams, TraceMode};
pub use store::{CacheStats, CacheStore, RawStore};
pub use sweeper::{DEFAULT_SWEEP_INTERVAL, SweeperHandle, spawn_sweeper};
