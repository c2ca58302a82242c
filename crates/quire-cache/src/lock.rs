//! Cache-backed method lock.
//!
//! A [`CacheLock`] guards an async operation with a lock key stored through
//! [`CacheStore::put_if_absent`]. The caller that manages to insert the key
//! runs the operation; every other caller fails fast with
//! [`LockError::Conflict`]. There is no queueing and no owner token: the
//! lock expires on its own after [`CacheLock::expiry`], which is also what
//! frees it when the holder dies mid-call.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use quire_cache::{CacheLock, CacheStore, InMemoryStore, LockError, LockParams};
//!
//! # async fn demo() -> Result<(), LockError<std::convert::Infallible>> {
//! let store = CacheStore::new(InMemoryStore::new());
//! let lock = CacheLock::new("reset").with_expiry(Duration::from_secs(30));
//!
//! let params = LockParams::new().with_component("alice@example.com");
//! let sent = lock
//!     .run(&store, "send_reset_code", &params, || async { Ok(true) })
//!     .await?;
//! assert!(sent);
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::entry::expiry_after;
use crate::error::{CacheError, CacheResult};
use crate::store::{CacheStore, RawStore};

/// Namespace every lock key starts with.
pub const LOCK_KEY_NAMESPACE: &str = "cache_lock_";

/// Value stored under a held lock key.
pub const LOCK_MARKER: &str = "locked";

/// How the requester identity takes part in a traced lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceMode {
    /// The identity is appended to the key: different requesters never
    /// conflict with each other on the same resource.
    #[default]
    KeyPart,
    /// The identity is only logged; all requesters share one key.
    LogOnly,
}

/// Declarative lock configuration for one guarded operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLock {
    /// Key prefix; the operation name is used when blank
    pub prefix: String,
    /// Lifetime of the lock key
    pub expiry: Duration,
    /// Separator between key parts
    pub delimiter: String,
    /// Delete the key as soon as the operation finishes
    pub auto_delete: bool,
    /// Take the requester identity into account
    pub trace_request: bool,
    pub trace_mode: TraceMode,
}

impl Default for CacheLock {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            expiry: Duration::from_secs(5),
            delimiter: ":".to_string(),
            auto_delete: true,
            trace_request: false,
            trace_mode: TraceMode::default(),
        }
    }
}

impl CacheLock {
    /// Create a lock with the given prefix and default settings.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    pub fn with_auto_delete(mut self, enabled: bool) -> Self {
        self.auto_delete = enabled;
        self
    }

    pub fn with_trace_request(mut self, enabled: bool) -> Self {
        self.trace_request = enabled;
        self
    }

    pub fn with_trace_mode(mut self, mode: TraceMode) -> Self {
        self.trace_mode = mode;
        self
    }

    /// Reject settings that would break the lock protocol.
    ///
    /// A zero expiry would store a key that never expires, so a crashed
    /// holder would keep the lock forever.
    pub fn validate(&self) -> CacheResult<()> {
        if self.expiry.is_zero() {
            return Err(CacheError::invalid_argument(
                "Lock expiry must be greater than zero",
            ));
        }
        expiry_after(time::OffsetDateTime::now_utc(), self.expiry)?;
        if self.delimiter.is_empty() {
            return Err(CacheError::invalid_argument(
                "Lock key delimiter must not be empty",
            ));
        }
        Ok(())
    }

    /// Build the lock key for one call of `operation`.
    ///
    /// Layout: `cache_lock_{prefix or operation}{delim}{component}...{delim}{requester}`,
    /// the requester part only when tracing in [`TraceMode::KeyPart`].
    pub fn key(&self, operation: &str, params: &LockParams) -> String {
        let base = if self.prefix.trim().is_empty() {
            operation
        } else {
            self.prefix.as_str()
        };

        let mut key = format!("{LOCK_KEY_NAMESPACE}{base}");
        for component in &params.components {
            key.push_str(&self.delimiter);
            key.push_str(component);
        }

        if self.trace_request && self.trace_mode == TraceMode::KeyPart {
            if let Some(requester) = params.requester.as_deref() {
                key.push_str(&self.delimiter);
                key.push_str(requester);
            }
        }

        key
    }

    /// Run `f` while holding the lock for (`operation`, `params`).
    ///
    /// # Errors
    ///
    /// - [`LockError::Conflict`] if the lock is held; `f` is not called
    /// - [`LockError::Cache`] if the lock could not be acquired
    /// - [`LockError::Operation`] with `f`'s own error
    ///
    /// Failing to release the lock afterwards is logged, not returned.
    pub async fn run<S, F, Fut, T, E>(
        &self,
        store: &CacheStore<S>,
        operation: &str,
        params: &LockParams,
        f: F,
    ) -> Result<T, LockError<E>>
    where
        S: RawStore,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.validate()?;

        let key = self.key(operation, params);
        let requester = if self.trace_request {
            params.requester.as_deref()
        } else {
            None
        };

        if !store
            .put_if_absent(&key, LOCK_MARKER, Some(self.expiry))
            .await?
        {
            warn!(
                key = %key,
                operation,
                requester = ?requester,
                "lock is held, rejecting call"
            );
            return Err(LockError::Conflict { key });
        }
        debug!(key = %key, operation, requester = ?requester, "lock acquired");

        let result = f().await;

        if self.auto_delete {
            match store.delete(&key).await {
                Ok(()) => debug!(key = %key, "lock released"),
                Err(e) => error!(
                    key = %key,
                    error = %e,
                    "failed to release lock, it will expire on its own"
                ),
            }
        }

        result.map_err(LockError::Operation)
    }

    /// Wrap `op` into a callable that runs every call under this lock.
    ///
    /// `key_fn` derives the key parts from the call's arguments.
    pub fn guard<S, K, F>(
        self,
        store: Arc<CacheStore<S>>,
        operation: impl Into<String>,
        key_fn: K,
        op: F,
    ) -> Guarded<S, K, F> {
        Guarded {
            store,
            lock: self,
            operation: operation.into(),
            key_fn,
            op,
        }
    }
}

/// Per-call inputs to the lock key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockParams {
    /// Argument-derived key parts, in order
    pub components: Vec<String>,
    /// Identity of the caller (e.g. client IP)
    pub requester: Option<String>,
}

impl LockParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_component(mut self, component: impl ToString) -> Self {
        self.components.push(component.to_string());
        self
    }

    pub fn with_requester(mut self, requester: impl Into<String>) -> Self {
        self.requester = Some(requester.into());
        self
    }
}

/// Errors returned by a guarded call.
#[derive(Debug, thiserror::Error)]
pub enum LockError<E> {
    /// Another call holds the lock
    #[error("Too many requests, lock [{key}] is held; try again later")]
    Conflict { key: String },

    /// The lock could not be acquired
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The guarded operation failed
    #[error("{0}")]
    Operation(E),
}

impl<E> LockError<E> {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// The operation's own error, if that is what failed.
    pub fn into_operation(self) -> Option<E> {
        match self {
            Self::Operation(e) => Some(e),
            _ => None,
        }
    }
}

/// An operation wrapped by [`CacheLock::guard`].
pub struct Guarded<S, K, F> {
    store: Arc<CacheStore<S>>,
    lock: CacheLock,
    operation: String,
    key_fn: K,
    op: F,
}

impl<S: RawStore, K, F> Guarded<S, K, F> {
    pub fn lock(&self) -> &CacheLock {
        &self.lock
    }

    /// Call the wrapped operation with `args` under the lock.
    pub async fn call<A, Fut, T, E>(&self, args: A) -> Result<T, LockError<E>>
    where
        K: Fn(&A) -> LockParams,
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let params = (self.key_fn)(&args);
        self.lock
            .run(&*self.store, &self.operation, &params, || (self.op)(args))
            .await
    }
}
