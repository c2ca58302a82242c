//! Cache entry wrapper shared by every backend.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{CacheError, CacheResult};

/// A cached value together with its creation and expiry timestamps.
///
/// Entries are never mutated once built. Overwriting a key replaces the
/// whole entry; expiry is decided by comparing `expires_at` against the
/// store's clock at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    pub data: V,
    pub created_at: OffsetDateTime,
    /// `None` means the entry never expires.
    pub expires_at: Option<OffsetDateTime>,
}

impl<V> CacheEntry<V> {
    /// Wrap `data` created at `now`.
    ///
    /// A missing or zero `ttl` produces an entry that never expires.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `now + ttl` is past the representable
    /// date range.
    pub fn new(data: V, now: OffsetDateTime, ttl: Option<Duration>) -> CacheResult<Self> {
        let expires_at = match ttl.filter(|ttl| !ttl.is_zero()) {
            Some(ttl) => Some(expiry_after(now, ttl)?),
            None => None,
        };
        Ok(Self {
            data,
            created_at: now,
            expires_at,
        })
    }

    /// Whether the entry is stale at `now`. An entry is expired from the
    /// instant its expiry timestamp is reached.
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// Time left before expiry, measured from `now`.
    ///
    /// Returns `None` for entries that never expire and `Some(Duration::ZERO)`
    /// for entries that are already stale.
    pub fn remaining_ttl(&self, now: OffsetDateTime) -> Option<Duration> {
        self.expires_at.map(|expires_at| {
            let millis = (expires_at - now).whole_milliseconds();
            if millis <= 0 {
                Duration::ZERO
            } else {
                Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
            }
        })
    }
}

/// `now + ttl`, or an error when the sum overflows the date range.
pub(crate) fn expiry_after(now: OffsetDateTime, ttl: Duration) -> CacheResult<OffsetDateTime> {
    time::Duration::try_from(ttl)
        .ok()
        .and_then(|ttl| now.checked_add(ttl))
        .ok_or_else(|| {
            CacheError::invalid_argument(format!("TTL of {}s is out of range", ttl.as_secs()))
        })
}
