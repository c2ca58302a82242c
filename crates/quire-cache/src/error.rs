//! Cache error types.
//!
//! Every backend maps its own failures onto [`CacheError`] so callers only
//! ever handle one error type regardless of which store is configured.
//! Expiry is never an error: a stale entry is simply reported as absent.

use std::fmt;

/// Errors that can occur during cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The caller passed an argument the store refuses (blank key, null value, ...).
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the rejected argument.
        message: String,
    },

    /// A cached value could not be converted to or from the requested type.
    #[error("Serialization error for key [{key}]: {message}")]
    Serialization {
        /// The key whose value failed to convert.
        key: String,
        /// Description of the conversion failure.
        message: String,
    },

    /// The storage medium behind the cache could not be reached or failed an I/O operation.
    #[error("Cache backend '{backend}' unavailable: {message}")]
    BackendUnavailable {
        /// Name of the backend that failed.
        backend: &'static str,
        /// Description of the underlying failure.
        message: String,
    },
}

/// Result alias used throughout the cache crate.
pub type CacheResult<T> = Result<T, CacheError>;

impl CacheError {
    /// Creates a new `InvalidArgument` error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a new `Serialization` error.
    #[must_use]
    pub fn serialization(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Serialization {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Creates a new `BackendUnavailable` error.
    #[must_use]
    pub fn backend_unavailable(backend: &'static str, message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend,
            message: message.into(),
        }
    }

    /// Returns `true` if this is an invalid argument error.
    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }

    /// Returns `true` if this is a serialization error.
    #[must_use]
    pub fn is_serialization(&self) -> bool {
        matches!(self, Self::Serialization { .. })
    }

    /// Returns `true` if the backend could not serve the request.
    #[must_use]
    pub fn is_backend_unavailable(&self) -> bool {
        matches!(self, Self::BackendUnavailable { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidArgument { .. } => ErrorCategory::Validation,
            Self::Serialization { .. } => ErrorCategory::Serialization,
            Self::BackendUnavailable { .. } => ErrorCategory::Infrastructure,
        }
    }
}

/// Categories of cache errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Caller bug, never retried.
    Validation,
    /// Stored value does not match the requested type.
    Serialization,
    /// Disk or network failure in the backend.
    Infrastructure,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Serialization => write!(f, "serialization"),
            Self::Infrastructure => write!(f, "infrastructure"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CacheError::invalid_argument("Cache key must not be blank");
        assert_eq!(err.to_string(), "Invalid argument: Cache key must not be blank");

        let err = CacheError::serialization("code", "invalid type: string, expected u32");
        assert_eq!(
            err.to_string(),
            "Serialization error for key [code]: invalid type: string, expected u32"
        );

        let err = CacheError::backend_unavailable("redis", "connection refused");
        assert_eq!(
            err.to_string(),
            "Cache backend 'redis' unavailable: connection refused"
        );
    }

    #[test]
    fn test_error_predicates() {
        let err = CacheError::invalid_argument("bad");
        assert!(err.is_invalid_argument());
        assert!(!err.is_serialization());
        assert!(!err.is_backend_unavailable());

        let err = CacheError::backend_unavailable("level", "disk full");
        assert!(err.is_backend_unavailable());
        assert!(!err.is_invalid_argument());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            CacheError::invalid_argument("x").category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            CacheError::serialization("k", "x").category(),
            ErrorCategory::Serialization
        );
        assert_eq!(
            CacheError::backend_unavailable("redis", "x").category(),
            ErrorCategory::Infrastructure
        );
        assert_eq!(ErrorCategory::Infrastructure.to_string(), "infrastructure");
    }
}
