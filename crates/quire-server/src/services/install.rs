//! First-run installation.
//!
//! Installation runs at most once at a time across every instance sharing
//! the cache: it is guarded by a resource-wide [`CacheLock`]. The client
//! address is only logged, so two clients racing each other still conflict.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quire_cache::{CacheError, CacheLock, CacheStore, LockError, LockParams, RawStore, TraceMode};
use serde::{Deserialize, Serialize};

/// Cache key marking a completed installation.
pub const INSTALLED_FLAG_KEY: &str = "quire.installed";

const MIN_PASSWORD_LENGTH: usize = 8;

/// Parameters submitted by the installation form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallParams {
    pub username: String,
    pub email: String,
    pub password: String,
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
}

impl InstallParams {
    pub fn validate(&self) -> Result<(), InstallError> {
        if self.username.trim().is_empty() {
            return Err(InstallError::invalid_params("username must not be blank"));
        }
        if !self.email.contains('@') {
            return Err(InstallError::invalid_params("email is not valid"));
        }
        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(InstallError::invalid_params(format!(
                "password must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }
        if self.title.trim().is_empty() {
            return Err(InstallError::invalid_params("title must not be blank"));
        }
        Ok(())
    }
}

/// Creates the initial site state (admin user, settings, default content).
#[async_trait]
pub trait SiteInitializer: Send + Sync {
    async fn initialize(&self, params: &InstallParams) -> anyhow::Result<()>;
}

#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("Installation is already in progress, please try again later")]
    Locked,

    #[error("Site is already installed")]
    AlreadyInstalled,

    #[error("Invalid installation parameters: {message}")]
    InvalidParams { message: String },

    #[error("Site initialization failed: {0}")]
    Initialization(anyhow::Error),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl InstallError {
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    /// Whether the same request may succeed if retried later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Locked)
    }
}

impl From<LockError<InstallError>> for InstallError {
    fn from(err: LockError<InstallError>) -> Self {
        match err {
            LockError::Conflict { .. } => Self::Locked,
            LockError::Cache(e) => Self::Cache(e),
            LockError::Operation(e) => e,
        }
    }
}

pub struct Installer<S, I> {
    cache: Arc<CacheStore<S>>,
    lock: CacheLock,
    initializer: I,
}

impl<S: RawStore, I: SiteInitializer> Installer<S, I> {
    pub fn new(cache: Arc<CacheStore<S>>, initializer: I) -> Self {
        Self {
            cache,
            lock: CacheLock::new("install")
                .with_expiry(Duration::from_secs(30))
                .with_trace_request(true)
                .with_trace_mode(TraceMode::LogOnly),
            initializer,
        }
    }

    /// Replace the lock settings (e.g. a longer expiry for slow setups).
    pub fn with_lock(mut self, lock: CacheLock) -> Self {
        self.lock = lock;
        self
    }

    pub async fn is_installed(&self) -> Result<bool, InstallError> {
        Ok(self.cache.get(INSTALLED_FLAG_KEY).await?.is_some())
    }

    /// Install the site.
    ///
    /// # Errors
    ///
    /// - [`InstallError::Locked`] while another installation is running
    /// - [`InstallError::AlreadyInstalled`] once an installation completed
    /// - [`InstallError::InvalidParams`] if `params` fail validation
    pub async fn install(&self, params: InstallParams, request_ip: &str) -> Result<(), InstallError> {
        let lock_params = LockParams::new().with_requester(request_ip);

        self.lock
            .run(&self.cache, "install", &lock_params, || async {
                if self.is_installed().await? {
                    return Err(InstallError::AlreadyInstalled);
                }
                params.validate()?;

                self.initializer
                    .initialize(&params)
                    .await
                    .map_err(InstallError::Initialization)?;

                self.cache.put(INSTALLED_FLAG_KEY, "true", None).await?;
                tracing::info!(username = %params.username, request_ip, "site installed");
                Ok(())
            })
            .await
            .map_err(InstallError::from)
    }
}
