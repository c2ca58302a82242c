//! One-time password-reset codes.
//!
//! Only one code is outstanding at a time. It lives under a single cache
//! key for five minutes and is consumed by a successful verification.

use std::sync::Arc;
use std::time::Duration;

use quire_cache::{CacheError, CacheStore, RawStore};
use rand::Rng;

pub const RESET_CODE_KEY: &str = "code";
pub const RESET_CODE_TTL: Duration = Duration::from_secs(5 * 60);

const CODE_LENGTH: usize = 6;

#[derive(Debug, thiserror::Error)]
pub enum ResetCodeError {
    #[error("A reset code has already been sent, please check your mailbox")]
    AlreadySent,

    #[error("Reset code must not be blank")]
    MissingCode,

    #[error("Reset code has expired or was never sent")]
    Expired,

    #[error("Reset code does not match")]
    Mismatch,

    #[error(transparent)]
    Cache(#[from] CacheError),
}

pub struct ResetCodeService<S> {
    cache: Arc<CacheStore<S>>,
}

impl<S: RawStore> ResetCodeService<S> {
    pub fn new(cache: Arc<CacheStore<S>>) -> Self {
        Self { cache }
    }

    /// Generate and store a new code.
    ///
    /// Fails with [`ResetCodeError::AlreadySent`] while a previous code is live.
    pub async fn issue(&self) -> Result<String, ResetCodeError> {
        let code = generate_code();
        if !self
            .cache
            .put_if_absent(RESET_CODE_KEY, code.as_str(), Some(RESET_CODE_TTL))
            .await?
        {
            return Err(ResetCodeError::AlreadySent);
        }

        tracing::info!(ttl_secs = RESET_CODE_TTL.as_secs(), "reset password code issued");
        Ok(code)
    }

    /// Check `candidate` against the live code and consume it on a match.
    pub async fn verify_and_consume(&self, candidate: &str) -> Result<(), ResetCodeError> {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            return Err(ResetCodeError::MissingCode);
        }

        let code = self
            .cache
            .get(RESET_CODE_KEY)
            .await?
            .ok_or(ResetCodeError::Expired)?;
        if code != candidate {
            tracing::warn!("reset password code mismatch");
            return Err(ResetCodeError::Mismatch);
        }

        self.cache.delete(RESET_CODE_KEY).await?;
        Ok(())
    }
}

fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LENGTH)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}
