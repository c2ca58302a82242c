//! Access/refresh token issuance.
//!
//! A user's current pair is indexed both ways so a token can be resolved
//! to its user and a user's tokens can be revoked:
//!
//! ```text
//! access_token_of:{user}   -> access token    (24h)
//! refresh_token_of:{user}  -> refresh token   (30d)
//! access_token:{token}     -> user id         (24h)
//! refresh_token:{token}    -> user id         (30d)
//! ```

use std::sync::Arc;
use std::time::Duration;

use quire_cache::{CacheError, CacheStore, RawStore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(24 * 3600);
pub const REFRESH_TOKEN_TTL: Duration = Duration::from_secs(30 * 24 * 3600);

/// Token pair handed to a client after login or refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Invalid or expired access token")]
    InvalidToken,

    #[error("Refresh token has expired or been revoked")]
    RefreshExpired,

    #[error(transparent)]
    Cache(#[from] CacheError),
}

fn access_token_of(user_id: i64) -> String {
    format!("access_token_of:{user_id}")
}

fn refresh_token_of(user_id: i64) -> String {
    format!("refresh_token_of:{user_id}")
}

fn access_token_key(token: &str) -> String {
    format!("access_token:{token}")
}

fn refresh_token_key(token: &str) -> String {
    format!("refresh_token:{token}")
}

fn generate_token() -> String {
    Uuid::new_v4().simple().to_string()
}

pub struct TokenService<S> {
    cache: Arc<CacheStore<S>>,
}

impl<S: RawStore> TokenService<S> {
    pub fn new(cache: Arc<CacheStore<S>>) -> Self {
        Self { cache }
    }

    /// Issue a fresh token pair for `user_id`.
    pub async fn issue(&self, user_id: i64) -> Result<AuthToken, TokenError> {
        let token = AuthToken {
            access_token: generate_token(),
            refresh_token: generate_token(),
            expires_in: ACCESS_TOKEN_TTL.as_secs(),
        };

        self.cache
            .put(
                &access_token_of(user_id),
                token.access_token.as_str(),
                Some(ACCESS_TOKEN_TTL),
            )
            .await?;
        self.cache
            .put(
                &refresh_token_of(user_id),
                token.refresh_token.as_str(),
                Some(REFRESH_TOKEN_TTL),
            )
            .await?;
        self.cache
            .put_as(
                &access_token_key(&token.access_token),
                &user_id,
                Some(ACCESS_TOKEN_TTL),
            )
            .await?;
        self.cache
            .put_as(
                &refresh_token_key(&token.refresh_token),
                &user_id,
                Some(REFRESH_TOKEN_TTL),
            )
            .await?;

        tracing::debug!(user_id, "issued token pair");
        Ok(token)
    }

    /// Resolve an access token to its user.
    pub async fn authenticate(&self, access_token: &str) -> Result<i64, TokenError> {
        if access_token.trim().is_empty() {
            return Err(TokenError::InvalidToken);
        }
        self.cache
            .get_as::<i64>(&access_token_key(access_token))
            .await?
            .ok_or(TokenError::InvalidToken)
    }

    /// Exchange a refresh token for a new pair, revoking the current one.
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthToken, TokenError> {
        if refresh_token.trim().is_empty() {
            return Err(TokenError::RefreshExpired);
        }
        let user_id = self
            .cache
            .get_as::<i64>(&refresh_token_key(refresh_token))
            .await?
            .ok_or(TokenError::RefreshExpired)?;

        self.clear(user_id).await?;
        // The presented token may not be the user's current one.
        self.cache.delete(&refresh_token_key(refresh_token)).await?;

        self.issue(user_id).await
    }

    /// Revoke the current pair of `user_id` (logout).
    pub async fn clear(&self, user_id: i64) -> Result<(), TokenError> {
        if let Some(access) = self.cache.get(&access_token_of(user_id)).await? {
            self.cache.delete(&access_token_key(&access)).await?;
        }
        self.cache.delete(&access_token_of(user_id)).await?;

        if let Some(refresh) = self.cache.get(&refresh_token_of(user_id)).await? {
            self.cache.delete(&refresh_token_key(&refresh)).await?;
        }
        self.cache.delete(&refresh_token_of(user_id)).await?;

        tracing::debug!(user_id, "cleared token pair");
        Ok(())
    }
}
