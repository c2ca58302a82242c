//! Services built on the cache layer.
//!
//! - [`tokens`]: access/refresh token pairs stored with TTLs
//! - [`reset_code`]: one-time password-reset codes
//! - [`install`]: first-run installation guarded by the cache lock

pub mod install;
pub mod reset_code;
pub mod tokens;

pub use install::{INSTALLED_FLAG_KEY, InstallError, InstallParams, Installer, SiteInitializer};
pub use reset_code::{RESET_CODE_KEY, RESET_CODE_TTL, ResetCodeError, ResetCodeService};
pub use tokens::{ACCESS_TOKEN_TTL, AuthToken, REFRESH_TOKEN_TTL, TokenError, TokenService};
