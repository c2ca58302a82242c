pub mod bootstrap;
pub mod config;
pub mod observability;
pub mod services;

pub use bootstrap::{CacheHandle, SharedCache, create_cache_store};
pub use config::{AppConfig, CacheSettings, LevelSettings, LoggingConfig, RedisSettings};
pub use observability::{apply_logging_config, init_tracing};
