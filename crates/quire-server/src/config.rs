use quire_cache::{BackendKind, RedisOptions};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub cache: CacheSettings,
    /// Redis configuration, used when `cache.backend = "redis"`
    #[serde(default)]
    pub redis: RedisSettings,
    /// Embedded store configuration, used when `cache.backend = "level"`
    #[serde(default)]
    pub level: LevelSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// Default derived via field defaults

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Cache validations
        self.cache
            .backend_kind()
            .map_err(|e| format!("cache.backend: {e}"))?;
        if self.cache.sweep_interval_secs == 0 {
            return Err("cache.sweep_interval_secs must be > 0".into());
        }
        // Redis validations
        if self.redis.pool_size == 0 {
            return Err("redis.pool_size must be > 0".into());
        }
        if self.redis.timeout_ms == 0 {
            return Err("redis.timeout_ms must be > 0".into());
        }
        self.redis
            .connection_url()
            .map_err(|e| format!("redis.url: {e}"))?;
        // Level validations
        if self.level.map_size_mb == 0 {
            return Err("level.map_size_mb must be > 0".into());
        }
        // Logging validations
        let level = self.logging.level.to_ascii_lowercase();
        if !matches!(
            level.as_str(),
            "trace" | "debug" | "info" | "warn" | "error" | "off"
        ) {
            return Err(format!(
                "logging.level must be one of trace, debug, info, warn, error, off (got '{}')",
                self.logging.level
            ));
        }
        Ok(())
    }
}

/// Cache layer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Backend selector: "memory", "level" or "redis"
    #[serde(default = "default_cache_backend")]
    pub backend: String,

    /// Seconds between sweeps of the memory and level stores
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_cache_backend() -> String {
    BackendKind::default().to_string()
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: default_cache_backend(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl CacheSettings {
    pub fn backend_kind(&self) -> Result<BackendKind, quire_cache::CacheError> {
        self.backend.parse()
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Redis configuration for multi-instance deployments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSettings {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Password merged into the URL, so it can come from the environment
    /// (QUIRE__REDIS__PASSWORD) instead of the config file
    #[serde(default)]
    pub password: Option<String>,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Connection timeout in milliseconds
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,

    /// Prepended to every cache key
    #[serde(default)]
    pub key_prefix: String,

    /// Use the memory store when Redis is unreachable at startup
    #[serde(default = "default_fallback_to_memory")]
    pub fallback_to_memory: bool,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_pool_size() -> usize {
    10
}

fn default_redis_timeout_ms() -> u64 {
    5000
}

fn default_fallback_to_memory() -> bool {
    true
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            password: None,
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
            key_prefix: String::new(),
            fallback_to_memory: default_fallback_to_memory(),
        }
    }
}

impl RedisSettings {
    /// The URL to connect with, password included.
    pub fn connection_url(&self) -> Result<String, String> {
        let mut url = url::Url::parse(&self.url).map_err(|e| e.to_string())?;
        if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
            url.set_password(Some(password))
                .map_err(|_| "cannot set a password on this URL".to_string())?;
        }
        Ok(url.to_string())
    }

    pub fn options(&self) -> Result<RedisOptions, String> {
        Ok(RedisOptions {
            url: self.connection_url()?,
            pool_size: self.pool_size,
            timeout: Duration::from_millis(self.timeout_ms),
            key_prefix: self.key_prefix.clone(),
        })
    }
}

/// Embedded on-disk store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelSettings {
    /// Directory holding the store files
    #[serde(default = "default_level_path")]
    pub path: PathBuf,

    /// Maximum size of the memory map in megabytes
    #[serde(default = "default_level_map_size_mb")]
    pub map_size_mb: usize,
}

fn default_level_path() -> PathBuf {
    std::env::temp_dir().join("quire").join("level-cache")
}

fn default_level_map_size_mb() -> usize {
    64
}

impl Default for LevelSettings {
    fn default() -> Self {
        Self {
            path: default_level_path(),
            map_size_mb: default_level_map_size_mb(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                let pathbuf = PathBuf::from(p);
                if pathbuf.exists() {
                    builder = builder.add_source(File::from(pathbuf));
                }
            }
            None => {
                // Try default root-level file
                let default_path = PathBuf::from("quire.toml");
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        // Environment variable overrides, e.g., QUIRE__CACHE__BACKEND=redis
        builder = builder.add_source(
            Environment::with_prefix("QUIRE")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        // Validate
        merged.validate()?;
        Ok(merged)
    }
}
