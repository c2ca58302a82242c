// Tracing setup. The filter sits behind a reload layer so the level read
// from configuration can replace the bootstrap level after startup.
use std::sync::OnceLock;
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

use crate::config::LoggingConfig;

/// Level used until configuration has been loaded.
const BOOTSTRAP_LEVEL: &str = "info";

static FILTER_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// Install the global subscriber. `RUST_LOG`, when set, wins over every
/// configured level for the lifetime of the process.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(BOOTSTRAP_LEVEL));

    let (reload_layer, handle) = reload::Layer::new(filter);
    let _ = FILTER_HANDLE.set(handle);

    let _ = tracing_subscriber::registry()
        .with(reload_layer)
        .with(fmt::layer())
        .try_init();
}

/// Switch to the configured level. No-op under `RUST_LOG` or before
/// [`init_tracing`].
pub fn apply_logging_config(logging: &LoggingConfig) {
    if std::env::var_os("RUST_LOG").is_some() {
        return;
    }
    let Some(handle) = FILTER_HANDLE.get() else {
        return;
    };
    match handle.modify(|filter| *filter = EnvFilter::new(&logging.level)) {
        Ok(()) => tracing::debug!(level = %logging.level, "logging level applied"),
        Err(e) => tracing::warn!(
            error = %e,
            level = %logging.level,
            "failed to apply logging level"
        ),
    }
}
