//! # Structured Logging
//!
//! Installs the global `tracing` subscriber. `RUST_LOG` wins over the
//! configured level when set.
//!
//! Secret values are never logged anywhere in the crate; spans and events
//! carry key names, version ids and display names only.

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};
use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber, JSON formatted when configured
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level).map_err(|e| {
            Error::config(format!("Invalid log level '{}': {}", config.log_level, e))
        })?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    // A subscriber installed earlier (e.g. by a test harness) stays in place.
    let _ = if config.json_logging { builder.json().try_init() } else { builder.try_init() };

    Ok(())
}

/// Log configuration at startup
pub fn log_config_info(config: &crate::config::AppConfig) {
    tracing::info!(
        database_url = %config.database.url,
        backend_provider = %config.backend.provider,
        concurrency_mode = %config.secrets.concurrency_mode,
        call_timeout_seconds = config.secrets.call_timeout_seconds,
        client_cache_capacity = config.secrets.client_cache_capacity,
        "tagvault configuration"
    );
}
