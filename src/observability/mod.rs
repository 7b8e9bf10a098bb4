//! # Observability Infrastructure
//!
//! Structured logging through `tracing` and counters/histograms through the
//! `metrics` facade. Installing a metrics exporter is left to the embedding
//! application; without one every metric call is a no-op.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, log_config_info};
pub use self::metrics::describe_metrics;

use crate::config::ObservabilityConfig;
use crate::errors::Result;
use ::tracing::info;

/// Initialize logging and register metric descriptions
pub fn init_observability(config: &ObservabilityConfig) -> Result<()> {
    init_logging(config)?;
    describe_metrics();

    info!(
        service_name = %config.service_name,
        log_level = %config.log_level,
        json_logging = config.json_logging,
        "Observability initialized"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_observability() {
        let config = ObservabilityConfig::default();

        // A second subscriber in the same test binary is ignored, not an error
        assert!(init_observability(&config).is_ok());
        assert!(init_observability(&config).is_ok());
    }
}
