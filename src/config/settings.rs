//! # Configuration Settings
//!
//! Defines the configuration structure for tagvault.

use crate::errors::{Error, Result};
use crate::secrets::backends::{BackendCredentials, SecretBackendType};
use crate::secrets::ConcurrencyMode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use validator::Validate;

/// Prefix of environment overrides, e.g. `TAGVAULT__DATABASE__URL`
pub const ENV_PREFIX: &str = "TAGVAULT";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Database configuration
    #[validate(nested)]
    pub database: DatabaseConfig,

    /// Observability configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,

    /// Secret backend selection and credentials
    #[validate(nested)]
    pub backend: BackendConfig,

    /// Secret engine behaviour
    #[validate(nested)]
    pub secrets: SecretsConfig,
}

impl AppConfig {
    /// Load configuration from defaults, an optional file and the environment
    ///
    /// Later sources win. Environment keys use `__` for nesting:
    /// `TAGVAULT__SECRETS__CONCURRENCY_MODE=check_and_set`.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&AppConfig::default())?);

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path));
        }

        let config: AppConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX).separator("__").try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        // Use validator crate for basic validation
        Validate::validate(self).map_err(Error::from)?;

        // Custom validation logic
        self.validate_custom()?;

        Ok(())
    }

    /// Custom validation logic that goes beyond what the validator crate can do
    fn validate_custom(&self) -> Result<()> {
        if !self.database.is_sqlite() {
            return Err(Error::validation_field("Database URL must start with 'sqlite://'", "url"));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(Error::validation(
                "min_connections cannot be greater than max_connections",
            ));
        }

        if self.backend.provider == SecretBackendType::Vault && self.backend.vault_address.is_none()
        {
            return Err(Error::validation_field(
                "Vault backend requires backend.vault_address",
                "vault_address",
            ));
        }

        Ok(())
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database connection URL
    #[validate(length(min = 1, message = "Database URL cannot be empty"))]
    pub url: String,

    /// Maximum number of connections in the pool
    #[validate(range(min = 1, max = 100, message = "Max connections must be between 1 and 100"))]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[validate(range(min = 0, max = 50, message = "Min connections must be between 0 and 50"))]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[validate(range(
        min = 1,
        max = 60,
        message = "Connect timeout must be between 1 and 60 seconds"
    ))]
    pub connect_timeout_seconds: u64,

    /// Idle timeout in seconds (0 = no timeout)
    pub idle_timeout_seconds: u64,

    /// Enable automatic migrations
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./data/tagvault.db".to_string(),
            max_connections: 10,
            min_connections: 0,
            connect_timeout_seconds: 10,
            idle_timeout_seconds: 600, // 10 minutes
            auto_migrate: true,
        }
    }
}

impl DatabaseConfig {
    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Get idle timeout as Duration (None if 0)
    pub fn idle_timeout(&self) -> Option<Duration> {
        if self.idle_timeout_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.idle_timeout_seconds))
        }
    }

    /// Check if this is a SQLite configuration
    pub fn is_sqlite(&self) -> bool {
        self.url.starts_with("sqlite:")
    }

    /// In-memory databases live only as long as their connection
    pub fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }

    /// In-memory SQLite configuration for tests and dry runs
    pub fn in_memory() -> Self {
        Self {
            url: "sqlite://:memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            idle_timeout_seconds: 0,
            ..Default::default()
        }
    }
}

/// Observability configuration for logging
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Service name attached to log output
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,

    /// Log level or env-filter directive (trace, debug, info, warn, error)
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: crate::APP_NAME.to_string(),
            log_level: "info".to_string(),
            json_logging: false,
        }
    }
}

fn default_vault_kv_mount() -> String {
    "secret".to_string()
}

/// Secret backend selection
#[derive(Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct BackendConfig {
    /// Provider family serving tag secrets
    pub provider: SecretBackendType,

    pub vault_address: Option<String>,
    pub vault_token: Option<String>,
    pub vault_namespace: Option<String>,
    #[validate(length(min = 1, message = "Vault KV mount cannot be empty"))]
    pub vault_kv_mount: String,

    pub aws_region: Option<String>,
    pub aws_profile: Option<String>,
    /// Override endpoint, e.g. for LocalStack
    pub aws_endpoint_url: Option<String>,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("provider", &self.provider)
            .field("vault_address", &self.vault_address)
            .field("vault_token", &self.vault_token.as_ref().map(|_| "[REDACTED]"))
            .field("vault_namespace", &self.vault_namespace)
            .field("vault_kv_mount", &self.vault_kv_mount)
            .field("aws_region", &self.aws_region)
            .field("aws_profile", &self.aws_profile)
            .field("aws_endpoint_url", &self.aws_endpoint_url)
            .finish()
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider: SecretBackendType::Memory,
            vault_address: None,
            vault_token: None,
            vault_namespace: None,
            vault_kv_mount: default_vault_kv_mount(),
            aws_region: None,
            aws_profile: None,
            aws_endpoint_url: None,
        }
    }
}

impl BackendConfig {
    /// Credentials for the configured provider
    pub fn credentials(&self) -> BackendCredentials {
        let credentials = BackendCredentials::new(self.provider);
        match self.provider {
            SecretBackendType::Memory => credentials,
            SecretBackendType::Vault => credentials
                .with_optional_setting("address", self.vault_address.clone())
                .with_optional_setting("token", self.vault_token.clone())
                .with_optional_setting("namespace", self.vault_namespace.clone())
                .with_setting("kv_mount", self.vault_kv_mount.clone()),
            SecretBackendType::AwsSecretsManager => credentials
                .with_optional_setting("region", self.aws_region.clone())
                .with_optional_setting("profile", self.aws_profile.clone())
                .with_optional_setting("endpoint_url", self.aws_endpoint_url.clone()),
        }
    }
}

/// Secret engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SecretsConfig {
    /// Whether writes verify the backend's live version first
    pub concurrency_mode: ConcurrencyMode,

    /// Bound on every backend call in seconds
    #[validate(range(
        min = 1,
        max = 120,
        message = "Call timeout must be between 1 and 120 seconds"
    ))]
    pub call_timeout_seconds: u64,

    /// Maximum number of cached backend clients
    #[validate(range(
        min = 1,
        max = 10000,
        message = "Client cache capacity must be between 1 and 10000"
    ))]
    pub client_cache_capacity: usize,

    /// Client cache TTL in seconds (0 = no expiry)
    pub client_cache_ttl_seconds: u64,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            concurrency_mode: ConcurrencyMode::LastWriteWins,
            call_timeout_seconds: 15,
            client_cache_capacity: 64,
            client_cache_ttl_seconds: 0,
        }
    }
}

impl SecretsConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_seconds)
    }

    /// Get client cache TTL as Duration (None if 0)
    pub fn client_cache_ttl(&self) -> Option<Duration> {
        if self.client_cache_ttl_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.client_cache_ttl_seconds))
        }
    }
}
