//! # Configuration Management
//!
//! Layered configuration: built-in defaults, an optional file in any format
//! the `config` crate understands, then `TAGVAULT__*` environment variables.

pub mod settings;

pub use settings::{
    AppConfig, BackendConfig, DatabaseConfig, ObservabilityConfig, SecretsConfig, ENV_PREFIX,
};
