//! # tagvault
//!
//! Tag-based secret inheritance on top of external secret managers.
//!
//! Every (application, environment) pair has one `base` tag that all other
//! tags inherit missing or empty keys from. Secret values live in the backend
//! (HashiCorp Vault, AWS Secrets Manager, or an in-memory store); tagvault
//! keeps the tag bindings, the secret records that point at backend secrets,
//! and an append-only version ledger in SQLite.
//!
//! ## Architecture
//!
//! ```text
//! CLI → TagSecretService → Naming Resolver → SecretBackend (Vault / AWS / memory)
//!              ↓                  ↓
//!   Inheritance Resolver   Revert Orchestrator → Version Ledger (SQLite)
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tagvault::config::DatabaseConfig;
//! use tagvault::secrets::{ConcurrencyMode, InMemorySecretBackend};
//! use tagvault::services::{TagAddress, TagSecretService};
//!
//! # async fn run() -> tagvault::Result<()> {
//! let pool = tagvault::storage::create_pool(&DatabaseConfig::in_memory()).await?;
//! let service = TagSecretService::with_pool(
//!     pool,
//!     Arc::new(InMemorySecretBackend::new()),
//!     ConcurrencyMode::LastWriteWins,
//! );
//! let view = service.get_merged(&TagAddress::new("payments", "staging", "blue")).await?;
//! println!("{:?}", view.overwritten_keys);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod domain;
pub mod errors;
pub mod observability;
pub mod secrets;
pub mod services;
pub mod storage;

// Re-export commonly used types and traits
pub use config::AppConfig;
pub use errors::{Error, Result};
pub use services::{TagAddress, TagSecretService};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
