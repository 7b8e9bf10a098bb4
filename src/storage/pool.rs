//! # Database Connection Pool Management
//!
//! Provides database connection pool creation and management utilities.

use crate::config::DatabaseConfig;
use crate::errors::{Error, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Pool, Sqlite,
};
use std::{str::FromStr, time::Duration};

/// Type alias for the database connection pool
pub type DbPool = Pool<Sqlite>;

const SQLITE_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a database connection pool with the specified configuration
pub async fn create_pool(config: &DatabaseConfig) -> Result<DbPool> {
    // Validate configuration
    validate_config(config)?;

    let mut connect_options = SqliteConnectOptions::from_str(&config.url)
        .map_err(|e| Error::Database {
            source: e,
            context: format!("Invalid SQLite connection string: {}", config.url),
        })?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(SQLITE_BUSY_TIMEOUT);

    // An in-memory database lives and dies with its single connection.
    let pool_options = if config.is_in_memory() {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        connect_options = connect_options.journal_mode(SqliteJournalMode::Wal);
        let options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .test_before_acquire(true);
        match config.idle_timeout() {
            Some(idle_timeout) => options.idle_timeout(idle_timeout),
            None => options,
        }
    };

    let pool = pool_options
        .acquire_timeout(config.connect_timeout())
        .connect_with(connect_options)
        .await
        .map_err(|e| {
            tracing::error!(
                error = %e,
                url = %config.url,
                busy_timeout_ms = SQLITE_BUSY_TIMEOUT.as_millis() as u64,
                "Failed to create SQLite database pool"
            );
            Error::Database {
                source: e,
                context: format!("Failed to connect to database: {}", config.url),
            }
        })?;

    tracing::info!(
        in_memory = config.is_in_memory(),
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        connect_timeout_ms = config.connect_timeout().as_millis() as u64,
        idle_timeout_ms = config.idle_timeout().map(|d| d.as_millis() as u64),
        "Database connection pool created"
    );

    // Run migrations if auto_migrate is enabled
    if config.auto_migrate {
        tracing::info!("Auto-migration enabled, running database migrations");
        crate::storage::migrations::run_migrations(&pool).await?;
    }

    Ok(pool)
}

/// Validate database configuration
fn validate_config(config: &DatabaseConfig) -> Result<()> {
    if config.max_connections == 0 {
        return Err(Error::validation("max_connections must be greater than 0"));
    }

    if config.min_connections > config.max_connections {
        return Err(Error::validation("min_connections cannot be greater than max_connections"));
    }

    if config.url.is_empty() {
        return Err(Error::validation("database URL cannot be empty"));
    }

    if !config.is_sqlite() {
        return Err(Error::validation("database URL must start with 'sqlite:'"));
    }

    Ok(())
}

/// Get pool statistics for monitoring
pub fn get_pool_stats(pool: &DbPool) -> PoolStats {
    PoolStats { size: pool.size(), idle: pool.num_idle() }
}

/// Pool statistics for monitoring
#[derive(Debug, Clone)]
pub struct PoolStats {
    /// Total connections in the pool
    pub size: u32,
    /// Number of idle connections
    pub idle: usize,
}

impl PoolStats {
    /// Get the number of active connections
    pub fn active(&self) -> u32 {
        self.size.saturating_sub(self.idle as u32)
    }

    /// Check if the pool is healthy (has available connections)
    pub fn is_healthy(&self) -> bool {
        self.size > 0
    }
}
