//! # Storage and Persistence
//!
//! SQLite persistence for tag bindings, secret records and the version ledger.

pub mod migrations;
pub mod pool;
pub mod repositories;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use crate::config::DatabaseConfig;

pub use migrations::{
    get_migration_version, list_applied_migrations, validate_migrations, MigrationInfo,
};
pub use pool::{create_pool, get_pool_stats, DbPool, PoolStats};
pub use repositories::{
    CreateLedgerEntryRequest, CreateSecretRecordRequest, CreateTagBindingRequest,
    SecretRecordRepository, SqlxSecretRecordRepository, SqlxTagBindingRepository,
    SqlxVersionLedgerRepository, TagBindingRepository, VersionLedgerRepository,
};

use crate::errors::{Error, Result};

/// Run database migrations
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    migrations::run_migrations(pool).await
}

/// Check database connectivity
pub async fn check_connection(pool: &DbPool) -> Result<()> {
    sqlx::query("SELECT 1").fetch_one(pool).await.map_err(|e| Error::Database {
        source: e,
        context: "Database connectivity check failed".to_string(),
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_sqlite_pool() {
        let config = DatabaseConfig { auto_migrate: false, ..DatabaseConfig::in_memory() };

        let pool = create_pool(&config).await.unwrap();
        check_connection(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_database_url() {
        let config = DatabaseConfig { url: "invalid://url".to_string(), ..Default::default() };

        let result = create_pool(&config).await;
        assert!(result.is_err());
    }
}
