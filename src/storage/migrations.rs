//! # Database Migration Management
//!
//! Schema migrations are embedded in the binary from `migrations/` and applied
//! through the sqlx migrator, which records them in `_sqlx_migrations`.

use crate::errors::{Error, Result};
use crate::storage::DbPool;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::migrate::Migrator;
use tracing::{info, warn};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Migration information structure
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MigrationInfo {
    pub version: i64,
    pub description: String,
    pub installed_on: DateTime<Utc>,
    pub success: bool,
    pub execution_time: i64,
}

/// Run all pending database migrations
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    info!(available = MIGRATOR.iter().count(), "Starting database migration process");

    MIGRATOR.run(pool).await.map_err(|e| {
        tracing::error!(error = %e, "Database migration failed");
        Error::from(e)
    })?;

    info!("Database migrations completed");
    Ok(())
}

/// List migrations recorded as applied, oldest first
///
/// Empty for a database the migrator has never touched.
pub async fn list_applied_migrations(pool: &DbPool) -> Result<Vec<MigrationInfo>> {
    let tracked: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await
    .map_err(|e| Error::Database {
        source: e,
        context: "Failed to look up the migrations table".to_string(),
    })?;
    if tracked == 0 {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, MigrationInfo>(
        "SELECT version, description, installed_on, success, execution_time
         FROM _sqlx_migrations ORDER BY version",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| Error::Database {
        source: e,
        context: "Failed to list applied migrations".to_string(),
    })
}

/// Latest applied migration version, if any
pub async fn get_migration_version(pool: &DbPool) -> Result<Option<i64>> {
    Ok(list_applied_migrations(pool).await?.iter().filter(|m| m.success).map(|m| m.version).max())
}

/// Check that every embedded migration has been applied successfully
pub async fn validate_migrations(pool: &DbPool) -> Result<bool> {
    let applied = list_applied_migrations(pool).await?;

    for migration in MIGRATOR.iter() {
        let ok = applied.iter().any(|m| m.version == migration.version && m.success);
        if !ok {
            warn!(
                version = migration.version,
                description = %migration.description,
                "Missing migration"
            );
            return Ok(false);
        }
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_helpers::memory_pool;

    #[tokio::test]
    async fn test_run_migrations_is_idempotent() {
        let pool = memory_pool().await;
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        assert!(validate_migrations(&pool).await.unwrap());
        let applied = list_applied_migrations(&pool).await.unwrap();
        assert_eq!(applied.len(), MIGRATOR.iter().count());
        assert_eq!(get_migration_version(&pool).await.unwrap(), Some(20250301000004));
    }

    #[tokio::test]
    async fn test_fresh_database_has_no_migrations() {
        let pool = memory_pool().await;

        assert!(list_applied_migrations(&pool).await.unwrap().is_empty());
        assert_eq!(get_migration_version(&pool).await.unwrap(), None);
        assert!(!validate_migrations(&pool).await.unwrap());
    }

    #[tokio::test]
    async fn test_tables_exist_after_migration() {
        let pool = memory_pool().await;
        run_migrations(&pool).await.unwrap();

        for table in ["secret_records", "tag_bindings", "version_ledger"] {
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = $1",
            )
            .bind(table)
            .fetch_one(&pool)
            .await
            .unwrap();
            assert_eq!(count, 1, "missing table {}", table);
        }
    }
}
