//! Test database utilities for in-library tests.
//!
//! Every pool is a fresh single-connection in-memory SQLite database, so tests
//! are fully isolated without external services.
//!
//! This module is only available in test builds (`#[cfg(test)]`).

use crate::config::DatabaseConfig;
use crate::storage::{create_pool, DbPool};

/// Empty in-memory database without migrations
pub async fn memory_pool() -> DbPool {
    let config = DatabaseConfig { auto_migrate: false, ..DatabaseConfig::in_memory() };
    create_pool(&config).await.expect("create in-memory pool")
}

/// In-memory database with all migrations applied
pub async fn migrated_pool() -> DbPool {
    create_pool(&DatabaseConfig::in_memory()).await.expect("create migrated in-memory pool")
}
