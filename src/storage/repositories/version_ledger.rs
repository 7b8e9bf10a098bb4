//! Version ledger repository
//!
//! Append-only record of CREATE/UPDATE/REVERT operations per secret record.
//! Rows are never updated or deleted.

use crate::domain::{
    LedgerEntityType, LedgerEntry, LedgerEntryId, LedgerMetadata, LedgerOperation,
    SecretRecordId,
};
use crate::errors::{Error, Result};
use crate::storage::DbPool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::str::FromStr;
use tracing::instrument;

// Database row structure

#[derive(Debug, Clone, FromRow)]
struct LedgerRow {
    pub id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub version: String,
    pub from_version: Option<String>,
    pub operation: String,
    pub metadata_json: String, // JSON stored as string
    pub created_at: DateTime<Utc>,
}

impl TryFrom<LedgerRow> for LedgerEntry {
    type Error = Error;

    fn try_from(row: LedgerRow) -> Result<Self> {
        let entity_type = LedgerEntityType::from_str(&row.entity_type).map_err(Error::internal)?;
        let operation = LedgerOperation::from_str(&row.operation).map_err(Error::internal)?;
        let metadata: LedgerMetadata =
            serde_json::from_str(&row.metadata_json).map_err(|e| Error::Serialization {
                source: e,
                context: format!("Invalid metadata JSON in ledger entry {}", row.id),
            })?;

        Ok(LedgerEntry {
            id: LedgerEntryId::from_string(row.id),
            entity_type,
            entity_id: SecretRecordId::from_string(row.entity_id),
            version: row.version,
            from_version: row.from_version,
            operation,
            metadata,
            created_at: row.created_at,
        })
    }
}

/// Input of [`VersionLedgerRepository::create_version_record`]
#[derive(Debug, Clone)]
pub struct CreateLedgerEntryRequest {
    pub entity_id: SecretRecordId,
    pub version: String,
    pub from_version: Option<String>,
    pub operation: LedgerOperation,
    pub metadata: LedgerMetadata,
}

// Repository trait

#[async_trait]
pub trait VersionLedgerRepository: Send + Sync {
    /// Append one entry
    async fn create_version_record(&self, request: CreateLedgerEntryRequest)
        -> Result<LedgerEntry>;

    /// All entries of one secret record, newest first
    async fn get_version_history(&self, entity_id: &SecretRecordId) -> Result<Vec<LedgerEntry>>;
}

// SQLx implementation

#[derive(Debug, Clone)]
pub struct SqlxVersionLedgerRepository {
    pool: DbPool,
}

impl SqlxVersionLedgerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VersionLedgerRepository for SqlxVersionLedgerRepository {
    #[instrument(
        skip(self, request),
        fields(
            entity_id = %request.entity_id,
            operation = %request.operation,
            version = %request.version
        ),
        name = "db_create_version_record"
    )]
    async fn create_version_record(
        &self,
        request: CreateLedgerEntryRequest,
    ) -> Result<LedgerEntry> {
        let id = LedgerEntryId::new();
        let now = Utc::now();
        let metadata_json =
            serde_json::to_string(&request.metadata).map_err(|e| Error::Serialization {
                source: e,
                context: "Failed to serialize ledger metadata".to_string(),
            })?;

        let row = sqlx::query_as::<_, LedgerRow>(
            "INSERT INTO version_ledger (
                id, entity_type, entity_id, version, from_version, operation, metadata_json,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *",
        )
        .bind(id.as_str())
        .bind(LedgerEntityType::Secret.as_str())
        .bind(request.entity_id.as_str())
        .bind(&request.version)
        .bind(&request.from_version)
        .bind(request.operation.as_str())
        .bind(&metadata_json)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Error::Database {
            source: e,
            context: format!("Failed to append ledger entry for secret {}", request.entity_id),
        })?;

        row.try_into()
    }

    #[instrument(skip(self), fields(entity_id = %entity_id), name = "db_get_version_history")]
    async fn get_version_history(&self, entity_id: &SecretRecordId) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, LedgerRow>(
            "SELECT * FROM version_ledger
             WHERE entity_type = $1 AND entity_id = $2
             ORDER BY created_at DESC, rowid DESC",
        )
        .bind(LedgerEntityType::Secret.as_str())
        .bind(entity_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Database {
            source: e,
            context: format!("Failed to fetch version history for secret {}", entity_id),
        })?;

        rows.into_iter().map(LedgerEntry::try_from).collect()
    }
}
