//! Secret record repository
//!
//! Records are created when a tag is provisioned and have their version
//! pointers moved on every write or revert. They are never deleted and their
//! backend secret id never changes.

use crate::domain::{
    ApplicationId, EnvironmentId, SecretRecord, SecretRecordId, SecretRecordMetadata, TagBinding,
};
use crate::errors::{Error, Result};
use crate::secrets::backends::SecretBackendType;
use crate::storage::repositories::tag_binding::{insert_binding, CreateTagBindingRequest};
use crate::storage::DbPool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Executor, FromRow, Sqlite};
use std::str::FromStr;
use tracing::instrument;

// Database row structure

#[derive(Debug, Clone, FromRow)]
struct SecretRecordRow {
    pub id: String,
    pub backend_secret_id: String,
    pub current_version_id: String,
    pub last_version_id: Option<String>,
    pub application_id: String,
    pub environment_id: String,
    pub tag_name: String,
    pub display_name: String,
    pub provider: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SecretRecordRow> for SecretRecord {
    type Error = Error;

    fn try_from(row: SecretRecordRow) -> Result<Self> {
        let provider = SecretBackendType::from_str(&row.provider).map_err(Error::internal)?;

        Ok(SecretRecord {
            local_id: SecretRecordId::from_string(row.id),
            backend_secret_id: row.backend_secret_id,
            current_version_id: row.current_version_id,
            last_version_id: row.last_version_id,
            metadata: SecretRecordMetadata {
                application_id: ApplicationId::from_string(row.application_id),
                environment_id: EnvironmentId::from_string(row.environment_id),
                tag_name: row.tag_name,
                display_name: row.display_name,
                provider,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Input of [`SecretRecordRepository::create_record`]
#[derive(Debug, Clone)]
pub struct CreateSecretRecordRequest {
    pub backend_secret_id: String,
    pub current_version_id: String,
    pub metadata: SecretRecordMetadata,
}

// Repository trait

#[async_trait]
pub trait SecretRecordRepository: Send + Sync {
    /// Create a record for a freshly provisioned backend secret
    async fn create_record(&self, request: CreateSecretRecordRequest) -> Result<SecretRecord>;

    /// Create a record and the binding pointing at it in one transaction.
    ///
    /// The binding's `secret_id` feature is set to the new record. When either
    /// insert fails neither row is kept.
    async fn create_record_with_binding(
        &self,
        record: CreateSecretRecordRequest,
        binding: CreateTagBindingRequest,
    ) -> Result<(SecretRecord, TagBinding)>;

    /// Get a record by local id
    async fn get_record_by_id(&self, id: &SecretRecordId) -> Result<Option<SecretRecord>>;

    /// Move the version pointers after a successful write or revert
    async fn update_versions(
        &self,
        id: &SecretRecordId,
        current_version_id: &str,
        last_version_id: Option<&str>,
    ) -> Result<SecretRecord>;
}

pub(crate) async fn insert_record<'e, E>(
    executor: E,
    request: &CreateSecretRecordRequest,
) -> Result<SecretRecord>
where
    E: Executor<'e, Database = Sqlite>,
{
    let id = SecretRecordId::new();
    let now = Utc::now();

    let row = sqlx::query_as::<_, SecretRecordRow>(
        "INSERT INTO secret_records (
            id, backend_secret_id, current_version_id, last_version_id, application_id,
            environment_id, tag_name, display_name, provider, created_at, updated_at
        ) VALUES ($1, $2, $3, NULL, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *",
    )
    .bind(id.as_str())
    .bind(&request.backend_secret_id)
    .bind(&request.current_version_id)
    .bind(request.metadata.application_id.as_str())
    .bind(request.metadata.environment_id.as_str())
    .bind(&request.metadata.tag_name)
    .bind(&request.metadata.display_name)
    .bind(request.metadata.provider.as_str())
    .bind(now)
    .bind(now)
    .fetch_one(executor)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            Error::already_exists("secret_record", &request.backend_secret_id)
        }
        other => Error::Database {
            source: other,
            context: format!(
                "Failed to create secret record for {}",
                request.metadata.display_name
            ),
        },
    })?;

    row.try_into()
}

// SQLx implementation

#[derive(Debug, Clone)]
pub struct SqlxSecretRecordRepository {
    pool: DbPool,
}

impl SqlxSecretRecordRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SecretRecordRepository for SqlxSecretRecordRepository {
    #[instrument(
        skip(self, request),
        fields(display_name = %request.metadata.display_name),
        name = "db_create_secret_record"
    )]
    async fn create_record(&self, request: CreateSecretRecordRequest) -> Result<SecretRecord> {
        insert_record(&self.pool, &request).await
    }

    #[instrument(
        skip(self, record, binding),
        fields(display_name = %record.metadata.display_name, tag = %binding.tag_name),
        name = "db_create_secret_record_with_binding"
    )]
    async fn create_record_with_binding(
        &self,
        record: CreateSecretRecordRequest,
        mut binding: CreateTagBindingRequest,
    ) -> Result<(SecretRecord, TagBinding)> {
        let mut tx = self.pool.begin().await.map_err(|e| Error::Database {
            source: e,
            context: "Failed to begin transaction for tag provisioning".to_string(),
        })?;

        let record = insert_record(&mut *tx, &record).await?;
        binding.features.secret_id = Some(record.local_id.clone());
        let binding = insert_binding(&mut *tx, &binding).await?;

        tx.commit().await.map_err(|e| Error::Database {
            source: e,
            context: format!("Failed to commit provisioning of {}", record.metadata.display_name),
        })?;

        Ok((record, binding))
    }

    #[instrument(skip(self), fields(secret_id = %id), name = "db_get_secret_record_by_id")]
    async fn get_record_by_id(&self, id: &SecretRecordId) -> Result<Option<SecretRecord>> {
        let row = sqlx::query_as::<_, SecretRecordRow>("SELECT * FROM secret_records WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Database {
                source: e,
                context: format!("Failed to fetch secret record by ID: {}", id),
            })?;

        row.map(|r| r.try_into()).transpose()
    }

    #[instrument(
        skip(self),
        fields(secret_id = %id, current_version_id = %current_version_id),
        name = "db_update_secret_record_versions"
    )]
    async fn update_versions(
        &self,
        id: &SecretRecordId,
        current_version_id: &str,
        last_version_id: Option<&str>,
    ) -> Result<SecretRecord> {
        let row = sqlx::query_as::<_, SecretRecordRow>(
            "UPDATE secret_records
             SET current_version_id = $1, last_version_id = $2, updated_at = $3
             WHERE id = $4
             RETURNING *",
        )
        .bind(current_version_id)
        .bind(last_version_id)
        .bind(Utc::now())
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Database {
            source: e,
            context: format!("Failed to update versions of secret record {}", id),
        })?;

        row.ok_or_else(|| Error::not_found("secret_record", id.as_str()))?.try_into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_helpers::migrated_pool;

    fn request(backend_id: &str) -> CreateSecretRecordRequest {
        CreateSecretRecordRequest {
            backend_secret_id: backend_id.to_string(),
            current_version_id: "v1".to_string(),
            metadata: SecretRecordMetadata {
                application_id: ApplicationId::from("app-1"),
                environment_id: EnvironmentId::from("env-1"),
                tag_name: "base".to_string(),
                display_name: "payments_staging_base".to_string(),
                provider: SecretBackendType::Memory,
            },
        }
    }

    #[tokio::test]
    async fn test_create_and_get_record() {
        let repo = SqlxSecretRecordRepository::new(migrated_pool().await);
        let created = repo.create_record(request("arn:1")).await.unwrap();

        assert_eq!(created.current_version_id, "v1");
        assert!(created.last_version_id.is_none());
        assert_eq!(created.metadata.provider, SecretBackendType::Memory);

        let fetched = repo.get_record_by_id(&created.local_id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert!(repo.get_record_by_id(&SecretRecordId::from("missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_backend_id_is_rejected() {
        let repo = SqlxSecretRecordRepository::new(migrated_pool().await);
        repo.create_record(request("arn:1")).await.unwrap();
        let err = repo.create_record(request("arn:1")).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
    }

    fn binding(tag: &str) -> CreateTagBindingRequest {
        CreateTagBindingRequest {
            application: crate::domain::ApplicationRef {
                id: ApplicationId::from("app-1"),
                name: "payments".to_string(),
            },
            environment: crate::domain::EnvironmentRef {
                id: EnvironmentId::from("env-1"),
                name: "staging".to_string(),
            },
            tag_name: tag.to_string(),
            features: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_create_record_with_binding_links_them() {
        let pool = migrated_pool().await;
        let repo = SqlxSecretRecordRepository::new(pool.clone());

        let (record, binding) =
            repo.create_record_with_binding(request("arn:1"), binding("base")).await.unwrap();

        assert_eq!(binding.features.secret_id.as_ref(), Some(&record.local_id));
        assert!(repo.get_record_by_id(&record.local_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_create_record_with_binding_rolls_back_on_binding_conflict() {
        let pool = migrated_pool().await;
        let repo = SqlxSecretRecordRepository::new(pool.clone());
        repo.create_record_with_binding(request("arn:1"), binding("base")).await.unwrap();

        let err =
            repo.create_record_with_binding(request("arn:2"), binding("base")).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM secret_records")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_update_versions_moves_pointers_only() {
        let repo = SqlxSecretRecordRepository::new(migrated_pool().await);
        let created = repo.create_record(request("arn:1")).await.unwrap();

        let updated = repo.update_versions(&created.local_id, "v2", Some("v1")).await.unwrap();
        assert_eq!(updated.current_version_id, "v2");
        assert_eq!(updated.last_version_id.as_deref(), Some("v1"));
        assert_eq!(updated.backend_secret_id, created.backend_secret_id);
        assert!(updated.updated_at >= created.updated_at);

        let err = repo
            .update_versions(&SecretRecordId::from("missing"), "v2", None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
