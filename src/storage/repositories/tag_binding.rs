//! Tag binding repository
//!
//! Bindings are looked up by (application name, environment name, tag name),
//! the triple callers address secrets with. Unique indexes keep one binding
//! per tag name per application/environment, by id and by name, so at most
//! one `base` and never an ambiguous lookup.

use crate::domain::{
    ApplicationId, ApplicationRef, EnvironmentId, EnvironmentRef, TagBinding, TagBindingId,
    TagFeatures,
};
use crate::errors::{Error, Result};
use crate::storage::DbPool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Executor, FromRow, Sqlite};
use tracing::instrument;

// Database row structure

#[derive(Debug, Clone, FromRow)]
struct TagBindingRow {
    pub id: String,
    pub application_id: String,
    pub application_name: String,
    pub environment_id: String,
    pub environment_name: String,
    pub tag_name: String,
    pub features: String, // JSON stored as string
    pub created_at: DateTime<Utc>,
}

impl TryFrom<TagBindingRow> for TagBinding {
    type Error = Error;

    fn try_from(row: TagBindingRow) -> Result<Self> {
        let features: TagFeatures =
            serde_json::from_str(&row.features).map_err(|e| Error::Serialization {
                source: e,
                context: format!("Invalid features JSON in tag binding {}", row.id),
            })?;

        Ok(TagBinding {
            id: TagBindingId::from_string(row.id),
            application_id: ApplicationId::from_string(row.application_id),
            application_name: row.application_name,
            environment_id: EnvironmentId::from_string(row.environment_id),
            environment_name: row.environment_name,
            name: row.tag_name,
            features,
            created_at: row.created_at,
        })
    }
}

/// Input of [`TagBindingRepository::create_binding`]
#[derive(Debug, Clone)]
pub struct CreateTagBindingRequest {
    pub application: ApplicationRef,
    pub environment: EnvironmentRef,
    pub tag_name: String,
    pub features: TagFeatures,
}

// Repository trait

#[async_trait]
pub trait TagBindingRepository: Send + Sync {
    /// Bind a tag to an application/environment
    async fn create_binding(&self, request: CreateTagBindingRequest) -> Result<TagBinding>;

    /// Find a binding by application, environment and tag name
    async fn find_binding(
        &self,
        application_name: &str,
        environment_name: &str,
        tag_name: &str,
    ) -> Result<Option<TagBinding>>;

    /// All tags bound to one application/environment, by name
    async fn list_bindings(
        &self,
        application_id: &ApplicationId,
        environment_id: &EnvironmentId,
    ) -> Result<Vec<TagBinding>>;
}

pub(crate) async fn insert_binding<'e, E>(
    executor: E,
    request: &CreateTagBindingRequest,
) -> Result<TagBinding>
where
    E: Executor<'e, Database = Sqlite>,
{
    let id = TagBindingId::new();
    let features = serde_json::to_string(&request.features).map_err(|e| Error::Serialization {
        source: e,
        context: "Failed to serialize tag features".to_string(),
    })?;

    let row = sqlx::query_as::<_, TagBindingRow>(
        "INSERT INTO tag_bindings (
            id, application_id, application_name, environment_id, environment_name,
            tag_name, features, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *",
    )
    .bind(id.as_str())
    .bind(request.application.id.as_str())
    .bind(&request.application.name)
    .bind(request.environment.id.as_str())
    .bind(&request.environment.name)
    .bind(&request.tag_name)
    .bind(&features)
    .bind(Utc::now())
    .fetch_one(executor)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => Error::already_exists(
            "tag_binding",
            format!(
                "{}/{}/{}",
                request.application.name, request.environment.name, request.tag_name
            ),
        ),
        other => Error::Database {
            source: other,
            context: format!("Failed to create tag binding {}", request.tag_name),
        },
    })?;

    row.try_into()
}

// SQLx implementation

#[derive(Debug, Clone)]
pub struct SqlxTagBindingRepository {
    pool: DbPool,
}

impl SqlxTagBindingRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TagBindingRepository for SqlxTagBindingRepository {
    #[instrument(
        skip(self, request),
        fields(
            application = %request.application.name,
            environment = %request.environment.name,
            tag = %request.tag_name
        ),
        name = "db_create_tag_binding"
    )]
    async fn create_binding(&self, request: CreateTagBindingRequest) -> Result<TagBinding> {
        insert_binding(&self.pool, &request).await
    }

    #[instrument(skip(self), name = "db_find_tag_binding")]
    async fn find_binding(
        &self,
        application_name: &str,
        environment_name: &str,
        tag_name: &str,
    ) -> Result<Option<TagBinding>> {
        let row = sqlx::query_as::<_, TagBindingRow>(
            "SELECT * FROM tag_bindings
             WHERE application_name = $1 AND environment_name = $2 AND tag_name = $3",
        )
        .bind(application_name)
        .bind(environment_name)
        .bind(tag_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Database {
            source: e,
            context: format!(
                "Failed to fetch tag binding {}/{}/{}",
                application_name, environment_name, tag_name
            ),
        })?;

        row.map(|r| r.try_into()).transpose()
    }

    #[instrument(
        skip(self),
        fields(application_id = %application_id, environment_id = %environment_id),
        name = "db_list_tag_bindings"
    )]
    async fn list_bindings(
        &self,
        application_id: &ApplicationId,
        environment_id: &EnvironmentId,
    ) -> Result<Vec<TagBinding>> {
        let rows = sqlx::query_as::<_, TagBindingRow>(
            "SELECT * FROM tag_bindings
             WHERE application_id = $1 AND environment_id = $2
             ORDER BY tag_name",
        )
        .bind(application_id.as_str())
        .bind(environment_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Database {
            source: e,
            context: "Failed to list tag bindings".to_string(),
        })?;

        rows.into_iter().map(TagBinding::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SecretRecordId;
    use crate::storage::test_helpers::migrated_pool;

    fn request(tag: &str) -> CreateTagBindingRequest {
        CreateTagBindingRequest {
            application: ApplicationRef {
                id: ApplicationId::from("app-1"),
                name: "payments".into(),
            },
            environment: EnvironmentRef {
                id: EnvironmentId::from("env-1"),
                name: "staging".into(),
            },
            tag_name: tag.to_string(),
            features: TagFeatures {
                secret_id: Some(SecretRecordId::from(format!("rec-{}", tag))),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_create_and_find_binding() {
        let repo = SqlxTagBindingRepository::new(migrated_pool().await);
        let created = repo.create_binding(request("base")).await.unwrap();
        assert!(created.is_base());

        let found = repo.find_binding("payments", "staging", "base").await.unwrap().unwrap();
        assert_eq!(found, created);
        assert_eq!(found.features.secret_id.as_ref().map(|id| id.as_str()), Some("rec-base"));

        assert!(repo.find_binding("payments", "prod", "base").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_base_binding_is_rejected() {
        let repo = SqlxTagBindingRepository::new(migrated_pool().await);
        repo.create_binding(request("base")).await.unwrap();
        let err = repo.create_binding(request("base")).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_same_names_under_another_application_id_are_rejected() {
        let repo = SqlxTagBindingRepository::new(migrated_pool().await);
        repo.create_binding(request("blue")).await.unwrap();

        let mut other_tenant = request("blue");
        other_tenant.application.id = ApplicationId::from("app-2");
        let err = repo.create_binding(other_tenant).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));

        let found = repo.find_binding("payments", "staging", "blue").await.unwrap().unwrap();
        assert_eq!(found.application_id, ApplicationId::from("app-1"));
    }

    #[tokio::test]
    async fn test_list_bindings_sorted_by_name() {
        let repo = SqlxTagBindingRepository::new(migrated_pool().await);
        repo.create_binding(request("green")).await.unwrap();
        repo.create_binding(request("base")).await.unwrap();
        repo.create_binding(request("blue")).await.unwrap();

        let names: Vec<_> = repo
            .list_bindings(&ApplicationId::from("app-1"), &EnvironmentId::from("env-1"))
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["base", "blue", "green"]);
    }
}
