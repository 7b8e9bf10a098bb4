//! Secret records and tag bindings
//!
//! A `SecretRecord` correlates one (application, environment, tag) with a
//! backend secret. A `TagBinding` ties a tag name to an application and
//! environment and, through `features.secret_id`, to its secret record.

use super::id::{ApplicationId, EnvironmentId, SecretRecordId, TagBindingId};
use crate::secrets::backends::SecretBackendType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of the tag every other tag inherits from
pub const BASE_TAG_NAME: &str = "base";

/// Metadata stored alongside a secret record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretRecordMetadata {
    pub application_id: ApplicationId,
    pub environment_id: EnvironmentId,
    pub tag_name: String,
    /// Backend-assigned display name (the resolved secret name)
    pub display_name: String,
    pub provider: SecretBackendType,
}

/// Local record correlating a tag with a backend secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretRecord {
    pub local_id: SecretRecordId,
    /// Immutable once assigned
    pub backend_secret_id: String,
    pub current_version_id: String,
    pub last_version_id: Option<String>,
    pub metadata: SecretRecordMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Free-form feature bag of a tag; `secret_id` links the secret record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagFeatures {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_id: Option<SecretRecordId>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A tag bound to exactly one (application, environment) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagBinding {
    pub id: TagBindingId,
    pub application_id: ApplicationId,
    pub application_name: String,
    pub environment_id: EnvironmentId,
    pub environment_name: String,
    pub name: String,
    pub features: TagFeatures,
    pub created_at: DateTime<Utc>,
}

impl TagBinding {
    pub fn is_base(&self) -> bool {
        self.name == BASE_TAG_NAME
    }
}

/// Application reference handed in by the external relational store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRef {
    pub id: ApplicationId,
    pub name: String,
}

/// Environment reference handed in by the external relational store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentRef {
    pub id: EnvironmentId,
    pub name: String,
}

/// Who performed a mutating operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub name: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into() }
    }
}
