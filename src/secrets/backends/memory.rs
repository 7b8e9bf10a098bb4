//! In-memory secret backend
//!
//! Keeps every version of every secret in process memory. Used for local
//! development and as the backend of the test suite; it follows the same
//! version semantics as the cloud providers (every write is a new version,
//! the newest version is CURRENT, the one before it PREVIOUS).

use super::backend::{
    version_not_found, CreateSecretInput, SecretBackend, SecretBackendType, SecretPayload,
    SecretWriteOutcome,
};
use crate::domain::{
    sort_versions, BackendVersion, SecretKeyValues, SecretVersionList, VersionStage,
};
use crate::errors::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

const BACKEND_ID_PREFIX: &str = "arn:tagvault:memory:secret:";

#[derive(Debug, Clone)]
struct StoredVersion {
    version_id: String,
    key_values: SecretKeyValues,
    description: Option<String>,
    created_at: DateTime<Utc>,
    last_accessed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct StoredSecret {
    backend_id: String,
    name: String,
    tags: BTreeMap<String, String>,
    /// Oldest first; the last element is the current version
    versions: Vec<StoredVersion>,
}

impl StoredSecret {
    fn current(&self) -> Result<&StoredVersion> {
        self.versions
            .last()
            .ok_or_else(|| Error::internal(format!("Secret '{}' has no versions", self.name)))
    }

    fn push_version(
        &mut self,
        key_values: SecretKeyValues,
        description: Option<String>,
    ) -> SecretWriteOutcome {
        let version_id = Uuid::new_v4().to_string();
        self.versions.push(StoredVersion {
            version_id: version_id.clone(),
            key_values,
            description,
            created_at: Utc::now(),
            last_accessed_at: None,
        });
        SecretWriteOutcome {
            backend_id: self.backend_id.clone(),
            display_name: self.name.clone(),
            version_id,
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    /// Keyed by backend id
    secrets: HashMap<String, StoredSecret>,
    /// Name -> backend id
    names: HashMap<String, String>,
}

impl MemoryState {
    fn backend_id_for(&self, secret_id: &str) -> Option<String> {
        if self.secrets.contains_key(secret_id) {
            Some(secret_id.to_string())
        } else {
            self.names.get(secret_id).cloned()
        }
    }

    fn secret(&self, secret_id: &str) -> Result<&StoredSecret> {
        self.backend_id_for(secret_id)
            .and_then(|id| self.secrets.get(&id))
            .ok_or_else(|| Error::not_found("secret", secret_id))
    }

    fn secret_mut(&mut self, secret_id: &str) -> Result<&mut StoredSecret> {
        let backend_id =
            self.backend_id_for(secret_id).ok_or_else(|| Error::not_found("secret", secret_id))?;
        self.secrets.get_mut(&backend_id).ok_or_else(|| Error::not_found("secret", secret_id))
    }
}

/// Process-local versioned secret store
#[derive(Debug, Default)]
pub struct InMemorySecretBackend {
    state: RwLock<MemoryState>,
}

impl InMemorySecretBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of secrets stored
    pub async fn len(&self) -> usize {
        self.state.read().await.secrets.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.secrets.is_empty()
    }
}

#[async_trait]
impl SecretBackend for InMemorySecretBackend {
    async fn create(&self, input: CreateSecretInput) -> Result<SecretWriteOutcome> {
        let mut state = self.state.write().await;

        if state.names.contains_key(&input.name) {
            return Err(Error::already_exists("secret", input.name));
        }

        let backend_id = format!("{}{}", BACKEND_ID_PREFIX, input.name);
        let mut secret = StoredSecret {
            backend_id: backend_id.clone(),
            name: input.name.clone(),
            tags: input.tags,
            versions: Vec::new(),
        };
        let outcome = secret.push_version(input.key_values, input.description);

        debug!(
            secret_name = %input.name,
            version_id = %outcome.version_id,
            "Created in-memory secret"
        );

        state.names.insert(input.name, backend_id.clone());
        state.secrets.insert(backend_id, secret);

        Ok(outcome)
    }

    async fn get(&self, secret_id: &str, version_id: Option<&str>) -> Result<SecretPayload> {
        let mut state = self.state.write().await;
        let secret = state.secret_mut(secret_id)?;
        let tags = secret.tags.clone();

        let version = match version_id {
            Some(version_id) => secret
                .versions
                .iter_mut()
                .find(|v| v.version_id == version_id)
                .ok_or_else(|| version_not_found(secret_id, version_id))?,
            None => secret
                .versions
                .last_mut()
                .ok_or_else(|| Error::not_found("secret_version", secret_id))?,
        };
        version.last_accessed_at = Some(Utc::now());

        Ok(SecretPayload {
            key_values: version.key_values.clone(),
            version_id: version.version_id.clone(),
            description: version.description.clone(),
            tags,
        })
    }

    async fn list_versions(&self, secret_id: &str) -> Result<SecretVersionList> {
        let state = self.state.read().await;
        let secret = state.secret(secret_id)?;
        let newest = secret.versions.len();

        // Newest first so equal timestamps keep write order after sorting.
        let mut versions: Vec<BackendVersion> = secret
            .versions
            .iter()
            .enumerate()
            .rev()
            .map(|(index, version)| {
                let stage = if index + 1 == newest {
                    VersionStage::Current
                } else if index + 2 == newest {
                    VersionStage::Previous
                } else {
                    VersionStage::Older
                };
                BackendVersion {
                    version_id: version.version_id.clone(),
                    stage,
                    created_at: Some(version.created_at),
                    last_accessed_at: version.last_accessed_at,
                }
            })
            .collect();
        sort_versions(&mut versions);

        Ok(SecretVersionList {
            backend_id: secret.backend_id.clone(),
            display_name: secret.name.clone(),
            versions,
        })
    }

    async fn update(
        &self,
        secret_id: &str,
        key_values: &SecretKeyValues,
        description: Option<&str>,
    ) -> Result<SecretWriteOutcome> {
        let mut state = self.state.write().await;
        let secret = state.secret_mut(secret_id)?;

        let description = match description {
            Some(description) => Some(description.to_string()),
            None => secret.current()?.description.clone(),
        };
        let outcome = secret.push_version(key_values.clone(), description);

        debug!(
            secret_id = %secret_id,
            version_id = %outcome.version_id,
            "Wrote in-memory secret version"
        );

        Ok(outcome)
    }

    fn backend_type(&self) -> SecretBackendType {
        SecretBackendType::Memory
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
