//! Secret backend trait and types
//!
//! Defines the capability set every secret manager integration provides:
//! create, get (optionally at a version), list versions, full-replace update
//! and revert-to-version.

use crate::domain::{SecretKeyValues, SecretVersionList};
use crate::errors::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Type of secret backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretBackendType {
    /// Process-local backend for development and tests
    Memory,
    /// HashiCorp Vault KV v2
    Vault,
    /// AWS Secrets Manager
    AwsSecretsManager,
}

impl SecretBackendType {
    /// Get the database representation of this type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Vault => "vault",
            Self::AwsSecretsManager => "aws_secrets_manager",
        }
    }
}

impl FromStr for SecretBackendType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "memory" => Ok(Self::Memory),
            "vault" => Ok(Self::Vault),
            "aws_secrets_manager" => Ok(Self::AwsSecretsManager),
            _ => Err(format!("Unknown secret backend type: {}", s)),
        }
    }
}

impl fmt::Display for SecretBackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Input of `create`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSecretInput {
    pub name: String,
    pub key_values: SecretKeyValues,
    pub tags: BTreeMap<String, String>,
    pub description: Option<String>,
}

/// Result of `create` and `update`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretWriteOutcome {
    pub backend_id: String,
    pub display_name: String,
    pub version_id: String,
}

/// Result of `get`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretPayload {
    pub key_values: SecretKeyValues,
    pub version_id: String,
    pub description: Option<String>,
    pub tags: BTreeMap<String, String>,
}

/// Result of `revert_to_version`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevertOutcome {
    pub backend_id: String,
    pub display_name: String,
    /// The version that was current before the revert
    pub new_last_version: String,
    /// The freshly written version holding the reverted content
    pub new_current_version: String,
}

/// Trait for secret backends
///
/// Implementations must be Send + Sync for use in async contexts. Secrets are
/// addressed by their resolved name or backend id, whichever the provider
/// accepts; all providers here accept both.
#[async_trait]
pub trait SecretBackend: Send + Sync + std::fmt::Debug {
    /// Create a new secret with an initial version.
    ///
    /// Fails with `AlreadyExists` if a secret with that name exists.
    async fn create(&self, input: CreateSecretInput) -> Result<SecretWriteOutcome>;

    /// Fetch the current version, or a specific one when `version_id` is given.
    async fn get(&self, secret_id: &str, version_id: Option<&str>) -> Result<SecretPayload>;

    /// List the backend's native version history, sorted with
    /// [`crate::domain::sort_versions`].
    async fn list_versions(&self, secret_id: &str) -> Result<SecretVersionList>;

    /// Replace the whole key/value map with `key_values`, producing a new version.
    ///
    /// Callers merge deltas before calling; this never merges.
    async fn update(
        &self,
        secret_id: &str,
        key_values: &SecretKeyValues,
        description: Option<&str>,
    ) -> Result<SecretWriteOutcome>;

    /// Write the content of `revert_to_version_id` back as a new current version.
    ///
    /// The current version's description is preserved. No version is
    /// destroyed: the old current becomes a historical version.
    async fn revert_to_version(
        &self,
        secret_id: &str,
        current_version_id: &str,
        revert_to_version_id: &str,
    ) -> Result<RevertOutcome> {
        let current = self.get(secret_id, Some(current_version_id)).await?;
        let target = self.get(secret_id, Some(revert_to_version_id)).await?;

        let written =
            self.update(secret_id, &target.key_values, current.description.as_deref()).await?;

        Ok(RevertOutcome {
            backend_id: written.backend_id,
            display_name: written.display_name,
            new_last_version: current_version_id.to_string(),
            new_current_version: written.version_id,
        })
    }

    /// Get the backend type identifier
    fn backend_type(&self) -> SecretBackendType;

    /// Perform a health check on the backend
    async fn health_check(&self) -> Result<()>;
}

/// Map a version id that the backend does not know to `NotFound`
pub(crate) fn version_not_found(secret_id: &str, version_id: &str) -> Error {
    Error::not_found("secret_version", format!("{}@{}", secret_id, version_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_type_roundtrip() {
        for bt in [
            SecretBackendType::Memory,
            SecretBackendType::Vault,
            SecretBackendType::AwsSecretsManager,
        ] {
            let parsed: SecretBackendType = bt.as_str().parse().unwrap();
            assert_eq!(bt, parsed);
        }
        assert!("gcp_secret_manager".parse::<SecretBackendType>().is_err());
    }

    #[test]
    fn test_backend_type_serialization() {
        let json = serde_json::to_string(&SecretBackendType::AwsSecretsManager).unwrap();
        assert_eq!(json, "\"aws_secrets_manager\"");

        let parsed: SecretBackendType = serde_json::from_str("\"vault\"").unwrap();
        assert_eq!(parsed, SecretBackendType::Vault);
    }
}
