//! Vault secret backend implementation
//!
//! Stores tag secrets in a HashiCorp Vault KV v2 engine. KV v2 keeps its own
//! version history, so every write is a new Vault version and a revert is a
//! write of an older version's data.
//!
//! ## Configuration
//!
//! Built from tenant credentials (`address`, `token`, `namespace`,
//! `kv_mount`), normally taken from the `backend.vault_*` settings.
//!
//! ## Stored document
//!
//! ```json
//! {
//!   "key_values": { "DATABASE_URL": "postgres://...", "FEATURE_X": "" },
//!   "description": "payments/staging base secret",
//!   "tags": { "applicationId": "...", "environmentId": "...", "tagName": "base" }
//! }
//! ```
//!
//! Secret ids are KV paths (the resolved secret name). The backend id is
//! `{mount}/data/{path}`; either form is accepted as a secret id. Version ids
//! are Vault version numbers rendered as strings.

use super::backend::{
    version_not_found, CreateSecretInput, SecretBackend, SecretBackendType, SecretPayload,
    SecretWriteOutcome,
};
use super::registry::BackendCredentials;
use crate::domain::{
    sort_versions, BackendVersion, SecretKeyValues, SecretVersionList, VersionStage,
};
use crate::errors::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, error, info};
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};
use vaultrs::error::ClientError;
use vaultrs::kv2;

fn default_kv_mount() -> String {
    "secret".to_string()
}

/// Configuration for Vault backend
#[derive(Clone, Serialize, Deserialize)]
pub struct VaultBackendConfig {
    /// Vault server address
    pub address: String,
    /// Vault authentication token
    pub token: Option<String>,
    /// Vault namespace (for Enterprise)
    pub namespace: Option<String>,
    /// KV v2 mount path (default: "secret")
    #[serde(default = "default_kv_mount")]
    pub kv_mount_path: String,
}

impl std::fmt::Debug for VaultBackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultBackendConfig")
            .field("address", &self.address)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("namespace", &self.namespace)
            .field("kv_mount_path", &self.kv_mount_path)
            .finish()
    }
}

impl VaultBackendConfig {
    /// Build configuration from tenant credentials
    ///
    /// Recognised settings: `address` (required), `token`, `namespace`, `kv_mount`.
    pub fn from_credentials(credentials: &BackendCredentials) -> Result<Self> {
        let address = credentials
            .setting("address")
            .ok_or_else(|| Error::config("Vault credentials require an 'address' setting"))?
            .to_string();

        Ok(Self {
            address,
            token: credentials.setting("token").map(String::from),
            namespace: credentials.setting("namespace").map(String::from),
            kv_mount_path: credentials
                .setting("kv_mount")
                .map(String::from)
                .unwrap_or_else(default_kv_mount),
        })
    }
}

/// Document stored at each KV path
#[derive(Debug, Clone, Serialize, Deserialize)]
struct VaultSecretDocument {
    key_values: SecretKeyValues,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

/// HashiCorp Vault secret backend
pub struct VaultSecretBackend {
    client: VaultClient,
    kv_mount_path: String,
}

impl std::fmt::Debug for VaultSecretBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultSecretBackend")
            .field("kv_mount_path", &self.kv_mount_path)
            .field("client", &"[VaultClient]")
            .finish()
    }
}

impl VaultSecretBackend {
    /// Create a new Vault backend with the given configuration
    pub fn new(config: VaultBackendConfig) -> Result<Self> {
        let mut settings_builder = VaultClientSettingsBuilder::default();
        settings_builder.address(&config.address);

        if let Some(ref token) = config.token {
            settings_builder.token(token);
        }

        if let Some(ref namespace) = config.namespace {
            settings_builder.namespace(Some(namespace.clone()));
        }

        let settings = settings_builder.build().map_err(|e| {
            Error::config(format!("Invalid Vault backend configuration: {}", e))
        })?;

        let client = VaultClient::new(settings)
            .map_err(|e| Error::config(format!("Failed to create Vault client: {}", e)))?;

        info!(
            address = %config.address,
            kv_mount = %config.kv_mount_path,
            "Initialized Vault secret backend"
        );

        Ok(Self { client, kv_mount_path: config.kv_mount_path })
    }

    fn backend_id(&self, path: &str) -> String {
        format!("{}/data/{}", self.kv_mount_path, path)
    }

    /// Accept either a KV path or a backend id and return the KV path
    fn kv_path<'a>(&self, secret_id: &'a str) -> &'a str {
        strip_backend_prefix(&self.kv_mount_path, secret_id)
    }

    async fn current_version(&self, path: &str) -> Result<u64> {
        let metadata = kv2::read_metadata(&self.client, &self.kv_mount_path, path)
            .await
            .map_err(|e| map_vault_error(path, e))?;
        Ok(metadata.current_version)
    }

    async fn read_document(&self, path: &str, version: u64) -> Result<VaultSecretDocument> {
        kv2::read_version(&self.client, &self.kv_mount_path, path, version).await.map_err(|e| {
            match e {
                ClientError::APIError { code: 404, .. } => {
                    version_not_found(path, &version.to_string())
                }
                other => map_vault_error(path, other),
            }
        })
    }

    async fn write_document(
        &self,
        path: &str,
        document: &VaultSecretDocument,
    ) -> Result<SecretWriteOutcome> {
        let written = kv2::set(&self.client, &self.kv_mount_path, path, document)
            .await
            .map_err(|e| map_vault_error(path, e))?;

        Ok(SecretWriteOutcome {
            backend_id: self.backend_id(path),
            display_name: path.to_string(),
            version_id: written.version.to_string(),
        })
    }
}

fn strip_backend_prefix<'a>(mount: &str, secret_id: &'a str) -> &'a str {
    secret_id
        .strip_prefix(mount)
        .and_then(|rest| rest.strip_prefix("/data/"))
        .unwrap_or(secret_id)
}

fn parse_version_id(path: &str, version_id: &str) -> Result<u64> {
    version_id.parse::<u64>().map_err(|_| version_not_found(path, version_id))
}

fn map_vault_error(path: &str, error: ClientError) -> Error {
    match error {
        ClientError::APIError { code: 404, .. } => Error::not_found("secret", path),
        other => {
            error!(path = %path, error = %other, "Vault request failed");
            Error::backend_unavailable(format!("Vault request for '{}' failed: {}", path, other))
        }
    }
}

/// Label Vault versions: the current version is CURRENT, the highest version
/// below it is PREVIOUS, everything else OLDER.
fn label_versions(
    current_version: u64,
    entries: Vec<(u64, Option<DateTime<Utc>>)>,
) -> Vec<BackendVersion> {
    let previous = entries.iter().map(|(n, _)| *n).filter(|n| *n < current_version).max();

    let mut versions: Vec<BackendVersion> = entries
        .into_iter()
        .map(|(number, created_at)| {
            let stage = if number == current_version {
                VersionStage::Current
            } else if Some(number) == previous {
                VersionStage::Previous
            } else {
                VersionStage::Older
            };
            BackendVersion {
                version_id: number.to_string(),
                stage,
                created_at,
                last_accessed_at: None,
            }
        })
        .collect();

    // Highest number first so equal timestamps keep write order.
    versions.sort_by(|a, b| {
        b.version_id.parse::<u64>().unwrap_or(0).cmp(&a.version_id.parse::<u64>().unwrap_or(0))
    });
    sort_versions(&mut versions);
    versions
}

fn parse_vault_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw).ok().map(|t| t.with_timezone(&Utc))
}

#[async_trait]
impl SecretBackend for VaultSecretBackend {
    async fn create(&self, input: CreateSecretInput) -> Result<SecretWriteOutcome> {
        let path = input.name.as_str();

        match kv2::read_metadata(&self.client, &self.kv_mount_path, path).await {
            Ok(_) => return Err(Error::already_exists("secret", path)),
            Err(ClientError::APIError { code: 404, .. }) => {}
            Err(other) => return Err(map_vault_error(path, other)),
        }

        let document = VaultSecretDocument {
            key_values: input.key_values,
            description: input.description,
            tags: input.tags,
        };

        let outcome = self.write_document(path, &document).await?;
        debug!(path = %path, version = %outcome.version_id, "Created Vault secret");
        Ok(outcome)
    }

    async fn get(&self, secret_id: &str, version_id: Option<&str>) -> Result<SecretPayload> {
        let path = self.kv_path(secret_id);

        let version = match version_id {
            Some(version_id) => parse_version_id(path, version_id)?,
            None => self.current_version(path).await?,
        };

        debug!(
            path = %path,
            version = version,
            kv_mount = %self.kv_mount_path,
            "Fetching secret from Vault"
        );

        let document = self.read_document(path, version).await?;
        Ok(SecretPayload {
            key_values: document.key_values,
            version_id: version.to_string(),
            description: document.description,
            tags: document.tags,
        })
    }

    async fn list_versions(&self, secret_id: &str) -> Result<SecretVersionList> {
        let path = self.kv_path(secret_id);

        let metadata = kv2::read_metadata(&self.client, &self.kv_mount_path, path)
            .await
            .map_err(|e| map_vault_error(path, e))?;

        let entries = metadata
            .versions
            .iter()
            .filter_map(|(number, version)| {
                number.parse::<u64>().ok().map(|n| (n, parse_vault_time(&version.created_time)))
            })
            .collect();

        Ok(SecretVersionList {
            backend_id: self.backend_id(path),
            display_name: path.to_string(),
            versions: label_versions(metadata.current_version, entries),
        })
    }

    async fn update(
        &self,
        secret_id: &str,
        key_values: &SecretKeyValues,
        description: Option<&str>,
    ) -> Result<SecretWriteOutcome> {
        let path = self.kv_path(secret_id);

        // Tags (and the description unless replaced) carry over from the current version.
        let current_version = self.current_version(path).await?;
        let current = self.read_document(path, current_version).await?;

        let document = VaultSecretDocument {
            key_values: key_values.clone(),
            description: description.map(String::from).or(current.description),
            tags: current.tags,
        };

        self.write_document(path, &document).await
    }

    fn backend_type(&self) -> SecretBackendType {
        SecretBackendType::Vault
    }

    async fn health_check(&self) -> Result<()> {
        vaultrs::sys::health(&self.client)
            .await
            .map_err(|e| Error::backend_unavailable(format!("Vault health check failed: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::backends::registry::BackendCredentials;
    use chrono::TimeZone;

    #[test]
    fn test_vault_backend_config_default_mount() {
        let credentials = BackendCredentials::new(SecretBackendType::Vault)
            .with_setting("address", "http://localhost:8200");
        let config = VaultBackendConfig::from_credentials(&credentials).unwrap();
        assert_eq!(config.kv_mount_path, "secret");
        assert!(config.token.is_none());
    }

    #[test]
    fn test_vault_backend_config_requires_address() {
        let credentials =
            BackendCredentials::new(SecretBackendType::Vault).with_setting("token", "t");
        assert!(matches!(
            VaultBackendConfig::from_credentials(&credentials),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn test_config_debug_redacts_token() {
        let config = VaultBackendConfig {
            address: "http://localhost:8200".to_string(),
            token: Some("s.very-secret".to_string()),
            namespace: None,
            kv_mount_path: default_kv_mount(),
        };
        assert!(!format!("{:?}", config).contains("very-secret"));
    }

    #[test]
    fn test_strip_backend_prefix() {
        assert_eq!(strip_backend_prefix("secret", "secret/data/app_env_base"), "app_env_base");
        assert_eq!(strip_backend_prefix("secret", "app_env_base"), "app_env_base");
        assert_eq!(strip_backend_prefix("kv", "secret/data/x"), "secret/data/x");
    }

    #[test]
    fn test_parse_version_id_rejects_non_numeric() {
        assert_eq!(parse_version_id("p", "7").unwrap(), 7);
        assert!(parse_version_id("p", "latest").unwrap_err().is_not_found());
    }

    #[test]
    fn test_label_versions() {
        let at = |m| Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, m, 0).unwrap());
        let versions = label_versions(4, vec![(1, at(1)), (3, at(3)), (4, at(4)), (2, at(2))]);

        let labelled: Vec<_> =
            versions.iter().map(|v| (v.version_id.as_str(), v.stage)).collect();
        assert_eq!(
            labelled,
            vec![
                ("4", VersionStage::Current),
                ("3", VersionStage::Previous),
                ("2", VersionStage::Older),
                ("1", VersionStage::Older),
            ]
        );
    }

    #[test]
    fn test_label_versions_single() {
        let versions = label_versions(1, vec![(1, None)]);
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].stage, VersionStage::Current);
    }

    #[test]
    fn test_document_tolerates_missing_optional_fields() {
        let document: VaultSecretDocument =
            serde_json::from_str(r#"{"key_values": {"A": "1"}}"#).unwrap();
        assert!(document.description.is_none());
        assert!(document.tags.is_empty());
    }

    #[test]
    fn test_parse_vault_time() {
        assert!(parse_vault_time("2018-03-22T02:24:06.945319214Z").is_some());
        assert!(parse_vault_time("").is_none());
    }
}
