//! AWS Secrets Manager backend
//!
//! Enable with `--features aws`. The key/value map is stored as the secret's
//! JSON `SecretString`. Secrets Manager keeps version history natively and
//! labels versions with staging labels, which map onto [`VersionStage`]:
//! `AWSCURRENT` is CURRENT, `AWSPREVIOUS` is PREVIOUS, anything else OLDER.
//!
//! Credentials come from the tenant settings (`region`, `profile`,
//! `access_key_id`, `secret_access_key`, `session_token`, `endpoint_url`) and
//! fall back to the default provider chain.

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
use aws_sdk_secretsmanager::error::DisplayErrorContext;
use aws_sdk_secretsmanager::primitives::DateTime as AwsDateTime;
use aws_sdk_secretsmanager::types::Tag;
use aws_sdk_secretsmanager::Client;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::{debug, info};

const STAGE_CURRENT: &str = "AWSCURRENT";
const STAGE_PREVIOUS: &str = "AWSPREVIOUS";

/// AWS Secrets Manager secret backend
#[derive(Debug, Clone)]
pub struct AwsSecretsManagerBackend {
    client: Client,
}

impl AwsSecretsManagerBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from tenant credentials, falling back to the default chain
    pub async fn from_credentials(credentials: &BackendCredentials) -> Result<Self> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());

        if let Some(region) = credentials.setting("region") {
            loader = loader.region(aws_config::Region::new(region.to_string()));
        }
        if let Some(profile) = credentials.setting("profile") {
            loader = loader.profile_name(profile);
        }
        if let Some(endpoint) = credentials.setting("endpoint_url") {
            loader = loader.endpoint_url(endpoint);
        }

        match (credentials.setting("access_key_id"), credentials.setting("secret_access_key")) {
            (Some(access_key_id), Some(secret_access_key)) => {
                loader = loader.credentials_provider(
                    aws_sdk_secretsmanager::config::Credentials::new(
                        access_key_id,
                        secret_access_key,
                        credentials.setting("session_token").map(String::from),
                        None,
                        "tagvault",
                    ),
                );
            }
            (None, None) => {}
            _ => {
                return Err(Error::config(
                    "AWS credentials require both 'access_key_id' and 'secret_access_key'",
                ))
            }
        }

        let config = loader.load().await;
        info!(region = ?config.region(), "Initialized AWS Secrets Manager backend");
        Ok(Self::new(Client::new(&config)))
    }

    async fn describe(
        &self,
        secret_id: &str,
    ) -> Result<(Option<String>, BTreeMap<String, String>)> {
        let described =
            self.client.describe_secret().secret_id(secret_id).send().await.map_err(|e| {
                let message = DisplayErrorContext(&e).to_string();
                let service_error = e.into_service_error();
                if service_error.is_resource_not_found_exception() {
                    Error::not_found("secret", secret_id)
                } else {
                    unavailable("describe_secret", secret_id, message)
                }
            })?;

        let tags = described
            .tags()
            .iter()
            .filter_map(|tag| Some((tag.key()?.to_string(), tag.value()?.to_string())))
            .collect();

        Ok((described.description().map(String::from), tags))
    }
}

fn unavailable(operation: &str, secret_id: &str, message: String) -> Error {
    Error::backend_unavailable(format!(
        "AWS Secrets Manager {} for '{}' failed: {}",
        operation, secret_id, message
    ))
}

fn to_chrono(value: Option<&AwsDateTime>) -> Option<DateTime<Utc>> {
    value.and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos()))
}

fn stage_from_labels(labels: &[String]) -> VersionStage {
    if labels.iter().any(|l| l == STAGE_CURRENT) {
        VersionStage::Current
    } else if labels.iter().any(|l| l == STAGE_PREVIOUS) {
        VersionStage::Previous
    } else {
        VersionStage::Older
    }
}

fn parse_secret_string(secret_id: &str, raw: Option<&str>) -> Result<SecretKeyValues> {
    match raw {
        Some(raw) => SecretKeyValues::from_json_str(raw),
        None => Err(Error::validation(format!(
            "Secret '{}' has no SecretString payload",
            secret_id
        ))),
    }
}

#[async_trait]
impl SecretBackend for AwsSecretsManagerBackend {
    async fn create(&self, input: CreateSecretInput) -> Result<SecretWriteOutcome> {
        let tags: Vec<Tag> = input
            .tags
            .iter()
            .map(|(key, value)| Tag::builder().key(key).value(value).build())
            .collect();

        let created = self
            .client
            .create_secret()
            .name(&input.name)
            .secret_string(input.key_values.to_json_string()?)
            .set_description(input.description.clone())
            .set_tags(Some(tags))
            .send()
            .await
            .map_err(|e| {
                let message = DisplayErrorContext(&e).to_string();
                let service_error = e.into_service_error();
                if service_error.is_resource_exists_exception() {
                    Error::already_exists("secret", &input.name)
                } else {
                    unavailable("create_secret", &input.name, message)
                }
            })?;

        debug!(secret_name = %input.name, "Created AWS secret");

        Ok(SecretWriteOutcome {
            backend_id: created.arn().unwrap_or_default().to_string(),
            display_name: created.name().unwrap_or(&input.name).to_string(),
            version_id: created.version_id().unwrap_or_default().to_string(),
        })
    }

    async fn get(&self, secret_id: &str, version_id: Option<&str>) -> Result<SecretPayload> {
        let value = self
            .client
            .get_secret_value()
            .secret_id(secret_id)
            .set_version_id(version_id.map(String::from))
            .send()
            .await
            .map_err(|e| {
                let message = DisplayErrorContext(&e).to_string();
                let service_error = e.into_service_error();
                match version_id {
                    Some(version_id) if service_error.is_resource_not_found_exception() => {
                        version_not_found(secret_id, version_id)
                    }
                    None if service_error.is_resource_not_found_exception() => {
                        Error::not_found("secret", secret_id)
                    }
                    _ => unavailable("get_secret_value", secret_id, message),
                }
            })?;

        let key_values = parse_secret_string(secret_id, value.secret_string())?;
        let (description, tags) = self.describe(secret_id).await?;

        Ok(SecretPayload {
            key_values,
            version_id: value.version_id().unwrap_or_default().to_string(),
            description,
            tags,
        })
    }

    async fn list_versions(&self, secret_id: &str) -> Result<SecretVersionList> {
        let mut versions = Vec::new();
        let mut backend_id = String::new();
        let mut display_name = secret_id.to_string();
        let mut next_token: Option<String> = None;

        loop {
            let page = self
                .client
                .list_secret_version_ids()
                .secret_id(secret_id)
                .include_deprecated(true)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| {
                    let message = DisplayErrorContext(&e).to_string();
                    let service_error = e.into_service_error();
                    if service_error.is_resource_not_found_exception() {
                        Error::not_found("secret", secret_id)
                    } else {
                        unavailable("list_secret_version_ids", secret_id, message)
                    }
                })?;

            if let Some(arn) = page.arn() {
                backend_id = arn.to_string();
            }
            if let Some(name) = page.name() {
                display_name = name.to_string();
            }

            versions.extend(page.versions().iter().filter_map(|entry| {
                Some(BackendVersion {
                    version_id: entry.version_id()?.to_string(),
                    stage: stage_from_labels(entry.version_stages()),
                    created_at: to_chrono(entry.created_date()),
                    last_accessed_at: to_chrono(entry.last_accessed_date()),
                })
            }));

            match page.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        sort_versions(&mut versions);
        Ok(SecretVersionList { backend_id, display_name, versions })
    }

    async fn update(
        &self,
        secret_id: &str,
        key_values: &SecretKeyValues,
        description: Option<&str>,
    ) -> Result<SecretWriteOutcome> {
        let updated = self
            .client
            .update_secret()
            .secret_id(secret_id)
            .secret_string(key_values.to_json_string()?)
            .set_description(description.map(String::from))
            .send()
            .await
            .map_err(|e| {
                let message = DisplayErrorContext(&e).to_string();
                let service_error = e.into_service_error();
                if service_error.is_resource_not_found_exception() {
                    Error::not_found("secret", secret_id)
                } else {
                    unavailable("update_secret", secret_id, message)
                }
            })?;

        Ok(SecretWriteOutcome {
            backend_id: updated.arn().unwrap_or(secret_id).to_string(),
            display_name: updated.name().unwrap_or(secret_id).to_string(),
            version_id: updated.version_id().unwrap_or_default().to_string(),
        })
    }

    fn backend_type(&self) -> SecretBackendType {
        SecretBackendType::AwsSecretsManager
    }

    async fn health_check(&self) -> Result<()> {
        self.client.list_secrets().max_results(1).send().await.map_err(|e| {
            Error::backend_unavailable(format!(
                "AWS Secrets Manager health check failed: {}",
                DisplayErrorContext(&e)
            ))
        })?;
        Ok(())
    }
}
