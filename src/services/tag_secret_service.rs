//! Tag secret business logic
//!
//! Reads resolve a tag to its backend secret and merge it with the base tag of
//! the same application and environment. Writes fetch the current version,
//! overlay the change, replace the whole map at the backend and append a
//! ledger entry. Ledger appends and record pointer refreshes after a
//! successful backend write are best effort: failures are logged and counted,
//! never returned.

use futures::future::join_all;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::{
    domain::{
        chain_gaps, Actor, ApplicationRef, EnvironmentRef, LedgerMetadata, LedgerOperation,
        SecretKeyValues, SecretRecord, SecretRecordMetadata, TagBinding, TagFeatures,
        BASE_TAG_NAME,
    },
    errors::{Error, Result},
    observability::metrics,
    secrets::{
        inheritance, naming, reconcile, BackendCredentials, CombinedTimeline, ConcurrencyMode,
        CreateSecretInput, MergedSecretView, RevertOrchestrator, RevertReport, RevertRequest,
        SecretBackend, SecretBackendRegistry, SecretPayload, SecretWriteOutcome,
    },
    storage::{
        CreateLedgerEntryRequest, CreateSecretRecordRequest, CreateTagBindingRequest, DbPool,
        SecretRecordRepository, SqlxSecretRecordRepository, SqlxTagBindingRepository,
        SqlxVersionLedgerRepository, TagBindingRepository, VersionLedgerRepository,
    },
};

/// Names addressing one tag secret
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagAddress {
    pub application: String,
    pub environment: String,
    pub tag: String,
}

impl TagAddress {
    pub fn new(
        application: impl Into<String>,
        environment: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        Self { application: application.into(), environment: environment.into(), tag: tag.into() }
    }

    /// The base tag of the same application and environment
    pub fn base(&self) -> Self {
        Self::new(&self.application, &self.environment, BASE_TAG_NAME)
    }

    pub fn is_base(&self) -> bool {
        self.tag == BASE_TAG_NAME
    }

    /// Backend secret name of this tag
    pub fn secret_name(&self) -> String {
        naming::resolve(&self.application, &self.environment, &self.tag)
    }
}

impl fmt::Display for TagAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.application, self.environment, self.tag)
    }
}

/// One environment that was provisioned
#[derive(Debug, Clone)]
pub struct ProvisionedTag {
    pub environment: EnvironmentRef,
    pub record: SecretRecord,
    pub binding: TagBinding,
}

/// One environment whose provisioning failed
#[derive(Debug)]
pub struct ProvisionFailure {
    pub environment: EnvironmentRef,
    pub error: Error,
}

/// Outcome of provisioning a tag across environments
///
/// Environments are independent: a failure in one never rolls back another.
#[derive(Debug, Default)]
pub struct ProvisionReport {
    pub succeeded: Vec<ProvisionedTag>,
    pub failed: Vec<ProvisionFailure>,
}

impl ProvisionReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Successes, or an error describing the failures.
    ///
    /// A lone failure with nothing else provisioned comes back as its own
    /// error; any other mix is a `PartialProvisionFailure`.
    pub fn into_result(mut self) -> Result<Vec<ProvisionedTag>> {
        if self.failed.is_empty() {
            return Ok(self.succeeded);
        }
        if self.succeeded.is_empty() && self.failed.len() == 1 {
            if let Some(failure) = self.failed.pop() {
                return Err(failure.error);
            }
        }

        Err(Error::PartialProvisionFailure {
            succeeded: self.succeeded.len(),
            failed: self
                .failed
                .iter()
                .map(|f| format!("{}: {}", f.environment.name, f.error))
                .collect(),
        })
    }
}

/// Service for reading, writing, provisioning and reverting tag secrets
#[derive(Clone)]
pub struct TagSecretService {
    backend: Arc<dyn SecretBackend>,
    bindings: Arc<dyn TagBindingRepository>,
    records: Arc<dyn SecretRecordRepository>,
    ledger: Arc<dyn VersionLedgerRepository>,
    mode: ConcurrencyMode,
}

impl fmt::Debug for TagSecretService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagSecretService")
            .field("backend", &self.backend.backend_type())
            .field("mode", &self.mode)
            .finish()
    }
}

impl TagSecretService {
    pub fn new(
        backend: Arc<dyn SecretBackend>,
        bindings: Arc<dyn TagBindingRepository>,
        records: Arc<dyn SecretRecordRepository>,
        ledger: Arc<dyn VersionLedgerRepository>,
        mode: ConcurrencyMode,
    ) -> Self {
        Self { backend, bindings, records, ledger, mode }
    }

    /// Service over the SQLx repositories of `pool`
    pub fn with_pool(pool: DbPool, backend: Arc<dyn SecretBackend>, mode: ConcurrencyMode) -> Self {
        Self::new(
            backend,
            Arc::new(SqlxTagBindingRepository::new(pool.clone())),
            Arc::new(SqlxSecretRecordRepository::new(pool.clone())),
            Arc::new(SqlxVersionLedgerRepository::new(pool)),
            mode,
        )
    }

    /// Service whose backend client comes from the registry
    pub async fn connect(
        pool: DbPool,
        registry: &SecretBackendRegistry,
        credentials: &BackendCredentials,
        mode: ConcurrencyMode,
    ) -> Result<Self> {
        let backend = registry.client_for(credentials).await?;
        Ok(Self::with_pool(pool, backend, mode))
    }

    pub fn concurrency_mode(&self) -> ConcurrencyMode {
        self.mode
    }

    /// Binding and secret record of a tag
    pub async fn resolve_tag(&self, address: &TagAddress) -> Result<(TagBinding, SecretRecord)> {
        let binding = self
            .bindings
            .find_binding(&address.application, &address.environment, &address.tag)
            .await?
            .ok_or_else(|| Error::not_found("tag_binding", address.to_string()))?;

        let record_id = binding
            .features
            .secret_id
            .clone()
            .ok_or_else(|| Error::not_found("secret_record", address.to_string()))?;

        let record = self
            .records
            .get_record_by_id(&record_id)
            .await?
            .ok_or_else(|| Error::not_found("secret_record", record_id.as_str()))?;

        Ok((binding, record))
    }

    /// Tags bound to one application/environment
    pub async fn list_tags(
        &self,
        application: &ApplicationRef,
        environment: &EnvironmentRef,
    ) -> Result<Vec<TagBinding>> {
        self.bindings.list_bindings(&application.id, &environment.id).await
    }

    /// Current values of a tag merged with its base
    #[instrument(skip(self), fields(tag = %address), name = "tag_secret_get_merged")]
    pub async fn get_merged(&self, address: &TagAddress) -> Result<MergedSecretView> {
        let (binding, record) = self.resolve_tag(address).await?;
        let payload = self.backend.get(&record.backend_secret_id, None).await?;

        let view = if binding.is_base() {
            inheritance::unmerged(&payload.key_values)
        } else {
            match self.base_values(address).await? {
                Some(base) => inheritance::merge(&base, &payload.key_values),
                None => inheritance::unmerged(&payload.key_values),
            }
        };

        Ok(view.with_current_version(payload.version_id))
    }

    /// Raw content of one version of a tag, without inheritance
    #[instrument(skip(self), fields(tag = %address), name = "tag_secret_get_version")]
    pub async fn get_version(
        &self,
        address: &TagAddress,
        version_id: &str,
    ) -> Result<SecretPayload> {
        let (_, record) = self.resolve_tag(address).await?;
        self.backend.get(&record.backend_secret_id, Some(version_id)).await
    }

    /// Overlay `delta` onto the current values and write a new version
    ///
    /// With `expected_version` the write fails with `VersionConflict` unless
    /// that is still the current version.
    #[instrument(
        skip(self, delta, actor),
        fields(tag = %address, keys = delta.len(), actor = %actor.id),
        name = "tag_secret_update"
    )]
    pub async fn update(
        &self,
        address: &TagAddress,
        delta: &SecretKeyValues,
        actor: &Actor,
        expected_version: Option<&str>,
    ) -> Result<SecretWriteOutcome> {
        if delta.is_empty() {
            return Err(Error::validation_field("No keys to update", "secret"));
        }

        let (_, record) = self.resolve_tag(address).await?;
        let current = self.backend.get(&record.backend_secret_id, None).await?;
        self.check_expected(&record, &current, expected_version)?;

        let mut values = current.key_values.clone();
        values.apply(delta);

        let metadata = LedgerMetadata {
            actor_id: actor.id.clone(),
            actor_name: actor.name.clone(),
            keys: delta.key_names(),
            ..Default::default()
        };
        self.write_version(&record, &current, &values, metadata).await
    }

    /// Remove keys from a tag and write a new version
    ///
    /// Unknown keys are ignored. When none of the keys exist nothing is
    /// written and the current version is returned.
    #[instrument(
        skip(self, keys, actor),
        fields(tag = %address, keys = keys.len(), actor = %actor.id),
        name = "tag_secret_delete_keys"
    )]
    pub async fn delete_keys(
        &self,
        address: &TagAddress,
        keys: &[String],
        actor: &Actor,
        expected_version: Option<&str>,
    ) -> Result<SecretWriteOutcome> {
        if keys.is_empty() {
            return Err(Error::validation_field("No keys to delete", "keys"));
        }

        let (_, record) = self.resolve_tag(address).await?;
        let current = self.backend.get(&record.backend_secret_id, None).await?;
        self.check_expected(&record, &current, expected_version)?;

        let mut values = current.key_values.clone();
        let mut deleted: Vec<String> =
            keys.iter().filter(|key| values.remove(key).is_some()).cloned().collect();
        deleted.sort();
        deleted.dedup();

        if deleted.is_empty() {
            info!(version_id = %current.version_id, "No matching keys to delete");
            return Ok(SecretWriteOutcome {
                backend_id: record.backend_secret_id.clone(),
                display_name: record.metadata.display_name.clone(),
                version_id: current.version_id,
            });
        }

        let metadata = LedgerMetadata {
            actor_id: actor.id.clone(),
            actor_name: actor.name.clone(),
            deleted_keys: deleted,
            ..Default::default()
        };
        self.write_version(&record, &current, &values, metadata).await
    }

    /// Create the tag's backend secret, record and binding in every environment
    ///
    /// Environments run concurrently and independently.
    #[instrument(
        skip(self, environments, initial, actor),
        fields(application = %application.name, tag = %tag_name, environments = environments.len()),
        name = "tag_secret_provision"
    )]
    pub async fn provision(
        &self,
        application: &ApplicationRef,
        environments: &[EnvironmentRef],
        tag_name: &str,
        initial: &SecretKeyValues,
        actor: &Actor,
    ) -> Result<ProvisionReport> {
        if tag_name.is_empty() {
            return Err(Error::validation_field("Tag name cannot be empty", "tag"));
        }

        let outcomes = join_all(environments.iter().map(|environment| async move {
            let result =
                self.provision_one(application, environment, tag_name, initial, actor).await;
            (environment, result)
        }))
        .await;

        let mut report = ProvisionReport::default();
        for (environment, result) in outcomes {
            match result {
                Ok(provisioned) => report.succeeded.push(provisioned),
                Err(error) => {
                    warn!(
                        environment = %environment.name,
                        error = %error,
                        "Provisioning failed for environment"
                    );
                    report
                        .failed
                        .push(ProvisionFailure { environment: environment.clone(), error });
                }
            }
        }

        metrics::record_provisions(report.succeeded.len(), report.failed.len());
        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "Tag provisioning finished"
        );

        Ok(report)
    }

    async fn provision_one(
        &self,
        application: &ApplicationRef,
        environment: &EnvironmentRef,
        tag_name: &str,
        initial: &SecretKeyValues,
        actor: &Actor,
    ) -> Result<ProvisionedTag> {
        let address = TagAddress::new(&application.name, &environment.name, tag_name);
        self.ensure_unbound(application, environment, &address).await?;

        let name = address.secret_name();
        let tags = BTreeMap::from([
            ("applicationId".to_string(), application.id.to_string()),
            ("environmentId".to_string(), environment.id.to_string()),
            ("tagName".to_string(), tag_name.to_string()),
        ]);

        let created = match self
            .backend
            .create(CreateSecretInput {
                name: name.clone(),
                key_values: initial.clone(),
                tags: tags.clone(),
                description: Some(format!(
                    "{} secret of {} in {}",
                    tag_name, application.name, environment.name
                )),
            })
            .await
        {
            Ok(created) => created,
            Err(e) if e.is_already_exists() => match self.adopt_orphan(&name, &tags).await? {
                Some(adopted) => adopted,
                None => return Err(e),
            },
            Err(e) => return Err(e),
        };

        let stored = self
            .records
            .create_record_with_binding(
                CreateSecretRecordRequest {
                    backend_secret_id: created.backend_id.clone(),
                    current_version_id: created.version_id.clone(),
                    metadata: SecretRecordMetadata {
                        application_id: application.id.clone(),
                        environment_id: environment.id.clone(),
                        tag_name: tag_name.to_string(),
                        display_name: created.display_name.clone(),
                        provider: self.backend.backend_type(),
                    },
                },
                CreateTagBindingRequest {
                    application: application.clone(),
                    environment: environment.clone(),
                    tag_name: tag_name.to_string(),
                    features: TagFeatures::default(),
                },
            )
            .await;

        let (record, binding) = match stored {
            Ok(stored) => stored,
            Err(e) => {
                warn!(
                    secret_name = %name,
                    backend_id = %created.backend_id,
                    error = %e,
                    "Backend secret orphaned; a retry adopts it"
                );
                metrics::record_provision_orphan();
                return Err(e);
            }
        };

        self.append_ledger(CreateLedgerEntryRequest {
            entity_id: record.local_id.clone(),
            version: created.version_id.clone(),
            from_version: None,
            operation: LedgerOperation::Create,
            metadata: LedgerMetadata {
                actor_id: actor.id.clone(),
                actor_name: actor.name.clone(),
                keys: initial.key_names(),
                ..Default::default()
            },
        })
        .await;

        info!(secret_name = %name, version_id = %created.version_id, "Tag secret provisioned");

        Ok(ProvisionedTag { environment: environment.clone(), record, binding })
    }

    /// Fail before touching the backend when the tag is already bound, by
    /// names or by ids
    async fn ensure_unbound(
        &self,
        application: &ApplicationRef,
        environment: &EnvironmentRef,
        address: &TagAddress,
    ) -> Result<()> {
        let bound = self
            .bindings
            .find_binding(&address.application, &address.environment, &address.tag)
            .await?
            .is_some()
            || self
                .bindings
                .list_bindings(&application.id, &environment.id)
                .await?
                .iter()
                .any(|binding| binding.name == address.tag);

        if bound {
            return Err(Error::already_exists("tag_binding", address.to_string()));
        }
        Ok(())
    }

    /// Take over a backend secret an earlier provision created but never
    /// recorded. Only a secret carrying exactly our scope tags qualifies.
    async fn adopt_orphan(
        &self,
        name: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<Option<SecretWriteOutcome>> {
        let existing = self.backend.get(name, None).await?;
        let matches = tags.iter().all(|(key, value)| existing.tags.get(key) == Some(value));
        if !matches {
            return Ok(None);
        }

        info!(
            secret_name = %name,
            version_id = %existing.version_id,
            "Adopting orphaned backend secret"
        );
        metrics::record_provision_adoption();

        Ok(Some(SecretWriteOutcome {
            backend_id: name.to_string(),
            display_name: name.to_string(),
            version_id: existing.version_id,
        }))
    }

    /// Backend versions of a tag joined with its ledger history
    #[instrument(skip(self), fields(tag = %address), name = "tag_secret_timeline")]
    pub async fn timeline(&self, address: &TagAddress) -> Result<CombinedTimeline> {
        let (_, record) = self.resolve_tag(address).await?;
        let history = self.ledger.get_version_history(&record.local_id).await?;
        let versions = self.backend.list_versions(&record.backend_secret_id).await?;

        let gaps = chain_gaps(&history);
        if !gaps.is_empty() {
            warn!(gaps = gaps.len(), secret_id = %record.local_id, "Ledger chain has gaps");
            metrics::record_ledger_gaps(gaps.len());
        }

        Ok(reconcile(&history, &versions))
    }

    /// Write the content of `revert_to_version_id` back as a new version
    pub async fn revert(
        &self,
        address: &TagAddress,
        current_version_id: &str,
        revert_to_version_id: &str,
        actor: &Actor,
    ) -> Result<RevertReport> {
        let (_, record) = self.resolve_tag(address).await?;

        RevertOrchestrator::new(
            Arc::clone(&self.backend),
            Arc::clone(&self.ledger),
            Arc::clone(&self.records),
            self.mode,
        )
        .execute(RevertRequest {
            record,
            current_version_id: current_version_id.to_string(),
            revert_to_version_id: revert_to_version_id.to_string(),
            actor: actor.clone(),
        })
        .await
    }

    /// Values of the base tag, or `None` when no base can be resolved
    async fn base_values(&self, address: &TagAddress) -> Result<Option<SecretKeyValues>> {
        let base = address.base();

        let record = match self.resolve_tag(&base).await {
            Ok((_, record)) => record,
            Err(e) if e.is_not_found() => {
                warn!(
                    base = %base,
                    error = %e,
                    "Base tag unresolved; serving tag without inheritance"
                );
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        match self.backend.get(&record.backend_secret_id, None).await {
            Ok(payload) => Ok(Some(payload.key_values)),
            Err(e) if e.is_not_found() => {
                warn!(
                    base = %base,
                    error = %e,
                    "Base secret missing at backend; serving tag without inheritance"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn check_expected(
        &self,
        record: &SecretRecord,
        current: &SecretPayload,
        expected_version: Option<&str>,
    ) -> Result<()> {
        match expected_version {
            Some(expected) if expected != current.version_id => Err(Error::version_conflict(
                &record.metadata.display_name,
                expected,
                &current.version_id,
            )),
            _ => Ok(()),
        }
    }

    async fn write_version(
        &self,
        record: &SecretRecord,
        current: &SecretPayload,
        values: &SecretKeyValues,
        metadata: LedgerMetadata,
    ) -> Result<SecretWriteOutcome> {
        if self.mode.checks_version() {
            let versions = self.backend.list_versions(&record.backend_secret_id).await?;
            let live = versions.current().map(|v| v.version_id.as_str()).unwrap_or("");
            if live != current.version_id {
                return Err(Error::version_conflict(
                    &record.metadata.display_name,
                    &current.version_id,
                    live,
                ));
            }
        }

        let written = self.backend.update(&record.backend_secret_id, values, None).await?;

        if let Err(e) = self
            .records
            .update_versions(
                &record.local_id,
                &written.version_id,
                Some(current.version_id.as_str()),
            )
            .await
        {
            warn!(
                secret_id = %record.local_id,
                error = %e,
                "Secret record refresh failed after write"
            );
            metrics::record_record_refresh_failure();
        }

        self.append_ledger(CreateLedgerEntryRequest {
            entity_id: record.local_id.clone(),
            version: written.version_id.clone(),
            from_version: Some(current.version_id.clone()),
            operation: LedgerOperation::Update,
            metadata,
        })
        .await;

        info!(
            secret_name = %record.metadata.display_name,
            from_version = %current.version_id,
            version_id = %written.version_id,
            "Tag secret written"
        );

        Ok(written)
    }

    async fn append_ledger(&self, request: CreateLedgerEntryRequest) {
        let operation = request.operation;
        let version = request.version.clone();

        if let Err(e) = self.ledger.create_version_record(request).await {
            warn!(
                operation = %operation,
                version = %version,
                error = %e,
                "Ledger append failed; ledger has a gap"
            );
            metrics::record_ledger_write_failure(operation);
        }
    }
}
