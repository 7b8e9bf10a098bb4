//! Point-in-time revert
//!
//! A revert writes the content of an older version back as a brand new
//! backend version, then records a REVERT ledger entry. Each request walks
//!
//! ```text
//! Requested -> FetchingTarget -> FetchingCurrent -> WritingBackend -> RecordingLedger -> Done
//! ```
//!
//! and may drop to `Failed` from any step before `RecordingLedger`. The fetch
//! steps are read-only, so a failure there leaves nothing behind. A failed
//! backend write leaves local state untouched, though the backend may or may
//! not have applied it; callers re-read before retrying. Once the backend
//! write succeeded the revert is reported successful even if the ledger
//! append or the record refresh fails, because the backend is authoritative.

use super::backends::{RevertOutcome, SecretBackend};
use super::ConcurrencyMode;
use crate::domain::{Actor, LedgerEntry, LedgerMetadata, LedgerOperation, SecretRecord};
use crate::errors::{Error, Result};
use crate::observability::metrics;
use crate::storage::{CreateLedgerEntryRequest, SecretRecordRepository, VersionLedgerRepository};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Step of a revert request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RevertState {
    Requested,
    FetchingTarget,
    FetchingCurrent,
    WritingBackend,
    RecordingLedger,
    Done,
    Failed,
}

impl RevertState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "REQUESTED",
            Self::FetchingTarget => "FETCHING_TARGET",
            Self::FetchingCurrent => "FETCHING_CURRENT",
            Self::WritingBackend => "WRITING_BACKEND",
            Self::RecordingLedger => "RECORDING_LEDGER",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }

    /// Whether the request ends in this state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for RevertState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A revert of one tag secret
#[derive(Debug, Clone)]
pub struct RevertRequest {
    pub record: SecretRecord,
    /// The version the caller believes is current
    pub current_version_id: String,
    pub revert_to_version_id: String,
    pub actor: Actor,
}

/// Result of a successful revert
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevertReport {
    pub outcome: RevertOutcome,
    /// `None` when the ledger append failed after the backend write
    pub ledger_entry: Option<LedgerEntry>,
    /// `None` when the record pointers could not be refreshed
    pub record: Option<SecretRecord>,
    /// Every state the request passed through, `Requested` to `Done`
    pub states: Vec<RevertState>,
}

impl RevertReport {
    pub fn ledger_recorded(&self) -> bool {
        self.ledger_entry.is_some()
    }
}

#[derive(Debug)]
struct StateTrail {
    states: Vec<RevertState>,
}

impl StateTrail {
    fn new() -> Self {
        Self { states: vec![RevertState::Requested] }
    }

    fn enter(&mut self, state: RevertState) {
        debug!(from = %self.current(), to = %state, "Revert state transition");
        self.states.push(state);
    }

    fn current(&self) -> RevertState {
        self.states.last().copied().unwrap_or(RevertState::Requested)
    }
}

/// Drives revert requests against one backend client
#[derive(Clone)]
pub struct RevertOrchestrator {
    backend: Arc<dyn SecretBackend>,
    ledger: Arc<dyn VersionLedgerRepository>,
    records: Arc<dyn SecretRecordRepository>,
    mode: ConcurrencyMode,
}

impl fmt::Debug for RevertOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RevertOrchestrator")
            .field("backend", &self.backend.backend_type())
            .field("mode", &self.mode)
            .finish()
    }
}

impl RevertOrchestrator {
    pub fn new(
        backend: Arc<dyn SecretBackend>,
        ledger: Arc<dyn VersionLedgerRepository>,
        records: Arc<dyn SecretRecordRepository>,
        mode: ConcurrencyMode,
    ) -> Self {
        Self { backend, ledger, records, mode }
    }

    /// Run one revert request to `Done` or `Failed`
    #[instrument(
        skip(self, request),
        fields(
            secret = %request.record.metadata.display_name,
            current_version_id = %request.current_version_id,
            revert_to_version_id = %request.revert_to_version_id
        ),
        name = "secret_revert"
    )]
    pub async fn execute(&self, request: RevertRequest) -> Result<RevertReport> {
        let mut trail = StateTrail::new();

        match self.run(&request, &mut trail).await {
            Ok(report) => {
                metrics::record_revert("success");
                Ok(report)
            }
            Err(e) => {
                let failed_at = trail.current();
                trail.enter(RevertState::Failed);
                warn!(failed_at = %failed_at, error = %e, "Revert failed");
                metrics::record_revert("failed");
                Err(e)
            }
        }
    }

    async fn run(&self, request: &RevertRequest, trail: &mut StateTrail) -> Result<RevertReport> {
        let secret_id = request.record.backend_secret_id.as_str();
        let current = request.current_version_id.as_str();
        let target = request.revert_to_version_id.as_str();

        if current == target {
            return Err(Error::validation_field(
                format!("Version '{}' is already current", target),
                "revert_to_version_id",
            ));
        }

        trail.enter(RevertState::FetchingTarget);
        let target_payload = self.backend.get(secret_id, Some(target)).await?;

        trail.enter(RevertState::FetchingCurrent);
        self.backend.get(secret_id, Some(current)).await?;
        if self.mode.checks_version() {
            self.ensure_current(request, secret_id).await?;
        }

        trail.enter(RevertState::WritingBackend);
        let outcome = self.backend.revert_to_version(secret_id, current, target).await?;

        trail.enter(RevertState::RecordingLedger);
        let record = self.refresh_record(request, &outcome).await;
        let ledger_entry =
            self.append_ledger(request, &outcome, target_payload.key_values.key_names()).await;

        trail.enter(RevertState::Done);
        info!(
            new_current_version = %outcome.new_current_version,
            ledger_recorded = ledger_entry.is_some(),
            "Secret reverted"
        );

        Ok(RevertReport { outcome, ledger_entry, record, states: trail.states.clone() })
    }

    async fn ensure_current(&self, request: &RevertRequest, secret_id: &str) -> Result<()> {
        let versions = self.backend.list_versions(secret_id).await?;
        let live = versions.current().map(|v| v.version_id.as_str()).unwrap_or("");

        if live != request.current_version_id {
            return Err(Error::version_conflict(
                &request.record.metadata.display_name,
                &request.current_version_id,
                live,
            ));
        }
        Ok(())
    }

    async fn refresh_record(
        &self,
        request: &RevertRequest,
        outcome: &RevertOutcome,
    ) -> Option<SecretRecord> {
        match self
            .records
            .update_versions(
                &request.record.local_id,
                &outcome.new_current_version,
                Some(outcome.new_last_version.as_str()),
            )
            .await
        {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(
                    secret_id = %request.record.local_id,
                    error = %e,
                    "Secret record refresh failed after revert"
                );
                metrics::record_record_refresh_failure();
                None
            }
        }
    }

    async fn append_ledger(
        &self,
        request: &RevertRequest,
        outcome: &RevertOutcome,
        keys: Vec<String>,
    ) -> Option<LedgerEntry> {
        let entry = CreateLedgerEntryRequest {
            entity_id: request.record.local_id.clone(),
            version: outcome.new_current_version.clone(),
            from_version: Some(outcome.new_last_version.clone()),
            operation: LedgerOperation::Revert,
            metadata: LedgerMetadata {
                actor_id: request.actor.id.clone(),
                actor_name: request.actor.name.clone(),
                keys,
                deleted_keys: Vec::new(),
                reverted_to_version: Some(request.revert_to_version_id.clone()),
            },
        };

        match self.ledger.create_version_record(entry).await {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(
                    secret_id = %request.record.local_id,
                    version = %outcome.new_current_version,
                    error = %e,
                    "Ledger append failed after revert; ledger has a gap"
                );
                metrics::record_ledger_write_failure(LedgerOperation::Revert);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ApplicationId, EnvironmentId, SecretKeyValues, SecretRecordId, SecretRecordMetadata,
        SecretVersionList,
    };
    use crate::secrets::backends::{
        CreateSecretInput, InMemorySecretBackend, SecretBackendType, SecretPayload,
        SecretWriteOutcome,
    };
    use crate::storage::test_helpers::migrated_pool;
    use crate::storage::{
        CreateSecretRecordRequest, SqlxSecretRecordRepository, SqlxVersionLedgerRepository,
    };
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use tracing_test::traced_test;

    fn kv(pairs: &[(&str, &str)]) -> SecretKeyValues {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    /// Reads from a shared in-memory store but rejects every write
    #[derive(Debug)]
    struct ReadOnlyBackend {
        inner: Arc<InMemorySecretBackend>,
    }

    #[async_trait]
    impl SecretBackend for ReadOnlyBackend {
        async fn create(&self, _input: CreateSecretInput) -> Result<SecretWriteOutcome> {
            Err(Error::backend_unavailable("write rejected"))
        }

        async fn get(&self, secret_id: &str, version_id: Option<&str>) -> Result<SecretPayload> {
            self.inner.get(secret_id, version_id).await
        }

        async fn list_versions(&self, secret_id: &str) -> Result<SecretVersionList> {
            self.inner.list_versions(secret_id).await
        }

        async fn update(
            &self,
            _secret_id: &str,
            _key_values: &SecretKeyValues,
            _description: Option<&str>,
        ) -> Result<SecretWriteOutcome> {
            Err(Error::backend_unavailable("write rejected"))
        }

        fn backend_type(&self) -> SecretBackendType {
            SecretBackendType::Memory
        }

        async fn health_check(&self) -> Result<()> {
            Ok(())
        }
    }

    struct OfflineLedger;

    #[async_trait]
    impl VersionLedgerRepository for OfflineLedger {
        async fn create_version_record(
            &self,
            _request: CreateLedgerEntryRequest,
        ) -> Result<LedgerEntry> {
            Err(Error::internal("ledger offline"))
        }

        async fn get_version_history(
            &self,
            _entity_id: &SecretRecordId,
        ) -> Result<Vec<LedgerEntry>> {
            Ok(Vec::new())
        }
    }

    struct Fixture {
        store: Arc<InMemorySecretBackend>,
        backend: Arc<dyn SecretBackend>,
        ledger: Arc<SqlxVersionLedgerRepository>,
        records: Arc<SqlxSecretRecordRepository>,
        record: SecretRecord,
        v1: String,
        v2: String,
    }

    /// A secret at v1 = {X: a}, v2 = {X: b}
    async fn fixture() -> Fixture {
        let pool = migrated_pool().await;
        let ledger = Arc::new(SqlxVersionLedgerRepository::new(pool.clone()));
        let records = Arc::new(SqlxSecretRecordRepository::new(pool));
        let store = Arc::new(InMemorySecretBackend::new());

        let created = store
            .create(CreateSecretInput {
                name: "payments_staging_blue".to_string(),
                key_values: kv(&[("X", "a")]),
                tags: BTreeMap::new(),
                description: Some("blue".to_string()),
            })
            .await
            .unwrap();
        let v2 = store
            .update(&created.backend_id, &kv(&[("X", "b")]), None)
            .await
            .unwrap()
            .version_id;

        let record = records
            .create_record(CreateSecretRecordRequest {
                backend_secret_id: created.backend_id.clone(),
                current_version_id: v2.clone(),
                metadata: SecretRecordMetadata {
                    application_id: ApplicationId::from("app-1"),
                    environment_id: EnvironmentId::from("env-1"),
                    tag_name: "blue".to_string(),
                    display_name: created.display_name.clone(),
                    provider: SecretBackendType::Memory,
                },
            })
            .await
            .unwrap();

        let backend: Arc<dyn SecretBackend> = store.clone();
        Fixture { store, backend, ledger, records, record, v1: created.version_id, v2 }
    }

    fn orchestrator(fx: &Fixture, mode: ConcurrencyMode) -> RevertOrchestrator {
        RevertOrchestrator::new(
            Arc::clone(&fx.backend),
            fx.ledger.clone(),
            fx.records.clone(),
            mode,
        )
    }

    fn request(fx: &Fixture, current: &str, target: &str) -> RevertRequest {
        RevertRequest {
            record: fx.record.clone(),
            current_version_id: current.to_string(),
            revert_to_version_id: target.to_string(),
            actor: Actor::new("u-1", "Ada"),
        }
    }

    #[tokio::test]
    async fn test_revert_writes_new_version_and_ledger_entry() {
        let fx = fixture().await;
        let report = orchestrator(&fx, ConcurrencyMode::LastWriteWins)
            .execute(request(&fx, &fx.v2, &fx.v1))
            .await
            .unwrap();

        let v3 = report.outcome.new_current_version.clone();
        assert_ne!(v3, fx.v1);
        assert_ne!(v3, fx.v2);
        assert_eq!(report.outcome.new_last_version, fx.v2);

        let secret_id = &fx.record.backend_secret_id;
        let current = fx.backend.get(secret_id, None).await.unwrap();
        assert_eq!(current.version_id, v3);
        assert_eq!(current.key_values, kv(&[("X", "a")]));
        assert_eq!(current.description.as_deref(), Some("blue"));

        // Both older versions stay retrievable
        let v1 = fx.backend.get(secret_id, Some(&fx.v1)).await.unwrap();
        let v2 = fx.backend.get(secret_id, Some(&fx.v2)).await.unwrap();
        assert_eq!(v1.key_values, kv(&[("X", "a")]));
        assert_eq!(v2.key_values, kv(&[("X", "b")]));

        let entry = report.ledger_entry.clone().unwrap();
        assert_eq!(entry.operation, LedgerOperation::Revert);
        assert_eq!(entry.version, v3);
        assert_eq!(entry.from_version.as_deref(), Some(fx.v2.as_str()));
        assert_eq!(entry.metadata.reverted_to_version.as_deref(), Some(fx.v1.as_str()));
        assert_eq!(entry.metadata.keys, vec!["X"]);

        let history = fx.ledger.get_version_history(&fx.record.local_id).await.unwrap();
        assert_eq!(history.len(), 1);

        let record = report.record.clone().unwrap();
        assert_eq!(record.current_version_id, v3);
        assert_eq!(record.last_version_id.as_deref(), Some(fx.v2.as_str()));

        assert_eq!(
            report.states,
            vec![
                RevertState::Requested,
                RevertState::FetchingTarget,
                RevertState::FetchingCurrent,
                RevertState::WritingBackend,
                RevertState::RecordingLedger,
                RevertState::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_repeated_revert_produces_another_version_with_same_content() {
        let fx = fixture().await;
        let orchestrator = orchestrator(&fx, ConcurrencyMode::LastWriteWins);

        let first = orchestrator.execute(request(&fx, &fx.v2, &fx.v1)).await.unwrap();
        let v3 = first.outcome.new_current_version;
        let second = orchestrator.execute(request(&fx, &v3, &fx.v1)).await.unwrap();
        let v4 = second.outcome.new_current_version;

        assert_ne!(v3, v4);
        let secret_id = &fx.record.backend_secret_id;
        let v3_content = fx.backend.get(secret_id, Some(&v3)).await.unwrap().key_values;
        let v4_content = fx.backend.get(secret_id, Some(&v4)).await.unwrap().key_values;
        assert_eq!(v3_content, kv(&[("X", "a")]));
        assert_eq!(v4_content, v3_content);
    }

    #[tokio::test]
    async fn test_missing_target_fails_without_side_effects() {
        let fx = fixture().await;
        let err = orchestrator(&fx, ConcurrencyMode::LastWriteWins)
            .execute(request(&fx, &fx.v2, "no-such-version"))
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        let versions = fx.backend.list_versions(&fx.record.backend_secret_id).await.unwrap();
        assert_eq!(versions.versions.len(), 2);
        assert!(fx.ledger.get_version_history(&fx.record.local_id).await.unwrap().is_empty());
    }

    #[traced_test]
    #[tokio::test]
    async fn test_unknown_current_fails_while_fetching_current() {
        let fx = fixture().await;
        let err = orchestrator(&fx, ConcurrencyMode::LastWriteWins)
            .execute(request(&fx, "no-such-version", &fx.v1))
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert!(logs_contain("failed_at=FETCHING_CURRENT"));
        let versions = fx.backend.list_versions(&fx.record.backend_secret_id).await.unwrap();
        assert_eq!(versions.versions.len(), 2);
        assert!(fx.ledger.get_version_history(&fx.record.local_id).await.unwrap().is_empty());
        let record = fx.records.get_record_by_id(&fx.record.local_id).await.unwrap().unwrap();
        assert_eq!(record.current_version_id, fx.v2);
    }

    #[tokio::test]
    async fn test_revert_to_current_is_rejected() {
        let fx = fixture().await;
        let err = orchestrator(&fx, ConcurrencyMode::LastWriteWins)
            .execute(request(&fx, &fx.v2, &fx.v2))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[traced_test]
    #[tokio::test]
    async fn test_backend_write_failure_leaves_local_state_untouched() {
        let fx = fixture().await;
        let fx = Fixture {
            backend: Arc::new(ReadOnlyBackend { inner: Arc::clone(&fx.store) }),
            ..fx
        };

        let err = orchestrator(&fx, ConcurrencyMode::LastWriteWins)
            .execute(request(&fx, &fx.v2, &fx.v1))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::BackendUnavailable { .. }));
        assert!(logs_contain("failed_at=WRITING_BACKEND"));
        assert!(fx.ledger.get_version_history(&fx.record.local_id).await.unwrap().is_empty());
        let record = fx.records.get_record_by_id(&fx.record.local_id).await.unwrap().unwrap();
        assert_eq!(record.current_version_id, fx.v2);
        let versions = fx.store.list_versions(&fx.record.backend_secret_id).await.unwrap();
        assert_eq!(versions.versions.len(), 2);
    }

    #[traced_test]
    #[tokio::test]
    async fn test_ledger_failure_still_reports_success() {
        let fx = fixture().await;
        let orchestrator = RevertOrchestrator::new(
            Arc::clone(&fx.backend),
            Arc::new(OfflineLedger),
            fx.records.clone(),
            ConcurrencyMode::LastWriteWins,
        );

        let report = orchestrator.execute(request(&fx, &fx.v2, &fx.v1)).await.unwrap();

        assert!(!report.ledger_recorded());
        assert_eq!(report.states.last(), Some(&RevertState::Done));
        assert!(logs_contain("Ledger append failed after revert"));

        let current = fx.backend.get(&fx.record.backend_secret_id, None).await.unwrap();
        assert_eq!(current.version_id, report.outcome.new_current_version);
        assert_eq!(current.key_values, kv(&[("X", "a")]));
    }

    #[tokio::test]
    async fn test_check_and_set_rejects_stale_current() {
        let fx = fixture().await;
        // Someone else wrote v3 after the caller read v2
        fx.backend
            .update(&fx.record.backend_secret_id, &kv(&[("X", "c")]), None)
            .await
            .unwrap();

        let err = orchestrator(&fx, ConcurrencyMode::CheckAndSet)
            .execute(request(&fx, &fx.v2, &fx.v1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::VersionConflict { .. }));

        let versions = fx.backend.list_versions(&fx.record.backend_secret_id).await.unwrap();
        assert_eq!(versions.versions.len(), 3);

        // Last-write-wins lets the same stale request through
        let report = orchestrator(&fx, ConcurrencyMode::LastWriteWins)
            .execute(request(&fx, &fx.v2, &fx.v1))
            .await
            .unwrap();
        assert_eq!(report.outcome.new_last_version, fx.v2);
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(RevertState::WritingBackend.to_string(), "WRITING_BACKEND");
        assert!(RevertState::Done.is_terminal());
        assert!(RevertState::Failed.is_terminal());
        assert!(!RevertState::RecordingLedger.is_terminal());
    }
}
