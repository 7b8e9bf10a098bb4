//! Per-call timeout decorator
//!
//! Wraps any [`SecretBackend`] so that every call is bounded. An expired call
//! surfaces as `BackendUnavailable`; the wrapped call is dropped, which for the
//! HTTP-based providers cancels the in-flight request.

use super::backend::{
    CreateSecretInput, RevertOutcome, SecretBackend, SecretBackendType, SecretPayload,
    SecretWriteOutcome,
};
use crate::domain::{SecretKeyValues, SecretVersionList};
use crate::errors::{Error, Result};
use crate::observability::metrics;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Default bound applied to every backend call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(15);

/// Backend decorator bounding every call with a timeout
#[derive(Debug, Clone)]
pub struct TimeoutSecretBackend {
    inner: Arc<dyn SecretBackend>,
    timeout: Duration,
}

impl TimeoutSecretBackend {
    pub fn new(inner: Arc<dyn SecretBackend>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send,
    {
        let provider = self.inner.backend_type();
        let started = Instant::now();

        let result = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    provider = %provider,
                    operation = operation,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Secret backend call timed out"
                );
                Err(Error::backend_unavailable(format!(
                    "{} {} timed out after {:?}",
                    provider, operation, self.timeout
                )))
            }
        };

        metrics::record_backend_call(
            provider,
            operation,
            result.is_ok(),
            started.elapsed().as_secs_f64(),
        );
        result
    }
}

#[async_trait]
impl SecretBackend for TimeoutSecretBackend {
    async fn create(&self, input: CreateSecretInput) -> Result<SecretWriteOutcome> {
        self.bounded("create", self.inner.create(input)).await
    }

    async fn get(&self, secret_id: &str, version_id: Option<&str>) -> Result<SecretPayload> {
        self.bounded("get", self.inner.get(secret_id, version_id)).await
    }

    async fn list_versions(&self, secret_id: &str) -> Result<SecretVersionList> {
        self.bounded("list_versions", self.inner.list_versions(secret_id)).await
    }

    async fn update(
        &self,
        secret_id: &str,
        key_values: &SecretKeyValues,
        description: Option<&str>,
    ) -> Result<SecretWriteOutcome> {
        self.bounded("update", self.inner.update(secret_id, key_values, description)).await
    }

    async fn revert_to_version(
        &self,
        secret_id: &str,
        current_version_id: &str,
        revert_to_version_id: &str,
    ) -> Result<RevertOutcome> {
        self.bounded(
            "revert_to_version",
            self.inner.revert_to_version(secret_id, current_version_id, revert_to_version_id),
        )
        .await
    }

    fn backend_type(&self) -> SecretBackendType {
        self.inner.backend_type()
    }

    async fn health_check(&self) -> Result<()> {
        self.bounded("health_check", self.inner.health_check()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::backends::memory::InMemorySecretBackend;
    use std::collections::BTreeMap;

    #[derive(Debug)]
    struct StalledBackend;

    #[async_trait]
    impl SecretBackend for StalledBackend {
        async fn create(&self, _input: CreateSecretInput) -> Result<SecretWriteOutcome> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(Error::internal("unreachable"))
        }

        async fn get(&self, _secret_id: &str, _version_id: Option<&str>) -> Result<SecretPayload> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(Error::internal("unreachable"))
        }

        async fn list_versions(&self, _secret_id: &str) -> Result<SecretVersionList> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(Error::internal("unreachable"))
        }

        async fn update(
            &self,
            _secret_id: &str,
            _key_values: &SecretKeyValues,
            _description: Option<&str>,
        ) -> Result<SecretWriteOutcome> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(Error::internal("unreachable"))
        }

        fn backend_type(&self) -> SecretBackendType {
            SecretBackendType::Memory
        }

        async fn health_check(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_expired_call_maps_to_backend_unavailable() {
        let backend =
            TimeoutSecretBackend::new(Arc::new(StalledBackend), Duration::from_millis(20));

        let err = backend.get("payments_staging_base", None).await.unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable { .. }));
        assert!(err.is_retryable());
        assert!(err.to_string().contains("get timed out"));
    }

    #[tokio::test]
    async fn test_fast_calls_pass_through() {
        let backend = TimeoutSecretBackend::new(
            Arc::new(InMemorySecretBackend::new()),
            DEFAULT_CALL_TIMEOUT,
        );

        let created = backend
            .create(CreateSecretInput {
                name: "payments_staging_base".to_string(),
                key_values: [("A", "1")].into_iter().collect(),
                tags: BTreeMap::new(),
                description: None,
            })
            .await
            .unwrap();

        let payload = backend.get(&created.backend_id, None).await.unwrap();
        assert_eq!(payload.version_id, created.version_id);
        assert_eq!(backend.backend_type(), SecretBackendType::Memory);
    }

    #[tokio::test]
    async fn test_inner_errors_are_not_rewritten() {
        let backend = TimeoutSecretBackend::new(
            Arc::new(InMemorySecretBackend::new()),
            DEFAULT_CALL_TIMEOUT,
        );
        assert!(backend.get("missing", None).await.unwrap_err().is_not_found());
    }
}
