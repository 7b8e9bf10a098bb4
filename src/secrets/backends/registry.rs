//! Secret backend registry
//!
//! Selects a backend implementation by provider name and hands out clients
//! for a given set of tenant credentials. Constructed clients are wrapped in
//! the per-call timeout decorator and kept in a bounded [`BackendClientCache`]
//! keyed by a SHA-256 fingerprint of (provider, credential settings).

use super::backend::{SecretBackend, SecretBackendType};
use super::cache::BackendClientCache;
use super::memory::InMemorySecretBackend;
use super::timeout::{TimeoutSecretBackend, DEFAULT_CALL_TIMEOUT};
use super::vault::{VaultBackendConfig, VaultSecretBackend};
use crate::errors::{Error, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use zeroize::Zeroizing;

/// Provider plus the settings needed to reach it
///
/// Setting values are wiped from memory on drop and never printed.
#[derive(Clone)]
pub struct BackendCredentials {
    provider: SecretBackendType,
    settings: BTreeMap<String, Zeroizing<String>>,
}

impl std::fmt::Debug for BackendCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendCredentials")
            .field("provider", &self.provider)
            .field("settings", &self.settings.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl BackendCredentials {
    pub fn new(provider: SecretBackendType) -> Self {
        Self { provider, settings: BTreeMap::new() }
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), Zeroizing::new(value.into()));
        self
    }

    /// Add a setting only when a value is present
    pub fn with_optional_setting(self, key: impl Into<String>, value: Option<String>) -> Self {
        match value {
            Some(value) => self.with_setting(key, value),
            None => self,
        }
    }

    pub fn provider(&self) -> SecretBackendType {
        self.provider
    }

    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(|value| value.as_str())
    }

    /// Stable hex-encoded SHA-256 over the provider and every setting.
    ///
    /// Each field is length-prefixed, so no two distinct setting maps hash
    /// the same input.
    pub fn fingerprint(&self) -> String {
        fn field(hasher: &mut Sha256, bytes: &[u8]) {
            hasher.update((bytes.len() as u64).to_be_bytes());
            hasher.update(bytes);
        }

        let mut hasher = Sha256::new();
        field(&mut hasher, self.provider.as_str().as_bytes());
        for (key, value) in &self.settings {
            field(&mut hasher, key.as_bytes());
            field(&mut hasher, value.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// Builds a client for one provider family
#[async_trait]
pub trait BackendFactory: Send + Sync {
    fn provider(&self) -> SecretBackendType;

    async fn build(&self, credentials: &BackendCredentials) -> Result<Arc<dyn SecretBackend>>;
}

/// Hands out one shared in-memory store regardless of credentials
#[derive(Debug, Default)]
pub struct MemoryBackendFactory {
    backend: Arc<InMemorySecretBackend>,
}

impl MemoryBackendFactory {
    pub fn new(backend: Arc<InMemorySecretBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl BackendFactory for MemoryBackendFactory {
    fn provider(&self) -> SecretBackendType {
        SecretBackendType::Memory
    }

    async fn build(&self, _credentials: &BackendCredentials) -> Result<Arc<dyn SecretBackend>> {
        Ok(self.backend.clone())
    }
}

#[derive(Debug, Default)]
pub struct VaultBackendFactory;

#[async_trait]
impl BackendFactory for VaultBackendFactory {
    fn provider(&self) -> SecretBackendType {
        SecretBackendType::Vault
    }

    async fn build(&self, credentials: &BackendCredentials) -> Result<Arc<dyn SecretBackend>> {
        let config = VaultBackendConfig::from_credentials(credentials)?;
        Ok(Arc::new(VaultSecretBackend::new(config)?))
    }
}

#[cfg(feature = "aws")]
#[derive(Debug, Default)]
pub struct AwsBackendFactory;

#[cfg(feature = "aws")]
#[async_trait]
impl BackendFactory for AwsBackendFactory {
    fn provider(&self) -> SecretBackendType {
        SecretBackendType::AwsSecretsManager
    }

    async fn build(&self, credentials: &BackendCredentials) -> Result<Arc<dyn SecretBackend>> {
        let backend = super::aws::AwsSecretsManagerBackend::from_credentials(credentials).await?;
        Ok(Arc::new(backend))
    }
}

/// Registry of backend factories with a client cache
#[derive(Clone)]
pub struct SecretBackendRegistry {
    factories: HashMap<SecretBackendType, Arc<dyn BackendFactory>>,
    cache: BackendClientCache,
    call_timeout: Duration,
}

impl std::fmt::Debug for SecretBackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretBackendRegistry")
            .field("providers", &self.registered_providers())
            .field("cache_capacity", &self.cache.capacity())
            .field("cache_ttl", &self.cache.ttl())
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

impl SecretBackendRegistry {
    /// Create a registry with no factories
    pub fn new(cache: BackendClientCache, call_timeout: Duration) -> Self {
        Self { factories: HashMap::new(), cache, call_timeout }
    }

    /// Registry with every provider compiled into this build
    pub fn with_default_factories(cache: BackendClientCache, call_timeout: Duration) -> Self {
        let mut registry = Self::new(cache, call_timeout);
        registry.register(Arc::new(MemoryBackendFactory::default()));
        registry.register(Arc::new(VaultBackendFactory));
        #[cfg(feature = "aws")]
        registry.register(Arc::new(AwsBackendFactory));
        registry
    }

    /// Register a factory, replacing any previous one for the same provider
    pub fn register(&mut self, factory: Arc<dyn BackendFactory>) {
        let provider = factory.provider();
        info!(provider = %provider, "Registering secret backend factory");
        self.factories.insert(provider, factory);
    }

    pub fn has_provider(&self, provider: SecretBackendType) -> bool {
        self.factories.contains_key(&provider)
    }

    pub fn registered_providers(&self) -> Vec<SecretBackendType> {
        let mut providers: Vec<_> = self.factories.keys().copied().collect();
        providers.sort();
        providers
    }

    /// Client for the given credentials, built on first use and cached
    pub async fn client_for(
        &self,
        credentials: &BackendCredentials,
    ) -> Result<Arc<dyn SecretBackend>> {
        let fingerprint = credentials.fingerprint();

        if let Some(client) = self.cache.get(&fingerprint).await {
            return Ok(client);
        }

        let factory = self.factories.get(&credentials.provider()).ok_or_else(|| {
            Error::config(format!("Backend provider '{}' not registered", credentials.provider()))
        })?;

        debug!(provider = %credentials.provider(), "Building secret backend client");
        let inner = factory.build(credentials).await?;
        let client: Arc<dyn SecretBackend> =
            Arc::new(TimeoutSecretBackend::new(inner, self.call_timeout));

        self.cache.insert(fingerprint, Arc::clone(&client)).await;
        Ok(client)
    }

    /// Health check through the client for `credentials`
    pub async fn health_check(&self, credentials: &BackendCredentials) -> Result<()> {
        self.client_for(credentials).await?.health_check().await
    }

    pub fn cache(&self) -> &BackendClientCache {
        &self.cache
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }
}

impl Default for SecretBackendRegistry {
    fn default() -> Self {
        Self::with_default_factories(BackendClientCache::default(), DEFAULT_CALL_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct CountingFactory {
        builds: AtomicUsize,
    }

    #[async_trait]
    impl BackendFactory for CountingFactory {
        fn provider(&self) -> SecretBackendType {
            SecretBackendType::Memory
        }

        async fn build(&self, _credentials: &BackendCredentials) -> Result<Arc<dyn SecretBackend>> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(InMemorySecretBackend::new()))
        }
    }

    #[test]
    fn test_fingerprint_is_stable_and_sensitive() {
        let a = BackendCredentials::new(SecretBackendType::Vault)
            .with_setting("address", "http://vault:8200")
            .with_setting("token", "s.one");
        let same = BackendCredentials::new(SecretBackendType::Vault)
            .with_setting("token", "s.one")
            .with_setting("address", "http://vault:8200");
        let other_token = BackendCredentials::new(SecretBackendType::Vault)
            .with_setting("address", "http://vault:8200")
            .with_setting("token", "s.two");
        let other_provider = BackendCredentials::new(SecretBackendType::Memory)
            .with_setting("address", "http://vault:8200")
            .with_setting("token", "s.one");

        assert_eq!(a.fingerprint(), same.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
        assert_ne!(a.fingerprint(), other_token.fingerprint());
        assert_ne!(a.fingerprint(), other_provider.fingerprint());
    }

    #[test]
    fn test_fingerprint_separates_keys_from_values() {
        let a = BackendCredentials::new(SecretBackendType::Vault).with_setting("a=", "b");
        let b = BackendCredentials::new(SecretBackendType::Vault).with_setting("a", "=b");
        assert_ne!(a.fingerprint(), b.fingerprint());

        let split = BackendCredentials::new(SecretBackendType::Vault)
            .with_setting("a", "")
            .with_setting("b", "c");
        let joined = BackendCredentials::new(SecretBackendType::Vault).with_setting("a", "\0bc");
        assert_ne!(split.fingerprint(), joined.fingerprint());
    }

    #[test]
    fn test_credentials_debug_hides_values() {
        let credentials = BackendCredentials::new(SecretBackendType::Vault)
            .with_setting("token", "s.super-secret");
        let debug = format!("{:?}", credentials);
        assert!(debug.contains("token"));
        assert!(!debug.contains("super-secret"));
    }

    #[tokio::test]
    async fn test_client_for_reuses_cached_client() {
        let factory = Arc::new(CountingFactory::default());
        let mut registry =
            SecretBackendRegistry::new(BackendClientCache::default(), DEFAULT_CALL_TIMEOUT);
        registry.register(factory.clone());

        let credentials = BackendCredentials::new(SecretBackendType::Memory);
        let first = registry.client_for(&credentials).await.unwrap();
        let second = registry.client_for(&credentials).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.builds.load(Ordering::SeqCst), 1);

        let tenant_b =
            BackendCredentials::new(SecretBackendType::Memory).with_setting("tenant", "b");
        registry.client_for(&tenant_b).await.unwrap();
        assert_eq!(factory.builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unregistered_provider_is_config_error() {
        let registry =
            SecretBackendRegistry::new(BackendClientCache::default(), DEFAULT_CALL_TIMEOUT);
        let err = registry
            .client_for(&BackendCredentials::new(SecretBackendType::Vault))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn test_default_registry_serves_memory_backend() {
        let registry = SecretBackendRegistry::default();
        assert!(registry.has_provider(SecretBackendType::Memory));
        assert!(registry.has_provider(SecretBackendType::Vault));

        let client =
            registry.client_for(&BackendCredentials::new(SecretBackendType::Memory)).await.unwrap();
        assert_eq!(client.backend_type(), SecretBackendType::Memory);
        client.health_check().await.unwrap();
    }

    #[tokio::test]
    async fn test_vault_factory_requires_address() {
        let registry = SecretBackendRegistry::default();
        let err = registry
            .client_for(&BackendCredentials::new(SecretBackendType::Vault))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
