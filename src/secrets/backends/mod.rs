//! Pluggable secret backend architecture
//!
//! Every provider implements the [`SecretBackend`] capability set. Clients are
//! obtained per tenant credentials through the [`SecretBackendRegistry`].
//!
//! ## Supported Backends
//!
//! - **Memory**: process-local versioned store for development and tests
//! - **Vault**: HashiCorp Vault KV v2 engine
//! - **AWS Secrets Manager**: (Optional feature `aws`)

#[cfg(feature = "aws")]
pub mod aws;
pub mod backend;
pub mod cache;
pub mod memory;
pub mod registry;
pub mod timeout;
pub mod vault;

#[cfg(feature = "aws")]
pub use aws::AwsSecretsManagerBackend;
pub use backend::{
    CreateSecretInput, RevertOutcome, SecretBackend, SecretBackendType, SecretPayload,
    SecretWriteOutcome,
};
pub use cache::{BackendClientCache, DEFAULT_CLIENT_CACHE_CAPACITY};
pub use memory::InMemorySecretBackend;
pub use registry::{BackendCredentials, BackendFactory, SecretBackendRegistry};
pub use timeout::{TimeoutSecretBackend, DEFAULT_CALL_TIMEOUT};
pub use vault::{VaultBackendConfig, VaultSecretBackend};
