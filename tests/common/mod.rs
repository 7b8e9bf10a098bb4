//! Common test utilities for all integration tests.
//!
//! Every service runs against a fresh in-memory SQLite database and an
//! in-memory secret backend, so tests need no external services.

#![allow(dead_code)]

use std::sync::Arc;

use tagvault::config::DatabaseConfig;
use tagvault::domain::{
    Actor, ApplicationId, ApplicationRef, EnvironmentId, EnvironmentRef, SecretKeyValues,
};
use tagvault::secrets::{ConcurrencyMode, InMemorySecretBackend};
use tagvault::storage::{create_pool, DbPool};
use tagvault::{TagAddress, TagSecretService};

pub const APPLICATION: &str = "payments";
pub const ENVIRONMENT: &str = "staging";

/// Service plus handles on what it writes to
pub struct TestContext {
    pub service: TagSecretService,
    pub backend: Arc<InMemorySecretBackend>,
    pub pool: DbPool,
}

pub async fn test_context(mode: ConcurrencyMode) -> TestContext {
    let pool = create_pool(&DatabaseConfig::in_memory()).await.expect("create in-memory pool");
    let backend = Arc::new(InMemorySecretBackend::new());
    let service = TagSecretService::with_pool(pool.clone(), backend.clone(), mode);
    TestContext { service, backend, pool }
}

pub fn actor() -> Actor {
    Actor::new("user-1", "Integration Tester")
}

pub fn application() -> ApplicationRef {
    ApplicationRef { id: ApplicationId::from("app-payments"), name: APPLICATION.to_string() }
}

pub fn environment(name: &str) -> EnvironmentRef {
    EnvironmentRef { id: EnvironmentId::from(format!("env-{}", name)), name: name.to_string() }
}

pub fn address(tag: &str) -> TagAddress {
    TagAddress::new(APPLICATION, ENVIRONMENT, tag)
}

pub fn values(json: &str) -> SecretKeyValues {
    SecretKeyValues::from_json_str(json).expect("valid key/value JSON")
}

/// Provision `tag` in the staging environment with `initial` values
pub async fn provision(ctx: &TestContext, tag: &str, initial: &str) -> String {
    let report = ctx
        .service
        .provision(&application(), &[environment(ENVIRONMENT)], tag, &values(initial), &actor())
        .await
        .expect("provision call");
    let provisioned = report.into_result().expect("tag provisioned");
    provisioned[0].record.current_version_id.clone()
}
