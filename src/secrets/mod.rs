//! # Tag Secret Engine
//!
//! Secrets are stored in an external secret manager, one backend secret per
//! (application, environment, tag). The tag named `base` is the fallback
//! source for every other tag of the same application and environment.
//!
//! - [`naming`] derives the durable backend secret name of a tag
//! - [`backends`] talks to the secret manager
//! - [`inheritance`] merges a tag with its base and reports inherited keys
//! - [`reconcile`] joins the local version ledger with backend versions
//! - [`revert`] writes an old version's content back as a new version
//!
//! Nothing in here holds a lock across a read-modify-write. With
//! [`ConcurrencyMode::CheckAndSet`] writers are rejected when the backend's
//! current version moved since they read it; otherwise the last write wins.

pub mod backends;
pub mod inheritance;
pub mod naming;
pub mod reconcile;
pub mod revert;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use backends::{
    BackendClientCache, BackendCredentials, CreateSecretInput, InMemorySecretBackend,
    RevertOutcome, SecretBackend, SecretBackendRegistry, SecretBackendType, SecretPayload,
    SecretWriteOutcome,
};
pub use inheritance::{merge, unmerged, MergedSecretView};
pub use reconcile::{reconcile, CombinedTimeline, TimelineRow};
pub use revert::{RevertOrchestrator, RevertReport, RevertRequest, RevertState};

/// How concurrent writers to one tag secret are arbitrated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyMode {
    /// No version check before writing; concurrent updates can be lost
    #[default]
    LastWriteWins,
    /// Fail with `VersionConflict` when the backend's current version is not
    /// the one the caller read
    CheckAndSet,
}

impl ConcurrencyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LastWriteWins => "last_write_wins",
            Self::CheckAndSet => "check_and_set",
        }
    }

    pub fn checks_version(&self) -> bool {
        matches!(self, Self::CheckAndSet)
    }
}

impl fmt::Display for ConcurrencyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concurrency_mode_serde() {
        assert_eq!(ConcurrencyMode::default(), ConcurrencyMode::LastWriteWins);
        assert_eq!(
            serde_json::to_string(&ConcurrencyMode::CheckAndSet).unwrap(),
            "\"check_and_set\""
        );
        let parsed: ConcurrencyMode = serde_json::from_str("\"last_write_wins\"").unwrap();
        assert_eq!(parsed, ConcurrencyMode::LastWriteWins);
        assert!(ConcurrencyMode::CheckAndSet.checks_version());
        assert!(!ConcurrencyMode::LastWriteWins.checks_version());
    }
}
