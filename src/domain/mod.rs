//! # Domain Types
//!
//! Records and value types of the secret inheritance engine, independent of
//! storage and backend concerns.

pub mod id;
pub mod key_values;
pub mod ledger;
pub mod secret;
pub mod version;

pub use id::{ApplicationId, EnvironmentId, LedgerEntryId, SecretRecordId, TagBindingId};
pub use key_values::{SecretKeyValues, SecretValue};
pub use ledger::{
    chain_gaps, ChainGap, LedgerEntityType, LedgerEntry, LedgerMetadata, LedgerOperation,
};
pub use secret::{
    Actor, ApplicationRef, EnvironmentRef, SecretRecord, SecretRecordMetadata, TagBinding,
    TagFeatures, BASE_TAG_NAME,
};
pub use version::{sort_versions, BackendVersion, SecretVersionList, VersionStage};
