//! Repository modules for data access
//!
//! Each repository is a trait plus its SQLx implementation.

pub mod secret_record;
pub mod tag_binding;
pub mod version_ledger;

pub use secret_record::{
    CreateSecretRecordRequest, SecretRecordRepository, SqlxSecretRecordRepository,
};
pub use tag_binding::{CreateTagBindingRequest, SqlxTagBindingRepository, TagBindingRepository};
pub use version_ledger::{
    CreateLedgerEntryRequest, SqlxVersionLedgerRepository, VersionLedgerRepository,
};
