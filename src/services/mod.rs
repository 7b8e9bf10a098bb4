//! Business logic services
//!
//! Service layer components that tie the secret engine to persistence,
//! separated from the CLI.

pub mod tag_secret_service;

pub use tag_secret_service::{
    ProvisionFailure, ProvisionReport, ProvisionedTag, TagAddress, TagSecretService,
};
