//! # Error Handling
//!
//! Error taxonomy shared by the backend clients, repositories and services.
//! Backend clients wrap provider errors into `NotFound`, `AlreadyExists` or
//! `BackendUnavailable`; nothing in this crate retries on its own.

pub mod types;

pub use types::{Error, Result};
