//! # Error Types
//!
//! Error taxonomy for the tag secret engine using `thiserror`.

/// Custom result type for tagvault operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for tagvault
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Tag binding, secret record, backend secret or version missing
    #[error("Resource not found: {resource_type} '{id}'")]
    NotFound { resource_type: String, id: String },

    /// Backend secret (or local record) already exists
    #[error("Resource already exists: {resource_type} '{id}'")]
    AlreadyExists { resource_type: String, id: String },

    /// Transient network, credential or timeout failure talking to the backend.
    /// Callers retry with backoff; nothing retries internally.
    #[error("Secret backend unavailable: {message}")]
    BackendUnavailable {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Malformed key/value payload or request
    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    /// The backend's live version no longer matches the version the caller read
    #[error("Version conflict on '{secret_id}': expected '{expected}', found '{actual}'")]
    VersionConflict { secret_id: String, expected: String, actual: String },

    /// Some per-environment provisions failed while others succeeded
    #[error("Partial provision failure: {succeeded} succeeded, {} failed", .failed.len())]
    PartialProvisionFailure { succeeded: usize, failed: Vec<String> },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Database and storage errors
    #[error("Database error: {context}")]
    Database {
        #[source]
        source: sqlx::Error,
        context: String,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        #[source]
        source: serde_json::Error,
        context: String,
    },

    /// Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Create a not found error
    pub fn not_found<R: Into<String>, I: Into<String>>(resource_type: R, id: I) -> Self {
        Self::NotFound { resource_type: resource_type.into(), id: id.into() }
    }

    /// Create an already-exists error
    pub fn already_exists<R: Into<String>, I: Into<String>>(resource_type: R, id: I) -> Self {
        Self::AlreadyExists { resource_type: resource_type.into(), id: id.into() }
    }

    /// Create a backend unavailable error
    pub fn backend_unavailable<S: Into<String>>(message: S) -> Self {
        Self::BackendUnavailable { message: message.into(), source: None }
    }

    /// Create a backend unavailable error with source
    pub fn backend_unavailable_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::BackendUnavailable { message: message.into(), source: Some(source) }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    /// Create a version conflict error
    pub fn version_conflict<S, E, A>(secret_id: S, expected: E, actual: A) -> Self
    where
        S: Into<String>,
        E: Into<String>,
        A: Into<String>,
    {
        Self::VersionConflict {
            secret_id: secret_id.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Whether this is a `NotFound` error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::AlreadyExists { .. })
    }

    /// Get the HTTP status code a caller-facing layer should return for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::AlreadyExists { .. } => 409,
            Error::BackendUnavailable { .. } => 503,
            Error::Validation { .. } => 400,
            Error::VersionConflict { .. } => 409,
            Error::PartialProvisionFailure { .. } => 207,
            Error::Config { .. } => 500,
            Error::Database { .. } => 500,
            Error::Serialization { .. } => 400,
            Error::Internal { .. } => 500,
        }
    }

    /// Check if this error should be retried by the caller
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::BackendUnavailable { .. } | Error::Database { .. })
    }
}

impl From<sqlx::Error> for Error {
    fn from(error: sqlx::Error) -> Self {
        Self::Database { source: error, context: "Database operation failed".to_string() }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization { source: error, context: "JSON serialization failed".to_string() }
    }
}

impl From<config::ConfigError> for Error {
    fn from(error: config::ConfigError) -> Self {
        Self::config_with_source("Configuration loading failed", Box::new(error))
    }
}

impl From<sqlx::migrate::MigrateError> for Error {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        Self::Database {
            source: sqlx::Error::Migrate(Box::new(error)),
            context: "Database migration failed".to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::validation(format!("Validation failed: {}", message))
    }
}
