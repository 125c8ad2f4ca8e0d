//! Error types for Sage

use thiserror::Error;

/// Result type alias using Sage's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Sage error types
///
/// The three domain kinds (`Validation`, `NotFound`, `Conflict`) are
/// deterministic given the same input and state, so none of them is ever
/// retried by the core.
#[derive(Error, Debug)]
pub enum Error {
    // Domain errors
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    // Storage errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Stored data is corrupt: {0}")]
    CorruptData(String),

    // Config errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a validation failure
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Shorthand for a missing record of the given kind
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Shorthand for a state conflict
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Get the stable error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::DatabaseError(_) => "DATABASE_ERROR",
            Self::Serialization(_) | Self::CorruptData(_) => "DATA_ERROR",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::Io(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the caller could reasonably retry the same request verbatim.
    ///
    /// Domain errors never are; only an underlying database failure might be.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DatabaseError(sqlx::Error::PoolTimedOut))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
