//! Domain errors for the challenge pilot.

use thiserror::Error;

/// Domain-level errors that can occur in the challenge pilot.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The session state machine was asked for a move it does not allow.
    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        /// State the session was in.
        from: String,
        /// State that was requested.
        to: String,
        /// Context, usually the session id.
        reason: String,
    },

    /// The rotation has no credential to offer.
    #[error("No credentials configured")]
    NoCredentials,

    /// The rotation has no model to offer.
    #[error("No models configured")]
    NoModels,

    /// A page automation call failed.
    #[error("Surface operation failed: {0}")]
    SurfaceFailed(String),

    /// A solve strategy gave up on a round with an error.
    #[error("Strategy failed: {0}")]
    StrategyFailed(String),

    /// An inference error crossed into domain code.
    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    /// Input rejected before it reached storage.
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// SQLite error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// JSON encode or decode error.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    IoError(String),
}

/// Result alias for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        DomainError::IoError(err.to_string())
    }
}

/// Errors surfaced by the inference gateway to solve strategies.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// No credential is configured at all.
    #[error("No credentials available for inference")]
    NoCredentials,

    /// Every attempt of the call failed.
    #[error("Retry budget exhausted after {attempts} attempts: {last}")]
    RetryBudgetExhausted {
        /// Attempts made.
        attempts: u32,
        /// Error of the final attempt.
        last: String,
    },

    /// Reading or writing the quota ledger failed.
    #[error("Quota ledger error: {0}")]
    Ledger(#[from] DomainError),
}

impl From<InferenceError> for DomainError {
    fn from(err: InferenceError) -> Self {
        match err {
            InferenceError::Ledger(inner) => inner,
            other => DomainError::InferenceFailed(other.to_string()),
        }
    }
}
