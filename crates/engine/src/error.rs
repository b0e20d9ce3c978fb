use serde::Serialize;
use thiserror::Error;

use fiscus_core::errors::DomainError;
use fiscus_db::StoreError;

/// Failure taxonomy for engine mutations.
///
/// `Conflict` is deliberately absent: every mutation runs inside one SQLite
/// transaction, so concurrent writers are serialized by the store rather
/// than surfaced as retryable conflicts. `Unauthorized` is carried for
/// callers whose auth collaborator rejects an actor; the engine itself never
/// raises it.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl EngineError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { kind, id: id.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Stable machine-readable code for the external interface.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Validation(_) => "validation_error",
            Self::Unauthorized(_) => "unauthorized",
            Self::Store(_) => "store_error",
            Self::Domain(_) => "validation_error",
        }
    }
}

/// The structured failure shape callers receive instead of a raw error.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
}

impl From<&EngineError> for ErrorEnvelope {
    fn from(error: &EngineError) -> Self {
        Self { code: error.code().to_string(), message: error.to_string() }
    }
}

impl From<EngineError> for ErrorEnvelope {
    fn from(error: EngineError) -> Self {
        Self::from(&error)
    }
}
