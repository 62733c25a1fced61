//! Repository error types.

use database::DatabaseError;
use guardian_core::AlertStatus;
use safety_api::ApiError;
use thiserror::Error;

use crate::validation::ValidationError;

/// Errors that can occur in repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Local store failure.
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// Remote backend failure.
    #[error("backend error: {0}")]
    Api(#[from] ApiError),

    /// The operation needs the backend and the device is offline.
    #[error("operation requires connectivity")]
    Offline,

    /// An alert status change that would move backward.
    #[error("invalid alert transition: {from} -> {to}")]
    InvalidTransition { from: AlertStatus, to: AlertStatus },

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Input rejected before it reached the store.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Export serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;
