//! # Engine Error Type
//!
//! What callers of the engine see when an operation fails.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in the Engine                             │
//! │                                                                         │
//! │  ValidationError ──► CoreError ──────────────► EngineError::Validation  │
//! │  (bad input)         (stock, promo, status)                             │
//! │                                                                         │
//! │  DbError::NotFound ──────────────────────────► EngineError::NotFound    │
//! │  DbError::UniqueViolation ───────────────────► EngineError::Conflict    │
//! │  DbError::Busy (lock timeout) ───────────────► EngineError::Conflict    │
//! │  DbError::* (connection, query, tx, ...) ────► EngineError::Internal    │
//! │                                                                         │
//! │  Engine checks: cross-pharmacy access ───────► EngineError::Forbidden   │
//! │                 already-done actions ────────► EngineError::Conflict    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing is retried internally; every error is returned to the caller.

use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use dispensa_core::{CoreError, PromoRejection, ValidationError};
use dispensa_db::DbError;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine operation errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed input or a business-rule violation (insufficient stock,
    /// invalid transition, promo refused, ...).
    #[error(transparent)]
    Validation(#[from] CoreError),

    /// A pharmacy-scoped entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The entity belongs to another pharmacy.
    #[error("Access denied: {0}")]
    Forbidden(String),

    /// Duplicate value or an action that was already performed.
    #[error("{0}")]
    Conflict(String),

    /// Storage or other infrastructure failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Machine-readable error category.
///
/// ```json
/// { "code": "NOT_FOUND", "message": "Order not found: 5f0c..." }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Forbidden,
    Conflict,
    Internal,
}

impl EngineError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Cross-pharmacy access to `entity` `id`.
    pub fn forbidden(entity: &str, id: &str) -> Self {
        EngineError::Forbidden(format!("{} {} belongs to another pharmacy", entity, id))
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        EngineError::Conflict(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::Forbidden(_) => ErrorKind::Forbidden,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// The promo rejection, if this error is one.
    pub fn promo_rejection(&self) -> Option<&PromoRejection> {
        match self {
            EngineError::Validation(CoreError::Promo(rejection)) => Some(rejection),
            _ => None,
        }
    }
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Validation(CoreError::Validation(err))
    }
}

impl From<PromoRejection> for EngineError {
    fn from(err: PromoRejection) -> Self {
        EngineError::Validation(CoreError::Promo(err))
    }
}

/// Converts database errors to engine errors.
impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            DbError::UniqueViolation { field, .. } => {
                EngineError::Conflict(format!("Duplicate {}", field))
            }
            DbError::Busy(detail) => {
                warn!(detail = %detail, "Store busy past the lock timeout");
                EngineError::Conflict("Store is busy, retry the operation".to_string())
            }
            other => {
                // Log the storage detail; callers only need the category
                error!(error = %other, "Database operation failed");
                EngineError::Internal(other.to_string())
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
