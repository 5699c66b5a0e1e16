//! # Storage Errors
//!
//! `sqlx` failures classified into the cases the engine reacts to
//! differently: a missing row, a UNIQUE clash (surfaced as a conflict), and
//! everything else (surfaced as an internal error).

use sqlx::error::ErrorKind as SqlxErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A UNIQUE index rejected the write: a promo code or SKU already used
    /// in the pharmacy, a phone already registered, a referral code taken.
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Another connection held the write lock past the busy timeout.
    #[error("Database busy: {0}")]
    Busy(String),

    #[error("Connection pool exhausted")]
    PoolExhausted,

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Callers generating random codes retry on this.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DbError::UniqueViolation { .. })
    }

    /// The operation lost a lock race and can be retried as a whole.
    pub fn is_busy(&self) -> bool {
        matches!(self, DbError::Busy(_))
    }

    /// BEGIN/COMMIT failures keep their busy classification.
    pub(crate) fn from_begin(err: sqlx::Error) -> Self {
        match DbError::from(err) {
            busy @ DbError::Busy(_) => busy,
            other => DbError::TransactionFailed(other.to_string()),
        }
    }
}

/// SQLITE_BUSY, SQLITE_LOCKED and their extended codes.
const LOCK_CODES: [&str; 6] = ["5", "6", "261", "262", "517", "773"];

fn is_lock_error(code: Option<&str>, message: &str) -> bool {
    code.is_some_and(|code| LOCK_CODES.contains(&code))
        || message.contains("database is locked")
        || message.contains("database table is locked")
}

/// Columns named in "UNIQUE constraint failed: orders.id, ..." messages.
fn unique_columns(message: &str) -> String {
    message
        .split_once(": ")
        .map(|(_, columns)| columns.to_string())
        .unwrap_or_else(|| "value".to_string())
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),
            sqlx::Error::Database(db_err)
                if is_lock_error(db_err.code().as_deref(), db_err.message()) =>
            {
                DbError::Busy(db_err.message().to_string())
            }
            sqlx::Error::Database(db_err) => match db_err.kind() {
                SqlxErrorKind::UniqueViolation => {
                    DbError::duplicate(unique_columns(db_err.message()), "unknown")
                }
                SqlxErrorKind::ForeignKeyViolation => DbError::ForeignKeyViolation {
                    message: db_err.message().to_string(),
                },
                _ => DbError::QueryFailed(db_err.message().to_string()),
            },
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("pool is closed".to_string()),
            other => DbError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_columns() {
        assert_eq!(
            unique_columns("UNIQUE constraint failed: promo_codes.pharmacy_id, promo_codes.code"),
            "promo_codes.pharmacy_id, promo_codes.code"
        );
        assert_eq!(unique_columns("constraint failed"), "value");
    }

    #[test]
    fn test_lock_errors_are_busy() {
        assert!(is_lock_error(Some("5"), "database is locked"));
        assert!(is_lock_error(Some("517"), ""));
        assert!(is_lock_error(None, "database table is locked"));
        assert!(!is_lock_error(Some("2067"), "UNIQUE constraint failed: customers.phone"));

        let err = DbError::Busy("database is locked".into());
        assert!(err.is_busy());
        assert!(!err.is_unique_violation());
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DbError::NotFound { .. }));
        assert!(!err.is_unique_violation());
    }
}
