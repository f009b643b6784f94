//! Ledger Store Error Types
//!
//! Closed set of failure kinds every backend maps its driver errors into.
//! Callers never inspect driver-specific error values.

use thiserror::Error;

/// PostgreSQL SQLSTATE codes the store classifies explicitly
pub mod sqlstate {
    pub const SERIALIZATION_FAILURE: &str = "40001";
    pub const DEADLOCK_DETECTED: &str = "40P01";
    pub const LOCK_NOT_AVAILABLE: &str = "55P03";
    pub const QUERY_CANCELED: &str = "57014";
    /// Class 22: data exception (numeric overflow, invalid text representation)
    pub const DATA_EXCEPTION_CLASS: &str = "22";
    /// Class 23: integrity constraint violation
    pub const INTEGRITY_CONSTRAINT_CLASS: &str = "23";
    /// Class 08: connection exception
    pub const CONNECTION_EXCEPTION_CLASS: &str = "08";
    pub const ADMIN_SHUTDOWN: &str = "57P01";
    pub const CANNOT_CONNECT_NOW: &str = "57P03";
}

/// Store error kinds
#[derive(Error, Debug)]
pub enum StoreError {
    /// Referenced row does not exist
    #[error("Record not found")]
    NotFound,

    /// Serialization conflict or lock wait timeout. The caller may retry.
    #[error("Transaction aborted: {0}")]
    TransactionAborted(String),

    /// Referential integrity, check or uniqueness failure. Not retryable.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Connectivity or infrastructure failure. Retry with backoff.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The commit was sent but its acknowledgement was lost. The writes may
    /// or may not be visible; re-running the transaction could apply it twice.
    #[error("Commit outcome unknown: {0}")]
    CommitOutcomeUnknown(String),

    /// The scope failed and rolling it back failed too
    #[error("Rollback failed: {rollback} (original error: {original})")]
    RollbackFailed {
        original: String,
        rollback: Box<StoreError>,
    },

    /// Row decoding and other unexpected failures
    #[error("Internal store error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Stable error code for logs and API responses
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NotFound => "NOT_FOUND",
            StoreError::TransactionAborted(_) => "TRANSACTION_ABORTED",
            StoreError::ConstraintViolation(_) => "CONSTRAINT_VIOLATION",
            StoreError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            StoreError::CommitOutcomeUnknown(_) => "COMMIT_OUTCOME_UNKNOWN",
            StoreError::RollbackFailed { .. } => "ROLLBACK_FAILED",
            StoreError::Internal(_) => "INTERNAL",
        }
    }

    /// Whether re-running the whole transaction with the same input may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::TransactionAborted(_) | StoreError::StoreUnavailable(_)
        )
    }

    /// Classify a PostgreSQL SQLSTATE code
    pub fn from_sqlstate(code: &str, message: &str) -> Self {
        match code {
            sqlstate::SERIALIZATION_FAILURE
            | sqlstate::DEADLOCK_DETECTED
            | sqlstate::LOCK_NOT_AVAILABLE
            | sqlstate::QUERY_CANCELED => StoreError::TransactionAborted(format!("{code}: {message}")),
            sqlstate::ADMIN_SHUTDOWN | sqlstate::CANNOT_CONNECT_NOW => {
                StoreError::StoreUnavailable(format!("{code}: {message}"))
            }
            c if c.starts_with(sqlstate::INTEGRITY_CONSTRAINT_CLASS)
                || c.starts_with(sqlstate::DATA_EXCEPTION_CLASS) =>
            {
                StoreError::ConstraintViolation(format!("{code}: {message}"))
            }
            c if c.starts_with(sqlstate::CONNECTION_EXCEPTION_CLASS) => {
                StoreError::StoreUnavailable(format!("{code}: {message}"))
            }
            _ => StoreError::Internal(format!("{code}: {message}")),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db_err) => match db_err.code() {
                Some(code) => StoreError::from_sqlstate(&code, db_err.message()),
                None => StoreError::Internal(db_err.message().to_string()),
            },
            sqlx::Error::Io(e) => StoreError::StoreUnavailable(e.to_string()),
            sqlx::Error::Tls(e) => StoreError::StoreUnavailable(e.to_string()),
            sqlx::Error::PoolTimedOut => {
                StoreError::StoreUnavailable("connection pool timed out".to_string())
            }
            sqlx::Error::PoolClosed => {
                StoreError::StoreUnavailable("connection pool closed".to_string())
            }
            sqlx::Error::WorkerCrashed => {
                StoreError::StoreUnavailable("database worker crashed".to_string())
            }
            sqlx::Error::Protocol(msg) => StoreError::StoreUnavailable(msg),
            other => StoreError::Internal(other.to_string()),
        }
    }
}
