//! Transfer Error Types

use thiserror::Error;

use crate::core_types::{AccountId, Amount};
use crate::ledger::StoreError;

/// Transfer error types
///
/// Structural errors are raised before any transaction opens. Everything
/// else means the transaction was rolled back and nothing is visible.
#[derive(Error, Debug)]
pub enum TransferError {
    // === Validation Errors ===
    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Source and destination account cannot be the same")]
    SameAccount,

    // === Ledger Errors ===
    #[error("Insufficient funds in account {account_id}: available {balance}")]
    InsufficientFunds {
        account_id: AccountId,
        /// Balance before this transfer
        balance: Amount,
    },

    // === Caller Signals ===
    #[error("Transfer cancelled by caller")]
    Cancelled,

    #[error("Transfer deadline exceeded")]
    DeadlineExceeded,

    // === Store Errors ===
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TransferError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::InvalidAmount => "INVALID_AMOUNT",
            TransferError::SameAccount => "SAME_ACCOUNT",
            TransferError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            TransferError::Cancelled => "CANCELLED",
            TransferError::DeadlineExceeded => "DEADLINE_EXCEEDED",
            TransferError::Store(e) => e.code(),
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            TransferError::InvalidAmount | TransferError::SameAccount => 400,
            TransferError::InsufficientFunds { .. } => 422,
            TransferError::Cancelled => 499,
            TransferError::DeadlineExceeded => 504,
            TransferError::Store(e) => match e {
                StoreError::NotFound => 404,
                StoreError::TransactionAborted(_) => 409,
                StoreError::ConstraintViolation(_) => 422,
                StoreError::StoreUnavailable(_) => 503,
                StoreError::CommitOutcomeUnknown(_)
                | StoreError::RollbackFailed { .. }
                | StoreError::Internal(_) => 500,
            },
        }
    }

    /// Whether the caller may re-submit the same transfer
    pub fn is_retryable(&self) -> bool {
        match self {
            TransferError::DeadlineExceeded => true,
            TransferError::Store(e) => e.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(TransferError::SameAccount.code(), "SAME_ACCOUNT");
        assert_eq!(
            TransferError::InsufficientFunds {
                account_id: 1,
                balance: 10
            }
            .code(),
            "INSUFFICIENT_FUNDS"
        );
        assert_eq!(
            TransferError::from(StoreError::TransactionAborted("40P01".into())).code(),
            "TRANSACTION_ABORTED"
        );
        assert_eq!(
            TransferError::from(StoreError::CommitOutcomeUnknown("reset".into())).code(),
            "COMMIT_OUTCOME_UNKNOWN"
        );
    }

    #[test]
    fn test_http_status() {
        assert_eq!(TransferError::InvalidAmount.http_status(), 400);
        assert_eq!(TransferError::DeadlineExceeded.http_status(), 504);
        assert_eq!(TransferError::Store(StoreError::NotFound).http_status(), 404);
        assert_eq!(
            TransferError::Store(StoreError::StoreUnavailable("down".into())).http_status(),
            503
        );
        assert_eq!(
            TransferError::Store(StoreError::Internal("decode".into())).http_status(),
            500
        );
    }

    #[test]
    fn test_retryable() {
        assert!(TransferError::DeadlineExceeded.is_retryable());
        assert!(TransferError::Store(StoreError::TransactionAborted("x".into())).is_retryable());
        assert!(!TransferError::Cancelled.is_retryable());
        assert!(!TransferError::InvalidAmount.is_retryable());
        assert!(
            !TransferError::InsufficientFunds {
                account_id: 1,
                balance: 0
            }
            .is_retryable()
        );
        assert!(
            !TransferError::Store(StoreError::ConstraintViolation("23503".into())).is_retryable()
        );
        assert!(
            !TransferError::Store(StoreError::CommitOutcomeUnknown("reset".into())).is_retryable()
        );
    }

    #[test]
    fn test_display() {
        let err = TransferError::InsufficientFunds {
            account_id: 7,
            balance: 20,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient funds in account 7: available 20"
        );
        let store = TransferError::Store(StoreError::NotFound);
        assert_eq!(store.to_string(), "Record not found");
    }
}
