//! Transfer input and output types

use serde::{Deserialize, Serialize};

use super::error::TransferError;
use crate::core_types::{AccountId, Amount};
use crate::ledger::{Account, Entry, Transfer};

/// Input of one transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferParams {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: Amount,
}

impl TransferParams {
    pub fn new(from_account_id: AccountId, to_account_id: AccountId, amount: Amount) -> Self {
        Self {
            from_account_id,
            to_account_id,
            amount,
        }
    }

    /// Structural checks that need no store access
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.amount <= 0 {
            return Err(TransferError::InvalidAmount);
        }
        if self.from_account_id == self.to_account_id {
            return Err(TransferError::SameAccount);
        }
        Ok(())
    }
}

/// Everything a committed transfer wrote, as of commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    pub transfer: Transfer,
    pub from_account: Account,
    pub to_account: Account,
    pub from_entry: Entry,
    pub to_entry: Entry,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(TransferParams::new(1, 2, 30).validate().is_ok());
        assert!(matches!(
            TransferParams::new(1, 2, 0).validate(),
            Err(TransferError::InvalidAmount)
        ));
        assert!(matches!(
            TransferParams::new(1, 2, -5).validate(),
            Err(TransferError::InvalidAmount)
        ));
        assert!(matches!(
            TransferParams::new(3, 3, 10).validate(),
            Err(TransferError::SameAccount)
        ));
    }

    #[test]
    fn test_amount_checked_before_accounts() {
        assert!(matches!(
            TransferParams::new(3, 3, 0).validate(),
            Err(TransferError::InvalidAmount)
        ));
    }
}
