//! Ledger records
//!
//! Rows of the `accounts`, `entries` and `transfers` tables. Entries and
//! transfers are append-only; only an account's balance ever changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core_types::{AccountId, Amount, EntryId, TransferId};

/// A ledger subject with a durable balance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub id: AccountId,
    pub owner: String,
    /// Balance in the smallest currency unit
    pub balance: Amount,
    /// ISO-style currency code, e.g. "USD"
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

/// Input for opening an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAccount {
    pub owner: String,
    pub balance: Amount,
    pub currency: String,
}

/// Immutable signed line item against one account.
///
/// Negative amounts are debits, positive amounts are credits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Entry {
    pub id: EntryId,
    pub account_id: AccountId,
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
}

impl Entry {
    #[inline]
    pub fn is_debit(&self) -> bool {
        self.amount < 0
    }

    #[inline]
    pub fn is_credit(&self) -> bool {
        self.amount > 0
    }
}

/// Immutable record of one source-to-destination movement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Transfer {
    pub id: TransferId,
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    /// Always > 0
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
}

/// Limit/offset window for list queries. Never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawPage")]
pub struct Page {
    limit: i64,
    offset: i64,
}

/// Unchecked wire form, clamped on the way in
#[derive(Deserialize)]
struct RawPage {
    limit: i64,
    offset: i64,
}

impl From<RawPage> for Page {
    fn from(raw: RawPage) -> Self {
        Self::new(raw.limit, raw.offset)
    }
}

impl Page {
    pub const DEFAULT_LIMIT: i64 = 50;

    pub fn new(limit: i64, offset: i64) -> Self {
        Self {
            limit: limit.max(0),
            offset: offset.max(0),
        }
    }

    /// First `limit` rows
    pub fn first(limit: i64) -> Self {
        Self::new(limit, 0)
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Apply this window to an already ordered iterator
    pub(crate) fn apply<T>(&self, rows: impl Iterator<Item = T>) -> Vec<T> {
        let offset = usize::try_from(self.offset).unwrap_or(0);
        let limit = usize::try_from(self.limit).unwrap_or(0);
        rows.skip(offset).take(limit).collect()
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::first(Self::DEFAULT_LIMIT)
    }
}
