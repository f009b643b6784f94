//! Core types used throughout the ledger
//!
//! These are the identifier and amount aliases shared by the store and the
//! transfer engine. They map 1:1 onto the `BIGINT` columns of the schema.

/// Account ID - primary key of `accounts`.
///
/// # Constraints:
/// - **Immutable**: Once assigned, NEVER changes
/// - **Totally ordered**: The transfer engine relies on `<` between account
///   IDs to pick a global lock order
pub type AccountId = i64;

/// Entry ID - primary key of `entries`
pub type EntryId = i64;

/// Transfer ID - primary key of `transfers`
pub type TransferId = i64;

/// Signed amount in the smallest currency unit (cents, satoshi, ...).
///
/// Balances and entry amounts may be negative; transfer amounts are always
/// strictly positive.
pub type Amount = i64;
