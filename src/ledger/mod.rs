//! Ledger Store
//!
//! Persistent accounts, entries and transfers behind two capability traits:
//!
//! - [`LedgerStore`]: shared handle with committed point reads and list queries
//! - [`LedgerTx`]: one open transaction with row locking and balance writes
//!
//! Two backends implement them: [`PgLedgerStore`] on PostgreSQL and
//! [`MemoryLedgerStore`] in process. Driver failures are mapped into the
//! closed [`StoreError`] enumeration.

pub mod error;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;

pub use error::StoreError;
pub use memory::{MemoryLedgerStore, MemoryLedgerTx};
pub use models::{Account, Entry, NewAccount, Page, Transfer};
pub use postgres::{PgLedgerStore, PgLedgerTx, SCHEMA};
pub use store::{LedgerStore, LedgerTx, TxState, run_in_transaction, run_in_transaction_until};
