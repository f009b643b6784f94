//! simple_bank - Ledger Store and Transfer Engine
//!
//! Accounts, immutable entries and transfer records on PostgreSQL, plus an
//! engine that moves money between two accounts atomically and without
//! deadlocks under concurrent load.
//!
//! # Modules
//!
//! - [`core_types`] - Identifier and amount aliases
//! - [`ledger`] - Store traits, PostgreSQL and in-memory backends
//! - [`transfer`] - Transfer engine, errors and retry helper
//! - [`db`] - Connection pool and schema setup
//! - [`config`] - YAML configuration
//! - [`logging`] - tracing subscriber setup
//! - [`fixtures`] - Seeded test-data builder

// Core types - must be first!
pub mod core_types;

pub mod config;
pub mod db;
pub mod fixtures;
pub mod ledger;
pub mod logging;
pub mod transfer;

// Convenient re-exports at crate root
pub use config::{AppConfig, EngineConfig, IsolationLevel, LogTargets, StoreConfig};
pub use core_types::{AccountId, Amount, EntryId, TransferId};
pub use ledger::{
    Account, Entry, LedgerStore, LedgerTx, MemoryLedgerStore, NewAccount, Page, PgLedgerStore,
    StoreError, Transfer,
};
pub use transfer::{TransferEngine, TransferError, TransferParams, TransferResult};
