//! Transfer Engine
//!
//! Moves money between two accounts as one store transaction: a transfer
//! record, a debit entry, a credit entry and two balance updates commit
//! together or not at all.
//!
//! # Lock Order
//!
//! ```text
//! A → B  and  B → A  both lock min(A, B) first, then max(A, B)
//! ```
//!
//! # Safety Invariants
//!
//! 1. **Conservation**: the two entries of a transfer sum to zero
//! 2. **Atomicity**: any failure rolls back every write of the transfer
//! 3. **No Deadlock**: row locks are always taken in ascending account id order
//! 4. **No Overdraft**: unless configured, a source balance never ends below zero
//! 5. **No Auto-Retry**: errors surface to the caller; see [`retry`]

pub mod engine;
pub mod error;
pub mod retry;
pub mod types;


// Re-exports for convenience
pub use engine::TransferEngine;
pub use error::TransferError;
pub use retry::{RetryPolicy, retry_transfer};
pub use types::{TransferParams, TransferResult};
