//! Ledger store capability traits
//!
//! `LedgerStore` is the shared handle (pool, in-process tables) and
//! `LedgerTx` is one open transaction on it. Every balance mutation happens
//! through a `LedgerTx`; the transfer engine depends only on these traits.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use tracing::{error, warn};

use super::error::StoreError;
use super::models::{Account, Entry, NewAccount, Page, Transfer};
use crate::core_types::{AccountId, Amount, EntryId, TransferId};

/// Lifecycle of a store transaction.
///
/// Only `Committed` makes writes visible to other transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    /// Open, writes invisible to others
    InFlight,
    /// Terminal: all writes visible
    Committed,
    /// Terminal: no writes visible
    Aborted,
}

impl TxState {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TxState::InFlight)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TxState::InFlight => "IN_FLIGHT",
            TxState::Committed => "COMMITTED",
            TxState::Aborted => "ABORTED",
        }
    }
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One open store transaction.
///
/// Dropping a transaction without calling `commit` rolls it back.
#[async_trait]
pub trait LedgerTx: Send {
    /// Read an account inside this transaction (sees own writes), no lock
    async fn get_account(&mut self, id: AccountId) -> Result<Account, StoreError>;

    /// Read an account and hold its exclusive row lock until the transaction ends
    async fn get_account_for_update(&mut self, id: AccountId) -> Result<Account, StoreError>;

    /// Append an immutable entry. Does not touch the balance.
    async fn create_entry(
        &mut self,
        account_id: AccountId,
        amount: Amount,
    ) -> Result<Entry, StoreError>;

    /// Append an immutable transfer record
    async fn create_transfer(
        &mut self,
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: Amount,
    ) -> Result<Transfer, StoreError>;

    /// Overwrite the balance. Callers must have read the account with
    /// `get_account_for_update` in this transaction.
    async fn update_account_balance(
        &mut self,
        id: AccountId,
        balance: Amount,
    ) -> Result<Account, StoreError>;

    /// Atomically add `delta` to the balance at the storage layer
    async fn add_account_balance(
        &mut self,
        id: AccountId,
        delta: Amount,
    ) -> Result<Account, StoreError>;

    /// Make every write of this transaction visible
    async fn commit(self) -> Result<(), StoreError>;

    /// Discard every write of this transaction
    async fn rollback(self) -> Result<(), StoreError>;
}

/// Shared handle on a ledger backend
#[async_trait]
pub trait LedgerStore: Send + Sync {
    type Tx: LedgerTx;

    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Open a new transaction scope
    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    /// Committed point read, no lock
    async fn get_account(&self, id: AccountId) -> Result<Account, StoreError>;

    async fn create_account(&self, account: NewAccount) -> Result<Account, StoreError>;

    /// Accounts ordered by id, optionally restricted to one owner
    async fn list_accounts(
        &self,
        owner: Option<&str>,
        page: Page,
    ) -> Result<Vec<Account>, StoreError>;

    /// Fails with `ConstraintViolation` while entries or transfers reference the account
    async fn delete_account(&self, id: AccountId) -> Result<(), StoreError>;

    async fn get_entry(&self, id: EntryId) -> Result<Entry, StoreError>;

    /// Entries of one account ordered by id
    async fn list_entries(
        &self,
        account_id: AccountId,
        page: Page,
    ) -> Result<Vec<Entry>, StoreError>;

    async fn get_transfer(&self, id: TransferId) -> Result<Transfer, StoreError>;

    /// Transfers ordered by id. `from`/`to` filters are combined with OR,
    /// so passing the same account for both lists everything it took part in.
    async fn list_transfers(
        &self,
        from_account_id: Option<AccountId>,
        to_account_id: Option<AccountId>,
        page: Page,
    ) -> Result<Vec<Transfer>, StoreError>;
}

/// Run `f` inside one transaction scope.
///
/// Commits when `f` returns `Ok`, rolls back when it returns `Err`. If the
/// rollback fails as well, both errors are reported through
/// `StoreError::RollbackFailed`.
pub async fn run_in_transaction<S, T, E, F>(store: &S, f: F) -> Result<T, E>
where
    S: LedgerStore,
    T: Send,
    E: From<StoreError> + fmt::Display + Send,
    F: for<'t> FnOnce(&'t mut S::Tx) -> BoxFuture<'t, Result<T, E>> + Send,
{
    run_in_transaction_until(store, std::future::pending::<E>(), f).await
}

/// Like [`run_in_transaction`] but stops the scope early when `interrupt`
/// resolves, failing with its error.
///
/// `interrupt` only races `begin` and the body. Once the body has succeeded
/// the commit is awaited to completion, so a signal can never turn an applied
/// commit into a reported failure. A commit whose result is lost on the wire
/// surfaces as `StoreError::CommitOutcomeUnknown`.
pub async fn run_in_transaction_until<S, T, E, F, I>(store: &S, interrupt: I, f: F) -> Result<T, E>
where
    S: LedgerStore,
    T: Send,
    E: From<StoreError> + fmt::Display + Send,
    F: for<'t> FnOnce(&'t mut S::Tx) -> BoxFuture<'t, Result<T, E>> + Send,
    I: Future<Output = E> + Send,
{
    tokio::pin!(interrupt);

    let mut tx = tokio::select! {
        biased;
        err = &mut interrupt => return Err(err),
        tx = store.begin() => tx?,
    };

    let outcome = {
        let body = f(&mut tx);
        tokio::select! {
            biased;
            err = &mut interrupt => Err(err),
            result = body => result,
        }
    };

    match outcome {
        Ok(value) => match tx.commit().await {
            Ok(()) => Ok(value),
            Err(e) => Err(E::from(commit_failure(store.name(), e))),
        },
        Err(err) => match tx.rollback().await {
            Ok(()) => {
                warn!(store = store.name(), error = %err, "Transaction rolled back");
                Err(err)
            }
            Err(rollback) => {
                error!(
                    store = store.name(),
                    error = %err,
                    rollback_error = %rollback,
                    "Rollback failed after transaction error"
                );
                Err(E::from(StoreError::RollbackFailed {
                    original: err.to_string(),
                    rollback: Box::new(rollback),
                }))
            }
        },
    }
}

/// Classify a failed commit.
///
/// Aborts and constraint failures are reported by the server before anything
/// is applied. A dropped connection or an unexpected error leaves the outcome
/// open.
fn commit_failure(store: &'static str, e: StoreError) -> StoreError {
    match e {
        StoreError::StoreUnavailable(msg) | StoreError::Internal(msg) => {
            error!(store, error = %msg, "Commit outcome unknown");
            StoreError::CommitOutcomeUnknown(msg)
        }
        other => other,
    }
}
