//! Transfer Engine
//!
//! Executes one transfer as a single store transaction:
//!
//! ```text
//! create_transfer → debit entry → credit entry → balances (lower id first) → commit
//! ```
//!
//! Both balance updates go through `add_account_balance`, which takes the
//! row lock. Two transfers touching the same pair of accounts always lock
//! them in ascending id order, whatever their direction, so they can never
//! wait on each other in a cycle.

use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::error::TransferError;
use super::types::{TransferParams, TransferResult};
use crate::config::EngineConfig;
use crate::core_types::{AccountId, Amount};
use crate::ledger::{Account, LedgerStore, LedgerTx, run_in_transaction_until};

/// Transfer Engine
///
/// Stateless apart from its store handle. Concurrent calls run as
/// independent store transactions; there is no engine-level lock.
pub struct TransferEngine<S: LedgerStore> {
    store: Arc<S>,
    config: EngineConfig,
}

impl<S: LedgerStore> Clone for TransferEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
        }
    }
}

impl<S: LedgerStore> TransferEngine<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Create with default configuration
    pub fn with_defaults(store: Arc<S>) -> Self {
        Self::new(store, EngineConfig::default())
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Move `amount` from one account to another.
    ///
    /// Applies the configured `transfer_timeout_ms` when set.
    pub async fn transfer(&self, params: TransferParams) -> Result<TransferResult, TransferError> {
        match self.config.transfer_timeout() {
            Some(timeout) => {
                self.transfer_with_deadline(params, Instant::now() + timeout)
                    .await
            }
            None => self.execute(params, std::future::pending::<TransferError>()).await,
        }
    }

    /// Like [`transfer`](Self::transfer) but gives up at `deadline`.
    ///
    /// The deadline only applies until the transfer is ready to commit. On
    /// expiry the transaction is rolled back; a commit already sent is always
    /// awaited, so `DeadlineExceeded` guarantees nothing was applied.
    pub async fn transfer_with_deadline(
        &self,
        params: TransferParams,
        deadline: Instant,
    ) -> Result<TransferResult, TransferError> {
        let expired = async move {
            tokio::time::sleep_until(deadline).await;
            TransferError::DeadlineExceeded
        };
        let result = self.execute(params, expired).await;
        if matches!(result, Err(TransferError::DeadlineExceeded)) {
            warn!(
                from = params.from_account_id,
                to = params.to_account_id,
                amount = params.amount,
                "Transfer deadline exceeded, transaction rolled back"
            );
        }
        result
    }

    /// Like [`transfer`](Self::transfer) but aborts as soon as `cancel` resolves.
    ///
    /// A signal that is already resolved wins before any write happens. Like
    /// the deadline, it cannot interrupt the commit.
    pub async fn transfer_with_cancel<C>(
        &self,
        params: TransferParams,
        cancel: C,
    ) -> Result<TransferResult, TransferError>
    where
        C: Future<Output = ()> + Send,
    {
        let cancelled = async move {
            cancel.await;
            TransferError::Cancelled
        };
        let result = self.execute(params, cancelled).await;
        if matches!(result, Err(TransferError::Cancelled)) {
            warn!(
                from = params.from_account_id,
                to = params.to_account_id,
                amount = params.amount,
                "Transfer cancelled, transaction rolled back"
            );
        }
        result
    }

    async fn execute<I>(
        &self,
        params: TransferParams,
        interrupt: I,
    ) -> Result<TransferResult, TransferError>
    where
        I: Future<Output = TransferError> + Send,
    {
        params.validate()?;

        let TransferParams {
            from_account_id,
            to_account_id,
            amount,
        } = params;
        let allow_overdraft = self.config.allow_overdraft;

        debug!(
            store = self.store.name(),
            from = from_account_id,
            to = to_account_id,
            amount,
            "Starting transfer"
        );

        let outcome: Result<TransferResult, TransferError> =
            run_in_transaction_until(self.store.as_ref(), interrupt, move |tx| {
                Box::pin(async move {
                    let transfer = tx
                        .create_transfer(from_account_id, to_account_id, amount)
                        .await?;
                    let from_entry = tx.create_entry(from_account_id, -amount).await?;
                    let to_entry = tx.create_entry(to_account_id, amount).await?;

                    let (from_account, to_account) =
                        add_money(tx, from_account_id, -amount, to_account_id, amount).await?;

                    if !allow_overdraft && from_account.balance < 0 {
                        return Err(TransferError::InsufficientFunds {
                            account_id: from_account_id,
                            balance: from_account.balance + amount,
                        });
                    }

                    Ok(TransferResult {
                        transfer,
                        from_account,
                        to_account,
                        from_entry,
                        to_entry,
                    })
                })
            })
            .await;

        let result = outcome?;
        info!(
            transfer_id = result.transfer.id,
            from = from_account_id,
            to = to_account_id,
            amount,
            from_balance = result.from_account.balance,
            to_balance = result.to_account.balance,
            "Transfer committed"
        );
        Ok(result)
    }
}

/// Apply both balance deltas, locking the lower account id first.
///
/// Returns the accounts in argument order.
async fn add_money<T: LedgerTx>(
    tx: &mut T,
    account_id1: AccountId,
    amount1: Amount,
    account_id2: AccountId,
    amount2: Amount,
) -> Result<(Account, Account), TransferError> {
    if account_id1 < account_id2 {
        let account1 = tx.add_account_balance(account_id1, amount1).await?;
        let account2 = tx.add_account_balance(account_id2, amount2).await?;
        Ok((account1, account2))
    } else {
        let account2 = tx.add_account_balance(account_id2, amount2).await?;
        let account1 = tx.add_account_balance(account_id1, amount1).await?;
        Ok((account1, account2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{MemoryLedgerStore, MemoryLedgerTx, NewAccount};

    async fn open(store: &MemoryLedgerStore, owner: &str, balance: Amount) -> Account {
        store
            .create_account(NewAccount {
                owner: owner.to_string(),
                balance,
                currency: "USD".to_string(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_add_money_locks_lower_id_first() {
        let store = MemoryLedgerStore::new();
        let low = open(&store, "low", 100).await;
        let high = open(&store, "high", 100).await;

        // Direction high -> low: the credit to `low` must lock first
        let mut tx: MemoryLedgerTx = store.begin().await.unwrap();
        let (from, to) = add_money(&mut tx, high.id, -10, low.id, 10).await.unwrap();
        assert_eq!(from.id, high.id);
        assert_eq!(from.balance, 90);
        assert_eq!(to.id, low.id);
        assert_eq!(to.balance, 110);
        assert_eq!(tx.locked_accounts(), vec![low.id, high.id]);
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_add_money_stops_at_first_lock_when_blocked() {
        let store = MemoryLedgerStore::with_lock_timeout(std::time::Duration::from_millis(30));
        let low = open(&store, "low", 100).await;
        let high = open(&store, "high", 100).await;

        let mut holder = store.begin().await.unwrap();
        holder.get_account_for_update(low.id).await.unwrap();

        // high -> low still asks for `low` first, so it never holds `high`
        let mut tx = store.begin().await.unwrap();
        let result = add_money(&mut tx, high.id, -10, low.id, 10).await;
        assert!(matches!(
            result,
            Err(TransferError::Store(crate::ledger::StoreError::TransactionAborted(_)))
        ));
        assert!(tx.locked_accounts().is_empty());
    }

    #[tokio::test]
    async fn test_configured_timeout_applies() {
        let store = Arc::new(MemoryLedgerStore::new());
        let a = open(&store, "alice", 100).await;
        let b = open(&store, "bob", 100).await;

        let engine = TransferEngine::new(
            Arc::clone(&store),
            EngineConfig {
                transfer_timeout_ms: Some(50),
                allow_overdraft: false,
            },
        );

        let mut holder = store.begin().await.unwrap();
        holder.get_account_for_update(a.id).await.unwrap();

        let result = engine.transfer(TransferParams::new(a.id, b.id, 10)).await;
        assert!(matches!(result, Err(TransferError::DeadlineExceeded)));

        holder.rollback().await.unwrap();
        assert_eq!(store.get_account(a.id).await.unwrap().balance, 100);
        assert_eq!(store.get_account(b.id).await.unwrap().balance, 100);
    }

    #[tokio::test]
    async fn test_overdraft_allowed_when_configured() {
        let store = Arc::new(MemoryLedgerStore::new());
        let a = open(&store, "alice", 10).await;
        let b = open(&store, "bob", 0).await;

        let engine = TransferEngine::new(
            Arc::clone(&store),
            EngineConfig {
                transfer_timeout_ms: None,
                allow_overdraft: true,
            },
        );
        let result = engine
            .transfer(TransferParams::new(a.id, b.id, 25))
            .await
            .unwrap();
        assert_eq!(result.from_account.balance, -15);
        assert_eq!(result.to_account.balance, 25);
    }
}
