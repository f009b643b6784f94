//! In-process ledger backend
//!
//! Committed rows live behind one `RwLock`. Each transaction buffers its
//! writes and holds per-account async row locks until it ends; `commit`
//! publishes every buffered write under a single write lock, so other
//! readers observe either all of a transaction's writes or none of them.
//!
//! Row locks are `tokio::sync::Mutex` guards owned by the transaction. A lock
//! wait longer than the configured timeout aborts with `TransactionAborted`,
//! mirroring PostgreSQL's `lock_timeout`.
//!
//! Every account a transaction references or locks is also held in key-share
//! mode until the transaction ends, like PostgreSQL's `FOR KEY SHARE` on a
//! foreign key target. `delete_account` needs the key exclusively, so it
//! waits for those transactions and then sees their committed rows.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard};
use tracing::debug;

use super::error::StoreError;
use super::models::{Account, Entry, NewAccount, Page, Transfer};
use super::store::{LedgerStore, LedgerTx, TxState};
use crate::config::StoreConfig;
use crate::core_types::{AccountId, Amount, EntryId, TransferId};

#[derive(Default)]
struct Tables {
    accounts: BTreeMap<AccountId, Account>,
    entries: BTreeMap<EntryId, Entry>,
    transfers: BTreeMap<TransferId, Transfer>,
}

impl Tables {
    fn has_owner_currency(&self, owner: &str, currency: &str) -> bool {
        self.accounts
            .values()
            .any(|a| a.owner == owner && a.currency == currency)
    }

    fn is_referenced(&self, id: AccountId) -> bool {
        self.entries.values().any(|e| e.account_id == id)
            || self
                .transfers
                .values()
                .any(|t| t.from_account_id == id || t.to_account_id == id)
    }
}

struct Shared {
    tables: RwLock<Tables>,
    row_locks: DashMap<AccountId, Arc<Mutex<()>>>,
    key_locks: DashMap<AccountId, Arc<tokio::sync::RwLock<()>>>,
    lock_timeout: Duration,
    account_seq: AtomicI64,
    entry_seq: AtomicI64,
    transfer_seq: AtomicI64,
}

impl Shared {
    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::StoreUnavailable("ledger tables lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::StoreUnavailable("ledger tables lock poisoned".to_string()))
    }

    fn row_lock(&self, id: AccountId) -> Arc<Mutex<()>> {
        Arc::clone(&self.row_locks.entry(id).or_default())
    }

    async fn acquire_row(&self, id: AccountId) -> Result<OwnedMutexGuard<()>, StoreError> {
        let lock = self.row_lock(id);
        tokio::time::timeout(self.lock_timeout, lock.lock_owned())
            .await
            .map_err(|_| self.lock_wait_timeout(id))
    }

    fn lock_wait_timeout(&self, id: AccountId) -> StoreError {
        StoreError::TransactionAborted(format!(
            "lock wait timeout on account {} after {:?}",
            id, self.lock_timeout
        ))
    }

    fn key_lock(&self, id: AccountId) -> Arc<tokio::sync::RwLock<()>> {
        Arc::clone(&self.key_locks.entry(id).or_default())
    }

    async fn share_key(&self, id: AccountId) -> Result<OwnedRwLockReadGuard<()>, StoreError> {
        let lock = self.key_lock(id);
        tokio::time::timeout(self.lock_timeout, lock.read_owned())
            .await
            .map_err(|_| self.lock_wait_timeout(id))
    }

    async fn lock_key(&self, id: AccountId) -> Result<OwnedRwLockWriteGuard<()>, StoreError> {
        let lock = self.key_lock(id);
        tokio::time::timeout(self.lock_timeout, lock.write_owned())
            .await
            .map_err(|_| self.lock_wait_timeout(id))
    }

    fn next_id(seq: &AtomicI64) -> i64 {
        seq.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// In-process implementation of [`LedgerStore`]
#[derive(Clone)]
pub struct MemoryLedgerStore {
    shared: Arc<Shared>,
}

impl MemoryLedgerStore {
    pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new() -> Self {
        Self::with_lock_timeout(Self::DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: RwLock::new(Tables::default()),
                row_locks: DashMap::new(),
                key_locks: DashMap::new(),
                lock_timeout,
                account_seq: AtomicI64::new(0),
                entry_seq: AtomicI64::new(0),
                transfer_seq: AtomicI64::new(0),
            }),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::with_lock_timeout(config.lock_timeout())
    }
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    type Tx = MemoryLedgerTx;

    fn name(&self) -> &'static str {
        "memory"
    }

    async fn begin(&self) -> Result<MemoryLedgerTx, StoreError> {
        Ok(MemoryLedgerTx::new(Arc::clone(&self.shared)))
    }

    async fn get_account(&self, id: AccountId) -> Result<Account, StoreError> {
        self.shared
            .read()?
            .accounts
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn create_account(&self, account: NewAccount) -> Result<Account, StoreError> {
        let mut tables = self.shared.write()?;
        if tables.has_owner_currency(&account.owner, &account.currency) {
            return Err(StoreError::ConstraintViolation(format!(
                "owner {} already has a {} account",
                account.owner, account.currency
            )));
        }

        let account = Account {
            id: Shared::next_id(&self.shared.account_seq),
            owner: account.owner,
            balance: account.balance,
            currency: account.currency,
            created_at: Utc::now(),
        };
        tables.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn list_accounts(
        &self,
        owner: Option<&str>,
        page: Page,
    ) -> Result<Vec<Account>, StoreError> {
        let tables = self.shared.read()?;
        let rows = tables
            .accounts
            .values()
            .filter(|a| owner.is_none_or(|o| a.owner == o))
            .cloned();
        Ok(page.apply(rows))
    }

    async fn delete_account(&self, id: AccountId) -> Result<(), StoreError> {
        // Waits for every open transaction that references or locks `id`
        let _key = self.shared.lock_key(id).await?;

        let mut tables = self.shared.write()?;
        if tables.is_referenced(id) {
            return Err(StoreError::ConstraintViolation(format!(
                "account {id} is still referenced by entries or transfers"
            )));
        }
        tables
            .accounts
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn get_entry(&self, id: EntryId) -> Result<Entry, StoreError> {
        self.shared
            .read()?
            .entries
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_entries(
        &self,
        account_id: AccountId,
        page: Page,
    ) -> Result<Vec<Entry>, StoreError> {
        let tables = self.shared.read()?;
        let rows = tables
            .entries
            .values()
            .filter(|e| e.account_id == account_id)
            .cloned();
        Ok(page.apply(rows))
    }

    async fn get_transfer(&self, id: TransferId) -> Result<Transfer, StoreError> {
        self.shared
            .read()?
            .transfers
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_transfers(
        &self,
        from_account_id: Option<AccountId>,
        to_account_id: Option<AccountId>,
        page: Page,
    ) -> Result<Vec<Transfer>, StoreError> {
        let tables = self.shared.read()?;
        let rows = tables
            .transfers
            .values()
            .filter(|t| match (from_account_id, to_account_id) {
                (None, None) => true,
                (from, to) => {
                    from == Some(t.from_account_id) || to == Some(t.to_account_id)
                }
            })
            .cloned();
        Ok(page.apply(rows))
    }
}

/// One open transaction on a [`MemoryLedgerStore`]
pub struct MemoryLedgerTx {
    shared: Arc<Shared>,
    /// Row locks held until the transaction ends
    locks: HashMap<AccountId, OwnedMutexGuard<()>>,
    /// Key-share locks on every account this transaction touched
    key_shares: HashMap<AccountId, OwnedRwLockReadGuard<()>>,
    /// Accounts written by this transaction, invisible to others until commit
    dirty: HashMap<AccountId, Account>,
    entries: Vec<Entry>,
    transfers: Vec<Transfer>,
    state: TxState,
}

impl MemoryLedgerTx {
    fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            locks: HashMap::new(),
            key_shares: HashMap::new(),
            dirty: HashMap::new(),
            entries: Vec::new(),
            transfers: Vec::new(),
            state: TxState::InFlight,
        }
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    /// Account IDs whose row lock this transaction currently holds
    pub fn locked_accounts(&self) -> Vec<AccountId> {
        let mut ids: Vec<AccountId> = self.locks.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Account IDs this transaction holds in key-share mode
    pub fn referenced_accounts(&self) -> Vec<AccountId> {
        let mut ids: Vec<AccountId> = self.key_shares.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    async fn share_key(&mut self, id: AccountId) -> Result<(), StoreError> {
        if self.key_shares.contains_key(&id) {
            return Ok(());
        }
        let guard = self.shared.share_key(id).await?;
        self.key_shares.insert(id, guard);
        Ok(())
    }

    async fn lock_row(&mut self, id: AccountId) -> Result<(), StoreError> {
        if self.locks.contains_key(&id) {
            return Ok(());
        }
        self.share_key(id).await?;
        let guard = self.shared.acquire_row(id).await?;
        debug!(account_id = id, "Row lock acquired");
        self.locks.insert(id, guard);
        Ok(())
    }

    fn current(&self, id: AccountId) -> Result<Account, StoreError> {
        if let Some(account) = self.dirty.get(&id) {
            return Ok(account.clone());
        }
        self.shared
            .read()?
            .accounts
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn account_exists(&self, id: AccountId) -> Result<bool, StoreError> {
        Ok(self.dirty.contains_key(&id) || self.shared.read()?.accounts.contains_key(&id))
    }

    /// Take the key share first, then check the account still exists
    async fn require_reference(&mut self, column: &str, id: AccountId) -> Result<(), StoreError> {
        self.share_key(id).await?;
        if self.account_exists(id)? {
            Ok(())
        } else {
            Err(StoreError::ConstraintViolation(format!(
                "{column} {id} references a missing account"
            )))
        }
    }

    /// Foreign keys re-checked against the committed tables at commit time.
    /// Key shares keep deletes out, so this only fails on a broken invariant.
    fn check_references(&self, tables: &Tables) -> Result<(), StoreError> {
        let missing = self
            .dirty
            .keys()
            .chain(self.entries.iter().map(|e| &e.account_id))
            .chain(
                self.transfers
                    .iter()
                    .flat_map(|t| [&t.from_account_id, &t.to_account_id]),
            )
            .find(|id| !tables.accounts.contains_key(id));

        match missing {
            Some(id) => Err(StoreError::ConstraintViolation(format!(
                "account {id} was deleted by a concurrent transaction"
            ))),
            None => Ok(()),
        }
    }

    fn discard(&mut self) {
        self.dirty.clear();
        self.entries.clear();
        self.transfers.clear();
        self.state = TxState::Aborted;
    }
}

#[async_trait]
impl LedgerTx for MemoryLedgerTx {
    async fn get_account(&mut self, id: AccountId) -> Result<Account, StoreError> {
        self.current(id)
    }

    async fn get_account_for_update(&mut self, id: AccountId) -> Result<Account, StoreError> {
        self.lock_row(id).await?;
        self.current(id)
    }

    async fn create_entry(
        &mut self,
        account_id: AccountId,
        amount: Amount,
    ) -> Result<Entry, StoreError> {
        self.require_reference("entries.account_id", account_id)
            .await?;
        let entry = Entry {
            id: Shared::next_id(&self.shared.entry_seq),
            account_id,
            amount,
            created_at: Utc::now(),
        };
        self.entries.push(entry.clone());
        Ok(entry)
    }

    async fn create_transfer(
        &mut self,
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: Amount,
    ) -> Result<Transfer, StoreError> {
        if amount <= 0 {
            return Err(StoreError::ConstraintViolation(format!(
                "transfers.amount must be positive, got {amount}"
            )));
        }
        self.require_reference("transfers.from_account_id", from_account_id)
            .await?;
        self.require_reference("transfers.to_account_id", to_account_id)
            .await?;

        let transfer = Transfer {
            id: Shared::next_id(&self.shared.transfer_seq),
            from_account_id,
            to_account_id,
            amount,
            created_at: Utc::now(),
        };
        self.transfers.push(transfer.clone());
        Ok(transfer)
    }

    async fn update_account_balance(
        &mut self,
        id: AccountId,
        balance: Amount,
    ) -> Result<Account, StoreError> {
        self.lock_row(id).await?;
        let mut account = self.current(id)?;
        account.balance = balance;
        self.dirty.insert(id, account.clone());
        Ok(account)
    }

    async fn add_account_balance(
        &mut self,
        id: AccountId,
        delta: Amount,
    ) -> Result<Account, StoreError> {
        self.lock_row(id).await?;
        let mut account = self.current(id)?;
        account.balance = account.balance.checked_add(delta).ok_or_else(|| {
            StoreError::ConstraintViolation(format!(
                "balance of account {id} out of range after adding {delta}"
            ))
        })?;
        self.dirty.insert(id, account.clone());
        Ok(account)
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        let publish = {
            let mut tables = self.shared.write()?;
            self.check_references(&tables).map(|()| {
                for (id, account) in self.dirty.drain() {
                    tables.accounts.insert(id, account);
                }
                for entry in self.entries.drain(..) {
                    tables.entries.insert(entry.id, entry);
                }
                for transfer in self.transfers.drain(..) {
                    tables.transfers.insert(transfer.id, transfer);
                }
            })
        };

        match publish {
            Ok(()) => {
                self.state = TxState::Committed;
                Ok(())
            }
            Err(e) => {
                self.discard();
                Err(e)
            }
        }
    }

    async fn rollback(mut self) -> Result<(), StoreError> {
        self.discard();
        Ok(())
    }
}

impl Drop for MemoryLedgerTx {
    fn drop(&mut self) {
        if self.state == TxState::InFlight {
            debug!(
                buffered_entries = self.entries.len(),
                buffered_transfers = self.transfers.len(),
                "Transaction dropped before commit, discarding writes"
            );
        }
    }
}
