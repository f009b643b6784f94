//! PostgreSQL ledger backend (sqlx)

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use tracing::debug;

use super::error::StoreError;
use super::models::{Account, Entry, NewAccount, Page, Transfer};
use super::store::{LedgerStore, LedgerTx};
use crate::config::{IsolationLevel, StoreConfig};
use crate::core_types::{AccountId, Amount, EntryId, TransferId};

/// Ledger schema, idempotent
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id          BIGSERIAL PRIMARY KEY,
    owner       VARCHAR NOT NULL,
    balance     BIGINT NOT NULL,
    currency    VARCHAR NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS entries (
    id          BIGSERIAL PRIMARY KEY,
    account_id  BIGINT NOT NULL REFERENCES accounts (id),
    amount      BIGINT NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS transfers (
    id               BIGSERIAL PRIMARY KEY,
    from_account_id  BIGINT NOT NULL REFERENCES accounts (id),
    to_account_id    BIGINT NOT NULL REFERENCES accounts (id),
    amount           BIGINT NOT NULL CHECK (amount > 0),
    created_at       TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_accounts_owner ON accounts (owner);
CREATE UNIQUE INDEX IF NOT EXISTS idx_accounts_owner_currency ON accounts (owner, currency);
CREATE INDEX IF NOT EXISTS idx_entries_account_id ON entries (account_id);
CREATE INDEX IF NOT EXISTS idx_transfers_from ON transfers (from_account_id);
CREATE INDEX IF NOT EXISTS idx_transfers_to ON transfers (to_account_id);
CREATE INDEX IF NOT EXISTS idx_transfers_from_to ON transfers (from_account_id, to_account_id);
"#;

const ACCOUNT_COLUMNS: &str = "id, owner, balance, currency, created_at";

/// sqlx-backed implementation of [`LedgerStore`]
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
    isolation: IsolationLevel,
    lock_timeout: Duration,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool, config: &StoreConfig) -> Self {
        Self {
            pool,
            isolation: config.isolation,
            lock_timeout: config.lock_timeout(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Statements sent first in every transaction, one per round trip.
    /// Isolation must precede any query that takes a snapshot.
    fn session_statements(&self) -> [String; 2] {
        [
            format!(
                "SET TRANSACTION ISOLATION LEVEL {}",
                self.isolation.as_sql()
            ),
            format!(
                "SET LOCAL lock_timeout = '{}ms'",
                self.lock_timeout.as_millis()
            ),
        ]
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    type Tx = PgLedgerTx;

    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn begin(&self) -> Result<PgLedgerTx, StoreError> {
        let mut tx = self.pool.begin().await?;
        for statement in self.session_statements() {
            sqlx::query(&statement).execute(&mut *tx).await?;
        }
        debug!(isolation = self.isolation.as_sql(), "Transaction opened");
        Ok(PgLedgerTx { tx })
    }

    async fn get_account(&self, id: AccountId) -> Result<Account, StoreError> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1");
        let account = sqlx::query_as::<_, Account>(&sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(account)
    }

    async fn create_account(&self, account: NewAccount) -> Result<Account, StoreError> {
        let sql = format!(
            "INSERT INTO accounts (owner, balance, currency) VALUES ($1, $2, $3) \
             RETURNING {ACCOUNT_COLUMNS}"
        );
        let account = sqlx::query_as::<_, Account>(&sql)
            .bind(&account.owner)
            .bind(account.balance)
            .bind(&account.currency)
            .fetch_one(&self.pool)
            .await?;
        Ok(account)
    }

    async fn list_accounts(
        &self,
        owner: Option<&str>,
        page: Page,
    ) -> Result<Vec<Account>, StoreError> {
        let sql = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts \
             WHERE ($1::VARCHAR IS NULL OR owner = $1) \
             ORDER BY id LIMIT $2 OFFSET $3"
        );
        let accounts = sqlx::query_as::<_, Account>(&sql)
            .bind(owner)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;
        Ok(accounts)
    }

    async fn delete_account(&self, id: AccountId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn get_entry(&self, id: EntryId) -> Result<Entry, StoreError> {
        let entry = sqlx::query_as::<_, Entry>(
            "SELECT id, account_id, amount, created_at FROM entries WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(entry)
    }

    async fn list_entries(
        &self,
        account_id: AccountId,
        page: Page,
    ) -> Result<Vec<Entry>, StoreError> {
        let entries = sqlx::query_as::<_, Entry>(
            "SELECT id, account_id, amount, created_at FROM entries \
             WHERE account_id = $1 ORDER BY id LIMIT $2 OFFSET $3",
        )
        .bind(account_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn get_transfer(&self, id: TransferId) -> Result<Transfer, StoreError> {
        let transfer = sqlx::query_as::<_, Transfer>(
            "SELECT id, from_account_id, to_account_id, amount, created_at \
             FROM transfers WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(transfer)
    }

    async fn list_transfers(
        &self,
        from_account_id: Option<AccountId>,
        to_account_id: Option<AccountId>,
        page: Page,
    ) -> Result<Vec<Transfer>, StoreError> {
        let transfers = sqlx::query_as::<_, Transfer>(
            "SELECT id, from_account_id, to_account_id, amount, created_at FROM transfers \
             WHERE ($1::BIGINT IS NULL AND $2::BIGINT IS NULL) \
                OR from_account_id = $1 OR to_account_id = $2 \
             ORDER BY id LIMIT $3 OFFSET $4",
        )
        .bind(from_account_id)
        .bind(to_account_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok(transfers)
    }
}

/// One open PostgreSQL transaction. Dropping it rolls back.
pub struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn get_account(&mut self, id: AccountId) -> Result<Account, StoreError> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1");
        let account = sqlx::query_as::<_, Account>(&sql)
            .bind(id)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(account)
    }

    async fn get_account_for_update(&mut self, id: AccountId) -> Result<Account, StoreError> {
        // NO KEY UPDATE: does not block concurrent FK inserts referencing the row
        let sql =
            format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 FOR NO KEY UPDATE");
        let account = sqlx::query_as::<_, Account>(&sql)
            .bind(id)
            .fetch_one(&mut *self.tx)
            .await?;
        debug!(account_id = id, "Row lock acquired");
        Ok(account)
    }

    async fn create_entry(
        &mut self,
        account_id: AccountId,
        amount: Amount,
    ) -> Result<Entry, StoreError> {
        let entry = sqlx::query_as::<_, Entry>(
            "INSERT INTO entries (account_id, amount) VALUES ($1, $2) \
             RETURNING id, account_id, amount, created_at",
        )
        .bind(account_id)
        .bind(amount)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(entry)
    }

    async fn create_transfer(
        &mut self,
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: Amount,
    ) -> Result<Transfer, StoreError> {
        let transfer = sqlx::query_as::<_, Transfer>(
            "INSERT INTO transfers (from_account_id, to_account_id, amount) \
             VALUES ($1, $2, $3) \
             RETURNING id, from_account_id, to_account_id, amount, created_at",
        )
        .bind(from_account_id)
        .bind(to_account_id)
        .bind(amount)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(transfer)
    }

    async fn update_account_balance(
        &mut self,
        id: AccountId,
        balance: Amount,
    ) -> Result<Account, StoreError> {
        let sql = format!(
            "UPDATE accounts SET balance = $2 WHERE id = $1 RETURNING {ACCOUNT_COLUMNS}"
        );
        let account = sqlx::query_as::<_, Account>(&sql)
            .bind(id)
            .bind(balance)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(account)
    }

    async fn add_account_balance(
        &mut self,
        id: AccountId,
        delta: Amount,
    ) -> Result<Account, StoreError> {
        let sql = format!(
            "UPDATE accounts SET balance = balance + $2 WHERE id = $1 \
             RETURNING {ACCOUNT_COLUMNS}"
        );
        let account = sqlx::query_as::<_, Account>(&sql)
            .bind(id)
            .bind(delta)
            .fetch_one(&mut *self.tx)
            .await?;
        debug!(account_id = id, delta, balance = account.balance, "Balance adjusted");
        Ok(account)
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
