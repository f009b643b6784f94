//! simple_bank - Ledger bootstrap
//!
//! Loads `config/<env>.yaml`, connects to PostgreSQL, applies the ledger
//! schema and reports what the ledger currently holds.
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌──────────┐    ┌──────────┐
//! │  Config  │───▶│ Postgres │───▶│  Schema  │───▶│  Report  │
//! │  (YAML)  │    │  (pool)  │    │(migrate) │    │ (counts) │
//! └──────────┘    └──────────┘    └──────────┘    └──────────┘
//! ```

use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use tracing::info;

use simple_bank::config::AppConfig;
use simple_bank::core_types::Amount;
use simple_bank::db::Database;
use simple_bank::ledger::{LedgerStore, Page, StoreError};
use simple_bank::logging::init_logging;
use simple_bank::transfer::TransferEngine;

const SCAN_PAGE: i64 = 500;

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

#[derive(Debug, Default, Serialize)]
struct LedgerSummary {
    accounts: usize,
    transfers: usize,
    total_balance: Amount,
}

impl LedgerSummary {
    async fn collect<S: LedgerStore>(store: &S) -> Result<Self, StoreError> {
        let mut summary = Self::default();

        let mut offset = 0;
        loop {
            let page = store
                .list_accounts(None, Page::new(SCAN_PAGE, offset))
                .await?;
            summary.accounts += page.len();
            summary.total_balance += page.iter().map(|a| a.balance).sum::<Amount>();
            if (page.len() as i64) < SCAN_PAGE {
                break;
            }
            offset += SCAN_PAGE;
        }

        let mut offset = 0;
        loop {
            let page = store
                .list_transfers(None, None, Page::new(SCAN_PAGE, offset))
                .await?;
            summary.transfers += page.len();
            if (page.len() as i64) < SCAN_PAGE {
                break;
            }
            offset += SCAN_PAGE;
        }

        Ok(summary)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env)?;
    let _guard = init_logging(&config);

    info!(env = %env, "Starting simple_bank");

    let url = config
        .postgres_url
        .as_deref()
        .context("postgres_url is not configured (set it in the config file or DATABASE_URL)")?;

    let db = Database::connect(url, &config.store)
        .await
        .context("Failed to connect to PostgreSQL")?;
    db.health_check()
        .await
        .context("Database health check failed")?;
    db.migrate()
        .await
        .context("Failed to apply ledger schema")?;

    let engine = TransferEngine::new(Arc::new(db.ledger_store(&config.store)), config.engine);
    info!(
        store = engine.store().name(),
        isolation = config.store.isolation.as_sql(),
        lock_timeout_ms = config.store.lock_timeout_ms,
        allow_overdraft = engine.config().allow_overdraft,
        "Transfer engine ready"
    );

    let summary = LedgerSummary::collect(engine.store()).await?;
    info!(
        summary = %serde_json::to_string(&summary)?,
        "Ledger loaded"
    );

    Ok(())
}
