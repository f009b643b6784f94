//! Property tests: money is conserved by any sequence of transfers
//!
//! Runs against `MemoryLedgerStore` with overdraft disabled.

use std::sync::Arc;

use futures::future::join_all;
use proptest::prelude::*;

use simple_bank::ledger::{LedgerStore, MemoryLedgerStore, NewAccount, Page};
use simple_bank::{Account, Amount, EngineConfig, TransferEngine, TransferError, TransferParams};

/// (from index, to index, amount)
type Move = (usize, usize, Amount);

fn balances_strategy() -> impl Strategy<Value = Vec<Amount>> {
    prop::collection::vec(0i64..=1_000, 2..=5)
}

fn moves_strategy(accounts: usize) -> impl Strategy<Value = Vec<Move>> {
    prop::collection::vec((0..accounts, 0..accounts, 1i64..=300), 1..40)
}

fn scenario() -> impl Strategy<Value = (Vec<Amount>, Vec<Move>)> {
    balances_strategy().prop_flat_map(|balances| {
        let n = balances.len();
        (Just(balances), moves_strategy(n))
    })
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

async fn open_accounts(store: &MemoryLedgerStore, balances: &[Amount]) -> Vec<Account> {
    let mut accounts = Vec::new();
    for (i, balance) in balances.iter().enumerate() {
        let account = store
            .create_account(NewAccount {
                owner: format!("owner{i}"),
                balance: *balance,
                currency: "USD".to_string(),
            })
            .await
            .unwrap();
        accounts.push(account);
    }
    accounts
}

fn allowed_failure(result: &Result<simple_bank::TransferResult, TransferError>) -> bool {
    matches!(
        result,
        Ok(_) | Err(TransferError::SameAccount) | Err(TransferError::InsufficientFunds { .. })
    )
}

/// Checks every invariant that must hold once all transfers are finished
async fn check_ledger(store: &MemoryLedgerStore, accounts: &[Account], committed: usize) {
    let mut initial_total = 0;
    let mut final_total = 0;
    let mut entry_count = 0;
    let mut entry_sum = 0;

    for account in accounts {
        let current = store.get_account(account.id).await.unwrap();
        let entries = store
            .list_entries(account.id, Page::first(1_000))
            .await
            .unwrap();
        let delta: Amount = entries.iter().map(|e| e.amount).sum();

        assert_eq!(account.balance + delta, current.balance);
        assert!(current.balance >= 0, "overdraft on account {}", account.id);

        initial_total += account.balance;
        final_total += current.balance;
        entry_count += entries.len();
        entry_sum += delta;
    }

    let transfers = store
        .list_transfers(None, None, Page::first(1_000))
        .await
        .unwrap();
    assert_eq!(initial_total, final_total);
    assert_eq!(entry_sum, 0);
    assert_eq!(transfers.len(), committed);
    assert_eq!(entry_count, committed * 2);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// **Conservation under sequential transfers**
    #[test]
    fn prop_sequential_transfers_conserve_money((balances, moves) in scenario()) {
        runtime().block_on(async {
            let store = Arc::new(MemoryLedgerStore::new());
            let engine = TransferEngine::new(Arc::clone(&store), EngineConfig::default());
            let accounts = open_accounts(&store, &balances).await;

            let mut committed = 0;
            for (from, to, amount) in &moves {
                let params = TransferParams::new(accounts[*from].id, accounts[*to].id, *amount);
                let result = engine.transfer(params).await;
                assert!(allowed_failure(&result), "unexpected result: {result:?}");
                if result.is_ok() {
                    committed += 1;
                }
            }

            check_ledger(&store, &accounts, committed).await;
        });
    }

    /// **Conservation under interleaved transfers**
    #[test]
    fn prop_interleaved_transfers_conserve_money((balances, moves) in scenario()) {
        runtime().block_on(async {
            let store = Arc::new(MemoryLedgerStore::new());
            let engine = TransferEngine::new(Arc::clone(&store), EngineConfig::default());
            let accounts = open_accounts(&store, &balances).await;

            let results = join_all(moves.iter().map(|(from, to, amount)| {
                engine.transfer(TransferParams::new(accounts[*from].id, accounts[*to].id, *amount))
            }))
            .await;

            let mut committed = 0;
            for result in &results {
                assert!(allowed_failure(result), "unexpected result: {result:?}");
                if result.is_ok() {
                    committed += 1;
                }
            }

            check_ledger(&store, &accounts, committed).await;
        });
    }
}
