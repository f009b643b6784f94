//! Deterministic test-data builder
//!
//! Every generator draws from one explicit `StdRng`, so a seed reproduces
//! the same owners, balances and currencies on every run.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::core_types::Amount;
use crate::ledger::{Account, LedgerStore, NewAccount, StoreError};

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

/// Currencies drawn by [`LedgerFixtures::random_currency`]
pub const CURRENCIES: [&str; 3] = ["USD", "EUR", "CAD"];

pub struct LedgerFixtures {
    rng: StdRng,
}

impl LedgerFixtures {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Integer in `min..=max`
    pub fn random_int(&mut self, min: i64, max: i64) -> i64 {
        self.rng.gen_range(min..=max)
    }

    /// Lowercase ASCII string of length `n`
    pub fn random_string(&mut self, n: usize) -> String {
        (0..n)
            .map(|_| ALPHABET[self.rng.gen_range(0..ALPHABET.len())] as char)
            .collect()
    }

    pub fn random_owner(&mut self) -> String {
        self.random_string(6)
    }

    /// Amount in `0..=1000`
    pub fn random_money(&mut self) -> Amount {
        self.random_int(0, 1000)
    }

    pub fn random_currency(&mut self) -> String {
        CURRENCIES[self.rng.gen_range(0..CURRENCIES.len())].to_string()
    }

    pub fn new_account(&mut self) -> NewAccount {
        NewAccount {
            owner: self.random_owner(),
            balance: self.random_money(),
            currency: self.random_currency(),
        }
    }

    /// Open an account with random owner, balance and currency
    pub async fn create_account<S: LedgerStore>(
        &mut self,
        store: &S,
    ) -> Result<Account, StoreError> {
        let account = self.new_account();
        store.create_account(account).await
    }

    /// Open an account with random owner and currency and a fixed balance
    pub async fn create_account_with_balance<S: LedgerStore>(
        &mut self,
        store: &S,
        balance: Amount,
    ) -> Result<Account, StoreError> {
        let account = NewAccount {
            balance,
            ..self.new_account()
        };
        store.create_account(account).await
    }
}
