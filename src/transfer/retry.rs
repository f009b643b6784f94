//! Caller-side retry helper
//!
//! The engine itself never retries. Callers that want to ride out lock
//! timeouts or a flapping database wrap their call in [`retry_transfer`].

use std::time::Duration;
use tracing::warn;

use super::engine::TransferEngine;
use super::error::TransferError;
use super::types::{TransferParams, TransferResult};
use crate::ledger::LedgerStore;

/// Exponential backoff policy
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self
            .multiplier
            .checked_pow(retry.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

/// Run a transfer, retrying errors marked retryable.
///
/// Non-retryable errors and the error of the last attempt are returned as is.
pub async fn retry_transfer<S: LedgerStore>(
    engine: &TransferEngine<S>,
    params: TransferParams,
    policy: &RetryPolicy,
) -> Result<TransferResult, TransferError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match engine.transfer(params).await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying transfer"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
