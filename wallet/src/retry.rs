//! Bounded exponential backoff for ledger calls.
//!
//! Only transport failures are retried. A ledger that answered, even with
//! a rejection or a 404, answered deterministically and asking again will
//! not change its mind.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::config::{INITIAL_BACKOFF, READER_ATTEMPTS, SUBMIT_ATTEMPTS};
use crate::ledger::LedgerError;

/// Attempt budget and backoff schedule.
///
/// Delay before retry `n` (0-based) is `initial_backoff_ms * 2^n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub attempts: u32,
    pub initial_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::submitter()
    }
}

impl RetryPolicy {
    /// Budget for balance and sequence reads.
    pub fn reader() -> Self {
        Self {
            attempts: READER_ATTEMPTS,
            initial_backoff_ms: INITIAL_BACKOFF.as_millis() as u64,
        }
    }

    /// Budget for envelope submission.
    pub fn submitter() -> Self {
        Self {
            attempts: SUBMIT_ATTEMPTS,
            initial_backoff_ms: INITIAL_BACKOFF.as_millis() as u64,
        }
    }

    /// A single attempt, no backoff.
    pub fn once() -> Self {
        Self {
            attempts: 1,
            initial_backoff_ms: 0,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.attempts.max(1)
    }

    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.min(16);
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(factor))
    }

    /// Runs `op` until it succeeds, fails non-transiently, or the budget is
    /// spent. The last error is returned on exhaustion.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut op: F) -> Result<T, LedgerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let attempts = self.max_attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Err(err) if err.is_transient() && attempt < attempts => {
                    let delay = self.backoff(attempt - 1);
                    warn!(
                        operation,
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient ledger failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::reader();
        assert_eq!(policy.backoff(0), Duration::from_millis(500));
        assert_eq!(policy.backoff(1), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(2), Duration::from_millis(2_000));
    }

    #[test]
    fn zero_attempts_means_one() {
        let policy = RetryPolicy {
            attempts: 0,
            initial_backoff_ms: 10,
        };
        assert_eq!(policy.max_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transport_failures_then_succeeds() {
        let calls = &AtomicU32::new(0);
        let started = Instant::now();

        let result = RetryPolicy::reader()
            .run("test", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(LedgerError::Transport("connection reset".into()))
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 500ms + 1000ms of backoff.
        assert!(started.elapsed() >= Duration::from_millis(1_500));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_budget() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = RetryPolicy::submitter()
            .run("test", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LedgerError::Transport("timeout".into()))
            })
            .await;

        assert!(matches!(result, Err(LedgerError::Transport(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn does_not_retry_protocol_errors() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = RetryPolicy::reader()
            .run("test", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LedgerError::Protocol("garbage".into()))
            })
            .await;

        assert!(matches!(result, Err(LedgerError::Protocol(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
