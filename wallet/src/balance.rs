//! Fresh account reads with bounded retries.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::crypto::keys::AccountId;
use crate::ledger::{AccountState, LedgerClient, LedgerError};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    /// The account has never been funded. Recoverable: fund it and retry.
    #[error("account {0} not found on ledger")]
    AccountNotFound(AccountId),

    #[error("ledger unreachable after {attempts} attempts: {reason}")]
    NetworkUnavailable { attempts: u32, reason: String },

    #[error("unexpected ledger response: {0}")]
    Protocol(String),
}

/// Reads account state straight from the ledger. Nothing is cached: every
/// `fetch` reflects the sequence number at the time of the call.
#[derive(Clone)]
pub struct BalanceReader {
    client: Arc<dyn LedgerClient>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for BalanceReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalanceReader")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl BalanceReader {
    pub fn new(client: Arc<dyn LedgerClient>) -> Self {
        Self::with_retry(client, RetryPolicy::reader())
    }

    pub fn with_retry(client: Arc<dyn LedgerClient>, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    pub async fn fetch(&self, account: &AccountId) -> Result<AccountState, ReadError> {
        let result = self
            .retry
            .run("load_account", || self.client.load_account(account))
            .await;
        match result {
            Ok(state) => {
                debug!(
                    account = %account,
                    sequence = state.sequence_number,
                    balances = state.balances.len(),
                    "account loaded"
                );
                Ok(state)
            }
            Err(LedgerError::NotFound) => Err(ReadError::AccountNotFound(*account)),
            Err(LedgerError::Transport(reason)) => Err(ReadError::NetworkUnavailable {
                attempts: self.retry.max_attempts(),
                reason,
            }),
            Err(LedgerError::Protocol(reason)) => Err(ReadError::Protocol(reason)),
        }
    }

    /// The ledger's current base fee, or `None` when fee stats cannot be
    /// read. A single attempt: the fee policy has a floor to fall back on.
    pub async fn base_fee(&self) -> Option<u32> {
        match self.client.base_fee().await {
            Ok(fee) => Some(fee),
            Err(err) => {
                warn!(error = %err, "fee stats unavailable, using configured base fee");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Network;
    use crate::crypto::keys::KeyPair;
    use crate::ledger::{LedgerOutcome, MemoryLedger};
    use crate::transaction::{Amount, Asset, SignedEnvelope, TransactionHash};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails every call with a transport error.
    #[derive(Default)]
    struct Unreachable {
        calls: AtomicU32,
    }

    #[async_trait]
    impl LedgerClient for Unreachable {
        async fn load_account(&self, _: &AccountId) -> Result<AccountState, LedgerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(LedgerError::Transport("connection refused".into()))
        }

        async fn submit(&self, _: &SignedEnvelope) -> Result<LedgerOutcome, LedgerError> {
            Err(LedgerError::Transport("connection refused".into()))
        }

        async fn transaction(
            &self,
            _: &TransactionHash,
        ) -> Result<Option<LedgerOutcome>, LedgerError> {
            Err(LedgerError::Transport("connection refused".into()))
        }

        async fn base_fee(&self) -> Result<u32, LedgerError> {
            Err(LedgerError::Transport("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn fetches_funded_account() {
        let ledger = Arc::new(MemoryLedger::new(Network::Testnet));
        let account = KeyPair::generate().public_key();
        ledger.fund(account, Amount::from_units(1000).unwrap(), 5);

        let state = BalanceReader::new(ledger).fetch(&account).await.unwrap();
        assert_eq!(state.sequence_number, 5);
        assert_eq!(state.balance(&Asset::Native), Amount::from_units(1000).unwrap());
    }

    #[tokio::test]
    async fn unfunded_account_is_not_found() {
        let ledger = Arc::new(MemoryLedger::new(Network::Testnet));
        let account = KeyPair::generate().public_key();
        let err = BalanceReader::new(ledger).fetch(&account).await.unwrap_err();
        assert_eq!(err, ReadError::AccountNotFound(account));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_are_network_unavailable() {
        let client = Arc::new(Unreachable::default());
        let reader = BalanceReader::new(client.clone());
        let account = KeyPair::generate().public_key();

        let err = reader.fetch(&account).await.unwrap_err();
        assert!(matches!(err, ReadError::NetworkUnavailable { attempts: 4, .. }));
        assert_eq!(client.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn base_fee_falls_back_to_none() {
        let reader = BalanceReader::new(Arc::new(Unreachable::default()));
        assert_eq!(reader.base_fee().await, None);

        let ledger = MemoryLedger::new(Network::Testnet).with_base_fee(250);
        assert_eq!(BalanceReader::new(Arc::new(ledger)).base_fee().await, Some(250));
    }
}
