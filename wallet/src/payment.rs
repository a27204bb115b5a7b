//! The composed send flow: fetch, build, sign, submit.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::balance::{BalanceReader, ReadError};
use crate::config::{FeePolicy, Network, WalletConfig};
use crate::ledger::{AccountState, LedgerClient, ResultCode};
use crate::submit::{SubmissionResult, SubmissionStatus, SubmitError, Submitter};
use crate::transaction::{
    sign, Asset, BuildError, Memo, SignError, TransactionBuilder, TransactionHash,
};
use crate::vault::{KeyVault, VaultError};

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Sign(#[from] SignError),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Submit(#[from] SubmitError),

    /// The ledger refused the payment for lack of funds. The fee was still
    /// charged and the sequence number consumed.
    #[error("insufficient balance (transaction {hash})")]
    InsufficientBalance { hash: TransactionHash },

    #[error("transaction {hash} rejected: {code}")]
    Rejected {
        hash: TransactionHash,
        code: ResultCode,
    },
}

/// One payment, as a user would describe it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub destination: String,
    #[serde(default)]
    pub asset: Asset,
    /// Decimal amount, e.g. `"12.5"`.
    pub amount: String,
    #[serde(default)]
    pub memo: Memo,
}

impl PaymentRequest {
    pub fn native(destination: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            asset: Asset::Native,
            amount: amount.into(),
            memo: Memo::None,
        }
    }

    pub fn with_memo(mut self, memo: Memo) -> Self {
        self.memo = memo;
        self
    }

    pub fn with_asset(mut self, asset: Asset) -> Self {
        self.asset = asset;
        self
    }
}

/// Sends payments from the vault's account.
///
/// Every [`send`](Self::send) reads a fresh sequence number, so concurrent
/// sends never share a snapshot; at worst one of them loses the race and
/// comes back as a `tx_bad_seq` rejection.
#[derive(Debug)]
pub struct PaymentService {
    vault: Arc<KeyVault>,
    reader: BalanceReader,
    submitter: Submitter,
    network: Network,
    fees: FeePolicy,
    timeout: Duration,
}

impl PaymentService {
    pub fn new(vault: Arc<KeyVault>, client: Arc<dyn LedgerClient>, config: &WalletConfig) -> Self {
        Self {
            vault,
            reader: BalanceReader::with_retry(client.clone(), config.reader_retry),
            submitter: Submitter::with_retry(client, config.submit_retry),
            network: config.network.clone(),
            fees: config.fees,
            timeout: config.tx_timeout(),
        }
    }

    pub fn submitter(&self) -> &Submitter {
        &self.submitter
    }

    /// Current state of the vault's own account.
    pub async fn account(&self) -> Result<AccountState, PaymentError> {
        let source = self.vault.with_key(|key| key.public_key())?;
        Ok(self.reader.fetch(&source).await?)
    }

    pub async fn send(&self, request: &PaymentRequest) -> Result<SubmissionResult, PaymentError> {
        let state = self.account().await?;
        let fee = self.fees.per_operation(self.reader.base_fee().await);

        let envelope = TransactionBuilder::new(&state, self.network.clone())
            .destination(&request.destination)
            .asset(request.asset.clone())
            .amount(&request.amount)
            .memo(request.memo.clone())
            .fee_per_operation(fee)
            .timeout(self.timeout)
            .build()?;
        let signed = self.vault.with_key(|key| sign(&envelope, key))??;

        info!(
            account = %state.account_id,
            hash = %signed.hash(),
            sequence = envelope.sequence_number(),
            fee,
            "submitting payment"
        );
        let result = self.submitter.submit(&signed).await?;

        match (result.status, result.result_code.clone()) {
            (SubmissionStatus::Accepted, _) => Ok(result),
            (SubmissionStatus::Rejected, Some(ResultCode::InsufficientBalance)) => {
                warn!(hash = %result.transaction_hash, "payment rejected for insufficient balance");
                Err(PaymentError::InsufficientBalance {
                    hash: result.transaction_hash,
                })
            }
            (SubmissionStatus::Rejected, code) => Err(PaymentError::Rejected {
                hash: result.transaction_hash,
                code: code.unwrap_or_else(|| ResultCode::Other("unknown".into())),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::KeyPair;
    use crate::ledger::MemoryLedger;
    use crate::transaction::Amount;
    use crate::vault::MemoryKeyStore;

    struct Fixture {
        ledger: Arc<MemoryLedger>,
        service: PaymentService,
        alice: KeyPair,
        bob: KeyPair,
    }

    fn fixture(ledger: MemoryLedger, alice_units: i64) -> Fixture {
        let ledger = Arc::new(ledger);
        let vault = Arc::new(KeyVault::new(MemoryKeyStore::new()));
        let alice = vault.generate().unwrap();
        let bob = KeyPair::generate();
        ledger.fund(
            alice.public_key(),
            Amount::from_units(alice_units).unwrap(),
            5,
        );
        ledger.fund(bob.public_key(), Amount::from_units(1).unwrap(), 0);
        let service = PaymentService::new(vault, ledger.clone(), &WalletConfig::default());
        Fixture {
            ledger,
            service,
            alice,
            bob,
        }
    }

    #[tokio::test]
    async fn sends_native_payment() {
        let f = fixture(MemoryLedger::new(Network::Testnet), 1000);
        let request = PaymentRequest::native(f.bob.public_key().to_string(), "10")
            .with_memo(Memo::Text("rent".into()));

        let result = f.service.send(&request).await.unwrap();
        assert!(result.is_accepted());

        let alice = f.ledger.account(&f.alice.public_key()).unwrap();
        assert_eq!(alice.sequence_number, 6);
        assert_eq!(
            alice.native_balance(),
            Amount::from_stroops(990 * 10_000_000 - 100)
        );
    }

    #[tokio::test]
    async fn consecutive_sends_use_fresh_sequence_numbers() {
        let f = fixture(MemoryLedger::new(Network::Testnet), 1000);
        let request = PaymentRequest::native(f.bob.public_key().to_string(), "1");

        f.service.send(&request).await.unwrap();
        f.service.send(&request).await.unwrap();
        assert_eq!(
            f.ledger.account(&f.alice.public_key()).unwrap().sequence_number,
            7
        );
    }

    #[tokio::test]
    async fn bids_the_ledger_base_fee() {
        let f = fixture(MemoryLedger::new(Network::Testnet).with_base_fee(300), 1000);
        let request = PaymentRequest::native(f.bob.public_key().to_string(), "10");

        f.service.send(&request).await.unwrap();
        assert_eq!(
            f.ledger.account(&f.alice.public_key()).unwrap().native_balance(),
            Amount::from_stroops(990 * 10_000_000 - 300)
        );
    }

    #[tokio::test]
    async fn insufficient_balance_is_surfaced() {
        let f = fixture(MemoryLedger::new(Network::Testnet), 5);
        let request = PaymentRequest::native(f.bob.public_key().to_string(), "50");

        let err = f.service.send(&request).await.unwrap_err();
        assert!(matches!(err, PaymentError::InsufficientBalance { .. }));
        assert_eq!(
            f.ledger.account(&f.alice.public_key()).unwrap().sequence_number,
            6
        );
    }

    #[tokio::test]
    async fn unknown_destination_is_rejected() {
        let f = fixture(MemoryLedger::new(Network::Testnet), 1000);
        let stranger = KeyPair::generate().public_key().to_string();

        let err = f
            .service
            .send(&PaymentRequest::native(stranger, "1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PaymentError::Rejected {
                code: ResultCode::NoDestination,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn validation_fails_before_submission() {
        let f = fixture(MemoryLedger::new(Network::Testnet), 1000);
        let bob = f.bob.public_key().to_string();

        let err = f
            .service
            .send(&PaymentRequest::native(bob.clone(), "0"))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Build(BuildError::NonPositiveAmount)));

        let err = f
            .service
            .send(&PaymentRequest::native(bob, "1").with_memo(Memo::Text("x".repeat(29))))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PaymentError::Build(BuildError::MemoTooLong { len: 29 })
        ));
        assert_eq!(f.ledger.submit_calls(), 0);
    }

    #[tokio::test]
    async fn empty_vault_and_unfunded_account() {
        let ledger = Arc::new(MemoryLedger::new(Network::Testnet));
        let vault = Arc::new(KeyVault::new(MemoryKeyStore::new()));
        let service = PaymentService::new(vault.clone(), ledger, &WalletConfig::default());
        let request = PaymentRequest::native(KeyPair::generate().public_key().to_string(), "1");

        let err = service.send(&request).await.unwrap_err();
        assert!(matches!(err, PaymentError::Vault(VaultError::NoWallet)));

        let account = vault.generate().unwrap().public_key();
        let err = service.send(&request).await.unwrap_err();
        assert!(matches!(
            err,
            PaymentError::Read(ReadError::AccountNotFound(id)) if id == account
        ));
    }

    #[test]
    fn request_json_defaults() {
        let request: PaymentRequest =
            serde_json::from_str(r#"{"destination":"GABC","amount":"1.5"}"#).unwrap();
        assert_eq!(request.asset, Asset::Native);
        assert_eq!(request.memo, Memo::None);
    }
}
