//! End-to-end tests for the wallet pipeline.
//!
//! Each test composes the real components (vault, reader, builder, signer,
//! submitter) over an in-memory ledger, with no shared state between tests.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use ilede_wallet::ledger::{LedgerError, LedgerOutcome, MemoryLedger};
use ilede_wallet::transaction::TransactionHash;
use ilede_wallet::vault::MemoryKeyStore;
use ilede_wallet::{
    sign, AccountId, AccountState, Amount, Asset, BalanceReader, BuildError, KeyPair, KeyVault,
    LedgerClient, Memo, Network, SignError, SignedEnvelope, SubmissionStatus, Submitter,
    TransactionBuilder, VaultError,
};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn units(n: i64) -> Amount {
    Amount::from_units(n).unwrap()
}

/// A ledger that applies everything and keeps the wire form of what it got.
#[derive(Default)]
struct EchoLedger {
    received: Mutex<Vec<String>>,
}

#[async_trait]
impl LedgerClient for EchoLedger {
    async fn load_account(&self, _: &AccountId) -> Result<AccountState, LedgerError> {
        Err(LedgerError::NotFound)
    }

    async fn submit(&self, envelope: &SignedEnvelope) -> Result<LedgerOutcome, LedgerError> {
        self.received.lock().push(envelope.to_xdr_base64());
        Ok(LedgerOutcome::Applied {
            hash: envelope.hash(),
            ledger: 1,
        })
    }

    async fn transaction(
        &self,
        _: &TransactionHash,
    ) -> Result<Option<LedgerOutcome>, LedgerError> {
        Ok(None)
    }

    async fn base_fee(&self) -> Result<u32, LedgerError> {
        Ok(100)
    }
}

// ---------------------------------------------------------------------------
// 1. Round Trip Through the Wire
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submitted_envelope_round_trips() {
    let echo = Arc::new(EchoLedger::default());
    let submitter = Submitter::new(echo.clone());
    let key = KeyPair::generate();
    let destination = KeyPair::generate().public_key();
    let issuer = KeyPair::generate().public_key();

    let cases = [
        (Asset::Native, "10", Memo::Text("test".into())),
        (Asset::Native, "0.0000001", Memo::None),
        (Asset::credit("USDC", issuer).unwrap(), "1234.5", Memo::Id(u64::MAX)),
        (
            Asset::credit("LONGASSET12", issuer).unwrap(),
            "922337203685.4775807",
            Memo::Text("x".repeat(28)),
        ),
    ];

    for (i, (asset, amount, memo)) in cases.into_iter().enumerate() {
        let state = AccountState::new(key.public_key(), i as i64);
        let unsigned = TransactionBuilder::new(&state, Network::Testnet)
            .destination(&destination.to_string())
            .asset(asset.clone())
            .amount(amount)
            .memo(memo.clone())
            .build()
            .unwrap();
        let signed = sign(&unsigned, &key).unwrap();
        let result = submitter.submit(&signed).await.unwrap();
        assert_eq!(result.status, SubmissionStatus::Accepted);

        let wire = echo.received.lock().last().cloned().unwrap();
        let echoed = SignedEnvelope::from_xdr_base64(&wire, Network::Testnet).unwrap();
        let env = echoed.envelope();
        let payment = env.payment().unwrap();

        assert_eq!(env.source_account(), &key.public_key());
        assert_eq!(payment.destination, destination);
        assert_eq!(payment.asset, asset);
        assert_eq!(payment.amount, Amount::parse(amount).unwrap());
        assert_eq!(env.memo(), &memo);
        assert_eq!(echoed.hash(), signed.hash());
        assert!(echoed.is_signed_by(&key.public_key()));
    }
}

// ---------------------------------------------------------------------------
// 2. Builder and Signer Laws
// ---------------------------------------------------------------------------

#[test]
fn signing_with_another_key_is_a_key_mismatch() {
    let owner = KeyPair::generate();
    let state = AccountState::new(owner.public_key(), 1);
    let unsigned = TransactionBuilder::new(&state, Network::Testnet)
        .destination(&KeyPair::generate().public_key().to_string())
        .amount("1")
        .build()
        .unwrap();

    for _ in 0..8 {
        let intruder = KeyPair::generate();
        match sign(&unsigned, &intruder) {
            Err(SignError::KeyMismatch { expected, found }) => {
                assert_eq!(expected, owner.public_key());
                assert_eq!(found, intruder.public_key());
            }
            other => panic!("expected KeyMismatch, got {other:?}"),
        }
    }
}

#[test]
fn non_positive_amounts_are_rejected() {
    let state = AccountState::new(KeyPair::generate().public_key(), 1);
    let destination = KeyPair::generate().public_key().to_string();

    for amount in ["0", "-1", "0.0000000", "-0.0000001", "-922337203685.4775807"] {
        let err = TransactionBuilder::new(&state, Network::Testnet)
            .destination(&destination)
            .amount(amount)
            .build()
            .unwrap_err();
        assert_eq!(err, BuildError::NonPositiveAmount, "amount {amount}");
    }
}

#[test]
fn memo_text_boundary() {
    let state = AccountState::new(KeyPair::generate().public_key(), 1);
    let destination = KeyPair::generate().public_key().to_string();
    let build = |memo: String| {
        TransactionBuilder::new(&state, Network::Testnet)
            .destination(&destination)
            .amount("1")
            .memo(Memo::Text(memo))
            .build()
    };

    assert!(build("a".repeat(28)).is_ok());
    assert_eq!(
        build("a".repeat(29)).unwrap_err(),
        BuildError::MemoTooLong { len: 29 }
    );
}

// ---------------------------------------------------------------------------
// 3. Sequence Collisions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn one_snapshot_yields_at_most_one_acceptance() {
    let ledger = Arc::new(MemoryLedger::new(Network::Testnet));
    let alice = KeyPair::generate();
    let bob = KeyPair::generate().public_key();
    ledger.fund(alice.public_key(), units(1000), 5);
    ledger.fund(bob, units(1), 0);

    let snapshot = BalanceReader::new(ledger.clone())
        .fetch(&alice.public_key())
        .await
        .unwrap();
    let build = |amount: &str| {
        let unsigned = TransactionBuilder::new(&snapshot, Network::Testnet)
            .destination(&bob.to_string())
            .amount(amount)
            .build()
            .unwrap();
        sign(&unsigned, &alice).unwrap()
    };
    let first = build("10");
    let second = build("20");
    assert_eq!(
        first.envelope().sequence_number(),
        second.envelope().sequence_number()
    );

    let submitter = Submitter::new(ledger.clone());
    let results = [
        submitter.submit(&first).await.unwrap(),
        submitter.submit(&second).await.unwrap(),
    ];
    let accepted = results
        .iter()
        .filter(|r| r.status == SubmissionStatus::Accepted)
        .count();
    assert_eq!(accepted, 1);
    assert_eq!(ledger.account(&alice.public_key()).unwrap().sequence_number, 6);
}

// ---------------------------------------------------------------------------
// 4. Vault Laws
// ---------------------------------------------------------------------------

#[test]
fn clear_twice_then_load_is_empty() {
    let vault = KeyVault::new(MemoryKeyStore::new());
    vault.generate().unwrap();

    vault.clear().unwrap();
    assert_eq!(vault.load().unwrap(), None);
    vault.clear().unwrap();
    assert_eq!(vault.load().unwrap(), None);
}

#[test]
fn invalid_import_leaves_stored_key() {
    let vault = KeyVault::new(MemoryKeyStore::new());
    let stored = vault.generate().unwrap();

    let err = vault.import("not-a-valid-key").unwrap_err();
    assert!(matches!(err, VaultError::InvalidKeyFormat));

    let loaded = vault.load().unwrap().unwrap();
    assert_eq!(loaded, stored);
    assert_eq!(*loaded.secret(), *stored.secret());
}

// ---------------------------------------------------------------------------
// 5. Full Payment Scenario
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fund_fetch_build_sign_submit() {
    let ledger = Arc::new(MemoryLedger::new(Network::Testnet));
    let vault = KeyVault::new(MemoryKeyStore::new());
    let key = vault.generate().unwrap();
    let source = key.public_key();
    let destination = KeyPair::generate().public_key();

    // Funded externally.
    ledger.fund(source, units(1000), 5);
    ledger.fund(destination, units(1), 0);

    let reader = BalanceReader::new(ledger.clone());
    let state = reader.fetch(&source).await.unwrap();
    assert_eq!(state.sequence_number, 5);
    assert_eq!(state.native_balance(), units(1000));

    let unsigned = TransactionBuilder::new(&state, Network::Testnet)
        .destination(&destination.to_string())
        .amount("10")
        .memo(Memo::Text("test".into()))
        .build()
        .unwrap();
    let fee = i64::from(unsigned.fee());
    let signed = vault.with_key(|k| sign(&unsigned, k)).unwrap().unwrap();

    let result = Submitter::new(ledger.clone()).submit(&signed).await.unwrap();
    assert_eq!(result.status, SubmissionStatus::Accepted);
    assert!(result.ledger_sequence.unwrap() > 0);
    assert!(!result.duplicate);

    let after = reader.fetch(&source).await.unwrap();
    assert_eq!(after.sequence_number, 6);
    assert_eq!(
        after.native_balance(),
        Amount::from_stroops(units(990).stroops() - fee)
    );
}
