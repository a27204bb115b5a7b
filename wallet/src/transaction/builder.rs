//! Payment construction via the builder pattern.
//!
//! [`TransactionBuilder`] takes a fresh [`AccountState`] and turns a payment
//! request into an immutable [`UnsignedEnvelope`]. It never touches a key,
//! so everything here is testable without secrets, and it never touches the
//! network: expiry is the submitter's problem.

use chrono::Utc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::types::{
    Amount, AmountError, Asset, Memo, Operation, PaymentOp, TimeBounds, Transaction,
    TransactionHash,
};
use super::xdr::{encode_transaction, XdrWriter, ENVELOPE_TYPE_TX};
use crate::config::{Network, BASE_FEE_STROOPS, MAX_MEMO_TEXT_BYTES, TX_TIMEOUT};
use crate::crypto::hash::sha256;
use crate::crypto::keys::AccountId;
use crate::ledger::AccountState;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("amount must be greater than zero")]
    NonPositiveAmount,

    #[error("amount has more than 7 decimal places")]
    PrecisionExceeded,

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("memo text is {len} bytes, the limit is 28")]
    MemoTooLong { len: usize },

    #[error("invalid destination account: {0}")]
    InvalidDestination(String),

    #[error("payment is missing its {0}")]
    MissingField(&'static str),

    #[error("source sequence number cannot be incremented")]
    SequenceOverflow,

    #[error("fee does not fit in 32 bits")]
    FeeOverflow,
}

impl From<AmountError> for BuildError {
    fn from(err: AmountError) -> Self {
        match err {
            AmountError::PrecisionExceeded => Self::PrecisionExceeded,
            other => Self::InvalidAmount(other.to_string()),
        }
    }
}

/// Seconds since the UNIX epoch, the unit of Stellar time bounds.
pub(crate) fn unix_now() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

// ---------------------------------------------------------------------------
// UnsignedEnvelope
// ---------------------------------------------------------------------------

/// A fully specified payment waiting for a signature.
///
/// There are no setters. Changing the amount, memo or anything else means
/// building again, which also means a new hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedEnvelope {
    tx: Transaction,
    network: Network,
}

impl UnsignedEnvelope {
    pub(crate) fn from_parts(tx: Transaction, network: Network) -> Self {
        Self { tx, network }
    }

    pub fn transaction(&self) -> &Transaction {
        &self.tx
    }

    pub fn source_account(&self) -> &AccountId {
        &self.tx.source_account
    }

    pub fn sequence_number(&self) -> i64 {
        self.tx.sequence_number
    }

    /// Total fee in stroops.
    pub fn fee(&self) -> u32 {
        self.tx.fee
    }

    pub fn time_bounds(&self) -> TimeBounds {
        self.tx.time_bounds
    }

    pub fn memo(&self) -> &Memo {
        &self.tx.memo
    }

    pub fn operations(&self) -> &[Operation] {
        &self.tx.operations
    }

    /// The payment, if the envelope carries one.
    pub fn payment(&self) -> Option<&PaymentOp> {
        self.tx.operations.first().map(|op| match op {
            Operation::Payment(payment) => payment,
        })
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    /// XDR of the `Transaction` body alone.
    pub fn to_xdr(&self) -> Vec<u8> {
        let mut w = XdrWriter::new();
        encode_transaction(&mut w, &self.tx);
        w.into_bytes()
    }

    /// `network_id || ENVELOPE_TYPE_TX || tx_xdr`. Signatures commit to
    /// the hash of this, which is why they do not transfer across networks.
    pub fn signature_base(&self) -> Vec<u8> {
        let mut w = XdrWriter::new();
        w.write_fixed(&self.network.network_id());
        w.write_u32(ENVELOPE_TYPE_TX);
        encode_transaction(&mut w, &self.tx);
        w.into_bytes()
    }

    pub fn hash(&self) -> TransactionHash {
        TransactionHash(sha256(&self.signature_base()))
    }
}

// ---------------------------------------------------------------------------
// TransactionBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for single-payment envelopes.
///
/// # Examples
///
/// ```
/// use ilede_wallet::{AccountState, KeyPair, Network, TransactionBuilder};
///
/// let source = KeyPair::generate().public_key();
/// let state = AccountState::new(source, 5);
/// let destination = KeyPair::generate().public_key().to_string();
///
/// let env = TransactionBuilder::new(&state, Network::Testnet)
///     .destination(&destination)
///     .amount("10")
///     .build()
///     .unwrap();
///
/// assert_eq!(env.sequence_number(), 6);
/// assert_eq!(env.fee(), 100);
/// ```
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    source: AccountId,
    sequence_number: i64,
    network: Network,
    destination: Option<String>,
    asset: Asset,
    amount: Option<String>,
    memo: Memo,
    fee_per_operation: u32,
    timeout: Duration,
    now: Option<u64>,
}

impl TransactionBuilder {
    /// Starts a payment from `source`. The state must be fresh: the
    /// envelope's sequence number is `source.sequence_number + 1`.
    pub fn new(source: &AccountState, network: Network) -> Self {
        Self {
            source: source.account_id,
            sequence_number: source.sequence_number,
            network,
            destination: None,
            asset: Asset::Native,
            amount: None,
            memo: Memo::None,
            fee_per_operation: BASE_FEE_STROOPS,
            timeout: TX_TIMEOUT,
            now: None,
        }
    }

    /// `G...` address. Validated in [`build`](Self::build).
    pub fn destination(mut self, destination: &str) -> Self {
        self.destination = Some(destination.to_string());
        self
    }

    pub fn asset(mut self, asset: Asset) -> Self {
        self.asset = asset;
        self
    }

    /// Decimal amount, e.g. `"10.5"`. Validated in [`build`](Self::build).
    pub fn amount(mut self, amount: &str) -> Self {
        self.amount = Some(amount.to_string());
        self
    }

    pub fn amount_stroops(self, amount: Amount) -> Self {
        let text = amount.to_string();
        self.amount(&text)
    }

    pub fn memo(mut self, memo: Memo) -> Self {
        self.memo = memo;
        self
    }

    /// Bid per operation in stroops; see [`crate::config::FeePolicy`].
    pub fn fee_per_operation(mut self, stroops: u32) -> Self {
        self.fee_per_operation = stroops;
        self
    }

    /// Validity window length, counted from "now".
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Pins the clock, in UNIX seconds. Defaults to the system time.
    pub fn now(mut self, unix_secs: u64) -> Self {
        self.now = Some(unix_secs);
        self
    }

    pub fn build(self) -> Result<UnsignedEnvelope, BuildError> {
        let destination_text = self
            .destination
            .as_deref()
            .ok_or(BuildError::MissingField("destination"))?;
        let amount_text = self
            .amount
            .as_deref()
            .ok_or(BuildError::MissingField("amount"))?;

        let amount = Amount::parse(amount_text)?;
        if !amount.is_positive() {
            return Err(BuildError::NonPositiveAmount);
        }

        let destination: AccountId = destination_text
            .parse()
            .map_err(|_| BuildError::InvalidDestination(destination_text.trim().to_string()))?;

        if let Memo::Text(text) = &self.memo {
            if text.len() > MAX_MEMO_TEXT_BYTES {
                return Err(BuildError::MemoTooLong { len: text.len() });
            }
        }

        let sequence_number = self
            .sequence_number
            .checked_add(1)
            .ok_or(BuildError::SequenceOverflow)?;

        let operations = vec![Operation::Payment(PaymentOp {
            destination,
            asset: self.asset,
            amount,
        })];
        let fee = self
            .fee_per_operation
            .checked_mul(operations.len() as u32)
            .ok_or(BuildError::FeeOverflow)?;

        let now = self.now.unwrap_or_else(unix_now);
        let time_bounds = TimeBounds {
            min_time: now,
            max_time: now.saturating_add(self.timeout.as_secs()),
        };

        if destination == self.source {
            warn!(account = %self.source, "building a payment to self");
        }

        let envelope = UnsignedEnvelope::from_parts(
            Transaction {
                source_account: self.source,
                fee,
                sequence_number,
                time_bounds,
                memo: self.memo,
                operations,
            },
            self.network,
        );
        debug!(
            source = %envelope.source_account(),
            sequence = sequence_number,
            fee,
            hash = %envelope.hash(),
            "built payment envelope"
        );
        Ok(envelope)
    }
}
