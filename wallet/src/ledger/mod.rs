//! # Ledger Access
//!
//! Everything that talks to "the ledger" goes through [`LedgerClient`].
//! Two implementations ship with the crate:
//!
//! - [`horizon::HorizonClient`], a Horizon REST client over `reqwest`.
//! - [`memory::MemoryLedger`], an in-process ledger that enforces the same
//!   rules (sequence numbers, signatures, time bounds, balances, fees).
//!   Tests and offline demos run against it.
//!
//! The trait deliberately exposes raw outcomes. Retrying, duplicate
//! detection and error shaping belong to [`crate::balance`] and
//! [`crate::submit`], so every backend gets them for free.

pub mod horizon;
pub mod memory;
pub mod result_code;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::crypto::keys::AccountId;
use crate::transaction::{Amount, Asset, SignedEnvelope, TransactionHash};

pub use horizon::HorizonClient;
pub use memory::MemoryLedger;
pub use result_code::ResultCode;

/// Ledger I/O failures, split by whether asking again could help.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The account or transaction does not exist (HTTP 404).
    #[error("not found on ledger")]
    NotFound,

    /// Connection, timeout or 5xx. The request may or may not have landed.
    #[error("ledger unreachable: {0}")]
    Transport(String),

    /// The ledger answered with something we cannot interpret.
    #[error("unexpected ledger response: {0}")]
    Protocol(String),
}

impl LedgerError {
    /// Transport failures are the only ones worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// What the ledger did with a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LedgerOutcome {
    Applied { hash: TransactionHash, ledger: u32 },
    Rejected { hash: TransactionHash, code: ResultCode },
}

impl LedgerOutcome {
    pub fn hash(&self) -> TransactionHash {
        match self {
            Self::Applied { hash, .. } | Self::Rejected { hash, .. } => *hash,
        }
    }
}

/// Snapshot of an account as the ledger last reported it.
///
/// Only valid for building one transaction: the sequence number moves as
/// soon as anything is submitted from the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    pub account_id: AccountId,
    /// Current sequence number; the next transaction uses this plus one.
    #[serde(with = "i64_string")]
    pub sequence_number: i64,
    pub balances: BTreeMap<Asset, Amount>,
}

impl AccountState {
    pub fn new(account_id: AccountId, sequence_number: i64) -> Self {
        Self {
            account_id,
            sequence_number,
            balances: BTreeMap::new(),
        }
    }

    pub fn with_balance(mut self, asset: Asset, amount: Amount) -> Self {
        self.balances.insert(asset, amount);
        self
    }

    /// Balance of `asset`; zero when the account holds no trust line.
    pub fn balance(&self, asset: &Asset) -> Amount {
        self.balances.get(asset).copied().unwrap_or(Amount::ZERO)
    }

    pub fn native_balance(&self) -> Amount {
        self.balance(&Asset::Native)
    }
}

/// The ledger as the wallet sees it.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Balances and sequence number. [`LedgerError::NotFound`] for an
    /// unfunded account.
    async fn load_account(&self, account: &AccountId) -> Result<AccountState, LedgerError>;

    /// One submission attempt. A rejection is `Ok(Rejected)`, not an error.
    async fn submit(&self, envelope: &SignedEnvelope) -> Result<LedgerOutcome, LedgerError>;

    /// Looks a transaction up by hash. `None` if the ledger never saw it
    /// land.
    async fn transaction(
        &self,
        hash: &TransactionHash,
    ) -> Result<Option<LedgerOutcome>, LedgerError>;

    /// Base fee per operation charged in the last closed ledger.
    async fn base_fee(&self) -> Result<u32, LedgerError>;
}

/// Sequence numbers travel as strings: they outgrow a JSON double.
mod i64_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        String::deserialize(deserializer)?
            .parse()
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::KeyPair;

    #[test]
    fn only_transport_is_transient() {
        assert!(LedgerError::Transport("reset".into()).is_transient());
        assert!(!LedgerError::NotFound.is_transient());
        assert!(!LedgerError::Protocol("bad json".into()).is_transient());
    }

    #[test]
    fn missing_balance_is_zero() {
        let issuer = KeyPair::generate().public_key();
        let state = AccountState::new(KeyPair::generate().public_key(), 1)
            .with_balance(Asset::Native, Amount::from_stroops(5));
        assert_eq!(state.native_balance(), Amount::from_stroops(5));
        assert_eq!(
            state.balance(&Asset::credit("USD", issuer).unwrap()),
            Amount::ZERO
        );
    }

    #[test]
    fn account_state_json_shape() {
        let id = KeyPair::from_seed(&[7u8; 32]).public_key();
        let state = AccountState::new(id, 12_884_901_888)
            .with_balance(Asset::Native, Amount::from_units(1000).unwrap());
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["sequence_number"], "12884901888");
        assert_eq!(json["balances"]["native"], "1000.0000000");

        let back: AccountState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }
}
