//! An in-process ledger.
//!
//! Applies the rules a single payment is subject to on the real network,
//! in the same order a validator checks them: known source, time bounds,
//! minimum fee, sequence number, signature, fee balance, then the payment
//! itself. Minimum reserves and trust-line limits are not modelled.
//!
//! Failed payments still consume the sequence number and charge the fee,
//! exactly like `tx_failed` on the real ledger.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;

use super::{AccountState, LedgerClient, LedgerError, LedgerOutcome, ResultCode};
use crate::config::{Network, BASE_FEE_STROOPS};
use crate::crypto::keys::AccountId;
use crate::transaction::builder::unix_now;
use crate::transaction::{Amount, Asset, Operation, PaymentOp, SignedEnvelope, TransactionHash};

#[derive(Debug)]
struct State {
    accounts: HashMap<AccountId, AccountState>,
    ledger: u32,
}

/// A [`LedgerClient`] that keeps the whole ledger in memory.
#[derive(Debug)]
pub struct MemoryLedger {
    network: Network,
    base_fee: u32,
    state: Mutex<State>,
    outcomes: DashMap<TransactionHash, LedgerOutcome>,
    /// Submissions that will fail with a transport error before reaching
    /// the ledger.
    drop_before: AtomicU32,
    /// Submissions that will be applied but whose reply is lost.
    drop_after: AtomicU32,
    submit_calls: AtomicU32,
}

impl MemoryLedger {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            base_fee: BASE_FEE_STROOPS,
            state: Mutex::new(State {
                accounts: HashMap::new(),
                ledger: 1,
            }),
            outcomes: DashMap::new(),
            drop_before: AtomicU32::new(0),
            drop_after: AtomicU32::new(0),
            submit_calls: AtomicU32::new(0),
        }
    }

    pub fn with_base_fee(mut self, stroops: u32) -> Self {
        self.base_fee = stroops;
        self
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Creates (or resets) an account with a native balance.
    pub fn fund(&self, account: AccountId, native: Amount, sequence_number: i64) {
        let state = AccountState::new(account, sequence_number).with_balance(Asset::Native, native);
        self.state.lock().accounts.insert(account, state);
    }

    /// Sets a balance on an existing account; a no-op for unknown accounts.
    pub fn set_balance(&self, account: &AccountId, asset: Asset, amount: Amount) {
        if let Some(state) = self.state.lock().accounts.get_mut(account) {
            state.balances.insert(asset, amount);
        }
    }

    pub fn account(&self, account: &AccountId) -> Option<AccountState> {
        self.state.lock().accounts.get(account).cloned()
    }

    /// The next `n` submissions fail with a transport error and never reach
    /// the ledger.
    pub fn fail_next(&self, n: u32) {
        self.drop_before.store(n, Ordering::SeqCst);
    }

    /// The next `n` submissions are applied, but the caller sees a
    /// transport error instead of the result.
    pub fn lose_next_reply(&self, n: u32) {
        self.drop_after.store(n, Ordering::SeqCst);
    }

    /// Number of `submit` calls received, including dropped ones.
    pub fn submit_calls(&self) -> u32 {
        self.submit_calls.load(Ordering::SeqCst)
    }

    fn take_one(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn apply(&self, envelope: &SignedEnvelope) -> LedgerOutcome {
        let env = envelope.envelope();
        let hash = envelope.hash();
        let rejected = |code| LedgerOutcome::Rejected { hash, code };

        if env.network() != &self.network {
            return rejected(ResultCode::BadAuth);
        }

        let mut state = self.state.lock();
        let source_id = *env.source_account();
        let Some(source) = state.accounts.get(&source_id) else {
            return rejected(ResultCode::NoSourceAccount);
        };

        let now = unix_now();
        let bounds = env.time_bounds();
        if bounds.is_premature(now) {
            return rejected(ResultCode::TooEarly);
        }
        if bounds.is_expired(now) {
            return rejected(ResultCode::TooLate);
        }

        let ops = env.operations().len() as u64;
        if ops == 0 {
            return rejected(ResultCode::Malformed);
        }
        if u64::from(env.fee()) < u64::from(self.base_fee) * ops {
            return rejected(ResultCode::InsufficientFee);
        }
        if source.sequence_number.checked_add(1) != Some(env.sequence_number()) {
            return rejected(ResultCode::BadSequence);
        }
        if !envelope.is_signed_by(&source_id) {
            return rejected(ResultCode::BadAuth);
        }

        // Only the base fee per operation is charged, not the full bid.
        let charged = Amount::from_stroops(i64::from(self.base_fee) * ops as i64);
        let after_fee = match source.native_balance().checked_sub(charged) {
            Some(left) if left.stroops() >= 0 => left,
            _ => return rejected(ResultCode::InsufficientBalance),
        };

        // From here on the transaction is in a ledger: sequence and fee are
        // consumed even if the payment fails.
        state.ledger += 1;
        let ledger = state.ledger;
        if let Some(account) = state.accounts.get_mut(&source_id) {
            account.sequence_number = env.sequence_number();
            account.balances.insert(Asset::Native, after_fee);
        }

        let mut staged = state.accounts.clone();
        let mut outcome = LedgerOutcome::Applied { hash, ledger };
        for op in env.operations() {
            let Operation::Payment(payment) = op;
            if let Err(code) = transfer(&mut staged, &source_id, payment) {
                debug!(hash = %hash, code = %code, "payment failed in ledger");
                outcome = rejected(code);
                break;
            }
        }
        if matches!(outcome, LedgerOutcome::Applied { .. }) {
            state.accounts = staged;
        }
        self.outcomes.insert(hash, outcome.clone());
        outcome
    }
}

fn transfer(
    accounts: &mut HashMap<AccountId, AccountState>,
    from: &AccountId,
    payment: &PaymentOp,
) -> Result<(), ResultCode> {
    let asset = &payment.asset;
    if !accounts.contains_key(&payment.destination) {
        return Err(ResultCode::NoDestination);
    }
    let issued_here = matches!(asset, Asset::Credit { issuer, .. } if issuer == from);
    let is_issuer_dest =
        matches!(asset, Asset::Credit { issuer, .. } if *issuer == payment.destination);

    if !asset.is_native() && !is_issuer_dest {
        let trusts = accounts
            .get(&payment.destination)
            .is_some_and(|dest| dest.balances.contains_key(asset));
        if !trusts {
            return Err(ResultCode::NoTrust);
        }
    }

    if !issued_here {
        let source = accounts.get_mut(from).ok_or(ResultCode::NoSourceAccount)?;
        let balance = source.balance(asset);
        let remaining = balance
            .checked_sub(payment.amount)
            .filter(|left| left.stroops() >= 0)
            .ok_or(ResultCode::InsufficientBalance)?;
        source.balances.insert(asset.clone(), remaining);
    }

    if !is_issuer_dest {
        let dest = accounts
            .get_mut(&payment.destination)
            .ok_or(ResultCode::NoDestination)?;
        let credited = dest
            .balance(asset)
            .checked_add(payment.amount)
            .ok_or(ResultCode::LineFull)?;
        dest.balances.insert(asset.clone(), credited);
    }
    Ok(())
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn load_account(&self, account: &AccountId) -> Result<AccountState, LedgerError> {
        self.account(account).ok_or(LedgerError::NotFound)
    }

    async fn submit(&self, envelope: &SignedEnvelope) -> Result<LedgerOutcome, LedgerError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_one(&self.drop_before) {
            return Err(LedgerError::Transport("connection reset".into()));
        }

        let hash = envelope.hash();
        // A transaction that made it into a ledger spent its sequence
        // number; sending it again can only be a bad sequence.
        let outcome = if self.outcomes.contains_key(&hash) {
            LedgerOutcome::Rejected {
                hash,
                code: ResultCode::BadSequence,
            }
        } else {
            self.apply(envelope)
        };

        if Self::take_one(&self.drop_after) {
            return Err(LedgerError::Transport("timed out waiting for reply".into()));
        }
        Ok(outcome)
    }

    async fn transaction(
        &self,
        hash: &TransactionHash,
    ) -> Result<Option<LedgerOutcome>, LedgerError> {
        Ok(self.outcomes.get(hash).map(|entry| entry.value().clone()))
    }

    async fn base_fee(&self) -> Result<u32, LedgerError> {
        Ok(self.base_fee)
    }
}
