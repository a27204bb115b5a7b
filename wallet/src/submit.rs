//! # Submitter
//!
//! Hands signed envelopes to the ledger with at-most-once semantics.
//!
//! A transport timeout says nothing about whether the envelope landed, so
//! the submitter never treats silence as "not applied":
//!
//! 1. Hashes already accepted through this submitter are answered from its
//!    cache, marked `duplicate`, even after the envelope has expired.
//! 2. Other expired envelopes are refused locally, before any network call.
//! 3. Transport failures are retried within the budget. Rejections are
//!    final and returned after one attempt.
//! 4. A `tx_bad_seq` rejection, or an exhausted retry budget, triggers a
//!    lookup by hash. Sequence numbers are consumed exactly once, so the
//!    lookup tells us whether *this* envelope is the one that used it.
//!
//! `duplicate` means the envelope was applied before this call started. If
//! an earlier attempt of the same call may have delivered it, the result is
//! a fresh acceptance.
//!
//! The accepted cache is bounded: entries are dropped [`ACCEPTED_RETENTION`]
//! after the envelope's `max_time`, and the oldest go first once
//! [`ACCEPTED_CACHE_CAPACITY`] is reached.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ACCEPTED_CACHE_CAPACITY, ACCEPTED_RETENTION};
use crate::ledger::{LedgerClient, LedgerError, LedgerOutcome, ResultCode};
use crate::retry::RetryPolicy;
use crate::transaction::builder::unix_now;
use crate::transaction::{SignedEnvelope, TransactionHash};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Accepted,
    Rejected,
}

/// What happened to a submitted envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub status: SubmissionStatus,
    /// Ledger that included the transaction, when accepted.
    pub ledger_sequence: Option<u32>,
    /// Why the ledger refused it, when rejected.
    pub result_code: Option<ResultCode>,
    pub transaction_hash: TransactionHash,
    /// The envelope had already been accepted before this call.
    pub duplicate: bool,
}

impl SubmissionResult {
    fn accepted(hash: TransactionHash, ledger: u32, duplicate: bool) -> Self {
        Self {
            status: SubmissionStatus::Accepted,
            ledger_sequence: Some(ledger),
            result_code: None,
            transaction_hash: hash,
            duplicate,
        }
    }

    fn rejected(hash: TransactionHash, code: ResultCode) -> Self {
        Self {
            status: SubmissionStatus::Rejected,
            ledger_sequence: None,
            result_code: Some(code),
            transaction_hash: hash,
            duplicate: false,
        }
    }

    fn from_outcome(outcome: LedgerOutcome, duplicate: bool) -> Self {
        match outcome {
            LedgerOutcome::Applied { hash, ledger } => Self::accepted(hash, ledger, duplicate),
            LedgerOutcome::Rejected { hash, code } => Self::rejected(hash, code),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.status == SubmissionStatus::Accepted
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The envelope's upper time bound has passed and this submitter has no
    /// record of it landing. If it may have been sent before, query
    /// [`Submitter::status`] first; otherwise rebuild and re-sign.
    #[error("envelope expired at {max_time} (now {now})")]
    EnvelopeExpired { max_time: u64, now: u64 },

    /// The outcome is unknown. Query [`Submitter::status`] with `hash`
    /// before building a replacement.
    #[error("ledger unreachable after {attempts} attempts submitting {hash}: {reason}")]
    NetworkUnavailable {
        hash: TransactionHash,
        attempts: u32,
        reason: String,
    },

    /// This exact envelope already made it into a ledger, as a failed
    /// transaction.
    #[error("transaction {hash} was already submitted and failed")]
    DuplicateSubmission { hash: TransactionHash },

    #[error("unexpected ledger response: {0}")]
    Protocol(String),
}

#[derive(Debug, Clone)]
struct CachedAcceptance {
    result: SubmissionResult,
    /// UNIX seconds after which the entry may be dropped.
    retain_until: u64,
}

pub struct Submitter {
    client: Arc<dyn LedgerClient>,
    retry: RetryPolicy,
    accepted: DashMap<TransactionHash, CachedAcceptance>,
    capacity: usize,
}

impl std::fmt::Debug for Submitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Submitter")
            .field("retry", &self.retry)
            .field("accepted", &self.accepted.len())
            .finish_non_exhaustive()
    }
}

impl Submitter {
    pub fn new(client: Arc<dyn LedgerClient>) -> Self {
        Self::with_retry(client, RetryPolicy::submitter())
    }

    pub fn with_retry(client: Arc<dyn LedgerClient>, retry: RetryPolicy) -> Self {
        Self {
            client,
            retry,
            accepted: DashMap::new(),
            capacity: ACCEPTED_CACHE_CAPACITY,
        }
    }

    pub async fn submit(&self, envelope: &SignedEnvelope) -> Result<SubmissionResult, SubmitError> {
        let hash = envelope.hash();
        let bounds = envelope.envelope().time_bounds();
        let now = unix_now();
        self.evict_expired(now);

        if let Some(cached) = self.accepted.get(&hash) {
            info!(hash = %hash, "envelope already accepted, not resubmitting");
            return Ok(SubmissionResult {
                duplicate: true,
                ..cached.result.clone()
            });
        }

        if bounds.is_expired(now) {
            warn!(hash = %hash, max_time = bounds.max_time, now, "refusing expired envelope");
            return Err(SubmitError::EnvelopeExpired {
                max_time: bounds.max_time,
                now,
            });
        }

        let lost_in_transit = AtomicBool::new(false);
        let lost = &lost_in_transit;
        let client = &self.client;
        let result = self
            .retry
            .run("submit", || async move {
                let outcome = client.submit(envelope).await;
                if matches!(outcome, Err(LedgerError::Transport(_))) {
                    lost.store(true, Ordering::Relaxed);
                }
                outcome
            })
            .await;
        let earlier_attempt_lost = lost_in_transit.load(Ordering::Relaxed);
        let result = match result {
            Ok(LedgerOutcome::Rejected {
                code: ResultCode::BadSequence,
                ..
            }) => {
                self.resolve_bad_sequence(hash, earlier_attempt_lost)
                    .await?
            }
            Ok(outcome) => SubmissionResult::from_outcome(outcome, false),
            Err(LedgerError::Transport(reason)) => self.resolve_unknown(hash, reason).await?,
            Err(LedgerError::NotFound) => {
                return Err(SubmitError::Protocol("submission endpoint not found".into()))
            }
            Err(LedgerError::Protocol(reason)) => return Err(SubmitError::Protocol(reason)),
        };

        self.record(&result, retain_until(bounds.max_time, now));
        Ok(result)
    }

    /// The ledger's view of `hash`, or `None` if it never landed.
    ///
    /// Lookups are not cached; only envelopes submitted through this
    /// submitter are.
    pub async fn status(
        &self,
        hash: &TransactionHash,
    ) -> Result<Option<SubmissionResult>, SubmitError> {
        if let Some(cached) = self.accepted.get(hash) {
            return Ok(Some(cached.result.clone()));
        }
        match self
            .retry
            .run("transaction_lookup", || self.client.transaction(hash))
            .await
        {
            Ok(found) => Ok(found.map(|outcome| SubmissionResult::from_outcome(outcome, false))),
            Err(LedgerError::NotFound) => Ok(None),
            Err(LedgerError::Transport(reason)) => Err(SubmitError::NetworkUnavailable {
                hash: *hash,
                attempts: self.retry.max_attempts(),
                reason,
            }),
            Err(LedgerError::Protocol(reason)) => Err(SubmitError::Protocol(reason)),
        }
    }

    /// The sequence number is spent. Either by this envelope (an earlier
    /// attempt whose reply was lost, in this call or before it) or by some
    /// other transaction.
    async fn resolve_bad_sequence(
        &self,
        hash: TransactionHash,
        earlier_attempt_lost: bool,
    ) -> Result<SubmissionResult, SubmitError> {
        match self.client.transaction(&hash).await {
            Ok(Some(LedgerOutcome::Applied { ledger, .. })) => {
                info!(
                    hash = %hash,
                    ledger,
                    earlier_attempt_lost,
                    "envelope had already landed"
                );
                Ok(SubmissionResult::accepted(hash, ledger, !earlier_attempt_lost))
            }
            Ok(Some(LedgerOutcome::Rejected { code, .. })) => {
                warn!(hash = %hash, code = %code, "envelope had already landed as failed");
                Err(SubmitError::DuplicateSubmission { hash })
            }
            Ok(None) => Ok(SubmissionResult::rejected(hash, ResultCode::BadSequence)),
            Err(err) => {
                warn!(hash = %hash, error = %err, "could not look up envelope after bad sequence");
                Ok(SubmissionResult::rejected(hash, ResultCode::BadSequence))
            }
        }
    }

    /// Every attempt failed in transit. One of them may still have landed.
    async fn resolve_unknown(
        &self,
        hash: TransactionHash,
        reason: String,
    ) -> Result<SubmissionResult, SubmitError> {
        match self.client.transaction(&hash).await {
            Ok(Some(outcome)) => {
                info!(hash = %hash, "envelope landed despite transport failures");
                Ok(SubmissionResult::from_outcome(outcome, false))
            }
            Ok(None) | Err(_) => {
                warn!(hash = %hash, reason = %reason, "submission outcome unknown");
                Err(SubmitError::NetworkUnavailable {
                    hash,
                    attempts: self.retry.max_attempts(),
                    reason,
                })
            }
        }
    }

    fn record(&self, result: &SubmissionResult, retain_until: u64) {
        match result.status {
            SubmissionStatus::Accepted => {
                info!(
                    hash = %result.transaction_hash,
                    ledger = result.ledger_sequence,
                    duplicate = result.duplicate,
                    "transaction accepted"
                );
                if self.accepted.len() >= self.capacity {
                    self.evict_oldest();
                }
                self.accepted.insert(
                    result.transaction_hash,
                    CachedAcceptance {
                        result: SubmissionResult {
                            duplicate: false,
                            ..result.clone()
                        },
                        retain_until,
                    },
                );
            }
            SubmissionStatus::Rejected => {
                warn!(
                    hash = %result.transaction_hash,
                    code = ?result.result_code,
                    "transaction rejected"
                );
            }
        }
    }

    fn evict_expired(&self, now: u64) {
        let before = self.accepted.len();
        self.accepted.retain(|_, entry| entry.retain_until >= now);
        let evicted = before.saturating_sub(self.accepted.len());
        if evicted > 0 {
            debug!(evicted, remaining = self.accepted.len(), "evicted expired accepted hashes");
        }
    }

    fn evict_oldest(&self) {
        let oldest = self
            .accepted
            .iter()
            .min_by_key(|entry| entry.retain_until)
            .map(|entry| *entry.key());
        if let Some(hash) = oldest {
            self.accepted.remove(&hash);
            debug!(hash = %hash, "accepted cache full, evicted oldest entry");
        }
    }
}

/// Unbounded envelopes are retained relative to the time they landed.
fn retain_until(max_time: u64, now: u64) -> u64 {
    let anchor = if max_time == 0 { now } else { max_time.max(now) };
    anchor.saturating_add(ACCEPTED_RETENTION.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Network;
    use crate::crypto::keys::KeyPair;
    use crate::ledger::MemoryLedger;
    use crate::transaction::{sign, Amount, TransactionBuilder};
    use std::time::Duration;

    struct Fixture {
        ledger: Arc<MemoryLedger>,
        alice: KeyPair,
        bob: KeyPair,
    }

    fn fixture(alice_units: i64) -> Fixture {
        let ledger = Arc::new(MemoryLedger::new(Network::Testnet));
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        ledger.fund(
            alice.public_key(),
            Amount::from_units(alice_units).unwrap(),
            5,
        );
        ledger.fund(bob.public_key(), Amount::from_units(1).unwrap(), 0);
        Fixture { ledger, alice, bob }
    }

    impl Fixture {
        fn envelope(&self, amount: &str) -> SignedEnvelope {
            let state = self.ledger.account(&self.alice.public_key()).unwrap();
            let env = TransactionBuilder::new(&state, Network::Testnet)
                .destination(&self.bob.public_key().to_string())
                .amount(amount)
                .build()
                .unwrap();
            sign(&env, &self.alice).unwrap()
        }

        fn submitter(&self) -> Submitter {
            Submitter::new(self.ledger.clone())
        }
    }

    #[tokio::test]
    async fn accepts_and_caches() {
        let f = fixture(1000);
        let submitter = f.submitter();
        let envelope = f.envelope("10");

        let first = submitter.submit(&envelope).await.unwrap();
        assert!(first.is_accepted());
        assert!(!first.duplicate);
        assert_eq!(first.transaction_hash, envelope.hash());

        let again = submitter.submit(&envelope).await.unwrap();
        assert!(again.is_accepted());
        assert!(again.duplicate);
        assert_eq!(again.ledger_sequence, first.ledger_sequence);
        assert_eq!(f.ledger.submit_calls(), 1);
    }

    #[tokio::test]
    async fn expired_envelope_never_reaches_ledger() {
        let f = fixture(1000);
        let state = f.ledger.account(&f.alice.public_key()).unwrap();
        let env = TransactionBuilder::new(&state, Network::Testnet)
            .destination(&f.bob.public_key().to_string())
            .amount("1")
            .now(1_000)
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap();
        let envelope = sign(&env, &f.alice).unwrap();

        let err = f.submitter().submit(&envelope).await.unwrap_err();
        assert!(matches!(
            err,
            SubmitError::EnvelopeExpired {
                max_time: 1_010,
                ..
            }
        ));
        assert_eq!(f.ledger.submit_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transport_failures() {
        let f = fixture(1000);
        f.ledger.fail_next(2);

        let result = f.submitter().submit(&f.envelope("10")).await.unwrap();
        assert!(result.is_accepted());
        assert_eq!(f.ledger.submit_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_are_network_unavailable() {
        let f = fixture(1000);
        f.ledger.fail_next(3);
        let envelope = f.envelope("10");

        let err = f.submitter().submit(&envelope).await.unwrap_err();
        assert_eq!(
            err,
            SubmitError::NetworkUnavailable {
                hash: envelope.hash(),
                attempts: 3,
                reason: "connection reset".into(),
            }
        );
        assert_eq!(f.ledger.submit_calls(), 3);
        assert_eq!(
            f.ledger.account(&f.alice.public_key()).unwrap().sequence_number,
            5
        );
    }

    #[tokio::test(start_paused = true)]
    async fn lost_reply_is_resolved_by_hash() {
        let f = fixture(1000);
        f.ledger.lose_next_reply(1);

        // The first attempt landed, the retry hit tx_bad_seq. Still this
        // call's acceptance, not an earlier one.
        let result = f.submitter().submit(&f.envelope("10")).await.unwrap();
        assert!(result.is_accepted());
        assert!(!result.duplicate);
        assert_eq!(f.ledger.submit_calls(), 2);
        assert_eq!(
            f.ledger.account(&f.bob.public_key()).unwrap().native_balance(),
            Amount::from_units(11).unwrap()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn every_reply_lost_still_finds_the_landed_envelope() {
        let f = fixture(1000);
        f.ledger.lose_next_reply(3);

        let result = f.submitter().submit(&f.envelope("10")).await.unwrap();
        assert!(result.is_accepted());
        assert!(!result.duplicate);
        assert_eq!(f.ledger.submit_calls(), 3);
    }

    #[tokio::test]
    async fn another_submitter_sees_a_duplicate() {
        let f = fixture(1000);
        let envelope = f.envelope("10");
        f.submitter().submit(&envelope).await.unwrap();

        let result = f.submitter().submit(&envelope).await.unwrap();
        assert!(result.is_accepted());
        assert!(result.duplicate);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_flag_does_not_depend_on_lost_reply_count() {
        for lost in [1, 2, 3] {
            let f = fixture(1000);
            f.ledger.lose_next_reply(lost);
            let result = f.submitter().submit(&f.envelope("10")).await.unwrap();
            assert!(result.is_accepted(), "lost {lost}");
            assert!(!result.duplicate, "lost {lost}");
        }
    }

    #[tokio::test]
    async fn accepted_envelope_is_answered_after_it_expires() {
        let f = fixture(1000);
        let state = f.ledger.account(&f.alice.public_key()).unwrap();
        let env = TransactionBuilder::new(&state, Network::Testnet)
            .destination(&f.bob.public_key().to_string())
            .amount("10")
            .timeout(Duration::from_secs(1))
            .build()
            .unwrap();
        let envelope = sign(&env, &f.alice).unwrap();
        let submitter = f.submitter();
        assert!(submitter.submit(&envelope).await.unwrap().is_accepted());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(env.time_bounds().is_expired(unix_now()));

        let again = submitter.submit(&envelope).await.unwrap();
        assert!(again.is_accepted());
        assert!(again.duplicate);
        assert_eq!(f.ledger.submit_calls(), 1);
    }

    #[tokio::test]
    async fn accepted_hashes_are_evicted_after_retention() {
        let f = fixture(1000);
        let envelope = f.envelope("10");
        let submitter = f.submitter();
        submitter.submit(&envelope).await.unwrap();
        assert_eq!(submitter.accepted.len(), 1);

        let keep_until = envelope.envelope().time_bounds().max_time + ACCEPTED_RETENTION.as_secs();
        submitter.evict_expired(keep_until);
        assert_eq!(submitter.accepted.len(), 1);
        submitter.evict_expired(keep_until + 1);
        assert!(submitter.accepted.is_empty());

        // Without the cache the ledger still knows it landed before this call.
        let again = submitter.submit(&envelope).await.unwrap();
        assert!(again.is_accepted());
        assert!(again.duplicate);
        assert_eq!(f.ledger.submit_calls(), 2);
    }

    #[test]
    fn accepted_cache_is_bounded() {
        let f = fixture(1000);
        let mut submitter = f.submitter();
        submitter.capacity = 2;
        for (byte, until) in [(1u8, 30), (2, 10), (3, 20)] {
            let result = SubmissionResult::accepted(TransactionHash([byte; 32]), 1, false);
            submitter.record(&result, until);
        }

        assert_eq!(submitter.accepted.len(), 2);
        assert!(submitter.accepted.contains_key(&TransactionHash([1; 32])));
        assert!(!submitter.accepted.contains_key(&TransactionHash([2; 32])));
        assert!(submitter.accepted.contains_key(&TransactionHash([3; 32])));
    }

    #[tokio::test]
    async fn status_lookups_are_not_cached() {
        let f = fixture(1000);
        let envelope = f.envelope("10");
        f.submitter().submit(&envelope).await.unwrap();

        let reader = f.submitter();
        assert!(reader.status(&envelope.hash()).await.unwrap().is_some());
        assert!(reader.accepted.is_empty());
    }

    #[tokio::test]
    async fn rejection_is_returned_once() {
        let f = fixture(5);
        let result = f.submitter().submit(&f.envelope("50")).await.unwrap();
        assert_eq!(result.status, SubmissionStatus::Rejected);
        assert_eq!(result.result_code, Some(ResultCode::InsufficientBalance));
        assert_eq!(f.ledger.submit_calls(), 1);
    }

    #[tokio::test]
    async fn resubmitting_a_failed_envelope_is_a_duplicate_submission() {
        let f = fixture(5);
        let envelope = f.envelope("50");
        let submitter = f.submitter();
        submitter.submit(&envelope).await.unwrap();

        let err = submitter.submit(&envelope).await.unwrap_err();
        assert_eq!(
            err,
            SubmitError::DuplicateSubmission {
                hash: envelope.hash()
            }
        );
    }

    #[tokio::test]
    async fn stale_sequence_is_rejected() {
        let f = fixture(1000);
        let stale = f.envelope("1");
        f.submitter().submit(&f.envelope("2")).await.unwrap();

        let result = f.submitter().submit(&stale).await.unwrap();
        assert_eq!(result.status, SubmissionStatus::Rejected);
        assert_eq!(result.result_code, Some(ResultCode::BadSequence));
    }

    #[tokio::test]
    async fn status_by_hash() {
        let f = fixture(1000);
        let envelope = f.envelope("10");
        let submitter = f.submitter();
        assert_eq!(submitter.status(&envelope.hash()).await.unwrap(), None);

        submitter.submit(&envelope).await.unwrap();
        let fresh = f.submitter();
        let found = fresh.status(&envelope.hash()).await.unwrap().unwrap();
        assert!(found.is_accepted());
        assert!(!found.duplicate);
    }

    #[test]
    fn result_json_shape() {
        let hash = TransactionHash([0xab; 32]);
        let json = serde_json::to_value(SubmissionResult::accepted(hash, 42, true)).unwrap();
        assert_eq!(json["status"], "accepted");
        assert_eq!(json["ledger_sequence"], 42);
        assert_eq!(json["duplicate"], true);
        assert!(json["result_code"].is_null());
    }
}
