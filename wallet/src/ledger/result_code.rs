//! Ledger result codes, as Horizon reports them in
//! `extras.result_codes`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::config::MAX_OPERATIONS;
use crate::transaction::xdr::{XdrError, XdrReader};

const TX_SUCCESS: i32 = 0;
const TX_FAILED: i32 = -1;
const OP_INNER: i32 = 0;
const OP_PAYMENT: u32 = 1;

/// Why the ledger refused a transaction.
///
/// Only the codes a single payment can realistically hit get their own
/// variant. Everything else is kept verbatim in [`ResultCode::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResultCode {
    /// `op_underfunded` / `tx_insufficient_balance`.
    InsufficientBalance,
    /// `tx_bad_seq`: the sequence number was already used or skipped ahead.
    BadSequence,
    TooEarly,
    TooLate,
    BadAuth,
    InsufficientFee,
    NoSourceAccount,
    /// `op_no_destination`: native payments cannot create accounts.
    NoDestination,
    /// The destination does not trust the asset.
    NoTrust,
    /// The destination trust line would exceed its limit.
    LineFull,
    Malformed,
    Other(String),
}

impl ResultCode {
    /// Maps Horizon's transaction code and operation codes to one result.
    ///
    /// For `tx_failed` the first failing operation code is the interesting
    /// one; the transaction code only says that *something* failed.
    pub fn from_codes(transaction: &str, operations: &[String]) -> Self {
        if transaction == "tx_failed" {
            if let Some(op) = operations.iter().find(|code| code.as_str() != "op_success") {
                return Self::from_code(op);
            }
        }
        Self::from_code(transaction)
    }

    pub fn from_code(code: &str) -> Self {
        match code {
            "op_underfunded" | "tx_insufficient_balance" => Self::InsufficientBalance,
            "tx_bad_seq" => Self::BadSequence,
            "tx_too_early" => Self::TooEarly,
            "tx_too_late" => Self::TooLate,
            "tx_bad_auth" | "tx_bad_auth_extra" => Self::BadAuth,
            "tx_insufficient_fee" => Self::InsufficientFee,
            "tx_no_source_account" | "op_no_source_account" => Self::NoSourceAccount,
            "op_no_destination" => Self::NoDestination,
            "op_no_trust" | "op_src_no_trust" => Self::NoTrust,
            "op_line_full" => Self::LineFull,
            "tx_malformed" | "op_malformed" => Self::Malformed,
            other => Self::Other(other.to_string()),
        }
    }

    /// Recovers the result from a `TransactionResult` XDR, as Horizon
    /// reports it in `result_xdr` for transactions already in a ledger.
    ///
    /// Only payment operation bodies are understood; any other operation
    /// falls back to the transaction code.
    pub fn from_result_xdr(bytes: &[u8]) -> Result<Self, XdrError> {
        let mut r = XdrReader::new(bytes);
        let _fee_charged = r.read_i64()?;
        let tx_code = r.read_u32()? as i32;
        let transaction = transaction_code_name(tx_code);

        let mut operations = Vec::new();
        if tx_code == TX_SUCCESS || tx_code == TX_FAILED {
            let count = r.read_u32()? as usize;
            if count > MAX_OPERATIONS {
                return Err(XdrError::LengthExceeded {
                    what: "operation results",
                    len: count,
                    max: MAX_OPERATIONS,
                });
            }
            for _ in 0..count {
                let outer = r.read_u32()? as i32;
                if outer != OP_INNER {
                    operations.push(operation_code_name(outer).to_string());
                    break;
                }
                if r.read_u32()? != OP_PAYMENT {
                    break;
                }
                let code = payment_code_name(r.read_u32()? as i32);
                operations.push(code.to_string());
                if code != "op_success" {
                    break;
                }
            }
        }
        Ok(Self::from_codes(&transaction, &operations))
    }

    /// The canonical Horizon code.
    pub fn as_str(&self) -> &str {
        match self {
            Self::InsufficientBalance => "op_underfunded",
            Self::BadSequence => "tx_bad_seq",
            Self::TooEarly => "tx_too_early",
            Self::TooLate => "tx_too_late",
            Self::BadAuth => "tx_bad_auth",
            Self::InsufficientFee => "tx_insufficient_fee",
            Self::NoSourceAccount => "tx_no_source_account",
            Self::NoDestination => "op_no_destination",
            Self::NoTrust => "op_no_trust",
            Self::LineFull => "op_line_full",
            Self::Malformed => "tx_malformed",
            Self::Other(code) => code,
        }
    }
}

fn transaction_code_name(code: i32) -> String {
    let name = match code {
        0 => "tx_success",
        -1 => "tx_failed",
        -2 => "tx_too_early",
        -3 => "tx_too_late",
        -4 => "tx_missing_operation",
        -5 => "tx_bad_seq",
        -6 => "tx_bad_auth",
        -7 => "tx_insufficient_balance",
        -8 => "tx_no_source_account",
        -9 => "tx_insufficient_fee",
        -10 => "tx_bad_auth_extra",
        -11 => "tx_internal_error",
        -12 => "tx_not_supported",
        -14 => "tx_bad_sponsorship",
        -15 => "tx_bad_min_seq_age_or_gap",
        -16 => "tx_malformed",
        other => return format!("tx_code_{other}"),
    };
    name.to_string()
}

fn operation_code_name(code: i32) -> &'static str {
    match code {
        -1 => "op_bad_auth",
        -2 => "op_no_source_account",
        -3 => "op_not_supported",
        -4 => "op_too_many_subentries",
        -5 => "op_exceeded_work_limit",
        -6 => "op_too_many_sponsoring",
        _ => "op_unknown",
    }
}

fn payment_code_name(code: i32) -> &'static str {
    match code {
        0 => "op_success",
        -1 => "op_malformed",
        -2 => "op_underfunded",
        -3 => "op_src_no_trust",
        -4 => "op_src_not_authorized",
        -5 => "op_no_destination",
        -6 => "op_no_trust",
        -7 => "op_not_authorized",
        -8 => "op_line_full",
        -9 => "op_no_issuer",
        _ => "op_unknown",
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ResultCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ResultCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_code(&raw))
    }
}
