//! # XDR Codec
//!
//! Just enough of Stellar's XDR to carry a single-payment
//! `TransactionEnvelope` (v1) in and out of base64.
//!
//! XDR is big-endian and pads every variable-length item to a multiple of
//! four bytes. Only the shapes this wallet builds are accepted on decode:
//! ed25519 accounts, time-bound preconditions, none/text/id memos and
//! payment operations. Anything else is [`XdrError::Unsupported`], which is
//! the right answer for a relay that only vouches for what it understands.

use thiserror::Error;

use crate::config::{MAX_MEMO_TEXT_BYTES, MAX_OPERATIONS, MAX_SIGNATURES};
use crate::crypto::keys::{AccountId, Signature};
use crate::transaction::types::{
    Amount, Asset, DecoratedSignature, Memo, Operation, PaymentOp, TimeBounds, Transaction,
};

// ---------------------------------------------------------------------------
// Discriminants
// ---------------------------------------------------------------------------

pub const ENVELOPE_TYPE_TX: u32 = 2;

const KEY_TYPE_ED25519: u32 = 0;
const PUBLIC_KEY_TYPE_ED25519: u32 = 0;

const PRECOND_TIME: u32 = 1;

const MEMO_NONE: u32 = 0;
const MEMO_TEXT: u32 = 1;
const MEMO_ID: u32 = 2;

const ASSET_TYPE_NATIVE: u32 = 0;
const ASSET_TYPE_CREDIT_ALPHANUM4: u32 = 1;
const ASSET_TYPE_CREDIT_ALPHANUM12: u32 = 2;

const OP_PAYMENT: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum XdrError {
    #[error("unexpected end of input at byte {0}")]
    Truncated(usize),

    #[error("{0} trailing bytes after envelope")]
    TrailingBytes(usize),

    #[error("unsupported {what} discriminant {value}")]
    Unsupported { what: &'static str, value: u32 },

    #[error("{what} length {len} exceeds bound {max}")]
    LengthExceeded {
        what: &'static str,
        len: usize,
        max: usize,
    },

    #[error("non-zero padding")]
    BadPadding,

    #[error("invalid {0}")]
    Invalid(&'static str),

    #[error("invalid base64: {0}")]
    Base64(String),
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct XdrWriter {
    buf: Vec<u8>,
}

impl XdrWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_fixed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
        self.pad(bytes.len());
    }

    pub fn write_var(&mut self, bytes: &[u8]) {
        self.write_u32(bytes.len() as u32);
        self.write_fixed(bytes);
    }

    fn pad(&mut self, len: usize) {
        let padding = (4 - len % 4) % 4;
        self.buf.extend(std::iter::repeat(0u8).take(padding));
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

pub struct XdrReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> XdrReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], XdrError> {
        if self.remaining() < n {
            return Err(XdrError::Truncated(self.pos));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], XdrError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u32(&mut self) -> Result<u32, XdrError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, XdrError> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, XdrError> {
        Ok(i64::from_be_bytes(self.array()?))
    }

    pub fn read_fixed(&mut self, len: usize) -> Result<&'a [u8], XdrError> {
        let data = self.take(len)?;
        let padding = (4 - len % 4) % 4;
        if self.take(padding)?.iter().any(|&b| b != 0) {
            return Err(XdrError::BadPadding);
        }
        Ok(data)
    }

    pub fn read_var(&mut self, what: &'static str, max: usize) -> Result<&'a [u8], XdrError> {
        let len = self.read_u32()? as usize;
        if len > max {
            return Err(XdrError::LengthExceeded { what, len, max });
        }
        self.read_fixed(len)
    }

    /// Reads an array length prefix, checked against its XDR bound.
    fn read_len(&mut self, what: &'static str, max: usize) -> Result<usize, XdrError> {
        let len = self.read_u32()? as usize;
        if len > max {
            return Err(XdrError::LengthExceeded { what, len, max });
        }
        Ok(len)
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

fn write_account(w: &mut XdrWriter, discriminant: u32, account: &AccountId) {
    w.write_u32(discriminant);
    w.write_fixed(account.as_bytes());
}

fn read_account(r: &mut XdrReader<'_>, what: &'static str) -> Result<AccountId, XdrError> {
    match r.read_u32()? {
        0 => Ok(AccountId(r.array()?)),
        value => Err(XdrError::Unsupported { what, value }),
    }
}

fn write_asset(w: &mut XdrWriter, asset: &Asset) {
    match asset {
        Asset::Native => w.write_u32(ASSET_TYPE_NATIVE),
        Asset::Credit { code, issuer } => {
            let bytes = code.as_bytes();
            if bytes.len() <= 4 {
                let mut padded = [0u8; 4];
                padded[..bytes.len()].copy_from_slice(bytes);
                w.write_u32(ASSET_TYPE_CREDIT_ALPHANUM4);
                w.write_fixed(&padded);
            } else {
                let mut padded = [0u8; 12];
                padded[..bytes.len()].copy_from_slice(bytes);
                w.write_u32(ASSET_TYPE_CREDIT_ALPHANUM12);
                w.write_fixed(&padded);
            }
            write_account(w, PUBLIC_KEY_TYPE_ED25519, issuer);
        }
    }
}

fn read_asset(r: &mut XdrReader<'_>) -> Result<Asset, XdrError> {
    let width = match r.read_u32()? {
        ASSET_TYPE_NATIVE => return Ok(Asset::Native),
        ASSET_TYPE_CREDIT_ALPHANUM4 => 4,
        ASSET_TYPE_CREDIT_ALPHANUM12 => 12,
        value => return Err(XdrError::Unsupported { what: "asset", value }),
    };
    let raw = r.read_fixed(width)?;
    let end = raw.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    let code = std::str::from_utf8(&raw[..end]).map_err(|_| XdrError::Invalid("asset code"))?;
    let issuer = read_account(r, "issuer key")?;
    Asset::credit(code, issuer).map_err(|_| XdrError::Invalid("asset code"))
}

fn write_memo(w: &mut XdrWriter, memo: &Memo) {
    match memo {
        Memo::None => w.write_u32(MEMO_NONE),
        Memo::Text(text) => {
            w.write_u32(MEMO_TEXT);
            w.write_var(text.as_bytes());
        }
        Memo::Id(id) => {
            w.write_u32(MEMO_ID);
            w.write_u64(*id);
        }
    }
}

fn read_memo(r: &mut XdrReader<'_>) -> Result<Memo, XdrError> {
    match r.read_u32()? {
        MEMO_NONE => Ok(Memo::None),
        MEMO_TEXT => {
            let raw = r.read_var("memo text", MAX_MEMO_TEXT_BYTES)?;
            let text = std::str::from_utf8(raw).map_err(|_| XdrError::Invalid("memo text"))?;
            Ok(Memo::Text(text.to_string()))
        }
        MEMO_ID => Ok(Memo::Id(r.read_u64()?)),
        value => Err(XdrError::Unsupported { what: "memo", value }),
    }
}

fn write_operation(w: &mut XdrWriter, op: &Operation) {
    // No per-operation source account.
    w.write_u32(0);
    match op {
        Operation::Payment(payment) => {
            w.write_u32(OP_PAYMENT);
            write_account(w, KEY_TYPE_ED25519, &payment.destination);
            write_asset(w, &payment.asset);
            w.write_i64(payment.amount.stroops());
        }
    }
}

fn read_operation(r: &mut XdrReader<'_>) -> Result<Operation, XdrError> {
    match r.read_u32()? {
        0 => {}
        value => {
            return Err(XdrError::Unsupported {
                what: "operation source",
                value,
            })
        }
    }
    match r.read_u32()? {
        OP_PAYMENT => {
            let destination = read_account(r, "destination")?;
            let asset = read_asset(r)?;
            let amount = Amount::from_stroops(r.read_i64()?);
            Ok(Operation::Payment(PaymentOp {
                destination,
                asset,
                amount,
            }))
        }
        value => Err(XdrError::Unsupported {
            what: "operation",
            value,
        }),
    }
}

/// Encodes the XDR `Transaction` body. This is the part the signature
/// payload hashes.
pub fn encode_transaction(w: &mut XdrWriter, tx: &Transaction) {
    write_account(w, KEY_TYPE_ED25519, &tx.source_account);
    w.write_u32(tx.fee);
    w.write_i64(tx.sequence_number);
    w.write_u32(PRECOND_TIME);
    w.write_u64(tx.time_bounds.min_time);
    w.write_u64(tx.time_bounds.max_time);
    write_memo(w, &tx.memo);
    w.write_u32(tx.operations.len() as u32);
    for op in &tx.operations {
        write_operation(w, op);
    }
    // ext: v0
    w.write_u32(0);
}

pub fn decode_transaction(r: &mut XdrReader<'_>) -> Result<Transaction, XdrError> {
    let source_account = read_account(r, "source account")?;
    let fee = r.read_u32()?;
    let sequence_number = r.read_i64()?;
    let time_bounds = match r.read_u32()? {
        PRECOND_TIME => TimeBounds {
            min_time: r.read_u64()?,
            max_time: r.read_u64()?,
        },
        value => {
            return Err(XdrError::Unsupported {
                what: "preconditions",
                value,
            })
        }
    };
    let memo = read_memo(r)?;
    let count = r.read_len("operations", MAX_OPERATIONS)?;
    let operations = (0..count)
        .map(|_| read_operation(r))
        .collect::<Result<Vec<_>, _>>()?;
    match r.read_u32()? {
        0 => {}
        value => {
            return Err(XdrError::Unsupported {
                what: "transaction ext",
                value,
            })
        }
    }
    Ok(Transaction {
        source_account,
        fee,
        sequence_number,
        time_bounds,
        memo,
        operations,
    })
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// `TransactionEnvelope` with discriminant `ENVELOPE_TYPE_TX`.
pub fn encode_envelope(tx: &Transaction, signatures: &[DecoratedSignature]) -> Vec<u8> {
    let mut w = XdrWriter::new();
    w.write_u32(ENVELOPE_TYPE_TX);
    encode_transaction(&mut w, tx);
    w.write_u32(signatures.len() as u32);
    for sig in signatures {
        w.write_fixed(&sig.hint);
        w.write_var(sig.signature.as_bytes());
    }
    w.into_bytes()
}

pub fn decode_envelope(bytes: &[u8]) -> Result<(Transaction, Vec<DecoratedSignature>), XdrError> {
    let mut r = XdrReader::new(bytes);
    match r.read_u32()? {
        ENVELOPE_TYPE_TX => {}
        value => {
            return Err(XdrError::Unsupported {
                what: "envelope",
                value,
            })
        }
    }
    let tx = decode_transaction(&mut r)?;

    let count = r.read_len("signatures", MAX_SIGNATURES)?;
    let mut signatures = Vec::with_capacity(count);
    for _ in 0..count {
        let hint = r.array::<4>()?;
        let raw = r.read_var("signature", 64)?;
        let signature = Signature::from_slice(raw).ok_or(XdrError::Invalid("signature"))?;
        signatures.push(DecoratedSignature { hint, signature });
    }

    if r.remaining() != 0 {
        return Err(XdrError::TrailingBytes(r.remaining()));
    }
    Ok((tx, signatures))
}
