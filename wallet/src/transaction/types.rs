//! Value types shared by the builder, the signer and the ledger clients.
//!
//! Money is never a float here. [`Amount`] is a count of stroops, the
//! ledger's own unit, and converts to and from its 7-decimal text form
//! exactly or not at all.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::{AMOUNT_DECIMALS, NATIVE_ASSET_CODE, STROOPS_PER_UNIT};
use crate::crypto::keys::{AccountId, Signature};

// ---------------------------------------------------------------------------
// Amount
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("not a decimal amount: {0:?}")]
    Invalid(String),

    #[error("more than {AMOUNT_DECIMALS} fractional digits")]
    PrecisionExceeded,

    #[error("amount does not fit in 64 bits of stroops")]
    Overflow,
}

/// A signed quantity of stroops (1 unit = 10^7 stroops).
///
/// Signed because the ledger's `int64` is signed; payment amounts must be
/// positive, which the builder enforces.
///
/// ```
/// use ilede_wallet::transaction::types::Amount;
///
/// let amt = Amount::parse("10.5").unwrap();
/// assert_eq!(amt.stroops(), 105_000_000);
/// assert_eq!(amt.to_string(), "10.5000000");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_stroops(stroops: i64) -> Self {
        Self(stroops)
    }

    /// Whole units, e.g. `Amount::from_units(1000)` is 1000.0000000.
    pub fn from_units(units: i64) -> Option<Self> {
        units.checked_mul(STROOPS_PER_UNIT).map(Self)
    }

    pub const fn stroops(self) -> i64 {
        self.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Parses decimal text such as `"10"`, `"0.0000001"` or `"-3.5"`.
    ///
    /// Digits past the seventh decimal place are only accepted when they
    /// are all zero; anything else is [`AmountError::PrecisionExceeded`]
    /// rather than a silent truncation.
    pub fn parse(input: &str) -> Result<Self, AmountError> {
        let invalid = || AmountError::Invalid(input.to_string());
        let trimmed = input.trim();

        let (negative, digits) = match trimmed.as_bytes().first() {
            Some(b'-') => (true, &trimmed[1..]),
            Some(b'+') => (false, &trimmed[1..]),
            _ => (false, trimmed),
        };

        let (whole, frac) = match digits.split_once('.') {
            Some((whole, frac)) => (whole, frac),
            None => (digits, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let decimals = AMOUNT_DECIMALS as usize;
        let frac = if frac.len() > decimals {
            let (kept, extra) = frac.split_at(decimals);
            if extra.bytes().any(|b| b != b'0') {
                return Err(AmountError::PrecisionExceeded);
            }
            kept
        } else {
            frac
        };

        let whole_value: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| AmountError::Overflow)?
        };
        let frac_value: i64 = format!("{frac:0<decimals$}")
            .parse()
            .map_err(|_| invalid())?;

        let stroops = whole_value
            .checked_mul(STROOPS_PER_UNIT)
            .and_then(|v| v.checked_add(frac_value))
            .ok_or(AmountError::Overflow)?;

        Ok(Self(if negative { -stroops } else { stroops }))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let per_unit = STROOPS_PER_UNIT as u64;
        write!(
            f,
            "{sign}{}.{:0width$}",
            abs / per_unit,
            abs % per_unit,
            width = AMOUNT_DECIMALS as usize
        )
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// Serialized as the decimal string, the same way Horizon does.
impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Asset
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssetError {
    #[error("asset code must be 1-12 ASCII letters or digits, got {0:?}")]
    InvalidCode(String),

    #[error("invalid asset issuer {0:?}")]
    InvalidIssuer(String),

    #[error("expected \"native\" or CODE:ISSUER, got {0:?}")]
    Malformed(String),
}

/// What a payment moves: lumens, or an issued credit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Asset {
    #[default]
    Native,
    Credit { code: String, issuer: AccountId },
}

impl Asset {
    pub fn credit(code: &str, issuer: AccountId) -> Result<Self, AssetError> {
        let valid = (1..=12).contains(&code.len()) && code.bytes().all(|b| b.is_ascii_alphanumeric());
        if !valid {
            return Err(AssetError::InvalidCode(code.to_string()));
        }
        Ok(Self::Credit {
            code: code.to_string(),
            issuer,
        })
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Self::Native)
    }

    /// Ticker for display; `XLM` for the native asset.
    pub fn code(&self) -> &str {
        match self {
            Self::Native => NATIVE_ASSET_CODE,
            Self::Credit { code, .. } => code,
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => f.write_str("native"),
            Self::Credit { code, issuer } => write!(f, "{code}:{issuer}"),
        }
    }
}

/// Accepts `native`, `XLM` (any case) or `CODE:ISSUER`.
impl FromStr for Asset {
    type Err = AssetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("native") || s.eq_ignore_ascii_case(NATIVE_ASSET_CODE) {
            return Ok(Self::Native);
        }
        let (code, issuer) = s
            .split_once(':')
            .ok_or_else(|| AssetError::Malformed(s.to_string()))?;
        let issuer: AccountId = issuer
            .parse()
            .map_err(|_| AssetError::InvalidIssuer(issuer.to_string()))?;
        Self::credit(code, issuer)
    }
}

impl Serialize for Asset {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Asset {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Memo
// ---------------------------------------------------------------------------

/// Free-form tag attached to a transaction. Exchanges use it to route
/// deposits to the right customer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Memo {
    #[default]
    None,
    /// At most 28 bytes of UTF-8. The limit is in bytes, so multi-byte
    /// characters count for more than one.
    Text(String),
    Id(u64),
}

impl Memo {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl fmt::Display for Memo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Text(text) => write!(f, "text:{text}"),
            Self::Id(id) => write!(f, "id:{id}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Time bounds
// ---------------------------------------------------------------------------

/// Validity window in UNIX seconds. `max_time == 0` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBounds {
    pub min_time: u64,
    pub max_time: u64,
}

impl TimeBounds {
    pub fn is_expired(&self, now: u64) -> bool {
        self.max_time != 0 && now > self.max_time
    }

    pub fn is_premature(&self, now: u64) -> bool {
        now < self.min_time
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentOp {
    pub destination: AccountId,
    pub asset: Asset,
    pub amount: Amount,
}

/// The only operation this wallet constructs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Payment(PaymentOp),
}

/// The XDR `Transaction` body: everything the signature commits to except
/// the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub source_account: AccountId,
    /// Total fee in stroops, already multiplied by the operation count.
    pub fee: u32,
    pub sequence_number: i64,
    pub time_bounds: TimeBounds,
    pub memo: Memo,
    pub operations: Vec<Operation>,
}

/// A signature plus the 4-byte hint naming its signer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoratedSignature {
    pub hint: [u8; 4],
    pub signature: Signature,
}

// ---------------------------------------------------------------------------
// TransactionHash
// ---------------------------------------------------------------------------

/// SHA-256 of the signature base. Shown as lowercase hex, as Horizon does.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionHash(pub [u8; 32]);

impl TransactionHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TransactionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for TransactionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionHash({self})")
    }
}

impl FromStr for TransactionHash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s.trim(), &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl Serialize for TransactionHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TransactionHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::KeyPair;

    #[test]
    fn parse_amounts() {
        assert_eq!(Amount::parse("10").unwrap().stroops(), 100_000_000);
        assert_eq!(Amount::parse("0.0000001").unwrap().stroops(), 1);
        assert_eq!(Amount::parse(".5").unwrap().stroops(), 5_000_000);
        assert_eq!(Amount::parse("7.").unwrap().stroops(), 70_000_000);
        assert_eq!(Amount::parse(" 1.25 ").unwrap().stroops(), 12_500_000);
        assert_eq!(Amount::parse("-3").unwrap().stroops(), -30_000_000);
        assert_eq!(Amount::parse("0").unwrap(), Amount::ZERO);
    }

    #[test]
    fn eighth_decimal_is_rejected_not_truncated() {
        assert_eq!(
            Amount::parse("0.00000001"),
            Err(AmountError::PrecisionExceeded)
        );
        assert_eq!(
            Amount::parse("1.12345678"),
            Err(AmountError::PrecisionExceeded)
        );
        // Trailing zeros carry no precision.
        assert_eq!(Amount::parse("1.100000000").unwrap().stroops(), 11_000_000);
    }

    #[test]
    fn garbage_is_invalid() {
        for bad in ["", ".", "-", "1.2.3", "1e5", "abc", "1,5", "--1"] {
            assert!(
                matches!(Amount::parse(bad), Err(AmountError::Invalid(_))),
                "{bad:?} should be invalid"
            );
        }
    }

    #[test]
    fn overflow_is_reported() {
        assert_eq!(
            Amount::parse("922337203686"),
            Err(AmountError::Overflow)
        );
        assert_eq!(
            Amount::parse("99999999999999999999"),
            Err(AmountError::Overflow)
        );
        // int64 max is 922337203685.4775807.
        assert_eq!(
            Amount::parse("922337203685.4775807").unwrap().stroops(),
            i64::MAX
        );
    }

    #[test]
    fn display_has_seven_decimals() {
        assert_eq!(Amount::from_stroops(105_000_000).to_string(), "10.5000000");
        assert_eq!(Amount::from_stroops(1).to_string(), "0.0000001");
        assert_eq!(Amount::from_stroops(-5).to_string(), "-0.0000005");
        assert_eq!(Amount::from_units(1000).unwrap().to_string(), "1000.0000000");
    }

    #[test]
    fn amount_serde_is_decimal_string() {
        let amt = Amount::from_stroops(12_345_678);
        assert_eq!(serde_json::to_string(&amt).unwrap(), "\"1.2345678\"");
        let back: Amount = serde_json::from_str("\"1.2345678\"").unwrap();
        assert_eq!(back, amt);
    }

    #[test]
    fn asset_parsing() {
        let issuer = KeyPair::generate().public_key();
        assert_eq!("native".parse::<Asset>().unwrap(), Asset::Native);
        assert_eq!("xlm".parse::<Asset>().unwrap(), Asset::Native);

        let usdc: Asset = format!("USDC:{issuer}").parse().unwrap();
        assert_eq!(usdc.code(), "USDC");
        assert_eq!(usdc.to_string(), format!("USDC:{issuer}"));

        assert!(matches!(
            "USDC".parse::<Asset>(),
            Err(AssetError::Malformed(_))
        ));
        assert!(matches!(
            "USDC:GNOPE".parse::<Asset>(),
            Err(AssetError::InvalidIssuer(_))
        ));
        assert!(Asset::credit("", issuer).is_err());
        assert!(Asset::credit("THIRTEENCHARS", issuer).is_err());
        assert!(Asset::credit("US-D", issuer).is_err());
    }

    #[test]
    fn memo_serde_shape() {
        let json = serde_json::to_string(&Memo::Text("rent".into())).unwrap();
        assert_eq!(json, r#"{"type":"text","value":"rent"}"#);
        let id: Memo = serde_json::from_str(r#"{"type":"id","value":42}"#).unwrap();
        assert_eq!(id, Memo::Id(42));
    }

    #[test]
    fn time_bounds_expiry() {
        let bounds = TimeBounds {
            min_time: 100,
            max_time: 280,
        };
        assert!(!bounds.is_expired(280));
        assert!(bounds.is_expired(281));
        assert!(bounds.is_premature(99));
        assert!(!TimeBounds { min_time: 0, max_time: 0 }.is_expired(u64::MAX));
    }

    #[test]
    fn hash_hex_roundtrip() {
        let hash = TransactionHash([0xab; 32]);
        let text = hash.to_string();
        assert_eq!(text.len(), 64);
        assert_eq!(text.parse::<TransactionHash>().unwrap(), hash);
        assert!("zz".parse::<TransactionHash>().is_err());
    }
}
