//! # Account Keys
//!
//! Ed25519 keypairs and the Stellar StrKey text forms they travel in.
//!
//! A Stellar account *is* its public key. `G...` is the public half and is
//! safe to print anywhere. `S...` is the 32-byte seed and is the whole
//! account: anyone holding it can sign for it.
//!
//! ## Security considerations
//!
//! - `KeyPair` deliberately does not implement `Serialize`. Writing a
//!   secret to disk goes through [`KeyPair::secret`] and the vault, on
//!   purpose, every time.
//! - `Debug` prints the public key only.
//! - Exported secrets come back wrapped in [`Zeroizing`], so the string is
//!   wiped when the caller drops it.

use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use zeroize::Zeroizing;

/// Key parsing failures.
///
/// These say which kind of string was bad and nothing about its content.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("invalid secret key: expected an S... StrKey seed")]
    InvalidSecretKey,

    #[error("invalid account id: expected a G... StrKey public key")]
    InvalidAccountId,
}

// ---------------------------------------------------------------------------
// KeyPair
// ---------------------------------------------------------------------------

/// An Ed25519 signing key for one Stellar account.
///
/// # Examples
///
/// ```
/// use ilede_wallet::crypto::keys::KeyPair;
///
/// let kp = KeyPair::generate();
/// let sig = kp.sign(b"pay 10 XLM");
/// assert!(kp.public_key().verify(b"pay 10 XLM", &sig));
/// ```
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    /// Fresh keypair from the OS CSPRNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Deterministic keypair from a raw 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Parses an `S...` secret seed. Surrounding whitespace is ignored,
    /// since secrets are usually pasted.
    pub fn from_secret(secret: &str) -> Result<Self, KeyError> {
        let decoded = stellar_strkey::ed25519::PrivateKey::from_string(secret.trim())
            .map_err(|_| KeyError::InvalidSecretKey)?;
        let seed = Zeroizing::new(decoded.0);
        Ok(Self::from_seed(&seed))
    }

    pub fn public_key(&self) -> AccountId {
        AccountId(self.signing_key.verifying_key().to_bytes())
    }

    /// The `S...` seed. Treat the returned string as the account itself.
    pub fn secret(&self) -> Zeroizing<String> {
        let seed = Zeroizing::new(self.signing_key.to_bytes());
        Zeroizing::new(stellar_strkey::ed25519::PrivateKey(*seed).to_string())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.signing_key.sign(message).to_bytes())
    }

    /// Last four bytes of the public key, carried next to each signature so
    /// validators can find the matching signer without trying them all.
    pub fn hint(&self) -> [u8; 4] {
        self.public_key().hint()
    }
}

impl Clone for KeyPair {
    fn clone(&self) -> Self {
        let seed = Zeroizing::new(self.signing_key.to_bytes());
        Self::from_seed(&seed)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPair(pub={})", self.public_key())
    }
}

impl PartialEq for KeyPair {
    /// Compared by public key; secrets are never compared directly.
    fn eq(&self, other: &Self) -> bool {
        self.public_key() == other.public_key()
    }
}

impl Eq for KeyPair {}

// ---------------------------------------------------------------------------
// AccountId
// ---------------------------------------------------------------------------

/// A Stellar account address: an Ed25519 public key shown as `G...`.
///
/// Parsing checks the StrKey version byte and CRC16 checksum, which is all
/// the ledger itself checks. Whether the account exists is a question for
/// the ledger.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountId(pub [u8; 32]);

impl AccountId {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn hint(&self) -> [u8; 4] {
        let mut hint = [0u8; 4];
        hint.copy_from_slice(&self.0[28..]);
        hint
    }

    /// Checks `signature` over `message` against this key. Bytes that are
    /// not a valid curve point simply fail verification.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        key.verify(message, &DalekSignature::from_bytes(&signature.0))
            .is_ok()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&stellar_strkey::ed25519::PublicKey(self.0).to_string())
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({self})")
    }
}

impl FromStr for AccountId {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        stellar_strkey::ed25519::PublicKey::from_string(s.trim())
            .map(|pk| Self(pk.0))
            .map_err(|_| KeyError::InvalidAccountId)
    }
}

impl Serialize for AccountId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

/// A raw 64-byte Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; 64]);

impl Signature {
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// Accepts exactly 64 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Self)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = hex::encode(self.0);
        write!(f, "Signature({}...{})", &hex[..8], &hex[120..])
    }
}
