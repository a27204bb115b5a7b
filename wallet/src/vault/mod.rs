//! # Key Vault
//!
//! Custody of the one keypair a device profile owns. The secret never
//! leaves this module except as a signature, or as the `S...` string the
//! user explicitly asks to back up.
//!
//! ## Persisted record
//!
//! One JSON record named [`KEY_RECORD_NAME`]:
//!
//! ```json
//! {"publicKey": "G...", "secretKey": "S..."}
//! ```
//!
//! The public key is stored alongside the secret only as a consistency
//! check: on load it is re-derived from the secret, and a mismatch marks
//! the record as corrupt.
//!
//! ## Locking
//!
//! The backend sits behind a `RwLock`. Signing through
//! [`KeyVault::with_key`] holds the shared side; `generate`, `import` and
//! `clear` take the exclusive side, so the key cannot be swapped out from
//! under a signature in progress.

pub mod sled_store;
pub mod store;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::config::KEY_RECORD_NAME;
use crate::crypto::keys::KeyPair;

pub use sled_store::SledKeyStore;
pub use store::{FileKeyStore, KeyStore, MemoryKeyStore, SealedKeyStore, StoreError};

#[derive(Debug, Error)]
pub enum VaultError {
    /// The input is not an `S...` secret seed. Nothing was stored.
    #[error("invalid secret key format")]
    InvalidKeyFormat,

    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error("failed to encode key record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("no wallet on this device")]
    NoWallet,
}

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
struct KeyRecord {
    public_key: String,
    secret_key: String,
}

impl KeyRecord {
    fn from_keypair(key: &KeyPair) -> Self {
        Self {
            public_key: key.public_key().to_string(),
            secret_key: key.secret().to_string(),
        }
    }
}

/// Local custody of one keypair over an injected [`KeyStore`].
///
/// # Examples
///
/// ```
/// use ilede_wallet::vault::{KeyVault, MemoryKeyStore};
///
/// let vault = KeyVault::new(MemoryKeyStore::new());
/// let key = vault.generate().unwrap();
/// assert_eq!(vault.load().unwrap(), Some(key));
///
/// vault.clear().unwrap();
/// assert_eq!(vault.load().unwrap(), None);
/// ```
pub struct KeyVault {
    store: RwLock<Box<dyn KeyStore>>,
}

impl std::fmt::Debug for KeyVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyVault")
    }
}

impl KeyVault {
    pub fn new(store: impl KeyStore + 'static) -> Self {
        Self {
            store: RwLock::new(Box::new(store)),
        }
    }

    /// A fresh OS-random keypair, persisted over whatever was stored.
    pub fn generate(&self) -> Result<KeyPair, VaultError> {
        let key = KeyPair::generate();
        self.persist(&key)?;
        info!(account = %key.public_key(), "generated new wallet key");
        Ok(key)
    }

    /// Imports an `S...` secret seed, replacing the stored keypair.
    ///
    /// Validation happens before the lock is taken: a malformed secret
    /// fails with [`VaultError::InvalidKeyFormat`] and the stored key is
    /// left exactly as it was.
    pub fn import(&self, secret: &str) -> Result<KeyPair, VaultError> {
        let key = KeyPair::from_secret(secret).map_err(|_| VaultError::InvalidKeyFormat)?;
        self.persist(&key)?;
        info!(account = %key.public_key(), "imported wallet key");
        Ok(key)
    }

    fn persist(&self, key: &KeyPair) -> Result<(), VaultError> {
        let record = KeyRecord::from_keypair(key);
        let bytes = Zeroizing::new(serde_json::to_vec(&record)?);
        self.store.write().write(KEY_RECORD_NAME, &bytes)?;
        Ok(())
    }

    /// The stored keypair.
    ///
    /// A missing record is `None`. So is a corrupt one (unparseable JSON,
    /// a bad seed, or a public key that does not match its secret): that is
    /// logged and reported as "no wallet" so the user can re-import.
    /// Backend failures, including a sealed record that will not open, are
    /// errors.
    pub fn load(&self) -> Result<Option<KeyPair>, VaultError> {
        let store = self.store.read();
        Self::load_from(&**store)
    }

    fn load_from(store: &dyn KeyStore) -> Result<Option<KeyPair>, VaultError> {
        let Some(bytes) = store.read(KEY_RECORD_NAME)? else {
            return Ok(None);
        };
        let record: KeyRecord = match serde_json::from_slice(&bytes) {
            Ok(record) => record,
            Err(err) => {
                warn!(error = %err, "stored key record is not valid JSON; ignoring it");
                return Ok(None);
            }
        };
        let key = match KeyPair::from_secret(&record.secret_key) {
            Ok(key) => key,
            Err(_) => {
                warn!("stored key record has a malformed secret; ignoring it");
                return Ok(None);
            }
        };
        if key.public_key().to_string() != record.public_key {
            warn!(
                stored = %record.public_key,
                derived = %key.public_key(),
                "stored public key does not match its secret; ignoring record"
            );
            return Ok(None);
        }
        Ok(Some(key))
    }

    /// Removes the stored keypair. Clearing an empty vault succeeds.
    pub fn clear(&self) -> Result<(), VaultError> {
        self.store.write().remove(KEY_RECORD_NAME)?;
        info!("wallet key cleared");
        Ok(())
    }

    /// Runs `f` with the stored key while holding the vault's shared lock.
    ///
    /// Fails with [`VaultError::NoWallet`] when nothing (usable) is stored.
    pub fn with_key<R>(&self, f: impl FnOnce(&KeyPair) -> R) -> Result<R, VaultError> {
        let store = self.store.read();
        let key = Self::load_from(&**store)?.ok_or(VaultError::NoWallet)?;
        Ok(f(&key))
    }
}
