//! Storage backends for the key vault.
//!
//! A [`KeyStore`] is a tiny named-blob store. The vault only ever uses one
//! name ([`crate::config::KEY_RECORD_NAME`]), but keeping the name in the
//! interface lets several profiles share one backend.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::crypto::encryption::{open, seal, SEAL_KEY_LENGTH};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("key store database error: {0}")]
    Sled(#[from] sled::Error),

    /// The record exists but cannot be unsealed with this key.
    #[error("sealed key record could not be opened")]
    Sealed,
}

/// Named-blob persistence. Implementations must make `write` atomic: a
/// reader sees the old record or the new one, never a mix.
pub trait KeyStore: Send + Sync {
    fn read(&self, name: &str) -> Result<Option<Zeroizing<Vec<u8>>>, StoreError>;

    fn write(&self, name: &str, bytes: &[u8]) -> Result<(), StoreError>;

    /// Removing a missing record is not an error.
    fn remove(&self, name: &str) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// MemoryKeyStore
// ---------------------------------------------------------------------------

/// Process-lifetime store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryKeyStore {
    records: Mutex<HashMap<String, Zeroizing<Vec<u8>>>>,
}

impl std::fmt::Debug for MemoryKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MemoryKeyStore({} records)", self.records.lock().len())
    }
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStore for MemoryKeyStore {
    fn read(&self, name: &str) -> Result<Option<Zeroizing<Vec<u8>>>, StoreError> {
        Ok(self.records.lock().get(name).cloned())
    }

    fn write(&self, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.records
            .lock()
            .insert(name.to_string(), Zeroizing::new(bytes.to_vec()));
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), StoreError> {
        self.records.lock().remove(name);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileKeyStore
// ---------------------------------------------------------------------------

/// One file per record, `<dir>/<name>.json`, readable by the owner only.
///
/// Writes go to a temporary file that is renamed into place, so a crash
/// mid-write leaves the previous record intact.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    dir: PathBuf,
}

impl FileKeyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

impl KeyStore for FileKeyStore {
    fn read(&self, name: &str) -> Result<Option<Zeroizing<Vec<u8>>>, StoreError> {
        match fs::read(self.path(name)) {
            Ok(bytes) => Ok(Some(Zeroizing::new(bytes))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(name);
        let tmp = self.dir.join(format!(".{name}.tmp"));

        let written = write_then_rename(&tmp, &path, bytes);
        if written.is_err() {
            // Never leave a copy of the record behind under another name.
            let _ = fs::remove_file(&tmp);
        }
        written.map_err(StoreError::from)
    }

    fn remove(&self, name: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path(name)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn write_then_rename(tmp: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(tmp)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(tmp, fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(tmp, path)
}

// ---------------------------------------------------------------------------
// SealedKeyStore
// ---------------------------------------------------------------------------

/// Encrypts records with AES-256-GCM before handing them to `inner`.
///
/// The record name is the associated data, so a blob renamed on disk
/// refuses to open.
pub struct SealedKeyStore<S> {
    inner: S,
    key: Zeroizing<[u8; SEAL_KEY_LENGTH]>,
}

impl<S: KeyStore> SealedKeyStore<S> {
    pub fn new(inner: S, key: [u8; SEAL_KEY_LENGTH]) -> Self {
        Self {
            inner,
            key: Zeroizing::new(key),
        }
    }
}

impl<S: KeyStore> KeyStore for SealedKeyStore<S> {
    fn read(&self, name: &str) -> Result<Option<Zeroizing<Vec<u8>>>, StoreError> {
        let Some(sealed) = self.inner.read(name)? else {
            return Ok(None);
        };
        open(&self.key, &sealed, name.as_bytes())
            .map(|plain| Some(Zeroizing::new(plain)))
            .map_err(|_| StoreError::Sealed)
    }

    fn write(&self, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let sealed = seal(&self.key, bytes, name.as_bytes()).map_err(|_| StoreError::Sealed)?;
        self.inner.write(name, &sealed)
    }

    fn remove(&self, name: &str) -> Result<(), StoreError> {
        self.inner.remove(name)
    }
}
