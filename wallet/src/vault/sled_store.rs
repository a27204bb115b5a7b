//! sled-backed key store with one tree per device profile.
//!
//! Several profiles (personal, business, a test account) can live in one
//! database file without seeing each other's records:
//!
//! | Tree                | Key            | Value        |
//! |---------------------|----------------|--------------|
//! | `profile:<name>`    | record name    | record bytes |
//!
//! sled's single-key `insert` is atomic, and every write and removal is
//! flushed before returning, so a generated key is on disk before the
//! caller shows it and a cleared key is gone from the live tree.
//!
//! sled is log-structured: a removed record can survive in old segments
//! until they are compacted. Wrap the store in
//! [`SealedKeyStore`](super::store::SealedKeyStore) so that whatever
//! lingers on disk is ciphertext.

use sled::{Db, Tree};
use std::path::Path;
use zeroize::Zeroizing;

use super::store::{KeyStore, StoreError};

/// Profile used when the caller does not name one.
pub const DEFAULT_PROFILE: &str = "default";

#[derive(Debug, Clone)]
pub struct SledKeyStore {
    db: Db,
    tree: Tree,
}

impl SledKeyStore {
    /// Opens (or creates) the database at `path` and selects `profile`.
    pub fn open(path: impl AsRef<Path>, profile: &str) -> Result<Self, StoreError> {
        Self::from_db(sled::open(path)?, profile)
    }

    /// In-memory database, removed when dropped.
    pub fn open_temporary(profile: &str) -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db, profile)
    }

    fn from_db(db: Db, profile: &str) -> Result<Self, StoreError> {
        let tree = db.open_tree(format!("profile:{profile}"))?;
        Ok(Self { db, tree })
    }

    /// Another profile in the same database.
    pub fn profile(&self, profile: &str) -> Result<Self, StoreError> {
        Self::from_db(self.db.clone(), profile)
    }
}

impl KeyStore for SledKeyStore {
    fn read(&self, name: &str) -> Result<Option<Zeroizing<Vec<u8>>>, StoreError> {
        Ok(self.tree.get(name)?.map(|v| Zeroizing::new(v.to_vec())))
    }

    fn write(&self, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.tree.insert(name, bytes)?;
        self.tree.flush()?;
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), StoreError> {
        if self.tree.remove(name)?.is_some() {
            self.tree.flush()?;
            self.db.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_are_isolated() {
        let personal = SledKeyStore::open_temporary("personal").unwrap();
        let business = personal.profile("business").unwrap();

        personal.write("k", b"mine").unwrap();
        assert!(business.read("k").unwrap().is_none());

        business.write("k", b"theirs").unwrap();
        assert_eq!(personal.read("k").unwrap().unwrap().as_slice(), b"mine");

        personal.remove("k").unwrap();
        personal.remove("k").unwrap();
        assert!(personal.read("k").unwrap().is_none());
        assert!(business.read("k").unwrap().is_some());
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.db");
        {
            let store = SledKeyStore::open(&path, DEFAULT_PROFILE).unwrap();
            store.write("k", b"persisted").unwrap();
        }
        let reopened = SledKeyStore::open(&path, DEFAULT_PROFILE).unwrap();
        assert_eq!(reopened.read("k").unwrap().unwrap().as_slice(), b"persisted");
    }

    #[test]
    fn removal_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.db");
        {
            let store = SledKeyStore::open(&path, DEFAULT_PROFILE).unwrap();
            store.write("k", b"secret").unwrap();
            store.remove("k").unwrap();
        }
        let reopened = SledKeyStore::open(&path, DEFAULT_PROFILE).unwrap();
        assert!(reopened.read("k").unwrap().is_none());
    }
}
