//! # Sealing Records at Rest
//!
//! AES-256-GCM with a random 96-bit nonce per record. The record name is
//! bound in as associated data, so a sealed blob copied under a different
//! name fails to open instead of silently loading.
//!
//! ## Wire format
//!
//! `nonce (12) || ciphertext || tag (16)`.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use thiserror::Error;

pub const SEAL_KEY_LENGTH: usize = 32;
pub const SEAL_NONCE_LENGTH: usize = 12;

/// Deliberately uninformative: "wrong key" and "tampered" look the same.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SealError {
    #[error("sealing failed")]
    SealFailed,

    #[error("unsealing failed: wrong key or corrupted record")]
    OpenFailed,

    #[error("sealed record too short")]
    TooShort,
}

/// Encrypts `plaintext`, authenticating `aad` alongside it.
pub fn seal(
    key: &[u8; SEAL_KEY_LENGTH],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, SealError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| SealError::SealFailed)?;

    let mut nonce_bytes = [0u8; SEAL_NONCE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| SealError::SealFailed)?;

    let mut out = Vec::with_capacity(SEAL_NONCE_LENGTH + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Reverses [`seal`]. The same `aad` must be supplied.
pub fn open(key: &[u8; SEAL_KEY_LENGTH], sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>, SealError> {
    if sealed.len() < SEAL_NONCE_LENGTH {
        return Err(SealError::TooShort);
    }
    let (nonce, ciphertext) = sealed.split_at(SEAL_NONCE_LENGTH);
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| SealError::OpenFailed)?;

    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| SealError::OpenFailed)
}
