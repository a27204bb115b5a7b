//! Signing unsigned envelopes with a vault key.
//!
//! Signing is pure: no I/O, no clock. The only check is that the key
//! belongs to the envelope's source account, since a signature from any
//! other key would just be rejected by the ledger with `tx_bad_auth`.

use base64::{engine::general_purpose::STANDARD, Engine};
use thiserror::Error;

use super::builder::UnsignedEnvelope;
use super::types::{DecoratedSignature, TransactionHash};
use super::xdr::{decode_envelope, encode_envelope, XdrError};
use crate::config::{Network, MAX_SIGNATURES};
use crate::crypto::keys::{AccountId, KeyPair};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignError {
    #[error("key {found} cannot sign for source account {expected}")]
    KeyMismatch { expected: AccountId, found: AccountId },

    #[error("envelope already carries the maximum of 20 signatures")]
    TooManySignatures,
}

/// An envelope ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEnvelope {
    envelope: UnsignedEnvelope,
    signatures: Vec<DecoratedSignature>,
}

impl SignedEnvelope {
    pub fn envelope(&self) -> &UnsignedEnvelope {
        &self.envelope
    }

    pub fn signatures(&self) -> &[DecoratedSignature] {
        &self.signatures
    }

    /// Same as the unsigned envelope's hash: signatures are not hashed.
    pub fn hash(&self) -> TransactionHash {
        self.envelope.hash()
    }

    /// Whether a valid signature from `account` is attached.
    pub fn is_signed_by(&self, account: &AccountId) -> bool {
        let payload = self.hash();
        let hint = account.hint();
        self.signatures
            .iter()
            .filter(|sig| sig.hint == hint)
            .any(|sig| account.verify(payload.as_bytes(), &sig.signature))
    }

    /// Adds another signer's signature, e.g. for a multisig source account.
    pub fn cosign(mut self, key: &KeyPair) -> Result<Self, SignError> {
        if self.signatures.len() >= MAX_SIGNATURES {
            return Err(SignError::TooManySignatures);
        }
        self.signatures.push(decorate(&self.envelope, key));
        Ok(self)
    }

    pub fn to_xdr(&self) -> Vec<u8> {
        encode_envelope(self.envelope.transaction(), &self.signatures)
    }

    /// Base64 XDR `TransactionEnvelope`, the form Horizon accepts.
    pub fn to_xdr_base64(&self) -> String {
        STANDARD.encode(self.to_xdr())
    }

    /// Decodes an envelope that was signed for `network`. The network is
    /// not in the XDR; it has to be known out of band.
    pub fn from_xdr_base64(encoded: &str, network: Network) -> Result<Self, XdrError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|err| XdrError::Base64(err.to_string()))?;
        let (tx, signatures) = decode_envelope(&bytes)?;
        Ok(Self {
            envelope: UnsignedEnvelope::from_parts(tx, network),
            signatures,
        })
    }
}

fn decorate(envelope: &UnsignedEnvelope, key: &KeyPair) -> DecoratedSignature {
    DecoratedSignature {
        hint: key.hint(),
        signature: key.sign(envelope.hash().as_bytes()),
    }
}

/// Signs `envelope` with `key`.
///
/// Fails with [`SignError::KeyMismatch`] unless `key` is the envelope's
/// source account. The envelope itself is left untouched and can be signed
/// again, which yields the same deterministic Ed25519 signature.
pub fn sign(envelope: &UnsignedEnvelope, key: &KeyPair) -> Result<SignedEnvelope, SignError> {
    let found = key.public_key();
    if &found != envelope.source_account() {
        return Err(SignError::KeyMismatch {
            expected: *envelope.source_account(),
            found,
        });
    }
    Ok(SignedEnvelope {
        envelope: envelope.clone(),
        signatures: vec![decorate(envelope, key)],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::AccountState;
    use crate::transaction::builder::TransactionBuilder;
    use crate::transaction::types::Memo;

    fn envelope_for(key: &KeyPair, network: Network) -> UnsignedEnvelope {
        TransactionBuilder::new(&AccountState::new(key.public_key(), 41), network)
            .destination(&KeyPair::generate().public_key().to_string())
            .amount("12.5")
            .memo(Memo::Text("thanks".into()))
            .now(1_700_000_000)
            .build()
            .unwrap()
    }

    #[test]
    fn signature_verifies_over_hash() {
        let key = KeyPair::generate();
        let env = envelope_for(&key, Network::Testnet);
        let signed = sign(&env, &key).unwrap();

        assert_eq!(signed.signatures().len(), 1);
        assert_eq!(signed.signatures()[0].hint, key.hint());
        assert!(signed.is_signed_by(&key.public_key()));
        assert!(!signed.is_signed_by(&KeyPair::generate().public_key()));
        assert_eq!(signed.hash(), env.hash());
    }

    #[test]
    fn wrong_key_is_key_mismatch() {
        let owner = KeyPair::generate();
        let intruder = KeyPair::generate();
        let env = envelope_for(&owner, Network::Testnet);
        assert_eq!(
            sign(&env, &intruder),
            Err(SignError::KeyMismatch {
                expected: owner.public_key(),
                found: intruder.public_key(),
            })
        );
    }

    #[test]
    fn signing_is_deterministic() {
        let key = KeyPair::generate();
        let env = envelope_for(&key, Network::Testnet);
        assert_eq!(sign(&env, &key).unwrap(), sign(&env, &key).unwrap());
    }

    #[test]
    fn base64_echo_roundtrip() {
        let key = KeyPair::generate();
        let signed = sign(&envelope_for(&key, Network::Testnet), &key).unwrap();

        let encoded = signed.to_xdr_base64();
        let decoded = SignedEnvelope::from_xdr_base64(&encoded, Network::Testnet).unwrap();

        assert_eq!(decoded, signed);
        assert!(decoded.is_signed_by(&key.public_key()));
    }

    #[test]
    fn decoding_for_another_network_breaks_signature() {
        let key = KeyPair::generate();
        let signed = sign(&envelope_for(&key, Network::Testnet), &key).unwrap();
        let on_mainnet =
            SignedEnvelope::from_xdr_base64(&signed.to_xdr_base64(), Network::Mainnet).unwrap();
        assert!(!on_mainnet.is_signed_by(&key.public_key()));
    }

    #[test]
    fn cosigning_appends() {
        let key = KeyPair::generate();
        let other = KeyPair::generate();
        let signed = sign(&envelope_for(&key, Network::Testnet), &key)
            .unwrap()
            .cosign(&other)
            .unwrap();
        assert_eq!(signed.signatures().len(), 2);
        assert!(signed.is_signed_by(&other.public_key()));
        assert!(signed.is_signed_by(&key.public_key()));
    }

    #[test]
    fn bad_base64_is_reported() {
        assert!(matches!(
            SignedEnvelope::from_xdr_base64("***", Network::Testnet),
            Err(XdrError::Base64(_))
        ));
    }
}
