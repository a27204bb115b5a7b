//! # Cryptographic Primitives
//!
//! Thin, typed wrappers around audited crates. Nothing in here invents
//! cryptography:
//!
//! - **Ed25519** (`ed25519-dalek`) for account keys and signatures.
//! - **SHA-256** (`sha2`) for network ids and transaction hashes.
//! - **AES-256-GCM** (`aes-gcm`) for sealing key records at rest.
//!
//! Account ids and secrets travel as Stellar StrKeys (`G...` / `S...`),
//! never as raw hex.

pub mod encryption;
pub mod hash;
pub mod keys;

pub use encryption::{open, seal};
pub use hash::sha256;
pub use keys::{AccountId, KeyError, KeyPair, Signature};
