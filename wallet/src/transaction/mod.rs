//! # Transaction Module
//!
//! Building, signing and encoding single-payment Stellar transactions.
//!
//! ```text
//! types.rs    Amount, Asset, Memo, TimeBounds, TransactionHash
//! builder.rs  TransactionBuilder -> UnsignedEnvelope
//! signing.rs  sign() -> SignedEnvelope, base64 XDR in and out
//! xdr.rs      The XDR subset a payment envelope needs
//! ```
//!
//! ## Lifecycle
//!
//! 1. **Build** from a fresh `AccountState`: sequence + 1, fee, time bounds.
//! 2. **Sign** with the source account's key. Pure, deterministic.
//! 3. **Submit** the base64 envelope (see [`crate::submit`]).

pub mod builder;
pub mod signing;
pub mod types;
pub mod xdr;

pub use builder::{BuildError, TransactionBuilder, UnsignedEnvelope};
pub use signing::{sign, SignError, SignedEnvelope};
pub use types::{Amount, AmountError, Asset, Memo, Operation, PaymentOp, TimeBounds, TransactionHash};
pub use xdr::XdrError;
