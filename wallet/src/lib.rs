// Copyright (c) 2026 iLede Wallet Developers. MIT License.
// See LICENSE for details.

//! # iLede Wallet: Non-Custodial Payment Core
//!
//! Everything a retail wallet needs to move money on Stellar without ever
//! handing its secret key to a server: the key lives on the device, the
//! transaction is built and signed on the device, and only the signed
//! envelope leaves it.
//!
//! ## Architecture
//!
//! One logical payment walks a strictly sequential pipeline:
//!
//! ```text
//! BalanceReader ──► TransactionBuilder ──► Signer ──► Submitter
//!   (fresh seq)        (unsigned env)      ▲          (ledger)
//!                                          │
//!                                       KeyVault
//! ```
//!
//! - **config**: Network passphrases, fee policy, protocol constants.
//! - **crypto**: Ed25519 keys as StrKey addresses, hashing, sealed records.
//! - **transaction**: Amounts, assets, memos, the builder, signing, XDR.
//! - **vault**: Key custody over an injected storage backend.
//! - **ledger**: The ledger client seam: Horizon over HTTP, or in memory.
//! - **balance** / **submit**: Retrying reader and at-most-once submitter.
//! - **payment**: The composed send flow.
//! - **anchor**: Thin SEP-24 client for fiat on/off ramps.
//!
//! ## Ground rules
//!
//! 1. Money is `i64` stroops. Never a float, never silently truncated.
//! 2. Secret material is never logged and never serialized by accident.
//! 3. Ledger rejections are terminal. Only transport failures are retried.

pub mod anchor;
pub mod balance;
pub mod config;
pub mod crypto;
pub mod ledger;
pub mod payment;
pub mod retry;
pub mod submit;
pub mod transaction;
pub mod vault;

pub use anchor::{AnchorClient, AnchorError};
pub use balance::{BalanceReader, ReadError};
pub use config::{Network, WalletConfig};
pub use crypto::keys::{AccountId, KeyPair};
pub use ledger::{AccountState, LedgerClient, ResultCode};
pub use payment::{PaymentError, PaymentRequest, PaymentService};
pub use submit::{SubmissionResult, SubmissionStatus, SubmitError, Submitter};
pub use transaction::{
    sign, Amount, Asset, BuildError, Memo, SignError, SignedEnvelope, TransactionBuilder,
    UnsignedEnvelope,
};
pub use vault::{KeyVault, VaultError};
