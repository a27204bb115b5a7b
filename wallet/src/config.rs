//! # Network Configuration & Constants
//!
//! Every magic number the wallet depends on lives here, next to the
//! [`WalletConfig`] that lets operators override the ones that are really
//! policy (fees, timeouts, retry budgets) rather than protocol.
//!
//! Fee policy: the per-operation fee is the larger of the configured floor
//! and the base fee the ledger charged in its last closed ledger, clamped
//! to a configured ceiling. When fee stats are unavailable the floor is
//! used as-is. See [`FeePolicy::per_operation`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::crypto::hash::sha256;
use crate::retry::RetryPolicy;

// ---------------------------------------------------------------------------
// Network Identifiers
// ---------------------------------------------------------------------------

/// Passphrase of the public Stellar network. Signatures commit to it.
pub const MAINNET_PASSPHRASE: &str = "Public Global Stellar Network ; September 2015";

/// Passphrase of the SDF test network.
pub const TESTNET_PASSPHRASE: &str = "Test SDF Network ; September 2015";

pub const MAINNET_HORIZON_URL: &str = "https://horizon.stellar.org";
pub const TESTNET_HORIZON_URL: &str = "https://horizon-testnet.stellar.org";

/// Friendbot funds fresh testnet accounts. There is no mainnet equivalent.
pub const TESTNET_FRIENDBOT_URL: &str = "https://friendbot.stellar.org";

/// Placeholder anchor used until an operator configures a real one.
pub const DEFAULT_ANCHOR_URL: &str = "https://anchor.example.com";

// ---------------------------------------------------------------------------
// Amounts & Fees
// ---------------------------------------------------------------------------

/// Fractional digits of every Stellar amount.
pub const AMOUNT_DECIMALS: u32 = 7;

/// 1 unit = 10^7 stroops.
pub const STROOPS_PER_UNIT: i64 = 10_000_000;

/// Network minimum fee per operation, in stroops.
pub const BASE_FEE_STROOPS: u32 = 100;

/// Default ceiling on the per-operation fee during surge pricing.
pub const MAX_FEE_STROOPS: u32 = 10_000;

/// Ticker shown for the native asset.
pub const NATIVE_ASSET_CODE: &str = "XLM";

// ---------------------------------------------------------------------------
// Transaction Limits
// ---------------------------------------------------------------------------

/// `MEMO_TEXT` is an XDR `string<28>`: bytes, not characters.
pub const MAX_MEMO_TEXT_BYTES: usize = 28;

/// XDR bound on `Transaction.operations`.
pub const MAX_OPERATIONS: usize = 100;

/// XDR bound on `TransactionV1Envelope.signatures`.
pub const MAX_SIGNATURES: usize = 20;

/// Default validity window of a freshly built envelope.
pub const TX_TIMEOUT: Duration = Duration::from_secs(180);

// ---------------------------------------------------------------------------
// Retry Budgets
// ---------------------------------------------------------------------------

/// Balance reads: one attempt plus three retries.
pub const READER_ATTEMPTS: u32 = 4;

/// Submissions: three attempts in total.
pub const SUBMIT_ATTEMPTS: u32 = 3;

/// First backoff delay; doubles on every retry.
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// How long past its `max_time` an accepted hash is still answered from
/// the submitter's cache.
pub const ACCEPTED_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Upper bound on cached accepted hashes per submitter.
pub const ACCEPTED_CACHE_CAPACITY: usize = 10_000;

// ---------------------------------------------------------------------------
// Key Storage
// ---------------------------------------------------------------------------

/// Name of the single persisted key record. Absence means "no wallet".
pub const KEY_RECORD_NAME: &str = "stellar_wallet_keys";

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// The ledger a wallet talks to.
///
/// The passphrase is not cosmetic: it is hashed into every signature
/// payload, so an envelope signed for testnet is invalid on mainnet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Testnet,
    Mainnet,
    /// A private or standalone network.
    Custom {
        passphrase: String,
        horizon_url: String,
    },
}

impl Network {
    pub fn passphrase(&self) -> &str {
        match self {
            Self::Testnet => TESTNET_PASSPHRASE,
            Self::Mainnet => MAINNET_PASSPHRASE,
            Self::Custom { passphrase, .. } => passphrase,
        }
    }

    pub fn horizon_url(&self) -> &str {
        match self {
            Self::Testnet => TESTNET_HORIZON_URL,
            Self::Mainnet => MAINNET_HORIZON_URL,
            Self::Custom { horizon_url, .. } => horizon_url,
        }
    }

    /// Friendbot endpoint, testnet only.
    pub fn friendbot_url(&self) -> Option<&'static str> {
        match self {
            Self::Testnet => Some(TESTNET_FRIENDBOT_URL),
            _ => None,
        }
    }

    /// `SHA-256(passphrase)`, the first 32 bytes of every signature payload.
    pub fn network_id(&self) -> [u8; 32] {
        sha256(self.passphrase().as_bytes())
    }

    /// Short name for logs and CLI output.
    pub fn name(&self) -> &str {
        match self {
            Self::Testnet => "testnet",
            Self::Mainnet => "mainnet",
            Self::Custom { .. } => "custom",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "testnet" | "test" => Ok(Self::Testnet),
            "mainnet" | "public" | "pubnet" => Ok(Self::Mainnet),
            other => Err(ConfigError::UnknownNetwork(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Fee Policy
// ---------------------------------------------------------------------------

/// How much to bid per operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeePolicy {
    /// Floor in stroops. Never bid below this.
    pub base_fee: u32,
    /// Ceiling in stroops. Surge pricing above this is declined.
    pub max_fee: u32,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self {
            base_fee: BASE_FEE_STROOPS,
            max_fee: MAX_FEE_STROOPS,
        }
    }
}

impl FeePolicy {
    /// Per-operation fee given the ledger's last observed base fee.
    ///
    /// A misconfigured ceiling below the floor is ignored; the floor wins.
    pub fn per_operation(&self, ledger_base_fee: Option<u32>) -> u32 {
        let bid = match ledger_base_fee {
            Some(observed) => observed.max(self.base_fee),
            None => self.base_fee,
        };
        bid.min(self.max_fee.max(self.base_fee))
    }
}

// ---------------------------------------------------------------------------
// WalletConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unknown network {0:?}: expected testnet or mainnet")]
    UnknownNetwork(String),
}

/// Operator-tunable settings. Every field has a default, so an empty TOML
/// file is a valid testnet configuration.
///
/// ```toml
/// network = "mainnet"
/// tx_timeout_secs = 120
///
/// [fees]
/// base_fee = 100
/// max_fee = 5000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    pub network: Network,
    /// Overrides the network's default Horizon endpoint.
    pub horizon_url: Option<String>,
    pub fees: FeePolicy,
    pub tx_timeout_secs: u64,
    pub reader_retry: RetryPolicy,
    pub submit_retry: RetryPolicy,
    pub anchor_url: String,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            network: Network::Testnet,
            horizon_url: None,
            fees: FeePolicy::default(),
            tx_timeout_secs: TX_TIMEOUT.as_secs(),
            reader_retry: RetryPolicy::reader(),
            submit_retry: RetryPolicy::submitter(),
            anchor_url: DEFAULT_ANCHOR_URL.to_string(),
        }
    }
}

impl WalletConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn horizon_url(&self) -> &str {
        self.horizon_url
            .as_deref()
            .unwrap_or_else(|| self.network.horizon_url())
    }

    pub fn tx_timeout(&self) -> Duration {
        Duration::from_secs(self.tx_timeout_secs)
    }
}
