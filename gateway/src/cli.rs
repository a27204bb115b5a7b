//! # CLI Interface
//!
//! Defines the command-line argument structure for `ilede` using `clap`
//! derive. Global flags select the configuration, network and key store;
//! subcommands cover key custody, payments, anchors and the relay server.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::logging::LogFormat;

/// iLede non-custodial Stellar wallet.
///
/// Keys stay in the local store. Transactions are built and signed here,
/// and only the signed envelope is sent to the network.
#[derive(Parser, Debug)]
#[command(
    name = "ilede",
    about = "iLede non-custodial Stellar wallet",
    version,
    propagate_version = true
)]
pub struct IledeCli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags shared by every subcommand. Each overrides the config file.
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Path to a TOML configuration file.
    #[arg(long, short = 'c', global = true, env = "ILEDE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Network to use: testnet or mainnet.
    #[arg(long, short = 'n', global = true, env = "ILEDE_NETWORK")]
    pub network: Option<String>,

    /// Horizon base URL, overriding the network default.
    #[arg(long, global = true, env = "ILEDE_HORIZON_URL")]
    pub horizon_url: Option<String>,

    /// Directory holding the key database. Defaults to the platform data
    /// directory.
    #[arg(long, global = true, env = "ILEDE_STORE")]
    pub store: Option<PathBuf>,

    /// Key profile within the store.
    #[arg(long, global = true, env = "ILEDE_PROFILE", default_value = "default")]
    pub profile: String,

    /// Hex-encoded 32-byte key used to seal the stored secret at rest.
    #[arg(long, global = true, env = "ILEDE_VAULT_KEY", hide_env_values = true)]
    pub vault_key: Option<String>,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage the local keypair.
    #[command(subcommand)]
    Keys(KeysCommand),
    /// Show balances and sequence number of an account.
    Balance(AccountArgs),
    /// Send a payment from the local account.
    Send(SendArgs),
    /// Fund an account through Friendbot (testnet only).
    Fund(AccountArgs),
    /// Look up a submitted transaction by hash.
    Status(StatusArgs),
    /// Start an anchor deposit and print the interactive URL.
    Deposit(AnchorArgs),
    /// Start an anchor withdrawal and print the interactive URL.
    Withdraw(AnchorArgs),
    /// Run the transaction relay API.
    Serve(ServeArgs),
    /// Print version information and exit.
    Version,
}

#[derive(Subcommand, Debug)]
pub enum KeysCommand {
    /// Generate a new keypair, replacing any stored one.
    Generate,
    /// Import an `S...` secret seed, replacing any stored keypair.
    Import {
        /// Secret seed. Read from the environment so it stays out of shell
        /// history.
        #[arg(long, env = "ILEDE_SECRET", hide_env_values = true)]
        secret: String,
    },
    /// Print the stored public key.
    Show {
        /// Also print the secret seed, for backup.
        #[arg(long)]
        reveal: bool,
    },
    /// Remove the stored keypair.
    Clear,
}

#[derive(Args, Debug)]
pub struct AccountArgs {
    /// `G...` account. Defaults to the local account.
    pub account: Option<String>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Destination `G...` account.
    #[arg(long)]
    pub to: String,

    /// Decimal amount, up to 7 fractional digits.
    #[arg(long)]
    pub amount: String,

    /// `native` or `CODE:ISSUER`.
    #[arg(long, default_value = "native")]
    pub asset: String,

    /// Text memo, at most 28 bytes.
    #[arg(long, conflicts_with = "memo_id")]
    pub memo_text: Option<String>,

    /// Numeric memo.
    #[arg(long)]
    pub memo_id: Option<u64>,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Hex transaction hash.
    pub hash: String,
}

#[derive(Args, Debug)]
pub struct AnchorArgs {
    /// Asset code the anchor issues, e.g. `USD`.
    #[arg(long)]
    pub asset: String,

    /// Optional decimal amount to prefill.
    #[arg(long)]
    pub amount: Option<String>,

    /// Anchor base URL, overriding the config file.
    #[arg(long, env = "ILEDE_ANCHOR_URL")]
    pub anchor_url: Option<String>,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on.
    #[arg(long, env = "ILEDE_LISTEN", default_value = "127.0.0.1:8000")]
    pub listen: String,
}
