// Copyright (c) 2026 iLede Wallet Developers. MIT License.
// See LICENSE for details.

//! # iLede CLI and Relay
//!
//! Entry point for the `ilede` binary. Parses CLI arguments, loads the
//! wallet configuration, opens the local key store and dispatches:
//!
//! - `keys`     generate, import, show or clear the local keypair
//! - `balance`  read an account from Horizon
//! - `send`     build, sign locally and submit a payment
//! - `fund`     create a testnet account through Friendbot
//! - `status`   look a transaction up by hash
//! - `deposit` / `withdraw`  start a SEP-24 anchor flow
//! - `serve`    run the non-custodial relay API
//! - `version`  print build information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;

use ilede_wallet::anchor::AnchorClient;
use ilede_wallet::ledger::HorizonClient;
use ilede_wallet::transaction::TransactionHash;
use ilede_wallet::vault::{SealedKeyStore, SledKeyStore};
use ilede_wallet::{
    AccountId, Amount, Asset, BalanceReader, KeyVault, LedgerClient, Memo, PaymentRequest,
    PaymentService, Submitter, WalletConfig,
};

use cli::{AccountArgs, AnchorArgs, Commands, GlobalArgs, IledeCli, KeysCommand, SendArgs};
use metrics::GatewayMetrics;

const STORE_DIR_NAME: &str = "ilede";
const KEY_DB_NAME: &str = "keys.db";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = IledeCli::parse();
    let default_level = match cli.command {
        Commands::Serve(_) => "ilede=info,ilede_wallet=info,tower_http=debug",
        _ => "ilede=warn,ilede_wallet=warn",
    };
    logging::init_logging(default_level, cli.global.log_format);

    let config = load_config(&cli.global)?;

    match cli.command {
        Commands::Keys(command) => keys(&cli.global, command),
        Commands::Balance(args) => balance(&cli.global, &config, args).await,
        Commands::Send(args) => send(&cli.global, &config, args).await,
        Commands::Fund(args) => fund(&cli.global, &config, args).await,
        Commands::Status(args) => status(&config, &args.hash).await,
        Commands::Deposit(args) => anchor(&cli.global, &config, args, true).await,
        Commands::Withdraw(args) => anchor(&cli.global, &config, args, false).await,
        Commands::Serve(args) => serve(&config, &args.listen).await,
        Commands::Version => {
            print_version(&config);
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

/// Config file first, then flags and environment on top.
fn load_config(global: &GlobalArgs) -> Result<WalletConfig> {
    let mut config = match &global.config {
        Some(path) => WalletConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => WalletConfig::default(),
    };
    if let Some(network) = &global.network {
        config.network = network
            .parse()
            .with_context(|| format!("invalid --network {network:?}"))?;
    }
    if let Some(url) = &global.horizon_url {
        config.horizon_url = Some(url.clone());
    }
    Ok(config)
}

fn store_dir(global: &GlobalArgs) -> Result<PathBuf> {
    match &global.store {
        Some(dir) => Ok(dir.clone()),
        None => dirs::data_dir()
            .map(|dir| dir.join(STORE_DIR_NAME))
            .ok_or_else(|| anyhow!("no platform data directory; pass --store")),
    }
}

fn open_vault(global: &GlobalArgs) -> Result<KeyVault> {
    let dir = store_dir(global)?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create key store directory {}", dir.display()))?;
    let path = dir.join(KEY_DB_NAME);
    let store = SledKeyStore::open(&path, &global.profile)
        .with_context(|| format!("failed to open key store at {}", path.display()))?;

    match &global.vault_key {
        Some(hex_key) => {
            let bytes = zeroize::Zeroizing::new(
                hex::decode(hex_key.trim()).context("--vault-key is not valid hex")?,
            );
            let key: [u8; 32] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| anyhow!("--vault-key must be 32 bytes"))?;
            Ok(KeyVault::new(SealedKeyStore::new(store, key)))
        }
        None => Ok(KeyVault::new(store)),
    }
}

fn horizon(config: &WalletConfig) -> Result<HorizonClient> {
    HorizonClient::from_config(config)
        .with_context(|| format!("failed to create Horizon client for {}", config.horizon_url()))
}

fn local_account(vault: &KeyVault) -> Result<AccountId> {
    vault
        .load()
        .context("failed to read the key store")?
        .map(|key| key.public_key())
        .ok_or_else(|| anyhow!("no wallet on this device; run `ilede keys generate` first"))
}

fn target_account(global: &GlobalArgs, args: &AccountArgs) -> Result<AccountId> {
    match &args.account {
        Some(text) => text
            .parse()
            .with_context(|| format!("invalid account id {text:?}")),
        None => local_account(&open_vault(global)?),
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn keys(global: &GlobalArgs, command: KeysCommand) -> Result<()> {
    let vault = open_vault(global)?;
    match command {
        KeysCommand::Generate => {
            let key = vault.generate().context("failed to generate keypair")?;
            println!("{}", key.public_key());
        }
        KeysCommand::Import { secret } => {
            let secret = zeroize::Zeroizing::new(secret);
            let key = vault.import(&secret).context("failed to import secret key")?;
            println!("{}", key.public_key());
        }
        KeysCommand::Show { reveal } => {
            let Some(key) = vault.load().context("failed to read the key store")? else {
                bail!("no wallet on this device");
            };
            println!("{}", key.public_key());
            if reveal {
                println!("{}", key.secret().as_str());
            }
        }
        KeysCommand::Clear => {
            vault.clear().context("failed to clear the key store")?;
            println!("key cleared");
        }
    }
    Ok(())
}

async fn balance(global: &GlobalArgs, config: &WalletConfig, args: AccountArgs) -> Result<()> {
    let account = target_account(global, &args)?;
    let reader = BalanceReader::with_retry(Arc::new(horizon(config)?), config.reader_retry);
    let state = reader
        .fetch(&account)
        .await
        .with_context(|| format!("failed to load account {account}"))?;

    println!("account   {}", state.account_id);
    println!("sequence  {}", state.sequence_number);
    for (asset, amount) in &state.balances {
        println!("{:<12} {amount}", asset.code());
    }
    Ok(())
}

async fn send(global: &GlobalArgs, config: &WalletConfig, args: SendArgs) -> Result<()> {
    let asset: Asset = args
        .asset
        .parse()
        .with_context(|| format!("invalid asset {:?}", args.asset))?;
    let memo = match (args.memo_text, args.memo_id) {
        (Some(text), _) => Memo::Text(text),
        (None, Some(id)) => Memo::Id(id),
        (None, None) => Memo::None,
    };
    let request = PaymentRequest::native(args.to, args.amount)
        .with_asset(asset)
        .with_memo(memo);

    let vault = Arc::new(open_vault(global)?);
    let client: Arc<dyn LedgerClient> = Arc::new(horizon(config)?);
    let service = PaymentService::new(vault, client, config);
    let result = service.send(&request).await.context("payment failed")?;
    print_json(&result)
}

async fn fund(global: &GlobalArgs, config: &WalletConfig, args: AccountArgs) -> Result<()> {
    let Some(friendbot) = config.network.friendbot_url() else {
        bail!("Friendbot is only available on testnet");
    };
    let account = target_account(global, &args)?;
    horizon(config)?
        .fund(friendbot, &account)
        .await
        .with_context(|| format!("failed to fund {account}"))?;
    println!("funded {account}");
    Ok(())
}

async fn status(config: &WalletConfig, hash: &str) -> Result<()> {
    let hash: TransactionHash = hash
        .parse()
        .with_context(|| format!("invalid transaction hash {hash:?}"))?;
    let submitter = Submitter::with_retry(Arc::new(horizon(config)?), config.reader_retry);
    match submitter
        .status(&hash)
        .await
        .context("failed to look up transaction")?
    {
        Some(result) => print_json(&result),
        None => bail!("transaction {hash} not found"),
    }
}

async fn anchor(
    global: &GlobalArgs,
    config: &WalletConfig,
    args: AnchorArgs,
    deposit: bool,
) -> Result<()> {
    let account = local_account(&open_vault(global)?)?;
    let amount = args
        .amount
        .as_deref()
        .map(Amount::parse)
        .transpose()
        .context("invalid amount")?;
    let base_url = args.anchor_url.as_deref().unwrap_or(&config.anchor_url);
    let client = AnchorClient::new(base_url).context("failed to create anchor client")?;

    let flow = if deposit {
        client.deposit(&args.asset, &account, amount).await
    } else {
        client.withdraw(&args.asset, &account, amount).await
    }
    .context("anchor request failed")?;
    print_json(&flow)
}

async fn serve(config: &WalletConfig, listen: &str) -> Result<()> {
    let client: Arc<dyn LedgerClient> = Arc::new(horizon(config)?);
    let metrics = Arc::new(GatewayMetrics::new().context("failed to register metrics")?);
    let state = api::AppState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        network: config.network.clone(),
        reader: Arc::new(BalanceReader::with_retry(client.clone(), config.reader_retry)),
        submitter: Arc::new(Submitter::with_retry(client, config.submit_retry)),
        metrics,
    };

    let router = api::create_router(state);
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to bind relay listener on {listen}"))?;
    tracing::info!(
        listen,
        network = %config.network,
        horizon = config.horizon_url(),
        "relay listening"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("relay server error")?;
    tracing::info!("relay stopped");
    Ok(())
}

fn print_version(config: &WalletConfig) {
    println!("ilede   {}", env!("CARGO_PKG_VERSION"));
    println!("network {}", config.network);
    println!("horizon {}", config.horizon_url());
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received, draining connections");
}
