//! Horizon REST client.
//!
//! | Call                | Endpoint                         |
//! |---------------------|----------------------------------|
//! | `load_account`      | `GET  /accounts/{id}`            |
//! | `submit`            | `POST /transactions` (form `tx`) |
//! | `transaction`       | `GET  /transactions/{hash}`      |
//! | `base_fee`          | `GET  /fee_stats`                |
//!
//! Status mapping: 404 is [`LedgerError::NotFound`] (or `None` for a
//! hash lookup), 5xx and connection failures are
//! [`LedgerError::Transport`], a 400 on submission is a ledger rejection
//! carrying its result codes. Anything else is
//! [`LedgerError::Protocol`].

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use super::{AccountState, LedgerClient, LedgerError, LedgerOutcome, ResultCode};
use crate::config::WalletConfig;
use crate::crypto::keys::AccountId;
use crate::transaction::xdr::XdrError;
use crate::transaction::{Amount, Asset, SignedEnvelope, TransactionHash};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct AccountRecord {
    sequence: String,
    balances: Vec<BalanceRecord>,
}

#[derive(Debug, Deserialize)]
struct BalanceRecord {
    balance: String,
    asset_type: String,
    asset_code: Option<String>,
    asset_issuer: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubmitRecord {
    hash: String,
    ledger: u32,
}

#[derive(Debug, Deserialize)]
struct TransactionRecord {
    ledger: u32,
    successful: bool,
    /// Base64 `TransactionResult`; carries the failing operation code.
    #[serde(default)]
    result_xdr: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeeStatsRecord {
    last_ledger_base_fee: String,
}

#[derive(Debug, Default, Deserialize)]
struct ProblemRecord {
    #[serde(default)]
    extras: Option<ProblemExtras>,
}

#[derive(Debug, Default, Deserialize)]
struct ProblemExtras {
    result_codes: Option<ResultCodes>,
}

#[derive(Debug, Default, Deserialize)]
struct ResultCodes {
    transaction: String,
    #[serde(default)]
    operations: Vec<String>,
}

fn transport(err: reqwest::Error) -> LedgerError {
    if err.is_decode() {
        LedgerError::Protocol(err.to_string())
    } else {
        LedgerError::Transport(err.to_string())
    }
}

fn unexpected(status: StatusCode) -> LedgerError {
    if status.is_server_error() {
        LedgerError::Transport(format!("horizon returned {status}"))
    } else {
        LedgerError::Protocol(format!("horizon returned {status}"))
    }
}

/// A [`LedgerClient`] over Horizon.
#[derive(Debug, Clone)]
pub struct HorizonClient {
    http: Client,
    base_url: String,
}

impl HorizonClient {
    pub fn new(base_url: &str) -> Result<Self, LedgerError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(transport)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &WalletConfig) -> Result<Self, LedgerError> {
        Self::new(config.horizon_url())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> Result<Response, LedgerError> {
        self.http.get(self.url(path)).send().await.map_err(transport)
    }

    /// Asks Friendbot to create and fund `account`. Testnet only; the URL
    /// comes from [`crate::Network::friendbot_url`].
    pub async fn fund(&self, friendbot_url: &str, account: &AccountId) -> Result<(), LedgerError> {
        let response = self
            .http
            .get(friendbot_url)
            .query(&[("addr", account.to_string())])
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        if status.is_success() {
            info!(account = %account, "account funded by friendbot");
            return Ok(());
        }
        if status.is_server_error() {
            return Err(unexpected(status));
        }
        let detail = response.text().await.unwrap_or_default();
        Err(LedgerError::Protocol(format!(
            "friendbot refused ({status}): {}",
            detail.chars().take(200).collect::<String>()
        )))
    }
}

/// Result code of a transaction that landed as failed. Falls back to the
/// generic `tx_failed` when `result_xdr` is missing or unreadable.
fn failed_result_code(hash: &TransactionHash, result_xdr: Option<&str>) -> ResultCode {
    let decoded = result_xdr.map(|encoded| {
        STANDARD
            .decode(encoded)
            .map_err(|e| XdrError::Base64(e.to_string()))
            .and_then(|bytes| ResultCode::from_result_xdr(&bytes))
    });
    match decoded {
        Some(Ok(code)) => code,
        Some(Err(err)) => {
            debug!(hash = %hash, error = %err, "unreadable result_xdr");
            ResultCode::Other("tx_failed".into())
        }
        None => ResultCode::Other("tx_failed".into()),
    }
}

fn parse_balance(record: BalanceRecord) -> Result<Option<(Asset, Amount)>, LedgerError> {
    let asset = match record.asset_type.as_str() {
        "native" => Asset::Native,
        "credit_alphanum4" | "credit_alphanum12" => {
            let (Some(code), Some(issuer)) = (record.asset_code, record.asset_issuer) else {
                return Err(LedgerError::Protocol("credit balance without asset".into()));
            };
            let issuer: AccountId = issuer
                .parse()
                .map_err(|_| LedgerError::Protocol(format!("bad issuer {issuer}")))?;
            Asset::credit(&code, issuer).map_err(|e| LedgerError::Protocol(e.to_string()))?
        }
        // Liquidity pool shares are not payable assets.
        _ => return Ok(None),
    };
    let amount = Amount::parse(&record.balance)
        .map_err(|e| LedgerError::Protocol(format!("bad balance {:?}: {e}", record.balance)))?;
    Ok(Some((asset, amount)))
}

#[async_trait]
impl LedgerClient for HorizonClient {
    async fn load_account(&self, account: &AccountId) -> Result<AccountState, LedgerError> {
        let response = self.get(&format!("accounts/{account}")).await?;
        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Err(LedgerError::NotFound),
            status => return Err(unexpected(status)),
        }
        let record: AccountRecord = response.json().await.map_err(transport)?;

        let sequence_number = record
            .sequence
            .parse()
            .map_err(|_| LedgerError::Protocol(format!("bad sequence {:?}", record.sequence)))?;
        let mut state = AccountState::new(*account, sequence_number);
        for balance in record.balances {
            if let Some((asset, amount)) = parse_balance(balance)? {
                state.balances.insert(asset, amount);
            }
        }
        debug!(account = %account, sequence = sequence_number, "loaded account");
        Ok(state)
    }

    async fn submit(&self, envelope: &SignedEnvelope) -> Result<LedgerOutcome, LedgerError> {
        let hash = envelope.hash();
        let response = self
            .http
            .post(self.url("transactions"))
            .form(&[("tx", envelope.to_xdr_base64())])
            .send()
            .await
            .map_err(transport)?;

        match response.status() {
            StatusCode::OK => {
                let record: SubmitRecord = response.json().await.map_err(transport)?;
                if record.hash != hash.to_string() {
                    return Err(LedgerError::Protocol(format!(
                        "horizon applied {} while we sent {hash}",
                        record.hash
                    )));
                }
                Ok(LedgerOutcome::Applied {
                    hash,
                    ledger: record.ledger,
                })
            }
            StatusCode::BAD_REQUEST => {
                let problem: ProblemRecord = response.json().await.map_err(transport)?;
                let codes = problem
                    .extras
                    .and_then(|extras| extras.result_codes)
                    .ok_or_else(|| LedgerError::Protocol("rejection without result codes".into()))?;
                Ok(LedgerOutcome::Rejected {
                    hash,
                    code: ResultCode::from_codes(&codes.transaction, &codes.operations),
                })
            }
            status => Err(unexpected(status)),
        }
    }

    async fn transaction(
        &self,
        hash: &TransactionHash,
    ) -> Result<Option<LedgerOutcome>, LedgerError> {
        let response = self.get(&format!("transactions/{hash}")).await?;
        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Ok(None),
            status => return Err(unexpected(status)),
        }
        let record: TransactionRecord = response.json().await.map_err(transport)?;
        Ok(Some(if record.successful {
            LedgerOutcome::Applied {
                hash: *hash,
                ledger: record.ledger,
            }
        } else {
            LedgerOutcome::Rejected {
                hash: *hash,
                code: failed_result_code(hash, record.result_xdr.as_deref()),
            }
        }))
    }

    async fn base_fee(&self) -> Result<u32, LedgerError> {
        let response = self.get("fee_stats").await?;
        if response.status() != StatusCode::OK {
            return Err(unexpected(response.status()));
        }
        let record: FeeStatsRecord = response.json().await.map_err(transport)?;
        record
            .last_ledger_base_fee
            .parse()
            .map_err(|_| LedgerError::Protocol("bad last_ledger_base_fee".into()))
    }
}
