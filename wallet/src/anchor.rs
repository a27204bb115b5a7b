//! SEP-24 anchor client for fiat deposits and withdrawals.
//!
//! The wallet only starts the interactive flow, polls its status and lists
//! past flows. KYC, bank details and the actual fiat leg all happen in the
//! anchor's web UI behind the returned URL.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::WalletConfig;
use crate::crypto::keys::AccountId;
use crate::transaction::Amount;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum AnchorError {
    #[error("anchor unreachable: {0}")]
    Transport(String),

    #[error("anchor returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("unexpected anchor response: {0}")]
    Decode(String),

    #[error("anchor has no transaction {0}")]
    UnknownTransaction(String),
}

fn transport(err: reqwest::Error) -> AnchorError {
    if err.is_decode() {
        AnchorError::Decode(err.to_string())
    } else {
        AnchorError::Transport(err.to_string())
    }
}

/// Direction of an interactive flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowKind {
    Deposit,
    Withdraw,
}

impl FlowKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdraw => "withdraw",
        }
    }
}

#[derive(Debug, Serialize)]
struct InteractiveRequest<'a> {
    asset_code: &'a str,
    account: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    amount: Option<String>,
}

/// Where to send the user, and the id to poll afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractiveFlow {
    pub url: String,
    pub id: String,
}

/// An anchor-side transaction as reported by `GET /sep24/transaction`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorTransaction {
    pub id: String,
    #[serde(default)]
    pub kind: Option<String>,
    pub status: String,
    #[serde(default)]
    pub amount_in: Option<String>,
    #[serde(default)]
    pub amount_out: Option<String>,
    #[serde(default)]
    pub more_info_url: Option<String>,
    /// Ledger transaction hash of the on-chain leg, once there is one.
    #[serde(default)]
    pub stellar_transaction_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransactionEnvelope {
    transaction: AnchorTransaction,
}

#[derive(Debug, Deserialize)]
struct TransactionList {
    #[serde(default)]
    transactions: Vec<AnchorTransaction>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSupport {
    #[serde(default)]
    pub enabled: bool,
}

/// Which assets the anchor will move in each direction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorInfo {
    #[serde(default)]
    pub deposit: BTreeMap<String, AssetSupport>,
    #[serde(default)]
    pub withdraw: BTreeMap<String, AssetSupport>,
}

impl AnchorInfo {
    pub fn supports(&self, kind: FlowKind, asset_code: &str) -> bool {
        let table = match kind {
            FlowKind::Deposit => &self.deposit,
            FlowKind::Withdraw => &self.withdraw,
        };
        table.get(asset_code).is_some_and(|asset| asset.enabled)
    }
}

#[derive(Debug, Clone)]
pub struct AnchorClient {
    http: Client,
    base_url: String,
}

impl AnchorClient {
    pub fn new(base_url: &str) -> Result<Self, AnchorError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(transport)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &WalletConfig) -> Result<Self, AnchorError> {
        Self::new(&config.anchor_url)
    }

    pub async fn info(&self) -> Result<AnchorInfo, AnchorError> {
        let response = self
            .http
            .get(format!("{}/info", self.base_url))
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnchorError::Status { status, body });
        }
        response.json().await.map_err(transport)
    }

    pub async fn deposit(
        &self,
        asset_code: &str,
        account: &AccountId,
        amount: Option<Amount>,
    ) -> Result<InteractiveFlow, AnchorError> {
        self.interactive(FlowKind::Deposit, asset_code, account, amount)
            .await
    }

    pub async fn withdraw(
        &self,
        asset_code: &str,
        account: &AccountId,
        amount: Option<Amount>,
    ) -> Result<InteractiveFlow, AnchorError> {
        self.interactive(FlowKind::Withdraw, asset_code, account, amount)
            .await
    }

    async fn interactive(
        &self,
        kind: FlowKind,
        asset_code: &str,
        account: &AccountId,
        amount: Option<Amount>,
    ) -> Result<InteractiveFlow, AnchorError> {
        let url = format!(
            "{}/sep24/transactions/{}/interactive",
            self.base_url,
            kind.as_str()
        );
        let body = InteractiveRequest {
            asset_code,
            account: account.to_string(),
            amount: amount.map(|a| a.to_string()),
        };
        let response = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnchorError::Status { status, body });
        }
        let flow: InteractiveFlow = response.json().await.map_err(transport)?;
        info!(
            kind = kind.as_str(),
            asset = asset_code,
            account = %account,
            id = %flow.id,
            "interactive anchor flow started"
        );
        Ok(flow)
    }

    pub async fn transaction(&self, id: &str) -> Result<AnchorTransaction, AnchorError> {
        let response = self
            .http
            .get(format!("{}/sep24/transaction", self.base_url))
            .query(&[("id", id)])
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(AnchorError::UnknownTransaction(id.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnchorError::Status { status, body });
        }
        let envelope: TransactionEnvelope = response.json().await.map_err(transport)?;
        Ok(envelope.transaction)
    }

    /// Past and pending flows of `account` for one asset, newest first as
    /// the anchor orders them. `kind` narrows to deposits or withdrawals.
    pub async fn transactions(
        &self,
        asset_code: &str,
        account: &AccountId,
        kind: Option<FlowKind>,
        limit: Option<u32>,
    ) -> Result<Vec<AnchorTransaction>, AnchorError> {
        let mut query = vec![
            ("asset_code", asset_code.to_string()),
            ("account", account.to_string()),
        ];
        if let Some(kind) = kind {
            query.push(("kind", kind.as_str().to_string()));
        }
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }

        let response = self
            .http
            .get(format!("{}/sep24/transactions", self.base_url))
            .query(&query)
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnchorError::Status { status, body });
        }
        let list: TransactionList = response.json().await.map_err(transport)?;
        Ok(list.transactions)
    }
}
