//! Bitcoind Wallet RPC Client
//!
//! JSON-RPC client for the bitcoind wallet that receives deposits and sends
//! payouts. The `BitcoinRpc` trait is the seam the reconciler and registry
//! talk through; `BitcoindClient` is the production implementation.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::types::units::{btc_to_sats, sats_to_btc_string};

/// Error code bitcoind returns for a txid its wallet does not track
const RPC_INVALID_ADDRESS_OR_KEY: i64 = -5;

/// Bitcoind RPC errors
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("node error {code}: {message}")]
    Node { code: i64, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Wallet view of a transaction that paid one of our addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletTx {
    pub txid: String,
    /// Receiving address of the first `receive` entry
    pub address: String,
    pub amount_sats: u64,
    pub confirmations: u32,
}

/// Wallet-node operations the exchange relies on
///
/// `lookup_transaction` returning `Ok(None)` is terminal: the wallet does
/// not track the txid (or the tx pays no wallet address), and no retry will
/// change that. Transport and node failures stay in `Err` so callers can
/// retry them.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BitcoinRpc: Send + Sync {
    /// Allocate a fresh receive address labelled for the account
    async fn get_new_address(&self, label: &str) -> Result<String, RpcError>;

    /// Look up a wallet transaction by txid
    async fn lookup_transaction(&self, txid: &str) -> Result<Option<WalletTx>, RpcError>;

    /// Pay `amount_sats` to `address`. The comment lands in the wallet's
    /// transaction list and carries the settlement idempotency key.
    async fn send_to_address(&self, address: &str, amount_sats: u64, comment: &str) -> Result<String, RpcError>;
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct GetTransactionResult {
    txid: String,
    #[serde(default)]
    confirmations: i64,
    #[serde(default)]
    details: Vec<TxDetail>,
}

#[derive(Debug, Deserialize)]
struct TxDetail {
    #[serde(default)]
    address: Option<String>,
    category: String,
    amount: f64,
}

/// JSON-RPC client for a bitcoind wallet node
pub struct BitcoindClient {
    client: Client,
    url: String,
    user: String,
    password: String,
}

impl BitcoindClient {
    pub fn new(url: &str, user: &str, password: &str) -> Self {
        Self {
            client: Client::new(),
            url: url.trim_end_matches('/').to_string(),
            user: user.to_string(),
            password: password.to_string(),
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let body = json!({
            "jsonrpc": "1.0",
            "id": "tokx",
            "method": method,
            "params": params,
        });

        debug!(method, "bitcoind rpc call");
        let response = self
            .client
            .post(&self.url)
            .basic_auth(&self.user, Some(&self.password))
            .json(&body)
            .send()
            .await?;

        let envelope: RpcEnvelope = response.json().await?;
        if let Some(err) = envelope.error {
            return Err(RpcError::Node {
                code: err.code,
                message: err.message,
            });
        }

        envelope
            .result
            .ok_or_else(|| RpcError::Malformed("missing result".to_string()))
    }

    /// Apply the configured payout fee rate (`settxfee`, BTC per kvB).
    /// Called once at startup.
    pub async fn set_tx_fee(&self, fee_btc: Decimal) -> Result<(), RpcError> {
        // bitcoind accepts amounts as strings, which keeps the rate exact
        self.call("settxfee", json!([fee_btc.to_string()])).await?;
        Ok(())
    }

    fn parse_wallet_tx(result: Value) -> Result<Option<WalletTx>, RpcError> {
        let parsed: GetTransactionResult =
            serde_json::from_value(result).map_err(|e| RpcError::Malformed(e.to_string()))?;

        // Only receive entries can belong to a managed deposit address
        let detail = match parsed
            .details
            .into_iter()
            .find(|d| d.category == "receive" && d.address.is_some())
        {
            Some(detail) => detail,
            None => return Ok(None),
        };

        Ok(Some(WalletTx {
            txid: parsed.txid,
            address: detail.address.unwrap_or_default(),
            amount_sats: btc_to_sats(detail.amount),
            confirmations: parsed.confirmations.max(0) as u32,
        }))
    }
}

#[async_trait]
impl BitcoinRpc for BitcoindClient {
    async fn get_new_address(&self, label: &str) -> Result<String, RpcError> {
        let result = self.call("getnewaddress", json!([label])).await?;
        result
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| RpcError::Malformed("getnewaddress returned non-string".to_string()))
    }

    async fn lookup_transaction(&self, txid: &str) -> Result<Option<WalletTx>, RpcError> {
        let result = match self.call("gettransaction", json!([txid])).await {
            Ok(result) => result,
            Err(RpcError::Node { code, .. }) if code == RPC_INVALID_ADDRESS_OR_KEY => {
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        Self::parse_wallet_tx(result)
    }

    async fn send_to_address(&self, address: &str, amount_sats: u64, comment: &str) -> Result<String, RpcError> {
        let amount = sats_to_btc_string(amount_sats);
        let result = self
            .call("sendtoaddress", json!([address, amount, comment]))
            .await?;

        result
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| RpcError::Malformed("sendtoaddress returned non-string".to_string()))
    }
}
