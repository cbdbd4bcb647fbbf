//! Native Ledger Client
//!
//! HTTP client for the account-based ledger that carries the exchange
//! currency. The reconciler needs exactly two things from it: the current
//! chain height (for redemption depth checks) and currency transfers out of
//! the redemption account (for minting).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

/// Native ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ledger rejected request: {0}")]
    Rejected(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Ledger operations the exchange relies on
///
/// `transfer_currency` must be given a `reference` unique per settlement;
/// it ends up in the transfer's attachment so a ledger-side audit can match
/// issued units back to the deposit that bought them.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NativeLedger: Send + Sync {
    /// Current chain height
    async fn current_height(&self) -> Result<u32, LedgerError>;

    /// Move `units` of the exchange currency from the redemption account to
    /// `recipient`. Returns the ledger transaction id.
    async fn transfer_currency(&self, recipient: u64, units: u64, reference: &str) -> Result<String, LedgerError>;
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct HeightResponse {
    height: u32,
}

#[derive(Debug, Deserialize)]
struct TransferResponse {
    transaction_id: Option<String>,
    error: Option<String>,
}

/// HTTP client for the native ledger node
pub struct LedgerClient {
    client: Client,
    base_url: String,
    currency_id: u64,
    redemption_account_id: u64,
}

impl LedgerClient {
    pub fn new(base_url: &str, currency_id: u64, redemption_account_id: u64) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            currency_id,
            redemption_account_id,
        }
    }
}

#[async_trait]
impl NativeLedger for LedgerClient {
    async fn current_height(&self) -> Result<u32, LedgerError> {
        let url = format!("{}/blockchain/height", self.base_url);
        let response: HeightResponse = self.client.get(&url).send().await?.json().await?;
        Ok(response.height)
    }

    async fn transfer_currency(&self, recipient: u64, units: u64, reference: &str) -> Result<String, LedgerError> {
        let url = format!("{}/currency/transfer", self.base_url);
        let body = json!({
            "currency_id": self.currency_id,
            "sender_id": self.redemption_account_id,
            "recipient_id": recipient,
            "units": units,
            "reference": reference,
        });

        debug!(recipient, units, reference, "ledger transfer");
        let response: TransferResponse = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(LedgerError::Rejected(error));
        }

        response
            .transaction_id
            .ok_or_else(|| LedgerError::Malformed("missing transaction_id".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_stripped() {
        let client = LedgerClient::new("http://127.0.0.1:7876/", 1, 9000);
        assert_eq!(client.base_url, "http://127.0.0.1:7876");
        assert_eq!(client.currency_id, 1);
        assert_eq!(client.redemption_account_id, 9000);
    }

    #[test]
    fn test_transfer_response_parsing() {
        let ok: TransferResponse =
            serde_json::from_value(json!({"transaction_id": "ltx77"})).unwrap();
        assert_eq!(ok.transaction_id.as_deref(), Some("ltx77"));
        assert!(ok.error.is_none());

        let err: TransferResponse =
            serde_json::from_value(json!({"error": "insufficient currency balance"})).unwrap();
        assert!(err.transaction_id.is_none());
        assert_eq!(err.error.as_deref(), Some("insufficient currency balance"));
    }
}
