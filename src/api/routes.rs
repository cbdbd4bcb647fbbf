//! API Route Handlers
//!
//! A single `POST /api` endpoint dispatches on the `function` form parameter,
//! plus a `GET /health` probe. Every `/api` response is returned with HTTP 200
//! and the outcome encoded in the JSON body; parse failures and operation
//! failures use the [`ErrorResponse`] envelope with its numeric code.

use std::collections::HashMap;

use axum::{
    extract::{Form, State},
    response::{IntoResponse, Response},
    Json,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::api::command::ApiCommand;
use crate::api::server::SharedAppState;
use crate::types::{format_units, Token};

// =============================================================================
// Response Types
// =============================================================================

/// Error envelope shared by every failed request.
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    #[serde(rename = "errorCode")]
    pub error_code: u32,
    #[serde(rename = "errorDescription")]
    pub error_description: String,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub currency_code: String,
    pub currency_id: u64,
    pub currency_decimals: u8,
    pub exchange_rate: String,
    pub redemption_account: u64,
    pub confirmations: u32,
    pub bitcoind_url: String,
    pub tx_fee: String,
    pub suspended: bool,
}

/// Token as rendered to API clients. Amounts are decimal strings so
/// callers never have to know the unit scale.
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenView {
    pub id: String,
    pub side: String,
    pub sender: String,
    pub height: u32,
    pub exchanged: bool,
    pub token_amount: String,
    pub bitcoin_amount: String,
    pub bitcoin_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitcoin_txid: Option<String>,
    pub timestamp: u64,
}

impl TokenView {
    pub fn from_token(token: &Token, decimals: u8) -> Self {
        TokenView {
            id: token.id.clone(),
            side: token.side.to_string(),
            sender: token.sender_account_id.to_string(),
            height: token.height,
            exchanged: token.exchanged,
            token_amount: format_units(token.token_amount, decimals),
            bitcoin_amount: format_units(token.bitcoin_amount, 8),
            bitcoin_address: token.bitcoin_address.clone(),
            bitcoin_txid: token.bitcoin_txid.clone(),
            timestamp: token.created_at,
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct TokenListResponse {
    pub tokens: Vec<TokenView>,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressResponse {
    pub account: String,
    pub bitcoin_address: String,
}

#[derive(Debug, serde::Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

#[derive(Debug, serde::Serialize)]
pub struct SuspendResponse {
    pub suspended: bool,
}

#[derive(Debug, serde::Serialize)]
pub struct ProcessedResponse {
    pub processed: bool,
}

// =============================================================================
// Handlers
// =============================================================================

/// POST /api
///
/// Single dispatch endpoint. The body is form-encoded with a `function`
/// parameter selecting the operation.
pub async fn handle_api(
    State(state): State<SharedAppState>,
    Form(params): Form<HashMap<String, String>>,
) -> Response {
    let request_id = Uuid::new_v4();

    let command = match ApiCommand::parse(&params) {
        Ok(command) => command,
        Err(err) => {
            debug!(%request_id, error = %err, "rejected api request");
            return Json(ErrorResponse {
                error_code: err.code(),
                error_description: err.to_string(),
            })
            .into_response();
        }
    };

    debug!(%request_id, ?command, "api request");
    execute(&state, command).await
}

/// GET /health
pub async fn handle_health() -> Response {
    Json(serde_json::json!({
        "status": "ok",
        "service": "tokx",
        "version": env!("CARGO_PKG_VERSION"),
        "time": chrono::Utc::now().to_rfc3339(),
    }))
    .into_response()
}

async fn execute(state: &SharedAppState, command: ApiCommand) -> Response {
    match command {
        ApiCommand::GetStatus => {
            let config = &state.config;
            Json(StatusResponse {
                currency_code: config.currency_code.clone(),
                currency_id: config.currency_id,
                currency_decimals: config.currency_decimals,
                exchange_rate: config.exchange_rate.to_string(),
                redemption_account: config.redemption_account_id,
                confirmations: config.confirmations_required,
                bitcoind_url: config.bitcoind_url.clone(),
                tx_fee: config.tx_fee.to_string(),
                suspended: state.suspend.is_suspended(),
            })
            .into_response()
        }
        ApiCommand::GetTokens {
            height,
            include_exchanged,
        } => match state.store.get_tokens(height, include_exchanged).await {
            Ok(tokens) => {
                let decimals = state.config.currency_decimals;
                Json(TokenListResponse {
                    tokens: tokens
                        .iter()
                        .map(|t| TokenView::from_token(t, decimals))
                        .collect(),
                })
                .into_response()
            }
            Err(err) => operation_failed(err),
        },
        ApiCommand::DeleteToken { id } => match state.store.delete_token(&id).await {
            Ok(deleted) => Json(DeleteResponse { deleted }).into_response(),
            Err(err) => operation_failed(err),
        },
        ApiCommand::SuspendSend => Json(SuspendResponse {
            suspended: state.suspend.suspend(),
        })
        .into_response(),
        ApiCommand::ResumeSend => Json(SuspendResponse {
            suspended: state.suspend.resume(),
        })
        .into_response(),
        ApiCommand::GetAddress {
            account_id,
            public_key,
        } => match state.registry.get_or_create(account_id, public_key).await {
            Ok(account) => Json(AddressResponse {
                account: account.ledger_account_id.to_string(),
                bitcoin_address: account.bitcoin_address,
            })
            .into_response(),
            Err(err) => operation_failed(err),
        },
        ApiCommand::BlockReceived { id } => {
            // A dropped trigger is still acknowledged: the next block
            // reaches the same tokens.
            let accepted = state.reconciler.notify_block(id);
            if !accepted {
                debug!("block trigger dropped, sweep already in flight");
            }
            Json(ProcessedResponse { processed: true }).into_response()
        }
        ApiCommand::TransactionReceived { id } => {
            if state.reconciler.notify_transaction(id).await {
                Json(ProcessedResponse { processed: true }).into_response()
            } else {
                Json(ErrorResponse {
                    error_code: 4,
                    error_description: "event queue unavailable".to_string(),
                })
                .into_response()
            }
        }
    }
}

fn operation_failed<E: std::fmt::Display>(err: E) -> Response {
    warn!(error = %err, "api operation failed");
    Json(ErrorResponse {
        error_code: 4,
        error_description: err.to_string(),
    })
    .into_response()
}
