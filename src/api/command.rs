//! API Command Parsing
//!
//! Every request arrives as `POST /api` with a `function` parameter naming
//! the operation and the remaining parameters carried alongside it. This
//! module turns that flat parameter map into a typed [`ApiCommand`] or a
//! [`CommandError`] with a stable numeric code.

use std::collections::HashMap;

use thiserror::Error;

/// Errors produced while parsing an API request.
///
/// Each variant maps to a stable numeric code returned in the response
/// envelope so callers can branch without string matching.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    #[error("\"{0}\" not specified")]
    MissingParameter(&'static str),
    #[error("Incorrect \"{0}\": {1}")]
    MalformedParameter(&'static str, String),
    #[error("Unknown function: {0}")]
    UnknownFunction(String),
}

impl CommandError {
    /// Numeric code carried in the error envelope.
    pub fn code(&self) -> u32 {
        match self {
            CommandError::MissingParameter(_) => 3,
            CommandError::MalformedParameter(_, _) => 4,
            CommandError::UnknownFunction(_) => 5,
        }
    }
}

/// A parsed API request.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCommand {
    /// Report exchange configuration and the suspend flag.
    GetStatus,
    /// List stored tokens above a height cutoff.
    GetTokens {
        height: u32,
        include_exchanged: bool,
    },
    /// Remove a stuck token by id.
    DeleteToken { id: String },
    /// Stop issuing currency and sending bitcoin until resumed.
    SuspendSend,
    /// Lift a previous suspension.
    ResumeSend,
    /// Return (allocating if needed) the deposit address for an account.
    GetAddress {
        account_id: u64,
        public_key: Option<Vec<u8>>,
    },
    /// A new chain block was observed; triggers a settlement sweep.
    BlockReceived { id: String },
    /// A wallet transaction was observed; may record a deposit.
    TransactionReceived { id: String },
}

impl ApiCommand {
    /// Parse the flat parameter map of a request.
    pub fn parse(params: &HashMap<String, String>) -> Result<ApiCommand, CommandError> {
        let function = required(params, "function")?;

        match function {
            "getStatus" => Ok(ApiCommand::GetStatus),
            "getTokens" => Ok(ApiCommand::GetTokens {
                height: optional_u32(params, "height")?.unwrap_or(0),
                include_exchanged: optional_bool(params, "includeExchanged")?.unwrap_or(false),
            }),
            "deleteToken" => Ok(ApiCommand::DeleteToken {
                id: required(params, "id")?.to_string(),
            }),
            "suspendSend" => Ok(ApiCommand::SuspendSend),
            "resumeSend" => Ok(ApiCommand::ResumeSend),
            "getAddress" => Ok(ApiCommand::GetAddress {
                account_id: required_u64(params, "account")?,
                public_key: optional_pubkey(params, "publicKey")?,
            }),
            "blockReceived" => Ok(ApiCommand::BlockReceived {
                id: required(params, "id")?.to_string(),
            }),
            "transactionReceived" => Ok(ApiCommand::TransactionReceived {
                id: required(params, "id")?.to_string(),
            }),
            other => Err(CommandError::UnknownFunction(other.to_string())),
        }
    }
}

// =============================================================================
// Parameter Helpers
// =============================================================================

fn required<'a>(
    params: &'a HashMap<String, String>,
    name: &'static str,
) -> Result<&'a str, CommandError> {
    match params.get(name).map(|v| v.trim()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(CommandError::MissingParameter(name)),
    }
}

fn required_u64(params: &HashMap<String, String>, name: &'static str) -> Result<u64, CommandError> {
    let raw = required(params, name)?;
    raw.parse::<u64>()
        .map_err(|_| CommandError::MalformedParameter(name, raw.to_string()))
}

fn optional_u32(
    params: &HashMap<String, String>,
    name: &'static str,
) -> Result<Option<u32>, CommandError> {
    match params.get(name).map(|v| v.trim()) {
        Some(v) if !v.is_empty() => v
            .parse::<u32>()
            .map(Some)
            .map_err(|_| CommandError::MalformedParameter(name, v.to_string())),
        _ => Ok(None),
    }
}

fn optional_bool(
    params: &HashMap<String, String>,
    name: &'static str,
) -> Result<Option<bool>, CommandError> {
    match params.get(name).map(|v| v.trim()) {
        Some(v) if !v.is_empty() => match v.to_ascii_lowercase().as_str() {
            "true" => Ok(Some(true)),
            "false" => Ok(Some(false)),
            _ => Err(CommandError::MalformedParameter(name, v.to_string())),
        },
        _ => Ok(None),
    }
}

fn optional_pubkey(
    params: &HashMap<String, String>,
    name: &'static str,
) -> Result<Option<Vec<u8>>, CommandError> {
    match params.get(name).map(|v| v.trim()) {
        Some(v) if !v.is_empty() => {
            let bytes = hex::decode(v)
                .map_err(|_| CommandError::MalformedParameter(name, v.to_string()))?;
            if bytes.len() != 32 {
                return Err(CommandError::MalformedParameter(name, v.to_string()));
            }
            Ok(Some(bytes))
        }
        _ => Ok(None),
    }
}

// =============================================================================
// Tests
// =============================================================================
