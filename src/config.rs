//! Environment-based Configuration for the Token Exchange
//!
//! All deployment-specific values come from environment variables with
//! devnet-friendly defaults, so a local run needs almost no setup.
//!
//! # Required Environment Variables
//!
//! - `TOKX_REDEMPTION_ACCOUNT` - Ledger account id that holds the currency
//!   backing and receives redemptions. No default: minting out of the wrong
//!   account must fail loudly at startup.
//!
//! # Optional Settings
//!
//! ## Currency
//! - `TOKX_CURRENCY_ID` - Currency id on the native ledger (default: 1)
//! - `TOKX_CURRENCY_CODE` - Display code (default: "TOKX")
//! - `TOKX_CURRENCY_DECIMALS` - Decimals of the smallest unit, 0-8 (default: 4)
//! - `TOKX_EXCHANGE_RATE` - Tokens per BTC (default: 1000)
//!
//! ## Settlement
//! - `TOKX_CONFIRMATIONS` - Depth required before a leg settles (default: 3)
//! - `TOKX_TX_FEE` - Payout fee rate in BTC/kvB applied via settxfee (default: 0.0001)
//!
//! ## Endpoints
//! - `TOKX_BITCOIND_URL` - bitcoind wallet RPC (default: http://127.0.0.1:18332)
//! - `TOKX_BITCOIND_USER` / `TOKX_BITCOIND_PASSWORD` - RPC credentials
//! - `TOKX_LEDGER_URL` - Native ledger API (default: http://127.0.0.1:7876)
//!
//! ## Service
//! - `TOKX_DB_PATH` - SQLite database file (default: data/tokx.db)
//! - `TOKX_API_PORT` - HTTP API port (default: 3001)
//! - `TOKX_LOG_LEVEL` - Logging level (debug, info, warn, error)
//! - `TOKX_LOG_JSON` - Set to "1" for JSON log output

use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    /// Currency id on the native ledger
    pub currency_id: u64,

    /// Currency display code
    pub currency_code: String,

    /// Decimals of the smallest currency unit (0-8)
    pub currency_decimals: u8,

    /// Tokens per BTC
    pub exchange_rate: Decimal,

    /// Depth required before a leg settles
    pub confirmations_required: u32,

    /// Payout fee rate in BTC/kvB
    pub tx_fee: Decimal,

    /// Ledger account holding the currency backing
    pub redemption_account_id: u64,

    /// bitcoind wallet RPC endpoint
    pub bitcoind_url: String,

    /// bitcoind RPC user
    pub bitcoind_user: String,

    /// bitcoind RPC password
    pub bitcoind_password: String,

    /// Native ledger API endpoint
    pub ledger_url: String,

    /// SQLite database file
    pub db_path: String,

    /// HTTP API port
    pub api_port: u16,

    /// Log level
    pub log_level: String,

    /// Emit JSON logs
    pub json_logs: bool,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            currency_id: 1,
            currency_code: "TOKX".to_string(),
            currency_decimals: 4,
            exchange_rate: Decimal::from(1000),
            confirmations_required: 3,
            tx_fee: Decimal::new(1, 4), // 0.0001 BTC/kvB
            redemption_account_id: 9000,
            bitcoind_url: "http://127.0.0.1:18332".to_string(),
            bitcoind_user: "tokx".to_string(),
            bitcoind_password: String::new(),
            ledger_url: "http://127.0.0.1:7876".to_string(),
            db_path: "data/tokx.db".to_string(),
            api_port: 3001,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl ExchangeConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let redemption_account_id: u64 = env::var("TOKX_REDEMPTION_ACCOUNT")
            .map_err(|_| ConfigError::MissingEnvVar("TOKX_REDEMPTION_ACCOUNT".to_string()))?
            .trim()
            .parse()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "TOKX_REDEMPTION_ACCOUNT".to_string(),
                    "must be a numeric account id".to_string(),
                )
            })?;

        Ok(Self {
            currency_id: parse_env("TOKX_CURRENCY_ID", defaults.currency_id)?,
            currency_code: env::var("TOKX_CURRENCY_CODE").unwrap_or(defaults.currency_code),
            currency_decimals: parse_env("TOKX_CURRENCY_DECIMALS", defaults.currency_decimals)?,
            exchange_rate: parse_env("TOKX_EXCHANGE_RATE", defaults.exchange_rate)?,
            confirmations_required: parse_env("TOKX_CONFIRMATIONS", defaults.confirmations_required)?,
            tx_fee: parse_env("TOKX_TX_FEE", defaults.tx_fee)?,
            redemption_account_id,
            bitcoind_url: env::var("TOKX_BITCOIND_URL").unwrap_or(defaults.bitcoind_url),
            bitcoind_user: env::var("TOKX_BITCOIND_USER").unwrap_or(defaults.bitcoind_user),
            bitcoind_password: env::var("TOKX_BITCOIND_PASSWORD").unwrap_or(defaults.bitcoind_password),
            ledger_url: env::var("TOKX_LEDGER_URL").unwrap_or(defaults.ledger_url),
            db_path: env::var("TOKX_DB_PATH").unwrap_or(defaults.db_path),
            api_port: parse_env("TOKX_API_PORT", defaults.api_port)?,
            log_level: env::var("TOKX_LOG_LEVEL").unwrap_or(defaults.log_level),
            json_logs: env::var("TOKX_LOG_JSON").map(|v| v == "1").unwrap_or(false),
        })
    }

    /// Validate configuration before anything touches money
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.redemption_account_id == 0 {
            return Err(ConfigError::InvalidValue(
                "TOKX_REDEMPTION_ACCOUNT".to_string(),
                "account id must be non-zero".to_string(),
            ));
        }

        if self.currency_decimals > 8 {
            return Err(ConfigError::InvalidValue(
                "TOKX_CURRENCY_DECIMALS".to_string(),
                format!("must be 0-8, got {}", self.currency_decimals),
            ));
        }

        if self.exchange_rate <= Decimal::ZERO {
            return Err(ConfigError::InvalidValue(
                "TOKX_EXCHANGE_RATE".to_string(),
                format!("must be positive, got {}", self.exchange_rate),
            ));
        }

        if self.confirmations_required == 0 {
            return Err(ConfigError::InvalidValue(
                "TOKX_CONFIRMATIONS".to_string(),
                "settling at zero depth is not supported".to_string(),
            ));
        }

        if self.tx_fee < Decimal::ZERO {
            return Err(ConfigError::InvalidValue(
                "TOKX_TX_FEE".to_string(),
                format!("must not be negative, got {}", self.tx_fee),
            ));
        }

        Ok(())
    }

    /// Print configuration summary (hiding sensitive values)
    pub fn print_summary(&self) {
        println!("=== Token Exchange Configuration ===");
        println!("Currency: {} (id {}, {} decimals)", self.currency_code, self.currency_id, self.currency_decimals);
        println!("Exchange Rate: {} tokens/BTC", self.exchange_rate);
        println!("Confirmations: {}", self.confirmations_required);
        println!("Payout Fee: {} BTC/kvB", self.tx_fee);
        println!("Redemption Account: {}", self.redemption_account_id);
        println!("bitcoind: {} (user {})", self.bitcoind_url, self.bitcoind_user);
        println!("Ledger: {}", self.ledger_url);
        println!("Database: {}", self.db_path);
        println!("API Port: {}", self.api_port);
        println!("Log Level: {}", self.log_level);
        println!("====================================");
    }
}

/// Parse an env var into any FromStr type, falling back to `default` when unset
fn parse_env<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), raw)),
        Err(_) => Ok(default),
    }
}

// ============================================================================
// Suspend Switch
// ============================================================================

/// Operator switch gating outbound settlement
///
/// Suspending stops the sweep from minting or paying; observation and
/// recording continue so nothing is lost while sends are held. Both
/// transitions are idempotent and return the resulting state.
#[derive(Clone, Debug, Default)]
pub struct SuspendSwitch {
    suspended: Arc<AtomicBool>,
}

impl SuspendSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold outbound sends. Returns the resulting state (always true).
    pub fn suspend(&self) -> bool {
        self.suspended.store(true, Ordering::SeqCst);
        true
    }

    /// Release outbound sends. Returns the resulting state (always false).
    pub fn resume(&self) -> bool {
        self.suspended.store(false, Ordering::SeqCst);
        false
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ExchangeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.currency_code, "TOKX");
        assert_eq!(config.tx_fee.to_string(), "0.0001");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ExchangeConfig::default();
        config.redemption_account_id = 0;
        assert!(config.validate().is_err());

        let mut config = ExchangeConfig::default();
        config.currency_decimals = 9;
        assert!(config.validate().is_err());

        let mut config = ExchangeConfig::default();
        config.exchange_rate = Decimal::ZERO;
        assert!(config.validate().is_err());

        let mut config = ExchangeConfig::default();
        config.confirmations_required = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_suspend_switch_transitions() {
        let switch = SuspendSwitch::new();
        assert!(!switch.is_suspended());

        assert!(switch.suspend());
        assert!(switch.is_suspended());
        // Idempotent
        assert!(switch.suspend());

        assert!(!switch.resume());
        assert!(!switch.is_suspended());
        assert!(!switch.resume());
    }

    #[test]
    fn test_suspend_switch_shares_state_across_clones() {
        let switch = SuspendSwitch::new();
        let clone = switch.clone();

        switch.suspend();
        assert!(clone.is_suspended());

        clone.resume();
        assert!(!switch.is_suspended());
    }
}
