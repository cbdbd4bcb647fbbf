//! Common Error Types for the Token Exchange
//!
//! Root error type for the binary's startup path and anything that needs
//! to carry a failure across module boundaries.

use thiserror::Error;

/// Root error type for the exchange
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Logging errors
    #[error("logging error: {0}")]
    Logging(#[from] crate::logging::LoggingError),

    /// Storage errors
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    /// Bitcoind RPC errors
    #[error("bitcoin error: {0}")]
    Bitcoin(#[from] crate::bitcoin::RpcError),

    /// Native ledger errors
    #[error("ledger error: {0}")]
    Ledger(#[from] crate::ledger::LedgerError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExchangeError {
    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExchangeError::Storage(_)
                | ExchangeError::Bitcoin(_)
                | ExchangeError::Ledger(_)
                | ExchangeError::Io(_)
        )
    }
}

/// Result type alias using ExchangeError
pub type Result<T> = std::result::Result<T, ExchangeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::storage::StorageError;

    #[test]
    fn test_error_display() {
        let err = ExchangeError::from(StorageError::Connection("pool exhausted".to_string()));
        assert!(err.to_string().contains("pool exhausted"));
    }

    #[test]
    fn test_retryable_errors() {
        let storage = ExchangeError::from(StorageError::Database("locked".to_string()));
        assert!(storage.is_retryable());

        let config = ExchangeError::from(ConfigError::MissingEnvVar("X".to_string()));
        assert!(!config.is_retryable());
    }
}
