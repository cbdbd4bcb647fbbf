//! Shared Domain Types
//!
//! Records passed between the storage layer, the reconciler and the API.

pub mod account;
pub mod token;
pub mod transaction;
pub mod units;

// Re-exports for convenience
pub use account::BitcoinAccount;
pub use token::{RedemptionNotice, Token, TokenSide};
pub use transaction::BitcoinTransaction;
pub use units::{btc_to_sats, format_units, sats_to_btc_string, SATS_PER_BTC};

/// Seconds since the unix epoch
pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}
