//! Bitcoin Gateway Module
//!
//! Wallet-node access for the exchange:
//! - Deposit address allocation
//! - Transaction lookups for inbound notifications and confirmation checks
//! - Payouts for redeemed tokens

pub mod rpc;

// Re-exports for convenience
pub use rpc::{BitcoinRpc, BitcoindClient, RpcError, WalletTx};

#[cfg(test)]
pub use rpc::MockBitcoinRpc;
