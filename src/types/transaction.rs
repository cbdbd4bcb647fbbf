//! Bitcoin Transaction Records
//!
//! The permanent record of a managed deposit. Its primary-key insert is the
//! dedup gate for inbound notifications: the first writer wins and triggers
//! the mint leg, every later writer sees a duplicate.

use serde::{Deserialize, Serialize};

use super::unix_now;

/// A wallet transaction that paid a managed deposit address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitcoinTransaction {
    /// Bitcoin transaction id
    pub txid: String,
    /// Ledger account that owns the receiving address
    pub ledger_account_id: u64,
    /// Received amount in satoshis
    pub amount_sats: u64,
    /// Confirmation count at observation time
    pub confirmations: u32,
    pub created_at: u64,
}

impl BitcoinTransaction {
    pub fn new(txid: String, ledger_account_id: u64, amount_sats: u64, confirmations: u32) -> Self {
        Self {
            txid,
            ledger_account_id,
            amount_sats,
            confirmations,
            created_at: unix_now(),
        }
    }
}
