//! Bitcoin Account Records
//!
//! Maps a native-ledger account to the bitcoin deposit address allocated
//! for it. An account gets exactly one address for its lifetime.

use serde::{Deserialize, Serialize};

use super::unix_now;

/// Association between a ledger account and its bitcoin deposit address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitcoinAccount {
    /// Account id on the native ledger
    pub ledger_account_id: u64,
    /// Deposit address allocated from the bitcoind wallet
    pub bitcoin_address: String,
    /// Optional 32-byte public key supplied at registration
    pub public_key: Option<Vec<u8>>,
    /// Unix timestamp of allocation
    pub created_at: u64,
}

impl BitcoinAccount {
    pub fn new(ledger_account_id: u64, bitcoin_address: String, public_key: Option<Vec<u8>>) -> Self {
        Self {
            ledger_account_id,
            bitcoin_address,
            public_key,
            created_at: unix_now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_creation() {
        let account = BitcoinAccount::new(1001, "tb1qdeposit".to_string(), None);
        assert_eq!(account.ledger_account_id, 1001);
        assert_eq!(account.bitcoin_address, "tb1qdeposit");
        assert!(account.public_key.is_none());
        assert!(account.created_at > 0);
    }

    #[test]
    fn test_account_with_public_key() {
        let key = vec![7u8; 32];
        let account = BitcoinAccount::new(42, "tb1qother".to_string(), Some(key.clone()));
        assert_eq!(account.public_key, Some(key));
    }
}
