//! Exchange Token Records
//!
//! A token is one pending leg of the exchange: either a bitcoin deposit
//! waiting to issue currency units (mint) or a currency redemption waiting
//! to pay out bitcoin (redeem). A token settles exactly once; `exchanged`
//! flips true at settlement and never flips back.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::unix_now;

/// Direction of an exchange leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenSide {
    /// Bitcoin came in; currency units go out
    Mint,
    /// Currency units came in; bitcoin goes out
    Redeem,
}

impl fmt::Display for TokenSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenSide::Mint => write!(f, "mint"),
            TokenSide::Redeem => write!(f, "redeem"),
        }
    }
}

impl FromStr for TokenSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mint" => Ok(TokenSide::Mint),
            "redeem" => Ok(TokenSide::Redeem),
            _ => Err(format!("unknown token side: {}", s)),
        }
    }
}

/// One pending or settled exchange leg
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Identity and idempotency key. Mint legs use the bitcoin txid,
    /// redeem legs the ledger transaction id.
    pub id: String,
    pub side: TokenSide,
    /// Ledger account the leg settles toward (mint) or came from (redeem)
    pub sender_account_id: u64,
    /// Native-chain height when the leg was observed
    pub height: u32,
    /// True once the settlement action has been taken
    pub exchanged: bool,
    /// Currency amount in smallest units
    pub token_amount: u64,
    /// Bitcoin amount in satoshis
    pub bitcoin_amount: u64,
    /// Deposit address (mint) or payout address (redeem)
    pub bitcoin_address: String,
    /// Deposit txid (mint) or payout txid once sent (redeem)
    pub bitcoin_txid: Option<String>,
    pub created_at: u64,
}

impl Token {
    /// Leg created from a managed bitcoin deposit
    pub fn mint_leg(
        txid: &str,
        sender_account_id: u64,
        height: u32,
        token_amount: u64,
        bitcoin_amount: u64,
        bitcoin_address: String,
    ) -> Self {
        Self {
            id: txid.to_string(),
            side: TokenSide::Mint,
            sender_account_id,
            height,
            exchanged: false,
            token_amount,
            bitcoin_amount,
            bitcoin_address,
            bitcoin_txid: Some(txid.to_string()),
            created_at: unix_now(),
        }
    }

    /// Leg created from a currency transfer into the redemption account
    pub fn redeem_leg(
        ledger_tx_id: &str,
        sender_account_id: u64,
        height: u32,
        token_amount: u64,
        bitcoin_amount: u64,
        bitcoin_address: String,
    ) -> Self {
        Self {
            id: ledger_tx_id.to_string(),
            side: TokenSide::Redeem,
            sender_account_id,
            height,
            exchanged: false,
            token_amount,
            bitcoin_amount,
            bitcoin_address,
            bitcoin_txid: None,
            created_at: unix_now(),
        }
    }

    /// Record settlement. A payout txid, when given, replaces the stored one.
    pub fn mark_exchanged(&mut self, bitcoin_txid: Option<String>) {
        self.exchanged = true;
        if bitcoin_txid.is_some() {
            self.bitcoin_txid = bitcoin_txid;
        }
    }
}

// ============================================================================
// Chain Observation Types
// ============================================================================

/// Currency transfer into the redemption account, as seen on the native chain.
/// The payout address rides in the transfer's attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionNotice {
    /// Ledger transaction id of the transfer
    pub ledger_tx_id: String,
    /// Account that sent the units
    pub sender_account_id: u64,
    /// Chain height the transfer confirmed at
    pub height: u32,
    /// Transferred amount in smallest units
    pub token_amount: u64,
    /// Bitcoin address the sender wants paying
    pub bitcoin_address: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_display_and_parse() {
        assert_eq!(TokenSide::Mint.to_string(), "mint");
        assert_eq!(TokenSide::Redeem.to_string(), "redeem");
        assert_eq!("mint".parse::<TokenSide>().unwrap(), TokenSide::Mint);
        assert_eq!("REDEEM".parse::<TokenSide>().unwrap(), TokenSide::Redeem);
        assert!("burn".parse::<TokenSide>().is_err());
    }

    #[test]
    fn test_mint_leg_carries_deposit_txid() {
        let token = Token::mint_leg("abc123", 1001, 5000, 15_000_000, 150_000_000, "tb1qd".into());
        assert_eq!(token.id, "abc123");
        assert_eq!(token.side, TokenSide::Mint);
        assert_eq!(token.bitcoin_txid.as_deref(), Some("abc123"));
        assert!(!token.exchanged);
    }

    #[test]
    fn test_redeem_leg_has_no_txid_until_payout() {
        let mut token = Token::redeem_leg("rtx1", 1001, 5000, 15_000_000, 150_000_000, "tb1qu".into());
        assert_eq!(token.side, TokenSide::Redeem);
        assert!(token.bitcoin_txid.is_none());

        token.mark_exchanged(Some("payout1".to_string()));
        assert!(token.exchanged);
        assert_eq!(token.bitcoin_txid.as_deref(), Some("payout1"));
    }

    #[test]
    fn test_mark_exchanged_keeps_existing_txid() {
        let mut token = Token::mint_leg("abc123", 1001, 5000, 1, 1, "tb1qd".into());
        token.mark_exchanged(None);
        assert!(token.exchanged);
        assert_eq!(token.bitcoin_txid.as_deref(), Some("abc123"));
    }
}
