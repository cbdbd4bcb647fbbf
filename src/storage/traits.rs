//! Storage Trait Definitions
//!
//! Abstract storage interface for exchange state. Implementations can use
//! SQLite (production) or in-memory (testing).

use async_trait::async_trait;
use thiserror::Error;

use crate::types::account::BitcoinAccount;
use crate::types::token::Token;
use crate::types::transaction::BitcoinTransaction;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Exchange state store
///
/// The insert operations returning `bool` are first-writer-wins: `true`
/// means this call created the row, `false` that an identical key already
/// existed. The reconciler builds its exactly-once guarantees on that.
///
/// Implementations:
/// - `SqliteExchangeStore` - Production storage with SQLite
/// - `MemoryExchangeStore` - In-memory storage for testing
#[async_trait]
pub trait ExchangeStore: Send + Sync {
    /// Tokens above `min_height`, ordered by height ascending. Settled
    /// tokens are excluded unless `include_exchanged` is set.
    async fn get_tokens(&self, min_height: u32, include_exchanged: bool) -> StorageResult<Vec<Token>>;

    /// Get a token by id
    async fn get_token(&self, id: &str) -> StorageResult<Option<Token>>;

    /// Insert a token if its id is not already present
    async fn store_token(&self, token: &Token) -> StorageResult<bool>;

    /// Flip a token to exchanged. `true` only for the call that did the
    /// flip; a token that is already settled (or missing) yields `false`.
    /// A payout txid, when given, replaces the stored one.
    async fn mark_token_exchanged(&self, id: &str, bitcoin_txid: Option<&str>) -> StorageResult<bool>;

    /// Remove a token. `false` when no such id exists.
    async fn delete_token(&self, id: &str) -> StorageResult<bool>;

    /// Get a recorded deposit transaction by txid
    async fn get_transaction(&self, txid: &str) -> StorageResult<Option<BitcoinTransaction>>;

    /// Insert a deposit transaction if its txid is not already present.
    /// This is the dedup gate for inbound notifications.
    async fn store_transaction(&self, tx: &BitcoinTransaction) -> StorageResult<bool>;

    /// Deposit transactions that have no token row yet. Non-empty only
    /// after a crash between the transaction write and the token write.
    async fn get_unminted_transactions(&self) -> StorageResult<Vec<BitcoinTransaction>>;

    /// Get the account record for a ledger account id
    async fn get_account(&self, ledger_account_id: u64) -> StorageResult<Option<BitcoinAccount>>;

    /// Get the account record owning a deposit address
    async fn get_account_by_address(&self, address: &str) -> StorageResult<Option<BitcoinAccount>>;

    /// Insert an account record. Errors with `Duplicate` when the account
    /// id or the address is already taken.
    async fn store_account(&self, account: &BitcoinAccount) -> StorageResult<()>;
}
