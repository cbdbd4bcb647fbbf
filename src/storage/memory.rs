//! In-Memory Storage Implementation
//!
//! Provides in-memory storage for testing and development.
//! Data is lost when the service restarts.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::traits::{ExchangeStore, StorageError, StorageResult};
use crate::types::account::BitcoinAccount;
use crate::types::token::Token;
use crate::types::transaction::BitcoinTransaction;

/// In-memory exchange store
///
/// Thread-safe storage for tokens, transactions and account mappings.
/// Uses Arc<RwLock<>> for concurrent access; each insert holds the write
/// lock across its contains/insert pair, so duplicate races resolve to a
/// single winner just like the SQLite primary keys do.
#[derive(Clone)]
pub struct MemoryExchangeStore {
    /// Tokens indexed by id
    tokens: Arc<RwLock<HashMap<String, Token>>>,
    /// Deposit transactions indexed by txid
    transactions: Arc<RwLock<HashMap<String, BitcoinTransaction>>>,
    /// Accounts indexed by ledger account id
    accounts: Arc<RwLock<HashMap<u64, BitcoinAccount>>>,
    /// Index: bitcoin address -> ledger account id
    by_address: Arc<RwLock<HashMap<String, u64>>>,
}

impl MemoryExchangeStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self {
            tokens: Arc::new(RwLock::new(HashMap::new())),
            transactions: Arc::new(RwLock::new(HashMap::new())),
            accounts: Arc::new(RwLock::new(HashMap::new())),
            by_address: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for MemoryExchangeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExchangeStore for MemoryExchangeStore {
    async fn get_tokens(&self, min_height: u32, include_exchanged: bool) -> StorageResult<Vec<Token>> {
        let tokens = self.tokens.read().await;

        let mut records: Vec<Token> = tokens
            .values()
            .filter(|t| t.height > min_height && (include_exchanged || !t.exchanged))
            .cloned()
            .collect();
        records.sort_by_key(|t| (t.height, t.created_at, t.id.clone()));

        Ok(records)
    }

    async fn get_token(&self, id: &str) -> StorageResult<Option<Token>> {
        let tokens = self.tokens.read().await;
        Ok(tokens.get(id).cloned())
    }

    async fn store_token(&self, token: &Token) -> StorageResult<bool> {
        let mut tokens = self.tokens.write().await;

        if tokens.contains_key(&token.id) {
            return Ok(false);
        }

        tokens.insert(token.id.clone(), token.clone());
        Ok(true)
    }

    async fn mark_token_exchanged(&self, id: &str, bitcoin_txid: Option<&str>) -> StorageResult<bool> {
        let mut tokens = self.tokens.write().await;

        match tokens.get_mut(id) {
            Some(token) if !token.exchanged => {
                token.mark_exchanged(bitcoin_txid.map(|t| t.to_string()));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_token(&self, id: &str) -> StorageResult<bool> {
        let mut tokens = self.tokens.write().await;
        Ok(tokens.remove(id).is_some())
    }

    async fn get_transaction(&self, txid: &str) -> StorageResult<Option<BitcoinTransaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions.get(txid).cloned())
    }

    async fn store_transaction(&self, tx: &BitcoinTransaction) -> StorageResult<bool> {
        let mut transactions = self.transactions.write().await;

        if transactions.contains_key(&tx.txid) {
            return Ok(false);
        }

        transactions.insert(tx.txid.clone(), tx.clone());
        Ok(true)
    }

    async fn get_unminted_transactions(&self) -> StorageResult<Vec<BitcoinTransaction>> {
        let transactions = self.transactions.read().await;
        let tokens = self.tokens.read().await;

        let mut records: Vec<BitcoinTransaction> = transactions
            .values()
            .filter(|tx| !tokens.contains_key(&tx.txid))
            .cloned()
            .collect();
        records.sort_by_key(|tx| (tx.created_at, tx.txid.clone()));

        Ok(records)
    }

    async fn get_account(&self, ledger_account_id: u64) -> StorageResult<Option<BitcoinAccount>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(&ledger_account_id).cloned())
    }

    async fn get_account_by_address(&self, address: &str) -> StorageResult<Option<BitcoinAccount>> {
        let by_address = self.by_address.read().await;
        let id = match by_address.get(address) {
            Some(id) => *id,
            None => return Ok(None),
        };
        drop(by_address);

        let accounts = self.accounts.read().await;
        Ok(accounts.get(&id).cloned())
    }

    async fn store_account(&self, account: &BitcoinAccount) -> StorageResult<()> {
        let mut accounts = self.accounts.write().await;
        let mut by_address = self.by_address.write().await;

        // Check for duplicate account id
        if accounts.contains_key(&account.ledger_account_id) {
            return Err(StorageError::Duplicate(format!(
                "account: {}",
                account.ledger_account_id
            )));
        }

        // Check for duplicate bitcoin address
        if by_address.contains_key(&account.bitcoin_address) {
            return Err(StorageError::Duplicate(format!(
                "address: {}",
                account.bitcoin_address
            )));
        }

        // Insert into both indexes
        by_address.insert(account.bitcoin_address.clone(), account.ledger_account_id);
        accounts.insert(account.ledger_account_id, account.clone());

        Ok(())
    }
}
