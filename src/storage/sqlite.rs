//! SQLite Persistent Storage for Exchange State
//!
//! Durable storage for tokens, deposit transactions and account mappings
//! that survives service restarts. Uses connection pooling via r2d2.
//!
//! Token and transaction inserts go through `INSERT OR IGNORE` so the
//! primary key decides who wins a duplicate race, not the caller.

use async_trait::async_trait;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::Path;

use super::traits::{ExchangeStore, StorageError, StorageResult};
use crate::types::account::BitcoinAccount;
use crate::types::token::{Token, TokenSide};
use crate::types::transaction::BitcoinTransaction;

/// SQLite-backed exchange store with connection pooling
pub struct SqliteExchangeStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteExchangeStore {
    /// Create a new store with the given database path
    ///
    /// Creates the database file and runs migrations if needed.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StorageError> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;

        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self, StorageError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;

        Ok(store)
    }

    /// Get a connection from the pool
    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StorageError> {
        self.pool
            .get()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<(), StorageError> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tokens (
                id TEXT PRIMARY KEY,
                side TEXT NOT NULL,
                sender_account_id INTEGER NOT NULL,
                height INTEGER NOT NULL,
                exchanged INTEGER NOT NULL DEFAULT 0,
                token_amount INTEGER NOT NULL,
                bitcoin_amount INTEGER NOT NULL,
                bitcoin_address TEXT NOT NULL,
                bitcoin_txid TEXT,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tokens_height ON tokens(height);
            CREATE INDEX IF NOT EXISTS idx_tokens_exchanged ON tokens(exchanged);

            CREATE TABLE IF NOT EXISTS transactions (
                txid TEXT PRIMARY KEY,
                ledger_account_id INTEGER NOT NULL,
                amount_sats INTEGER NOT NULL,
                confirmations INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS accounts (
                ledger_account_id INTEGER PRIMARY KEY,
                bitcoin_address TEXT NOT NULL UNIQUE,
                public_key BLOB,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_accounts_address ON accounts(bitcoin_address);
            "#,
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(())
    }

    /// Convert a database row to Token
    fn row_to_token(row: &rusqlite::Row) -> rusqlite::Result<Token> {
        let side_str: String = row.get("side")?;
        let side = side_str.parse().unwrap_or(TokenSide::Mint);

        Ok(Token {
            id: row.get("id")?,
            side,
            sender_account_id: row.get::<_, i64>("sender_account_id")? as u64,
            height: row.get::<_, i64>("height")? as u32,
            exchanged: row.get::<_, i64>("exchanged")? != 0,
            token_amount: row.get::<_, i64>("token_amount")? as u64,
            bitcoin_amount: row.get::<_, i64>("bitcoin_amount")? as u64,
            bitcoin_address: row.get("bitcoin_address")?,
            bitcoin_txid: row.get("bitcoin_txid")?,
            created_at: row.get::<_, i64>("created_at")? as u64,
        })
    }

    /// Convert a database row to BitcoinTransaction
    fn row_to_transaction(row: &rusqlite::Row) -> rusqlite::Result<BitcoinTransaction> {
        Ok(BitcoinTransaction {
            txid: row.get("txid")?,
            ledger_account_id: row.get::<_, i64>("ledger_account_id")? as u64,
            amount_sats: row.get::<_, i64>("amount_sats")? as u64,
            confirmations: row.get::<_, i64>("confirmations")? as u32,
            created_at: row.get::<_, i64>("created_at")? as u64,
        })
    }

    /// Convert a database row to BitcoinAccount
    fn row_to_account(row: &rusqlite::Row) -> rusqlite::Result<BitcoinAccount> {
        Ok(BitcoinAccount {
            ledger_account_id: row.get::<_, i64>("ledger_account_id")? as u64,
            bitcoin_address: row.get("bitcoin_address")?,
            public_key: row.get("public_key")?,
            created_at: row.get::<_, i64>("created_at")? as u64,
        })
    }

    // Synchronous helper methods for the trait implementations

    fn get_tokens_sync(&self, min_height: u32, include_exchanged: bool) -> Result<Vec<Token>, StorageError> {
        let conn = self.conn()?;

        let sql = if include_exchanged {
            "SELECT * FROM tokens WHERE height > ?1 ORDER BY height ASC, created_at ASC"
        } else {
            "SELECT * FROM tokens WHERE height > ?1 AND exchanged = 0 ORDER BY height ASC, created_at ASC"
        };

        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let records = stmt
            .query_map(params![min_height as i64], |row| Self::row_to_token(row))
            .map_err(|e| StorageError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(records)
    }

    fn get_token_sync(&self, id: &str) -> Result<Option<Token>, StorageError> {
        let conn = self.conn()?;

        let record = conn
            .query_row(
                "SELECT * FROM tokens WHERE id = ?1",
                params![id],
                |row| Self::row_to_token(row),
            )
            .optional()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(record)
    }

    fn store_token_sync(&self, token: &Token) -> Result<bool, StorageError> {
        let conn = self.conn()?;

        let rows_affected = conn
            .execute(
                r#"
            INSERT OR IGNORE INTO tokens (
                id, side, sender_account_id, height, exchanged,
                token_amount, bitcoin_amount, bitcoin_address, bitcoin_txid,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
                params![
                    token.id,
                    token.side.to_string(),
                    token.sender_account_id as i64,
                    token.height as i64,
                    token.exchanged as i64,
                    token.token_amount as i64,
                    token.bitcoin_amount as i64,
                    token.bitcoin_address,
                    token.bitcoin_txid,
                    token.created_at as i64,
                ],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(rows_affected > 0)
    }

    fn mark_token_exchanged_sync(&self, id: &str, bitcoin_txid: Option<&str>) -> Result<bool, StorageError> {
        let conn = self.conn()?;

        // exchanged = 0 in the predicate keeps the flip one-shot
        let rows_affected = conn
            .execute(
                r#"
            UPDATE tokens SET
                exchanged = 1,
                bitcoin_txid = COALESCE(?2, bitcoin_txid)
            WHERE id = ?1 AND exchanged = 0
            "#,
                params![id, bitcoin_txid],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(rows_affected > 0)
    }

    fn delete_token_sync(&self, id: &str) -> Result<bool, StorageError> {
        let conn = self.conn()?;

        let rows_affected = conn
            .execute("DELETE FROM tokens WHERE id = ?1", params![id])
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(rows_affected > 0)
    }

    fn get_transaction_sync(&self, txid: &str) -> Result<Option<BitcoinTransaction>, StorageError> {
        let conn = self.conn()?;

        let record = conn
            .query_row(
                "SELECT * FROM transactions WHERE txid = ?1",
                params![txid],
                |row| Self::row_to_transaction(row),
            )
            .optional()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(record)
    }

    fn store_transaction_sync(&self, tx: &BitcoinTransaction) -> Result<bool, StorageError> {
        let conn = self.conn()?;

        let rows_affected = conn
            .execute(
                r#"
            INSERT OR IGNORE INTO transactions (
                txid, ledger_account_id, amount_sats, confirmations, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
                params![
                    tx.txid,
                    tx.ledger_account_id as i64,
                    tx.amount_sats as i64,
                    tx.confirmations as i64,
                    tx.created_at as i64,
                ],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(rows_affected > 0)
    }

    fn get_unminted_transactions_sync(&self) -> Result<Vec<BitcoinTransaction>, StorageError> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(
                r#"
            SELECT t.* FROM transactions t
            LEFT JOIN tokens k ON k.id = t.txid
            WHERE k.id IS NULL
            ORDER BY t.created_at ASC
            "#,
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let records = stmt
            .query_map([], |row| Self::row_to_transaction(row))
            .map_err(|e| StorageError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(records)
    }

    fn get_account_sync(&self, ledger_account_id: u64) -> Result<Option<BitcoinAccount>, StorageError> {
        let conn = self.conn()?;

        let record = conn
            .query_row(
                "SELECT * FROM accounts WHERE ledger_account_id = ?1",
                params![ledger_account_id as i64],
                |row| Self::row_to_account(row),
            )
            .optional()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(record)
    }

    fn get_account_by_address_sync(&self, address: &str) -> Result<Option<BitcoinAccount>, StorageError> {
        let conn = self.conn()?;

        let record = conn
            .query_row(
                "SELECT * FROM accounts WHERE bitcoin_address = ?1",
                params![address],
                |row| Self::row_to_account(row),
            )
            .optional()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(record)
    }

    fn store_account_sync(&self, account: &BitcoinAccount) -> Result<(), StorageError> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO accounts (
                ledger_account_id, bitcoin_address, public_key, created_at
            ) VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                account.ledger_account_id as i64,
                account.bitcoin_address,
                account.public_key,
                account.created_at as i64,
            ],
        )
        .map_err(|e| {
            if let rusqlite::Error::SqliteFailure(ref err, _) = e {
                if err.extended_code == 1555 || err.extended_code == 2067 {
                    return StorageError::Duplicate(account.bitcoin_address.clone());
                }
            }
            StorageError::Database(e.to_string())
        })?;

        Ok(())
    }
}

#[async_trait]
impl ExchangeStore for SqliteExchangeStore {
    async fn get_tokens(&self, min_height: u32, include_exchanged: bool) -> StorageResult<Vec<Token>> {
        self.get_tokens_sync(min_height, include_exchanged)
    }

    async fn get_token(&self, id: &str) -> StorageResult<Option<Token>> {
        self.get_token_sync(id)
    }

    async fn store_token(&self, token: &Token) -> StorageResult<bool> {
        self.store_token_sync(token)
    }

    async fn mark_token_exchanged(&self, id: &str, bitcoin_txid: Option<&str>) -> StorageResult<bool> {
        self.mark_token_exchanged_sync(id, bitcoin_txid)
    }

    async fn delete_token(&self, id: &str) -> StorageResult<bool> {
        self.delete_token_sync(id)
    }

    async fn get_transaction(&self, txid: &str) -> StorageResult<Option<BitcoinTransaction>> {
        self.get_transaction_sync(txid)
    }

    async fn store_transaction(&self, tx: &BitcoinTransaction) -> StorageResult<bool> {
        self.store_transaction_sync(tx)
    }

    async fn get_unminted_transactions(&self) -> StorageResult<Vec<BitcoinTransaction>> {
        self.get_unminted_transactions_sync()
    }

    async fn get_account(&self, ledger_account_id: u64) -> StorageResult<Option<BitcoinAccount>> {
        self.get_account_sync(ledger_account_id)
    }

    async fn get_account_by_address(&self, address: &str) -> StorageResult<Option<BitcoinAccount>> {
        self.get_account_by_address_sync(address)
    }

    async fn store_account(&self, account: &BitcoinAccount) -> StorageResult<()> {
        self.store_account_sync(account)
    }
}
