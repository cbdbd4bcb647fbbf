//! tokx - Bitcoin/Currency Exchange Backend
//!
//! Bridges a bitcoin wallet and an account-based native ledger. Managed
//! deposits on the bitcoin side issue currency units on the ledger; currency
//! transfers into the redemption account pay bitcoin back out. Each side is
//! tracked as a token that settles exactly once, no matter how many times the
//! chain re-notifies us.
//!
//! ## Components
//!
//! 1. **Storage** - Token, transaction, and account records (SQLite or memory)
//! 2. **Reconciler** - Records deposits and redemptions, settles them on
//!    block triggers
//! 3. **Registry** - Per-account deposit address allocation
//! 4. **API** - Single-endpoint command dispatch over HTTP

pub mod api;
pub mod bitcoin;
pub mod common;
pub mod config;
pub mod ledger;
pub mod logging;
pub mod reconciler;
pub mod registry;
pub mod storage;
pub mod types;

// Re-exports: Configuration
pub use config::{ConfigError, ExchangeConfig, SuspendSwitch};

// Re-exports: Core types
pub use types::{BitcoinAccount, BitcoinTransaction, RedemptionNotice, Token, TokenSide};

// Re-exports: Storage
pub use storage::{ExchangeStore, MemoryExchangeStore, SqliteExchangeStore, StorageError};

// Re-exports: Gateways
pub use bitcoin::{BitcoinRpc, BitcoindClient, RpcError};
pub use ledger::{LedgerClient, LedgerError, NativeLedger};

// Re-exports: Reconciliation
pub use reconciler::{spawn_reconciler, Reconciler, ReconcilerHandle, SweepReport};
pub use registry::AccountRegistry;

// Re-exports: Common error type
pub use common::{ExchangeError, Result};
