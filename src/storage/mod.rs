//! Storage Layer Module
//!
//! Provides persistence for tokens, deposit transactions and accounts.
//!
//! This module contains:
//! - Storage trait definitions for abstraction
//! - SQLite implementation for production
//! - In-memory implementation for testing

pub mod memory;
pub mod sqlite;
pub mod traits;

// Re-exports for convenience
pub use memory::MemoryExchangeStore;
pub use sqlite::SqliteExchangeStore;
pub use traits::{ExchangeStore, StorageError, StorageResult};
