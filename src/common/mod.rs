//! Common Infrastructure Module
//!
//! Shared pieces that belong to no single feature module.
//!
//! This module contains:
//! - Root error type aggregating the per-module errors

pub mod error;

// Re-exports for convenience
pub use error::{ExchangeError, Result};
