//! Reconciliation Module
//!
//! The engine that keeps the bitcoin wallet and the native ledger agreeing:
//! - `service` holds the observation and settlement flows
//! - `worker` runs them on a single task fed by chain notifications

pub mod service;
pub mod worker;

// Re-exports for convenience
pub use service::{InboundOutcome, ReconcileError, Reconciler, SweepReport};
pub use worker::{spawn_reconciler, ChainEvent, ReconcilerHandle};
