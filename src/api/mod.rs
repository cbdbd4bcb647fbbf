//! API Layer Module
//!
//! HTTP server plus the single-endpoint command dispatch.

pub mod command;
pub mod routes;
pub mod server;

// Re-exports for convenience
pub use command::{ApiCommand, CommandError};
pub use server::{create_router, start_server, AppState, SharedAppState};
