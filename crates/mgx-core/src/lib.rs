//! # mgx-core
//!
//! Core crate for the MGX grid trading system, providing:
//!
//! - **Types** (`types`) — side/status enums, order struct, feed and domain
//!   events, price-tick arithmetic
//! - **Configuration** (`config`) — JSON config deserialization
//! - **Error types** (`error`) — domain-specific `GridError` via thiserror
//! - **WebSocket** (`ws`) — WS client with auto-reconnect and keep-alive
//! - **Time utilities** (`time_util`) — millisecond/microsecond timestamps
//! - **Logging** (`logging`) — tracing-based structured logging

pub mod config;
pub mod error;
pub mod logging;
pub mod time_util;
pub mod types;
pub mod ws;

// Re-export types at crate root for convenience.
pub use types::*;
