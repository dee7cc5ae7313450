//! Typed error definitions for the MGX grid system.
//!
//! Provides [`GridError`] for domain-specific errors that are more informative
//! than plain `anyhow::Error` strings. All variants implement `std::error::Error`
//! via `thiserror`, so they integrate seamlessly with `anyhow::Result`.

use thiserror::Error;

/// Domain-specific errors for the MGX grid system.
#[derive(Debug, Error)]
pub enum GridError {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// WebSocket connection, handshake, or communication error.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// Feed message or REST response parsing error.
    #[error("parse error: {0}")]
    Parse(String),

    /// Trading operation error (order placement, cancellation, etc.).
    #[error("trading error: {0}")]
    Trading(String),
}
