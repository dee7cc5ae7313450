//! Enumerations used throughout the MGX grid system.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Order side
// ---------------------------------------------------------------------------

/// Buy or sell side of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Lowercase label used in client order ids and log lines.
    pub fn label(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }

    /// Uppercase label used by the exchange REST API.
    pub fn api_label(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Order status
// ---------------------------------------------------------------------------

/// Order lifecycle status.
///
/// Transitions only move forward:
/// `Pending → {Acknowledged, Expired} → {Filled, Cancelled}`.
/// [`OrderStatus::can_transition_to`] encodes the allowed edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Optimistically tracked; the exchange has not acknowledged it yet.
    Pending,
    /// Acknowledged by the exchange and resting on the book.
    Acknowledged,
    /// Fully executed.
    Filled,
    /// Cancelled by us or the exchange.
    Cancelled,
    /// Purged by the cleanup sweep after the confirmation timeout.
    Expired,
}

impl OrderStatus {
    /// Whether moving from `self` to `next` is a legal forward transition.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Acknowledged)
                | (Pending, Expired)
                | (Pending, Filled)
                | (Pending, Cancelled)
                | (Acknowledged, Filled)
                | (Acknowledged, Cancelled)
        )
    }

    /// Whether the order is still resting (counted toward the slot budget).
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Acknowledged)
    }
}
