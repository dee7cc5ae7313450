//! Order struct, client order ids, and price arithmetic.
//!
//! Prices and sizes travel as `f64` quantized to configured precisions, the
//! same way the exchange API formats them. Wherever a price is used as a map
//! or set key it is first converted to integer **ticks**
//! ([`price_ticks`]) so float identity never decides membership.

use serde::{Deserialize, Serialize};

use super::enums::{OrderStatus, Side};
use crate::time_util;

// ---------------------------------------------------------------------------
// Price arithmetic
// ---------------------------------------------------------------------------

/// Round a price (or size) to `precision` decimal places.
#[inline]
pub fn quantize(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

/// Convert a price to integer ticks at the given precision.
///
/// `price_ticks(29950.0, 2) == 2_995_000`. Two prices that format identically
/// at `precision` decimals map to the same tick value.
#[inline]
pub fn price_ticks(price: f64, precision: u32) -> i64 {
    let factor = 10f64.powi(precision as i32);
    (price * factor).round() as i64
}

/// Order size for a fixed notional amount at the given price, quantized to
/// `size_precision` decimals.
#[inline]
pub fn size_for_notional(notional: f64, price: f64, size_precision: u32) -> f64 {
    quantize(notional / price, size_precision)
}

// ---------------------------------------------------------------------------
// Client order ids
// ---------------------------------------------------------------------------

/// Generate a client order id: `{side}_{pricedigits}_{timestamp_ms}`.
///
/// The id encodes side and price for debuggability and carries a millisecond
/// timestamp for uniqueness; it is the correlation key between local tracking
/// and exchange acknowledgements.
pub fn generate_order_id(side: Side, price: f64, price_precision: u32) -> String {
    let price_part =
        format!("{:.*}", price_precision as usize, price).replace('.', "");
    format!("{}_{}_{}", side.label(), price_part, time_util::now_ms())
}

/// Extract the side from a client order id, if the prefix is recognized.
pub fn side_from_order_id(id: &str) -> Option<Side> {
    if id.starts_with("buy_") {
        Some(Side::Buy)
    } else if id.starts_with("sell_") {
        Some(Side::Sell)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

/// A tracked order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Client order id (locally generated, unique for the process lifetime).
    pub id: String,
    /// Buy or sell.
    pub side: Side,
    /// Limit price, quantized to the configured price precision.
    pub price: f64,
    /// Order size, quantized to the configured size precision.
    pub size: f64,
    /// Lifecycle status (forward-only transitions).
    pub status: OrderStatus,
    /// Submission timestamp (ms since epoch).
    pub created_at: u64,
}

impl Order {
    /// Create a new order in `Pending` status, stamped now.
    pub fn new(id: String, side: Side, price: f64, size: f64) -> Self {
        Self {
            id,
            side,
            price,
            size,
            status: OrderStatus::Pending,
            created_at: time_util::now_ms(),
        }
    }
}
