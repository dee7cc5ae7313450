//! Event types flowing between the feed, the engine core, and telemetry.
//!
//! Two channels exist:
//!
//! - [`FeedEvent`] — produced by the price/event feed, consumed in arrival
//!   order by the order-state tracker task.
//! - [`GridEvent`] — domain events emitted by the tracker, consumed by the
//!   engine for reservations/forced triggers and by logging.

use super::enums::Side;

// ---------------------------------------------------------------------------
// Feed events (exchange → engine)
// ---------------------------------------------------------------------------

/// A typed event delivered by the price/event feed.
///
/// No ordering or monotonicity is guaranteed for prices; lifecycle events are
/// keyed by the locally generated client order id.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// Latest traded/quoted price for the configured symbol.
    PriceUpdate(f64),

    /// The exchange acknowledged an order (it is resting on the book).
    OrderAcknowledged { id: String },

    /// An order was fully executed.
    OrderFilled { id: String, price: f64, size: f64 },

    /// An order was cancelled.
    OrderCancelled { id: String, side: Side },
}

/// Sender half of the feed event channel.
pub type FeedEventSender = tokio::sync::mpsc::UnboundedSender<FeedEvent>;

/// Receiver half of the feed event channel (single consumer).
pub type FeedEventReceiver = tokio::sync::mpsc::UnboundedReceiver<FeedEvent>;

// ---------------------------------------------------------------------------
// Domain events (engine → strategy glue / telemetry)
// ---------------------------------------------------------------------------

/// A domain event emitted by the order-state tracker.
#[derive(Debug, Clone, PartialEq)]
pub enum GridEvent {
    /// A buy order filled and its paired sell was submitted one step above.
    BuyFilled { price: f64, sell_price: f64, size: f64 },

    /// A sell order filled, vacating a grid level.
    SellFilled { price: f64 },

    /// An order was cancelled (by us or the exchange).
    OrderCancelled { price: f64, side: Side },

    /// An unacknowledged order outlived the confirmation timeout and was
    /// purged by the cleanup sweep.
    OrderExpired { price: f64, side: Side, reason: &'static str },
}

/// Sender half of the domain event channel.
pub type GridEventSender = tokio::sync::mpsc::UnboundedSender<GridEvent>;

/// Receiver half of the domain event channel.
pub type GridEventReceiver = tokio::sync::mpsc::UnboundedReceiver<GridEvent>;
