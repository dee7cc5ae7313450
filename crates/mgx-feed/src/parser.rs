//! MEXC WebSocket push message parsing.
//!
//! Both streams push JSON envelopes with a channel name in `c` and a payload
//! in `d`:
//!
//! - public book ticker batch — the `askPrice` of the last (newest) entry in
//!   `d.items` is taken as the current price (the sell-side quote, matching
//!   where our buys execute)
//! - private order updates — keyed by the client order id, with MEXC status
//!   codes `1` = new (acknowledged), `2` = filled, `4` = cancelled
//!
//! `PONG` replies, subscription acks, and unknown channels parse to `None`.

use mgx_core::order::side_from_order_id;
use mgx_core::{FeedEvent, Side};
use serde_json::Value;
use tracing::debug;

const STATUS_NEW: i64 = 1;
const STATUS_FILLED: i64 = 2;
const STATUS_CANCELLED: i64 = 4;

/// Parse one text frame into a feed event, if it carries one.
pub fn parse_message(text: &str) -> Option<FeedEvent> {
    let value: Value = serde_json::from_str(text).ok()?;

    // Control traffic: {"id":0,"code":0,"msg":"PONG"} and subscription acks.
    if let Some(msg) = value.get("msg").and_then(Value::as_str) {
        debug!("[feed] control message: {msg}");
        return None;
    }

    let channel = value.get("c").and_then(Value::as_str)?;
    let data = value.get("d")?;

    if channel.contains("public.bookTicker") {
        parse_book_ticker(data)
    } else if channel.contains("private.orders") {
        parse_order_update(data)
    } else {
        None
    }
}

fn parse_book_ticker(data: &Value) -> Option<FeedEvent> {
    // Batched pushes carry an item list; take the newest entry.
    let item = data.get("items").and_then(Value::as_array).and_then(|v| v.last()).unwrap_or(data);
    let ask = item.get("askPrice")?;
    let price = as_f64(ask)?;
    if price <= 0.0 {
        return None;
    }
    Some(FeedEvent::PriceUpdate(price))
}

fn parse_order_update(data: &Value) -> Option<FeedEvent> {
    let id = data.get("clientId").and_then(Value::as_str)?.to_string();
    let status = data.get("status").and_then(Value::as_i64)?;

    match status {
        STATUS_NEW => Some(FeedEvent::OrderAcknowledged { id }),
        STATUS_FILLED => {
            let price = data.get("price").and_then(as_f64)?;
            // Prefer the last deal quantity; fall back to the cumulative fill.
            let size = data
                .get("lastDealQuantity")
                .and_then(as_f64)
                .or_else(|| data.get("cumulativeQuantity").and_then(as_f64))?;
            Some(FeedEvent::OrderFilled { id, price, size })
        }
        STATUS_CANCELLED => {
            // tradeType 1 = buy, 2 = sell; the id prefix is the fallback.
            let side = match data.get("tradeType").and_then(Value::as_i64) {
                Some(1) => Side::Buy,
                Some(2) => Side::Sell,
                _ => side_from_order_id(&id)?,
            };
            Some(FeedEvent::OrderCancelled { id, side })
        }
        other => {
            debug!("[feed] order {id} in unhandled status {other}");
            None
        }
    }
}

/// MEXC sends numbers as strings in most payloads.
fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}
