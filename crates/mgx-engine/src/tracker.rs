//! Order state tracker — the single source of truth for order state.
//!
//! The tracker owns the active buy/sell maps and the pending-confirmation
//! records; nothing else mutates them. Orders are inserted *optimistically*,
//! before the gateway call returns, so concurrent capacity checks see them
//! immediately. A gateway failure is never surfaced to the caller: a rejected
//! or lost submission is indistinguishable from a slow exchange, and both
//! resolve the same way — the cleanup sweep purges any order that is still
//! unacknowledged past its confirmation deadline.
//!
//! Lock discipline: all state sits behind one `tokio::sync::Mutex` with short
//! critical sections that are never held across a gateway await. The atomic
//! in-flight counter is incremented around every gateway burst; the
//! reconciler reads it to defer passes while a burst is outstanding.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use ahash::AHashMap;
use mgx_core::order::{generate_order_id, price_ticks, quantize};
use mgx_core::time_util;
use mgx_core::{GridEvent, GridEventSender, Order, OrderStatus, Side};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::gateway::{BatchItem, OrderGateway};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tracker parameters, extracted from the application config.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Distance between grid levels (paired sell = buy price + step).
    pub price_step: f64,
    /// Decimal places for prices.
    pub price_precision: u32,
    /// Decimal places for sizes.
    pub size_precision: u32,
    /// Maximum orders per batch chunk.
    pub max_batch_size: usize,
    /// Minimum delay between batch chunks / spaced cancels.
    pub batch_delay: Duration,
    /// Age after which an unacknowledged order is purged (ms).
    pub confirm_timeout_ms: u64,
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Ephemeral shadow entry for an order awaiting exchange acknowledgement.
#[derive(Debug, Clone)]
struct PendingRecord {
    deadline_ms: u64,
    side: Side,
    price: f64,
}

#[derive(Default)]
struct TrackerState {
    /// Active buy orders by client order id.
    buys: AHashMap<String, Order>,
    /// Active sell orders by client order id.
    sells: AHashMap<String, Order>,
    /// Pending-confirmation records by client order id.
    pending: AHashMap<String, PendingRecord>,
}

/// Decrements the in-flight counter when a gateway burst completes.
struct FlightGuard<'a> {
    counter: &'a AtomicUsize,
    n: usize,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(self.n, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// OrderTracker
// ---------------------------------------------------------------------------

/// Authoritative map of active and in-flight orders.
pub struct OrderTracker {
    cfg: TrackerConfig,
    gateway: Arc<dyn OrderGateway>,
    state: Mutex<TrackerState>,
    /// Orders currently part of an in-flight gateway burst.
    ops_in_flight: AtomicUsize,
    /// Domain event channel (fills, cancels, expiries).
    events: GridEventSender,
}

impl OrderTracker {
    pub fn new(cfg: TrackerConfig, gateway: Arc<dyn OrderGateway>, events: GridEventSender) -> Self {
        Self {
            cfg,
            gateway,
            state: Mutex::new(TrackerState::default()),
            ops_in_flight: AtomicUsize::new(0),
            events,
        }
    }

    /// Begin a gateway burst covering `n` orders.
    fn flight(&self, n: usize) -> FlightGuard<'_> {
        self.ops_in_flight.fetch_add(n, Ordering::SeqCst);
        FlightGuard { counter: &self.ops_in_flight, n }
    }

    /// Insert an order as `Pending` into the active map and pending set.
    /// Caller holds the state lock.
    fn insert_locked(&self, st: &mut TrackerState, id: &str, side: Side, price: f64, size: f64) {
        let order = Order::new(id.to_string(), side, price, size);
        let record = PendingRecord {
            deadline_ms: time_util::now_ms() + self.cfg.confirm_timeout_ms,
            side,
            price,
        };
        match side {
            Side::Buy => st.buys.insert(id.to_string(), order),
            Side::Sell => st.sells.insert(id.to_string(), order),
        };
        st.pending.insert(id.to_string(), record);
    }

    async fn insert_tracked(&self, id: &str, side: Side, price: f64, size: f64) {
        let mut st = self.state.lock().await;
        self.insert_locked(&mut st, id, side, price, size);
    }

    // -----------------------------------------------------------------------
    // Placement / cancellation
    // -----------------------------------------------------------------------

    /// Place a single limit order. The order is tracked before the gateway
    /// call; a gateway failure degrades to the expiry path.
    pub async fn place(&self, side: Side, price: f64, size: f64) -> String {
        let price = quantize(price, self.cfg.price_precision);
        let size = quantize(size, self.cfg.size_precision);
        let id = generate_order_id(side, price, self.cfg.price_precision);

        self.insert_tracked(&id, side, price, size).await;
        debug!("[tracker] {side} {price} x {size} tracked as pending ({id})");

        let _guard = self.flight(1);
        if let Err(e) = self.gateway.submit(side, price, size, &id).await {
            warn!("[tracker] submit {side} {price} failed, will expire via sweep: {e:#}");
        }
        id
    }

    /// Place a batch of `(price, size)` orders on one side.
    ///
    /// Items are partitioned into chunks of at most `max_batch_size`; chunks
    /// are submitted sequentially with `batch_delay` between them to respect
    /// the exchange request-rate ceiling. Every order of a chunk is tracked
    /// before that chunk's network call.
    pub async fn place_batch(&self, items: &[(f64, f64)], side: Side) -> Vec<String> {
        if items.is_empty() {
            return Vec::new();
        }

        let mut ids = Vec::with_capacity(items.len());

        for (chunk_idx, chunk) in items.chunks(self.cfg.max_batch_size).enumerate() {
            if chunk_idx > 0 {
                tokio::time::sleep(self.cfg.batch_delay).await;
            }

            let mut batch = Vec::with_capacity(chunk.len());
            for &(price, size) in chunk {
                let price = quantize(price, self.cfg.price_precision);
                let size = quantize(size, self.cfg.size_precision);
                let id = generate_order_id(side, price, self.cfg.price_precision);
                self.insert_tracked(&id, side, price, size).await;
                batch.push(BatchItem { client_id: id.clone(), price, size });
                ids.push(id);
            }

            info!("[tracker] submitting {side} chunk {} ({} orders)", chunk_idx + 1, batch.len());

            let _guard = self.flight(batch.len());
            if let Err(e) = self.gateway.submit_batch(&batch, side).await {
                warn!(
                    "[tracker] batch chunk of {} {side} orders failed, will expire via sweep: {e:#}",
                    batch.len(),
                );
            }
        }

        ids
    }

    /// Cancel a single order. Removal from the maps happens when the
    /// exchange's cancel event arrives, not here.
    pub async fn cancel(&self, id: &str) {
        let _guard = self.flight(1);
        if let Err(e) = self.gateway.cancel(id).await {
            warn!("[tracker] cancel {id} failed: {e:#}");
        }
    }

    /// Cancel orders sequentially with rate-limit spacing (no atomic bulk
    /// cancel is assumed).
    pub async fn cancel_batch(&self, ids: &[String]) {
        if ids.is_empty() {
            return;
        }

        let _guard = self.flight(ids.len());
        for (i, id) in ids.iter().enumerate() {
            if i > 0 && i % 2 == 0 {
                tokio::time::sleep(self.cfg.batch_delay).await;
            }
            if let Err(e) = self.gateway.cancel(id).await {
                warn!("[tracker] cancel {id} failed: {e:#}");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Feed event handlers
    // -----------------------------------------------------------------------

    /// The exchange acknowledged the order: clear its pending record. The
    /// order stays active. Unknown ids are no-ops.
    pub async fn on_acknowledged(&self, id: &str) {
        let mut st = self.state.lock().await;
        if st.pending.remove(id).is_none() {
            return;
        }
        if let Some(order) = st.buys.get_mut(id) {
            order.status = OrderStatus::Acknowledged;
        } else if let Some(order) = st.sells.get_mut(id) {
            order.status = OrderStatus::Acknowledged;
        }
        debug!("[tracker] {id} acknowledged");
    }

    /// An order filled. A buy fill places the paired sell one step above for
    /// the same tracked size and emits `BuyFilled`; a sell fill emits
    /// `SellFilled`. Unknown ids are no-ops.
    ///
    /// The buy removal and the paired-sell insertion share one critical
    /// section, so no concurrent reader ever observes the level with neither
    /// the buy nor its sell tracked. Only the gateway submit happens after.
    pub async fn on_filled(&self, id: &str, fill_price: f64, fill_size: f64) {
        let (order, sell_id, sell_price) = {
            let mut st = self.state.lock().await;
            st.pending.remove(id);
            let Some(order) = st.buys.remove(id).or_else(|| st.sells.remove(id)) else {
                debug!("[tracker] fill for unknown order {id} ignored");
                return;
            };

            match order.side {
                Side::Sell => {
                    info!("[tracker] sell filled at {}", order.price);
                    let _ = self.events.send(GridEvent::SellFilled { price: order.price });
                    return;
                }
                Side::Buy => {
                    let sell_price =
                        quantize(order.price + self.cfg.price_step, self.cfg.price_precision);
                    let sell_id =
                        generate_order_id(Side::Sell, sell_price, self.cfg.price_precision);
                    self.insert_locked(&mut st, &sell_id, Side::Sell, sell_price, order.size);
                    (order, sell_id, sell_price)
                }
            }
        };

        info!(
            "[tracker] buy filled at {} (fill {fill_price} x {fill_size}), placing sell at {sell_price}",
            order.price,
        );
        let _ = self.events.send(GridEvent::BuyFilled {
            price: order.price,
            sell_price,
            size: order.size,
        });

        let _guard = self.flight(1);
        if let Err(e) = self.gateway.submit(Side::Sell, sell_price, order.size, &sell_id).await {
            warn!("[tracker] submit sell {sell_price} failed, will expire via sweep: {e:#}");
        }
    }

    /// An order was cancelled: remove it and emit `OrderCancelled`. Unknown
    /// ids are no-ops.
    pub async fn on_cancelled(&self, id: &str, side: Side) {
        let removed = {
            let mut st = self.state.lock().await;
            st.pending.remove(id);
            match side {
                Side::Buy => st.buys.remove(id),
                Side::Sell => st.sells.remove(id),
            }
        };

        if let Some(order) = removed {
            info!("[tracker] {side} order at {} cancelled ({id})", order.price);
            let _ = self.events.send(GridEvent::OrderCancelled { price: order.price, side });
        }
    }

    /// Purge every pending-confirmation record older than the confirmation
    /// timeout from both the active map and the pending set, emitting one
    /// `OrderExpired` each. Runs on a fixed tick; this is the sole recovery
    /// mechanism for lost or never-sent acknowledgements.
    pub async fn cleanup_sweep(&self) {
        let now = time_util::now_ms();

        let expired: Vec<(String, PendingRecord)> = {
            let mut st = self.state.lock().await;
            let ids: Vec<String> = st
                .pending
                .iter()
                .filter(|(_, rec)| now >= rec.deadline_ms)
                .map(|(id, _)| id.clone())
                .collect();

            ids.into_iter()
                .filter_map(|id| {
                    let rec = st.pending.remove(&id)?;
                    match rec.side {
                        Side::Buy => st.buys.remove(&id),
                        Side::Sell => st.sells.remove(&id),
                    };
                    Some((id, rec))
                })
                .collect()
        };

        for (id, rec) in expired {
            warn!("[tracker] {} order at {} expired unconfirmed ({id})", rec.side, rec.price);
            let _ = self.events.send(GridEvent::OrderExpired {
                price: rec.price,
                side: rec.side,
                reason: "timeout",
            });
        }
    }

    // -----------------------------------------------------------------------
    // Queries (pure reads)
    // -----------------------------------------------------------------------

    /// Snapshot of active buy orders.
    pub async fn active_buys(&self) -> Vec<Order> {
        self.state.lock().await.buys.values().cloned().collect()
    }

    /// Snapshot of active sell orders.
    pub async fn active_sells(&self) -> Vec<Order> {
        self.state.lock().await.sells.values().cloned().collect()
    }

    /// Whether an active buy exists at this price level.
    pub async fn has_buy_at(&self, price: f64) -> bool {
        let tick = price_ticks(price, self.cfg.price_precision);
        let st = self.state.lock().await;
        st.buys.values().any(|o| price_ticks(o.price, self.cfg.price_precision) == tick)
    }

    /// Whether an active sell exists at this price level.
    pub async fn has_sell_at(&self, price: f64) -> bool {
        let tick = price_ticks(price, self.cfg.price_precision);
        let st = self.state.lock().await;
        st.sells.values().any(|o| price_ticks(o.price, self.cfg.price_precision) == tick)
    }

    /// Total active + pending orders (the quantity bounded by the slot budget).
    pub async fn total_active(&self) -> usize {
        let st = self.state.lock().await;
        st.buys.len() + st.sells.len()
    }

    /// Orders currently part of an in-flight gateway burst.
    pub fn ops_in_flight(&self) -> usize {
        self.ops_in_flight.load(Ordering::SeqCst)
    }
}
