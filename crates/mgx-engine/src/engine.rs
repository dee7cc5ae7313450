//! Engine assembly: wires the feed, the order tracker, and the reconciler
//! into a set of background tasks.
//!
//! | task            | drives                                              |
//! |-----------------|-----------------------------------------------------|
//! | feed consumer   | feed events → tracker handlers + price watch        |
//! | reconcile loop  | single consumer of the trigger queue                |
//! | periodic ticker | one `Periodic` trigger per reconcile interval       |
//! | cleanup ticker  | tracker sweep per cleanup interval                  |
//! | event fan-out   | tracker domain events → reservations/forced passes  |
//!
//! All reconciler state is owned by the reconcile loop task; triggers and
//! reservations ride the same FIFO queue, so passes are strictly serialized
//! against each other and against reservation updates.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use mgx_core::config::AppConfig;
use mgx_core::{FeedEvent, FeedEventReceiver, GridEvent, GridEventReceiver};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::gateway::OrderGateway;
use crate::reconciler::{GridReconciler, ReconcilerConfig};
use crate::tracker::{OrderTracker, TrackerConfig};

/// One reconciliation trigger. `Reserve` rides the same queue so the
/// reconciler never races a pass against a reservation update.
#[derive(Debug, Clone, Copy)]
enum ReconcileMsg {
    /// Regular interval tick.
    Periodic,
    /// Prompt pass requested after a sell fill vacated a level.
    Forced,
    /// Exclude this buy price from hole-filling for one interval.
    Reserve(f64),
}

/// Point-in-time engine snapshot for the status log.
#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub price: Option<f64>,
    pub active_buys: usize,
    pub active_sells: usize,
    pub ops_in_flight: usize,
    pub last_pass_ms: u64,
}

struct EngineSettings {
    reconcile_interval: Duration,
    forced_trigger_delay: Duration,
    cleanup_interval: Duration,
}

/// The assembled grid engine.
pub struct GridEngine {
    settings: EngineSettings,
    tracker: Arc<OrderTracker>,
    price_tx: watch::Sender<Option<f64>>,
    price_rx: watch::Receiver<Option<f64>>,
    reconcile_tx: mpsc::UnboundedSender<ReconcileMsg>,
    // Taken by `start`; `None` afterwards.
    reconcile_rx: Option<mpsc::UnboundedReceiver<ReconcileMsg>>,
    reconciler: Option<GridReconciler>,
    feed_rx: Option<FeedEventReceiver>,
    grid_rx: Option<GridEventReceiver>,
    last_pass_ms: Arc<AtomicU64>,
    tasks: Vec<JoinHandle<()>>,
}

impl GridEngine {
    pub fn new(
        cfg: &AppConfig,
        gateway: Arc<dyn OrderGateway>,
        feed_rx: FeedEventReceiver,
    ) -> Self {
        let (grid_tx, grid_rx) = mpsc::unbounded_channel();

        let tracker = Arc::new(OrderTracker::new(
            TrackerConfig {
                price_step: cfg.trading.price_step,
                price_precision: cfg.trading.price_precision,
                size_precision: cfg.trading.size_precision,
                max_batch_size: cfg.batch.max_batch_size(),
                batch_delay: Duration::from_millis(cfg.batch.batch_delay_ms()),
                confirm_timeout_ms: cfg.engine.confirm_timeout_ms(),
            },
            gateway,
            grid_tx,
        ));

        let reconciler = GridReconciler::new(
            ReconcilerConfig {
                max_orders: cfg.trading.max_orders,
                price_step: cfg.trading.price_step,
                price_precision: cfg.trading.price_precision,
                size_precision: cfg.trading.size_precision,
                order_notional: cfg.trading.order_notional,
                reconcile_interval_ms: cfg.engine.reconcile_interval_ms(),
            },
            Arc::clone(&tracker),
        );

        let (price_tx, price_rx) = watch::channel(None);
        let (reconcile_tx, reconcile_rx) = mpsc::unbounded_channel();

        Self {
            settings: EngineSettings {
                reconcile_interval: Duration::from_millis(cfg.engine.reconcile_interval_ms()),
                forced_trigger_delay: Duration::from_millis(cfg.engine.forced_trigger_delay_ms()),
                cleanup_interval: Duration::from_millis(cfg.engine.cleanup_interval_ms()),
            },
            tracker,
            price_tx,
            price_rx,
            reconcile_tx,
            reconcile_rx: Some(reconcile_rx),
            reconciler: Some(reconciler),
            feed_rx: Some(feed_rx),
            grid_rx: Some(grid_rx),
            last_pass_ms: Arc::new(AtomicU64::new(0)),
            tasks: Vec::new(),
        }
    }

    /// Observe the latest known price (updated by the feed consumer).
    pub fn price_watch(&self) -> watch::Receiver<Option<f64>> {
        self.price_rx.clone()
    }

    /// Spawn the engine's background tasks. Idempotent; a second call is a
    /// no-op.
    pub fn start(&mut self) {
        let (Some(feed_rx), Some(reconcile_rx), Some(reconciler), Some(grid_rx)) = (
            self.feed_rx.take(),
            self.reconcile_rx.take(),
            self.reconciler.take(),
            self.grid_rx.take(),
        ) else {
            warn!("[engine] already started");
            return;
        };

        info!("[engine] starting background tasks");
        self.spawn_feed_consumer(feed_rx);
        self.spawn_reconcile_loop(reconcile_rx, reconciler);
        self.spawn_periodic_ticker();
        self.spawn_cleanup_ticker();
        self.spawn_event_fanout(grid_rx);
    }

    /// Abort every background task.
    pub fn stop(&mut self) {
        info!("[engine] stopping {} tasks", self.tasks.len());
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    /// Snapshot for the periodic status log.
    pub async fn status(&self) -> EngineStatus {
        EngineStatus {
            price: *self.price_rx.borrow(),
            active_buys: self.tracker.active_buys().await.len(),
            active_sells: self.tracker.active_sells().await.len(),
            ops_in_flight: self.tracker.ops_in_flight(),
            last_pass_ms: self.last_pass_ms.load(Ordering::Relaxed),
        }
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    fn spawn_feed_consumer(&mut self, mut feed_rx: FeedEventReceiver) {
        let tracker = Arc::clone(&self.tracker);
        let price_tx = self.price_tx.clone();

        self.tasks.push(tokio::spawn(async move {
            while let Some(event) = feed_rx.recv().await {
                match event {
                    FeedEvent::PriceUpdate(price) => {
                        let _ = price_tx.send(Some(price));
                    }
                    FeedEvent::OrderAcknowledged { id } => tracker.on_acknowledged(&id).await,
                    FeedEvent::OrderFilled { id, price, size } => {
                        tracker.on_filled(&id, price, size).await
                    }
                    FeedEvent::OrderCancelled { id, side } => tracker.on_cancelled(&id, side).await,
                }
            }
            debug!("[engine] feed channel closed");
        }));
    }

    fn spawn_reconcile_loop(
        &mut self,
        mut rx: mpsc::UnboundedReceiver<ReconcileMsg>,
        mut reconciler: GridReconciler,
    ) {
        let price_rx = self.price_rx.clone();
        let last_pass = Arc::clone(&self.last_pass_ms);

        self.tasks.push(tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                match msg {
                    ReconcileMsg::Reserve(price) => reconciler.reserve(price),
                    ReconcileMsg::Periodic | ReconcileMsg::Forced => {
                        let Some(price) = *price_rx.borrow() else {
                            debug!("[engine] no price yet, pass skipped");
                            continue;
                        };
                        if let Err(e) = reconciler.reconcile(price).await {
                            warn!("[engine] reconciliation pass failed: {e:#}");
                        }
                        last_pass.store(reconciler.last_update_ms(), Ordering::Relaxed);
                    }
                }
            }
            debug!("[engine] trigger queue closed");
        }));
    }

    fn spawn_periodic_ticker(&mut self) {
        let tx = self.reconcile_tx.clone();
        let interval = self.settings.reconcile_interval;

        self.tasks.push(tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                if tx.send(ReconcileMsg::Periodic).is_err() {
                    break;
                }
            }
        }));
    }

    fn spawn_cleanup_ticker(&mut self) {
        let tracker = Arc::clone(&self.tracker);
        let interval = self.settings.cleanup_interval;

        self.tasks.push(tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                tracker.cleanup_sweep().await;
            }
        }));
    }

    fn spawn_event_fanout(&mut self, mut grid_rx: GridEventReceiver) {
        let tx = self.reconcile_tx.clone();
        let delay = self.settings.forced_trigger_delay;

        self.tasks.push(tokio::spawn(async move {
            while let Some(event) = grid_rx.recv().await {
                match event {
                    GridEvent::BuyFilled { price, sell_price, size } => {
                        info!(
                            "[engine] buy {price} filled, sell {sell_price} x {size} placed, level reserved"
                        );
                        let _ = tx.send(ReconcileMsg::Reserve(price));
                    }
                    GridEvent::SellFilled { price } => {
                        info!("[engine] sell {price} filled, forcing a pass shortly");
                        let tx = tx.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(delay).await;
                            let _ = tx.send(ReconcileMsg::Forced);
                        });
                    }
                    GridEvent::OrderCancelled { price, side } => {
                        debug!("[engine] {side} at {price} cancelled");
                    }
                    GridEvent::OrderExpired { price, side, reason } => {
                        warn!("[engine] {side} at {price} expired ({reason})");
                    }
                }
            }
            debug!("[engine] domain event channel closed");
        }));
    }
}

impl Drop for GridEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeGateway;
    use mgx_core::Side;
    use mgx_core::config::{BatchConfig, Credentials, EndpointsConfig, EngineConfig, TradingConfig};

    /// Config with intervals shrunk so the tests run against the real clock.
    fn fast_config() -> AppConfig {
        AppConfig {
            trading: TradingConfig {
                symbol: "BTCUSDC".into(),
                max_orders: 4,
                price_step: 50.0,
                order_notional: 1.5,
                price_precision: 2,
                size_precision: 6,
            },
            batch: BatchConfig { max_batch_size: Some(20), batch_delay_ms: Some(10) },
            engine: EngineConfig {
                reconcile_interval_ms: Some(25),
                forced_trigger_delay_ms: Some(5),
                cleanup_interval_ms: Some(20),
                confirm_timeout_ms: Some(10_000),
            },
            endpoints: EndpointsConfig {
                rest_base_url: "http://localhost".into(),
                ws_public_url: "ws://localhost".into(),
                ws_private_url: "ws://localhost".into(),
                ping_interval_ms: None,
                listen_key_refresh_secs: None,
            },
            credentials: Credentials::default(),
        }
    }

    fn setup() -> (Arc<FakeGateway>, GridEngine, mgx_core::FeedEventSender) {
        let gateway = Arc::new(FakeGateway::new());
        let (feed_tx, feed_rx) = mpsc::unbounded_channel();
        let gw: Arc<dyn OrderGateway> = gateway.clone();
        let engine = GridEngine::new(&fast_config(), gw, feed_rx);
        (gateway, engine, feed_tx)
    }

    #[tokio::test]
    async fn periodic_pass_places_the_grid_once_a_price_arrives() {
        let (_gateway, mut engine, feed_tx) = setup();
        engine.start();

        // No price yet: passes are skipped.
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(engine.tracker.total_active().await, 0);

        feed_tx.send(FeedEvent::PriceUpdate(30010.0)).unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        let status = engine.status().await;
        assert_eq!(status.price, Some(30010.0));
        assert_eq!(status.active_buys, 4);
        assert_eq!(status.active_sells, 0);
        assert!(status.last_pass_ms > 0);
    }

    #[tokio::test]
    async fn fill_cycle_replaces_sell_and_refills_the_level() {
        let (_gateway, mut engine, feed_tx) = setup();
        engine.start();

        feed_tx.send(FeedEvent::PriceUpdate(30010.0)).unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        let buy = engine
            .tracker
            .active_buys()
            .await
            .into_iter()
            .find(|o| o.price == 29950.0)
            .unwrap();
        feed_tx
            .send(FeedEvent::OrderFilled { id: buy.id, price: 29950.0, size: buy.size })
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(engine.tracker.has_sell_at(30000.0).await);

        let sell = engine.tracker.active_sells().await.into_iter().next().unwrap();
        feed_tx
            .send(FeedEvent::OrderFilled { id: sell.id, price: 30000.0, size: sell.size })
            .unwrap();

        // Reservation (one reconcile interval) lapses, then a pass re-fills.
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(engine.tracker.has_buy_at(29950.0).await);
        assert_eq!(engine.tracker.total_active().await, 4);
        assert!(!engine.tracker.has_sell_at(30000.0).await);
    }

    #[tokio::test]
    async fn cancel_events_free_slots_for_the_next_pass() {
        let (_gateway, mut engine, feed_tx) = setup();
        engine.start();

        feed_tx.send(FeedEvent::PriceUpdate(30010.0)).unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        let buy = engine.tracker.active_buys().await.into_iter().next().unwrap();
        let price = buy.price;
        feed_tx.send(FeedEvent::OrderCancelled { id: buy.id, side: Side::Buy }).unwrap();

        // Next pass sees the hole and re-fills it.
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(engine.tracker.has_buy_at(price).await);
        assert_eq!(engine.tracker.total_active().await, 4);
    }

    #[tokio::test]
    async fn stop_halts_all_background_work() {
        let (gateway, mut engine, feed_tx) = setup();
        engine.start();

        feed_tx.send(FeedEvent::PriceUpdate(30010.0)).unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        engine.stop();
        let calls = gateway.call_count();

        // A fill after stop produces no further gateway traffic.
        let _ = feed_tx.send(FeedEvent::PriceUpdate(31000.0));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(gateway.call_count(), calls);
    }
}
