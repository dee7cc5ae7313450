//! Grid reconciler — the control loop that converges actual order state
//! toward the ideal grid.
//!
//! Each pass recomputes the target grid from the latest price, diffs it
//! against tracker state, and issues cancellations and placements under the
//! slot budget. The grid only migrates on price *increases*; holes are filled
//! on every pass, nearest level first, swapping out the farthest active order
//! when at capacity.
//!
//! The reconciler owns no order state. It reads the tracker and issues
//! tracker operations; all of its own state (last base price, reservations)
//! is mutated only by the single task draining the trigger queue, so no lock
//! is needed.

use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use anyhow::Result;
use mgx_core::Side;
use mgx_core::order::{price_ticks, quantize, size_for_notional};
use mgx_core::time_util;
use tracing::{debug, info};

use crate::grid::{GridParams, base_price, grid_levels};
use crate::tracker::OrderTracker;

/// Upper bound on 1-for-1 swaps in a single at-capacity pass.
const MAX_SWAPS_PER_PASS: usize = 20;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Reconciler parameters, extracted from the application config.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Hard cap on active + pending orders.
    pub max_orders: usize,
    /// Distance between grid levels.
    pub price_step: f64,
    /// Decimal places for prices.
    pub price_precision: u32,
    /// Decimal places for sizes.
    pub size_precision: u32,
    /// Fixed notional per order; size = notional / price.
    pub order_notional: f64,
    /// Reconciliation interval — also the reservation time-to-live (ms).
    pub reconcile_interval_ms: u64,
}

// ---------------------------------------------------------------------------
// GridReconciler
// ---------------------------------------------------------------------------

/// The reconciliation control loop state.
pub struct GridReconciler {
    cfg: ReconcilerConfig,
    tracker: Arc<OrderTracker>,
    /// Last base price the grid was shifted to.
    last_base_price: Option<f64>,
    /// Timestamp of the last completed pass (ms).
    last_update_ms: u64,
    /// Price levels excluded from hole-filling because a paired sell was just
    /// placed one step above: level tick → expiry (ms).
    reserved: AHashMap<i64, u64>,
}

impl GridReconciler {
    pub fn new(cfg: ReconcilerConfig, tracker: Arc<OrderTracker>) -> Self {
        Self {
            cfg,
            tracker,
            last_base_price: None,
            last_update_ms: 0,
            reserved: AHashMap::new(),
        }
    }

    fn grid_params(&self) -> GridParams {
        GridParams {
            step: self.cfg.price_step,
            count: self.cfg.max_orders,
            price_precision: self.cfg.price_precision,
        }
    }

    /// Exclude a price level from hole-filling for exactly one reconciliation
    /// interval. Called right after a buy fill triggers its paired sell, so
    /// the next pass does not re-fill the level before the sell is
    /// acknowledged.
    pub fn reserve(&mut self, price: f64) {
        let tick = price_ticks(price, self.cfg.price_precision);
        let expiry = time_util::now_ms() + self.cfg.reconcile_interval_ms;
        self.reserved.insert(tick, expiry);
        debug!("[reconciler] level {price} reserved until {expiry}");
    }

    fn is_reserved(&self, tick: i64, now: u64) -> bool {
        self.reserved.get(&tick).is_some_and(|&expiry| now < expiry)
    }

    fn purge_reservations(&mut self, now: u64) {
        self.reserved.retain(|_, &mut expiry| now < expiry);
    }

    /// Timestamp of the last completed pass (ms since epoch).
    pub fn last_update_ms(&self) -> u64 {
        self.last_update_ms
    }

    // -----------------------------------------------------------------------
    // Reconciliation pass
    // -----------------------------------------------------------------------

    /// Run one reconciliation pass against the given price.
    ///
    /// The pass is dropped (not requeued) when a previous burst of
    /// placements/cancellations is still in flight; the trigger queue already
    /// serializes passes against each other. The algorithm is idempotent with
    /// respect to its inputs, so the next pass converges without special
    /// recovery.
    pub async fn reconcile(&mut self, price: f64) -> Result<()> {
        if self.tracker.ops_in_flight() > 0 {
            debug!("[reconciler] pass dropped: gateway burst in flight");
            return Ok(());
        }

        let now = time_util::now_ms();
        self.purge_reservations(now);

        let base = base_price(price, self.cfg.price_step);
        let mut departing: Vec<String> = Vec::new();
        match self.last_base_price {
            None => {
                info!("[reconciler] initial base price {base}");
                self.last_base_price = Some(base);
            }
            Some(last) if base > last => {
                info!("[reconciler] price rose: base {base} > last base {last}, shifting grid");
                departing = self.shift_upwards(price).await?;
                // Updated regardless of whether additions were skipped.
                self.last_base_price = Some(base);
            }
            // The grid never reacts to price decreases.
            Some(_) => {}
        }

        self.fill_holes(price, &departing).await?;
        self.last_update_ms = time_util::now_ms();
        Ok(())
    }

    /// Migrate the grid after an upward base-price move: cancel buys that
    /// fell off the bottom of the new grid and place the newly uncovered
    /// levels, unless that would exceed the slot budget (then cancellations
    /// only; staying within budget beats migration speed). Returns the
    /// cancel-issued ids so hole-filling does not touch them again this pass.
    async fn shift_upwards(&mut self, price: f64) -> Result<Vec<String>> {
        let grid = grid_levels(price, &self.grid_params());
        let grid_ticks: AHashSet<i64> =
            grid.iter().map(|&p| price_ticks(p, self.cfg.price_precision)).collect();

        let buys = self.tracker.active_buys().await;
        let buy_ticks: AHashSet<i64> =
            buys.iter().map(|o| price_ticks(o.price, self.cfg.price_precision)).collect();

        let to_cancel: Vec<String> = buys
            .iter()
            .filter(|o| !grid_ticks.contains(&price_ticks(o.price, self.cfg.price_precision)))
            .map(|o| o.id.clone())
            .collect();

        let candidates = self.eligible_levels(&grid, &buy_ticks).await;

        if !to_cancel.is_empty() {
            info!("[reconciler] cancelling {} buys below the new grid", to_cancel.len());
            self.tracker.cancel_batch(&to_cancel).await;
        }

        // Cancellations above have been issued but not yet confirmed, so the
        // cancelled orders still sit in the active map.
        let effective = self.tracker.total_active().await.saturating_sub(to_cancel.len());
        if effective + candidates.len() > self.cfg.max_orders {
            info!(
                "[reconciler] skipping {} additions: would exceed budget ({effective} effective / {} max)",
                candidates.len(),
                self.cfg.max_orders,
            );
            return Ok(to_cancel);
        }

        if !candidates.is_empty() {
            info!("[reconciler] adding {} new grid levels", candidates.len());
            let items = self.sized(&candidates);
            self.tracker.place_batch(&items, Side::Buy).await;
        }
        Ok(to_cancel)
    }

    /// Fill grid levels that lack an active buy, nearest to the price first.
    /// With spare capacity the holes are simply placed; at capacity the
    /// farthest active buys are swapped for nearer holes, cancel and place in
    /// the same pass, bounded by [`MAX_SWAPS_PER_PASS`]. Orders in
    /// `departing` were already cancel-issued this pass and are counted as
    /// gone.
    async fn fill_holes(&mut self, price: f64, departing: &[String]) -> Result<()> {
        let grid = grid_levels(price, &self.grid_params());
        let buys = self.tracker.active_buys().await;
        let buy_ticks: AHashSet<i64> =
            buys.iter().map(|o| price_ticks(o.price, self.cfg.price_precision)).collect();

        let mut holes = self.eligible_levels(&grid, &buy_ticks).await;
        if holes.is_empty() {
            return Ok(());
        }
        holes.sort_by(|a, b| (price - a).abs().total_cmp(&(price - b).abs()));

        let total =
            self.tracker.total_active().await.saturating_sub(departing.len());

        if total < self.cfg.max_orders {
            let free = self.cfg.max_orders - total;
            let to_place: Vec<f64> = holes.into_iter().take(free).collect();
            info!("[reconciler] filling {} holes", to_place.len());
            let items = self.sized(&to_place);
            self.tracker.place_batch(&items, Side::Buy).await;
            return Ok(());
        }

        // At capacity: 1-for-1 swaps, farthest active order for nearest hole.
        let mut movable: Vec<_> = buys
            .iter()
            .filter(|o| !departing.contains(&o.id))
            .map(|o| (o.id.clone(), (price - o.price).abs()))
            .collect();
        movable.sort_by(|a, b| b.1.total_cmp(&a.1));
        let mut movable = movable.into_iter();
        let mut next_far = movable.next();

        let mut cancel_ids = Vec::new();
        let mut place_levels = Vec::new();

        for &hole in holes.iter().take(MAX_SWAPS_PER_PASS) {
            let Some((ref far_id, far_dist)) = next_far else { break };
            if far_dist > (price - hole).abs() {
                cancel_ids.push(far_id.clone());
                place_levels.push(hole);
                next_far = movable.next();
            } else {
                // Both lists are sorted; no further swap can be beneficial.
                break;
            }
        }

        if !cancel_ids.is_empty() {
            info!("[reconciler] swapping {} far orders for nearer holes", cancel_ids.len());
            self.tracker.cancel_batch(&cancel_ids).await;
            let items = self.sized(&place_levels);
            self.tracker.place_batch(&items, Side::Buy).await;
        }
        Ok(())
    }

    /// Grid levels eligible for placement: no active buy at the level, not
    /// reserved, and no sell order one step above (a buy there would
    /// duplicate coverage of the level the sell already guards).
    async fn eligible_levels(&self, grid: &[f64], buy_ticks: &AHashSet<i64>) -> Vec<f64> {
        let now = time_util::now_ms();
        let mut eligible = Vec::new();

        for &level in grid {
            let tick = price_ticks(level, self.cfg.price_precision);
            if buy_ticks.contains(&tick) {
                continue;
            }
            if self.is_reserved(tick, now) {
                debug!("[reconciler] level {level} skipped: recently paired sell above");
                continue;
            }
            let sell_above = quantize(level + self.cfg.price_step, self.cfg.price_precision);
            if self.tracker.has_sell_at(sell_above).await {
                continue;
            }
            eligible.push(level);
        }
        eligible
    }

    /// Attach notional-derived sizes to a list of levels.
    fn sized(&self, levels: &[f64]) -> Vec<(f64, f64)> {
        levels
            .iter()
            .map(|&p| (p, size_for_notional(self.cfg.order_notional, p, self.cfg.size_precision)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FakeGateway, test_tracker_config};
    use mgx_core::GridEventReceiver;

    const MAX_ORDERS: usize = 4;

    fn test_config() -> ReconcilerConfig {
        ReconcilerConfig {
            max_orders: MAX_ORDERS,
            price_step: 50.0,
            price_precision: 2,
            size_precision: 6,
            order_notional: 1.5,
            reconcile_interval_ms: 1001,
        }
    }

    fn setup() -> (Arc<FakeGateway>, Arc<OrderTracker>, GridReconciler, GridEventReceiver) {
        let gateway = Arc::new(FakeGateway::new());
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let tracker =
            Arc::new(OrderTracker::new(test_tracker_config(), gateway.clone(), tx));
        let reconciler = GridReconciler::new(test_config(), Arc::clone(&tracker));
        (gateway, tracker, reconciler, rx)
    }

    #[tokio::test]
    async fn first_pass_places_the_full_grid() {
        let (gateway, tracker, mut recon, _rx) = setup();

        recon.reconcile(30010.0).await.unwrap();

        assert_eq!(recon.last_base_price, Some(30000.0));
        assert_eq!(tracker.total_active().await, 4);
        assert_eq!(gateway.submitted_prices(), vec![30000.0, 29950.0, 29900.0, 29850.0]);
    }

    #[tokio::test]
    async fn unchanged_state_issues_no_gateway_calls() {
        let (gateway, _tracker, mut recon, _rx) = setup();

        recon.reconcile(30010.0).await.unwrap();
        let calls_after_first = gateway.call_count();

        recon.reconcile(30010.0).await.unwrap();
        recon.reconcile(30015.0).await.unwrap(); // same base, no holes

        assert_eq!(gateway.call_count(), calls_after_first);
    }

    #[tokio::test]
    async fn base_price_never_shifts_downward() {
        let (gateway, tracker, mut recon, _rx) = setup();

        recon.reconcile(30010.0).await.unwrap();
        let calls = gateway.call_count();

        // Small decrease: the base holds and the one new hole (29800, 160
        // away) is farther than every active order, so no swap is beneficial.
        recon.reconcile(29960.0).await.unwrap();

        assert_eq!(recon.last_base_price, Some(30000.0));
        assert_eq!(gateway.call_count(), calls);
        assert!(gateway.cancelled_ids().is_empty());
        assert_eq!(tracker.total_active().await, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn large_drop_migrates_the_grid_via_swaps() {
        let (gateway, tracker, mut recon, _rx) = setup();

        recon.reconcile(30010.0).await.unwrap();

        // The base does not move down, but hole filling tracks the live
        // price: every old level is now farther than the new holes.
        recon.reconcile(29600.0).await.unwrap();

        assert_eq!(recon.last_base_price, Some(30000.0));
        assert_eq!(gateway.cancelled_ids().len(), 4);
        let swapped: Vec<f64> = gateway
            .submitted_prices()
            .into_iter()
            .filter(|&p| p < 29800.1)
            .collect();
        assert_eq!(swapped, vec![29600.0, 29550.0, 29500.0, 29450.0]);
        assert_eq!(tracker.total_active().await, 8); // 4 cancels unconfirmed
    }

    #[tokio::test]
    async fn upward_shift_cancels_bottom_and_adds_top() {
        let (gateway, tracker, mut recon, _rx) = setup();

        recon.reconcile(30010.0).await.unwrap();
        let low_id = tracker
            .active_buys()
            .await
            .into_iter()
            .find(|o| o.price == 29850.0)
            .unwrap()
            .id;

        recon.reconcile(30070.0).await.unwrap();

        assert_eq!(recon.last_base_price, Some(30050.0));
        assert_eq!(gateway.cancelled_ids(), vec![low_id]);
        // 30050 is the one new level; budget permits exactly that one swap.
        let placed: Vec<f64> =
            gateway.submitted_prices().into_iter().filter(|&p| p == 30050.0).collect();
        assert_eq!(placed, vec![30050.0]);
    }

    #[tokio::test]
    async fn upward_shift_withholds_additions_over_budget() {
        let (gateway, tracker, mut recon, _rx) = setup();

        recon.reconcile(30010.0).await.unwrap();
        // Park an extra sell so actives stay above what the shift frees up.
        tracker.place(Side::Sell, 30150.0, 0.00005).await;
        assert_eq!(tracker.total_active().await, 5);
        let calls = gateway.call_count();

        let departing = recon.shift_upwards(30070.0).await.unwrap();

        // The off-grid buy is cancelled, but 30050 is withheld: four
        // remaining actives plus one candidate would exceed the budget.
        assert_eq!(departing.len(), 1);
        assert_eq!(gateway.cancelled_ids(), departing);
        assert_eq!(gateway.call_count(), calls + 1);
    }

    #[tokio::test]
    async fn at_capacity_swap_moves_farthest_order_to_nearest_hole() {
        let (gateway, tracker, mut recon, _rx) = setup();

        // 4/4 active: three grid levels plus one stale order far below.
        tracker
            .place_batch(&[(29950.0, 0.0001), (29900.0, 0.0001), (29850.0, 0.0001)], Side::Buy)
            .await;
        let far_id = tracker.place(Side::Buy, 29810.0, 0.0001).await;
        recon.last_base_price = Some(30000.0);
        assert_eq!(tracker.total_active().await, MAX_ORDERS);

        // Hole at 30000 (distance 10); farthest active is 29810 (distance 200).
        recon.reconcile(30010.0).await.unwrap();

        assert_eq!(gateway.cancelled_ids(), vec![far_id]);
        assert!(gateway.submitted_prices().contains(&30000.0));
    }

    #[tokio::test]
    async fn at_capacity_swap_stops_when_not_beneficial() {
        let (gateway, tracker, mut recon, _rx) = setup();

        // Full ideal grid plus nothing to improve: every active order is
        // nearer than any hole could be.
        recon.reconcile(30010.0).await.unwrap();
        let calls = gateway.call_count();

        recon.reconcile(30010.0).await.unwrap();
        assert_eq!(gateway.call_count(), calls);
    }

    #[tokio::test]
    async fn buy_fill_reserves_level_for_one_interval() {
        let (gateway, tracker, mut recon, mut rx) = setup();

        recon.reconcile(30010.0).await.unwrap();

        // Buy at 29950 fills; tracker pairs a sell at 30000 and the level is
        // reserved.
        let buy_id = tracker
            .active_buys()
            .await
            .into_iter()
            .find(|o| o.price == 29950.0)
            .unwrap()
            .id;
        tracker.on_filled(&buy_id, 29950.0, 0.00005).await;
        match rx.try_recv().unwrap() {
            mgx_core::GridEvent::BuyFilled { price, sell_price, .. } => {
                assert_eq!(price, 29950.0);
                assert_eq!(sell_price, 30000.0);
                recon.reserve(price);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        // The paired sell fills, vacating the level entirely.
        let sell_id = tracker.active_sells().await[0].id.clone();
        tracker.on_filled(&sell_id, 30000.0, 0.00005).await;
        assert_eq!(tracker.total_active().await, 3);

        // While reserved, the hole at 29950 is not re-filled.
        let calls = gateway.call_count();
        recon.reconcile(30010.0).await.unwrap();
        assert_eq!(gateway.call_count(), calls);

        // After the interval elapses the hole is eligible again.
        for expiry in recon.reserved.values_mut() {
            *expiry = 0;
        }
        recon.reconcile(30010.0).await.unwrap();
        assert!(gateway.submitted_prices().contains(&29950.0));
        assert!(tracker.has_buy_at(29950.0).await);
    }

    #[tokio::test]
    async fn no_buy_placed_under_an_existing_sell() {
        let (gateway, tracker, mut recon, _rx) = setup();

        // A resting sell at 30000 guards the 29950 level.
        tracker.place(Side::Sell, 30000.0, 0.00005).await;

        recon.reconcile(30010.0).await.unwrap();

        let placed = gateway.submitted_prices();
        assert!(!placed.contains(&29950.0));
        assert!(placed.contains(&30000.0)); // grid top is unaffected
        assert!(tracker.total_active().await <= MAX_ORDERS);
    }

    #[tokio::test(start_paused = true)]
    async fn pass_is_dropped_while_a_burst_is_in_flight() {
        use std::time::Duration;

        use anyhow::Result;
        use async_trait::async_trait;
        use mgx_core::Side;

        use crate::gateway::{BatchItem, OrderGateway};
        use crate::tracker::OrderTracker;

        /// Gateway whose submissions park for a second before returning.
        struct SlowGateway;

        #[async_trait]
        impl OrderGateway for SlowGateway {
            async fn submit(&self, _: Side, _: f64, _: f64, _: &str) -> Result<()> {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(())
            }
            async fn submit_batch(&self, _: &[BatchItem], _: Side) -> Result<()> {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(())
            }
            async fn cancel(&self, _: &str) -> Result<()> {
                Ok(())
            }
        }

        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let tracker =
            Arc::new(OrderTracker::new(test_tracker_config(), Arc::new(SlowGateway), tx));
        let mut recon = GridReconciler::new(test_config(), Arc::clone(&tracker));

        let placing = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move { tracker.place(Side::Sell, 30100.0, 0.0001).await })
        };
        tokio::task::yield_now().await;
        assert_eq!(tracker.ops_in_flight(), 1);

        // The pass is dropped: no base price recorded, nothing placed.
        recon.reconcile(30010.0).await.unwrap();
        assert_eq!(recon.last_base_price, None);

        placing.await.unwrap();
        assert_eq!(tracker.ops_in_flight(), 0);

        // The next trigger converges normally.
        recon.reconcile(30010.0).await.unwrap();
        assert_eq!(tracker.total_active().await, 4); // 3 grid buys + 1 sell
    }
}
