//! Ideal grid computation.
//!
//! The grid is not stored anywhere — it is a pure function of the current
//! price and the trading parameters. The reconciler recomputes it on every
//! pass and diffs it against tracked state.

use mgx_core::order::quantize;

/// Parameters defining the grid shape.
#[derive(Debug, Clone, Copy)]
pub struct GridParams {
    /// Distance between levels.
    pub step: f64,
    /// Maximum number of levels (the order count).
    pub count: usize,
    /// Decimal places for level prices.
    pub price_precision: u32,
}

/// The current price rounded down to the nearest multiple of `step`.
#[inline]
pub fn base_price(price: f64, step: f64) -> f64 {
    (price / step).floor() * step
}

/// The ideal ladder of buy levels for `price`.
///
/// Levels are `base - i*step` for `i in [0, count)`, strictly decreasing,
/// positive only, each rounded to `price_precision` decimals.
pub fn grid_levels(price: f64, params: &GridParams) -> Vec<f64> {
    let base = base_price(price, params.step);
    let mut levels = Vec::with_capacity(params.count);

    for i in 0..params.count {
        let level = base - i as f64 * params.step;
        if level > 0.0 {
            levels.push(quantize(level, params.price_precision));
        }
    }

    levels
}
