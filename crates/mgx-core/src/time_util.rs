//! Time utilities.
//!
//! Wall-clock timestamps for order ids, pending-confirmation deadlines, and
//! reservation expiries. Millisecond resolution is sufficient everywhere in
//! this system; all deadlines are stored as `u64` ms since the Unix epoch.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as **milliseconds** since Unix epoch.
#[inline]
pub fn now_ms() -> u64 {
    let d = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    d.as_secs() * 1_000 + u64::from(d.subsec_millis())
}
