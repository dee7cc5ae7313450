//! Shared test fixtures: a recording fake gateway and standard configs.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use mgx_core::Side;

use crate::gateway::{BatchItem, OrderGateway};
use crate::tracker::TrackerConfig;

/// One recorded gateway invocation.
#[derive(Debug, Clone)]
pub enum GatewayCall {
    Submit { side: Side, price: f64, size: f64, client_id: String },
    SubmitBatch { side: Side, items: Vec<BatchItem> },
    Cancel { client_id: String },
}

/// Gateway fake that records every call and can be switched to fail them all.
pub struct FakeGateway {
    calls: Mutex<Vec<GatewayCall>>,
    fail: AtomicBool,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self { calls: Mutex::new(Vec::new()), fail: AtomicBool::new(false) }
    }

    /// Make every subsequent call return an error.
    pub fn fail_all(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn submit_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, GatewayCall::Submit { .. }))
            .count()
    }

    /// All prices submitted (single and batch), in call order.
    pub fn submitted_prices(&self) -> Vec<f64> {
        let mut prices = Vec::new();
        for call in self.calls.lock().unwrap().iter() {
            match call {
                GatewayCall::Submit { price, .. } => prices.push(*price),
                GatewayCall::SubmitBatch { items, .. } => {
                    prices.extend(items.iter().map(|i| i.price));
                }
                GatewayCall::Cancel { .. } => {}
            }
        }
        prices
    }

    /// All cancelled client ids, in call order.
    pub fn cancelled_ids(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                GatewayCall::Cancel { client_id } => Some(client_id.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: GatewayCall) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        if self.fail.load(Ordering::SeqCst) {
            Err(anyhow!("fake gateway failure"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl OrderGateway for FakeGateway {
    async fn submit(&self, side: Side, price: f64, size: f64, client_id: &str) -> Result<()> {
        self.record(GatewayCall::Submit { side, price, size, client_id: client_id.to_string() })
    }

    async fn submit_batch(&self, items: &[BatchItem], side: Side) -> Result<()> {
        self.record(GatewayCall::SubmitBatch { side, items: items.to_vec() })
    }

    async fn cancel(&self, client_id: &str) -> Result<()> {
        self.record(GatewayCall::Cancel { client_id: client_id.to_string() })
    }
}

/// Tracker config matching the reference scenarios (step 50, two decimals).
pub fn test_tracker_config() -> TrackerConfig {
    TrackerConfig {
        price_step: 50.0,
        price_precision: 2,
        size_precision: 6,
        max_batch_size: 20,
        batch_delay: Duration::from_millis(500),
        confirm_timeout_ms: 1_000,
    }
}
