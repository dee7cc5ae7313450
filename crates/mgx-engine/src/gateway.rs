//! The order gateway seam between the engine and the exchange transport.
//!
//! The engine is constructed against this trait; `mgx-td` provides the signed
//! REST implementation and tests substitute a recording fake. Gateway calls
//! are the engine's only suspension points besides timers.

use anyhow::Result;
use async_trait::async_trait;
use mgx_core::Side;

/// One order of a batch submission.
#[derive(Debug, Clone)]
pub struct BatchItem {
    /// Locally generated client order id.
    pub client_id: String,
    /// Limit price, already quantized.
    pub price: f64,
    /// Order size, already quantized.
    pub size: f64,
}

/// Exchange order transport.
///
/// Failures are reported per *call*, not per item: a batch chunk reports a
/// single success/failure for all of its orders. The tracker resolves
/// rejected or lost orders uniformly through the confirmation-timeout sweep,
/// so implementations should not retry internally.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Submit a single limit order.
    async fn submit(&self, side: Side, price: f64, size: f64, client_id: &str) -> Result<()>;

    /// Submit one batch chunk. The caller enforces chunk size and inter-chunk
    /// spacing; implementations send the chunk as a single request.
    async fn submit_batch(&self, items: &[BatchItem], side: Side) -> Result<()>;

    /// Cancel an order by client id.
    async fn cancel(&self, client_id: &str) -> Result<()>;
}
