//! # mgx-td
//!
//! MEXC Spot trading transport: the signed-REST implementation of the
//! engine's [`OrderGateway`] seam.
//!
//! # REST endpoints
//!
//! | Operation     | Method | Path                  |
//! |---------------|--------|-----------------------|
//! | Place order   | POST   | `/order`              |
//! | Cancel order  | DELETE | `/order`              |
//! | Place batch   | POST   | `/batchOrders`        |
//!
//! All orders are plain limit orders identified by their locally generated
//! client order id. Batch placement encodes the orders as a JSON array in a
//! single `batchOrders` query parameter (the MEXC convention). Errors are
//! reported per call; the engine's tracker resolves rejected or lost orders
//! through its confirmation-timeout sweep, so nothing here retries.

pub mod auth;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use mgx_core::Side;
use mgx_core::config::AppConfig;
use mgx_core::time_util;
use mgx_engine::{BatchItem, OrderGateway};
use tracing::{debug, info};

/// Signed REST client for MEXC Spot order operations.
pub struct MexcGateway {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    secret_key: String,
    symbol: String,
    price_precision: u32,
    size_precision: u32,
}

impl MexcGateway {
    pub fn new(cfg: &AppConfig) -> Result<Self> {
        let api_key = cfg
            .credentials
            .effective_api_key()
            .ok_or_else(|| anyhow!("missing API key (MEXC_API_KEY or config)"))?;
        let secret_key = cfg
            .credentials
            .effective_secret_key()
            .ok_or_else(|| anyhow!("missing secret key (MEXC_SECRET_KEY or config)"))?;

        Ok(Self {
            http: reqwest::Client::new(),
            base_url: cfg.endpoints.rest_base_url.trim_end_matches('/').to_string(),
            api_key,
            secret_key,
            symbol: cfg.trading.symbol.clone(),
            price_precision: cfg.trading.price_precision,
            size_precision: cfg.trading.size_precision,
        })
    }

    fn fmt_price(&self, price: f64) -> String {
        format!("{:.*}", self.price_precision as usize, price)
    }

    fn fmt_size(&self, size: f64) -> String {
        format!("{:.*}", self.size_precision as usize, size)
    }

    fn signed_url(&self, path: &str, params: &[(&str, &str)]) -> String {
        let query = auth::build_signed_query(params, &self.secret_key);
        format!("{}{path}?{query}", self.base_url)
    }
}

/// JSON array for the `batchOrders` parameter.
fn batch_orders_json(
    symbol: &str,
    side: Side,
    items: &[BatchItem],
    price_precision: u32,
    size_precision: u32,
) -> String {
    let orders: Vec<serde_json::Value> = items
        .iter()
        .map(|item| {
            serde_json::json!({
                "symbol": symbol,
                "side": side.api_label(),
                "type": "LIMIT",
                "price": format!("{:.*}", price_precision as usize, item.price),
                "quantity": format!("{:.*}", size_precision as usize, item.size),
                "newClientOrderId": item.client_id,
            })
        })
        .collect();
    serde_json::Value::Array(orders).to_string()
}

#[async_trait]
impl OrderGateway for MexcGateway {
    async fn submit(&self, side: Side, price: f64, size: f64, client_id: &str) -> Result<()> {
        let price_s = self.fmt_price(price);
        let size_s = self.fmt_size(size);
        let ts = time_util::now_ms().to_string();

        let url = self.signed_url(
            "/order",
            &[
                ("symbol", &self.symbol),
                ("side", side.api_label()),
                ("type", "LIMIT"),
                ("price", &price_s),
                ("quantity", &size_s),
                ("newClientOrderId", client_id),
                ("timestamp", &ts),
            ],
        );

        let body: serde_json::Value = self
            .http
            .post(&url)
            .header("X-MEXC-APIKEY", &self.api_key)
            .send()
            .await
            .context("order request failed")?
            .error_for_status()
            .context("order HTTP error")?
            .json()
            .await?;

        if body.get("orderId").is_none() {
            return Err(anyhow!("order not accepted: {body}"));
        }
        info!("[td] {side} {price_s} x {size_s} placed ({client_id})");
        Ok(())
    }

    async fn submit_batch(&self, items: &[BatchItem], side: Side) -> Result<()> {
        let orders = batch_orders_json(
            &self.symbol,
            side,
            items,
            self.price_precision,
            self.size_precision,
        );
        let ts = time_util::now_ms().to_string();

        let url = self.signed_url(
            "/batchOrders",
            &[("batchOrders", &orders), ("timestamp", &ts)],
        );

        self.http
            .post(&url)
            .header("X-MEXC-APIKEY", &self.api_key)
            .send()
            .await
            .context("batch request failed")?
            .error_for_status()
            .context("batch HTTP error")?;

        info!("[td] batch of {} {side} orders placed", items.len());
        Ok(())
    }

    async fn cancel(&self, client_id: &str) -> Result<()> {
        let ts = time_util::now_ms().to_string();

        let url = self.signed_url(
            "/order",
            &[
                ("symbol", &self.symbol),
                ("origClientOrderId", client_id),
                ("timestamp", &ts),
            ],
        );

        self.http
            .delete(&url)
            .header("X-MEXC-APIKEY", &self.api_key)
            .send()
            .await
            .context("cancel request failed")?
            .error_for_status()
            .context("cancel HTTP error")?;

        debug!("[td] cancel requested for {client_id}");
        Ok(())
    }
}
