//! Configuration parsing for the MGX grid system.
//!
//! All components read their settings from a single JSON config file. The
//! top-level structure groups trading parameters, batch/rate-limit settings,
//! engine intervals, exchange endpoints, and API credentials.
//!
//! # Example config
//!
//! ```json
//! {
//!   "trading": {
//!     "symbol": "BTCUSDC",
//!     "max_orders": 20,
//!     "price_step": 50.0,
//!     "order_notional": 1.5,
//!     "price_precision": 2,
//!     "size_precision": 6
//!   },
//!   "batch": { "max_batch_size": 20, "batch_delay_ms": 500 },
//!   "engine": { "reconcile_interval_ms": 1001, "confirm_timeout_ms": 1000 },
//!   "endpoints": {
//!     "rest_base_url": "https://api.mexc.com/api/v3",
//!     "ws_public_url": "wss://wbs-api.mexc.com/ws",
//!     "ws_private_url": "wss://wbs-api.mexc.com/ws"
//!   },
//!   "credentials": { "api_key": "...", "secret_key": "..." }
//! }
//! ```
//!
//! API credentials may also come from the `MEXC_API_KEY` / `MEXC_SECRET_KEY`
//! environment variables, which take precedence over the file.

use serde::Deserialize;

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Grid trading parameters.
    pub trading: TradingConfig,

    /// Batch submission and rate-limit settings.
    #[serde(default)]
    pub batch: BatchConfig,

    /// Engine loop intervals and timeouts.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Exchange endpoints.
    pub endpoints: EndpointsConfig,

    /// API credentials (file values; env vars override).
    #[serde(default)]
    pub credentials: Credentials,
}

/// Grid trading parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    /// Trading symbol (e.g. `"BTCUSDC"`).
    pub symbol: String,

    /// Hard cap on active + pending orders (the slot budget).
    pub max_orders: usize,

    /// Distance between grid levels in quote currency.
    pub price_step: f64,

    /// Fixed notional amount per order in quote currency; order size is
    /// `order_notional / price`.
    pub order_notional: f64,

    /// Decimal places for prices.
    pub price_precision: u32,

    /// Decimal places for order sizes.
    pub size_precision: u32,
}

/// Batch submission and rate-limit settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    /// Maximum orders per batch request (exchange limit).
    pub max_batch_size: Option<usize>,

    /// Minimum delay between batch chunks in ms (request-rate ceiling).
    pub batch_delay_ms: Option<u64>,
}

impl BatchConfig {
    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size.unwrap_or(20)
    }

    pub fn batch_delay_ms(&self) -> u64 {
        self.batch_delay_ms.unwrap_or(500)
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { max_batch_size: None, batch_delay_ms: None }
    }
}

/// Engine loop intervals and timeouts.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct EngineConfig {
    /// Interval between periodic reconciliation passes in ms.
    pub reconcile_interval_ms: Option<u64>,

    /// Delay between a sell fill and the forced reconciliation trigger in ms.
    pub forced_trigger_delay_ms: Option<u64>,

    /// Interval between pending-confirmation cleanup sweeps in ms.
    pub cleanup_interval_ms: Option<u64>,

    /// Age after which an unacknowledged order is purged, in ms.
    pub confirm_timeout_ms: Option<u64>,
}

impl EngineConfig {
    pub fn reconcile_interval_ms(&self) -> u64 {
        self.reconcile_interval_ms.unwrap_or(1001)
    }

    pub fn forced_trigger_delay_ms(&self) -> u64 {
        self.forced_trigger_delay_ms.unwrap_or(100)
    }

    pub fn cleanup_interval_ms(&self) -> u64 {
        self.cleanup_interval_ms.unwrap_or(1000)
    }

    pub fn confirm_timeout_ms(&self) -> u64 {
        self.confirm_timeout_ms.unwrap_or(1000)
    }
}

/// Exchange endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointsConfig {
    /// REST base URL (e.g. `https://api.mexc.com/api/v3`).
    pub rest_base_url: String,

    /// Public market data WebSocket URL.
    pub ws_public_url: String,

    /// Private user-data WebSocket URL (listen key appended as a parameter).
    pub ws_private_url: String,

    /// Application-level ping interval in ms.
    pub ping_interval_ms: Option<u64>,

    /// Listen-key keepalive interval in seconds.
    pub listen_key_refresh_secs: Option<u64>,
}

impl EndpointsConfig {
    pub fn ping_interval_ms(&self) -> u64 {
        self.ping_interval_ms.unwrap_or(29_000)
    }

    pub fn listen_key_refresh_secs(&self) -> u64 {
        self.listen_key_refresh_secs.unwrap_or(1_800)
    }
}

/// API credentials.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Credentials {
    pub api_key: Option<String>,
    pub secret_key: Option<String>,
}

impl Credentials {
    /// Effective API key — `MEXC_API_KEY` env var, falling back to the file.
    pub fn effective_api_key(&self) -> Option<String> {
        std::env::var("MEXC_API_KEY").ok().or_else(|| self.api_key.clone())
    }

    /// Effective secret key — `MEXC_SECRET_KEY` env var, falling back to the file.
    pub fn effective_secret_key(&self) -> Option<String> {
        std::env::var("MEXC_SECRET_KEY").ok().or_else(|| self.secret_key.clone())
    }
}

/// Load and parse a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

impl AppConfig {
    /// Reject configurations the engine cannot operate under.
    fn validate(&self) -> anyhow::Result<()> {
        use crate::error::GridError;

        if self.trading.max_orders == 0 {
            return Err(GridError::Config("max_orders must be > 0".into()).into());
        }
        if self.trading.price_step <= 0.0 {
            return Err(GridError::Config("price_step must be > 0".into()).into());
        }
        if self.trading.order_notional <= 0.0 {
            return Err(GridError::Config("order_notional must be > 0".into()).into());
        }
        if self.batch.max_batch_size() == 0 {
            return Err(GridError::Config("max_batch_size must be > 0".into()).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_json() -> &'static str {
        r#"{
            "trading": {
                "symbol": "BTCUSDC",
                "max_orders": 20,
                "price_step": 50.0,
                "order_notional": 1.5,
                "price_precision": 2,
                "size_precision": 6
            },
            "endpoints": {
                "rest_base_url": "https://api.mexc.com/api/v3",
                "ws_public_url": "wss://wbs-api.mexc.com/ws",
                "ws_private_url": "wss://wbs-api.mexc.com/ws"
            }
        }"#
    }

    #[test]
    fn parses_minimal_config_with_defaults() {
        let config: AppConfig = serde_json::from_str(minimal_json()).unwrap();
        assert_eq!(config.trading.symbol, "BTCUSDC");
        assert_eq!(config.batch.max_batch_size(), 20);
        assert_eq!(config.batch.batch_delay_ms(), 500);
        assert_eq!(config.engine.reconcile_interval_ms(), 1001);
        assert_eq!(config.engine.confirm_timeout_ms(), 1000);
        assert_eq!(config.endpoints.ping_interval_ms(), 29_000);
    }

    #[test]
    fn rejects_zero_max_orders() {
        let mut value: serde_json::Value = serde_json::from_str(minimal_json()).unwrap();
        value["trading"]["max_orders"] = 0.into();
        let config: AppConfig = serde_json::from_value(value).unwrap();
        assert!(config.validate().is_err());
    }
}
