//! # mgx-feed
//!
//! MEXC price/event feed: turns the exchange's WebSocket streams into the
//! typed [`FeedEvent`] channel the engine consumes.
//!
//! Two connections run side by side:
//!
//! - **public** — book ticker stream for the configured symbol; the ask price
//!   becomes `PriceUpdate`
//! - **private** — user-data order stream, authenticated by a listen key
//!   appended to the URL; order pushes become acknowledgement, fill, and
//!   cancel events
//!
//! Both use the reconnecting [`WsConnection`] from `mgx-core` with the MEXC
//! application-level `PING`. The listen key is refreshed on a timer; if a
//! keepalive is rejected the private connection is torn down and rebuilt with
//! a fresh key.

pub mod listen_key;
pub mod parser;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use mgx_core::config::AppConfig;
use mgx_core::ws::{OnMessageCallback, WsConnConfig, WsConnection};
use mgx_core::{FeedEvent, FeedEventSender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use listen_key::ListenKeyClient;

const PING_MSG: &str = r#"{"method":"PING"}"#;
const PRIVATE_ORDERS_CHANNEL: &str = "spot@private.orders.v3.api";

fn public_subscribe_msg(symbol: &str) -> String {
    format!(
        r#"{{"method":"SUBSCRIPTION","params":["spot@public.bookTicker.batch.v3.api@{symbol}"]}}"#
    )
}

fn private_subscribe_msg() -> String {
    format!(r#"{{"method":"SUBSCRIPTION","params":["{PRIVATE_ORDERS_CHANNEL}"]}}"#)
}

struct FeedSettings {
    symbol: String,
    ws_public_url: String,
    ws_private_url: String,
    ping_interval: Duration,
    refresh_interval: Duration,
}

/// The assembled MEXC feed.
pub struct MexcFeed {
    settings: FeedSettings,
    events: FeedEventSender,
    keys: Arc<ListenKeyClient>,
    public: Option<WsConnection>,
    private: Arc<Mutex<Option<WsConnection>>>,
    refresh_task: Option<JoinHandle<()>>,
}

impl MexcFeed {
    pub fn new(cfg: &AppConfig, events: FeedEventSender) -> Result<Self> {
        let api_key = cfg
            .credentials
            .effective_api_key()
            .ok_or_else(|| anyhow!("missing API key (MEXC_API_KEY or config)"))?;
        let secret_key = cfg
            .credentials
            .effective_secret_key()
            .ok_or_else(|| anyhow!("missing secret key (MEXC_SECRET_KEY or config)"))?;

        Ok(Self {
            settings: FeedSettings {
                symbol: cfg.trading.symbol.clone(),
                ws_public_url: cfg.endpoints.ws_public_url.clone(),
                ws_private_url: cfg.endpoints.ws_private_url.clone(),
                ping_interval: Duration::from_millis(cfg.endpoints.ping_interval_ms()),
                refresh_interval: Duration::from_secs(cfg.endpoints.listen_key_refresh_secs()),
            },
            events,
            keys: Arc::new(ListenKeyClient::new(
                &cfg.endpoints.rest_base_url,
                api_key,
                secret_key,
            )),
            public: None,
            private: Arc::new(Mutex::new(None)),
            refresh_task: None,
        })
    }

    /// Forward every parseable frame onto the feed channel.
    fn forwarder(&self) -> OnMessageCallback {
        let events = self.events.clone();
        Arc::new(move |text: &str| {
            if let Some(event) = parser::parse_message(text) {
                let _ = events.send(event);
            }
        })
    }

    fn private_conn(&self, key: &str) -> WsConnection {
        let mut conn = WsConnection::new(WsConnConfig {
            label: "private".into(),
            url: format!("{}?listenKey={key}", self.settings.ws_private_url),
            subscribe_msg: Some(private_subscribe_msg()),
            ping_interval: Some(self.settings.ping_interval),
            ping_msg: Some(PING_MSG.into()),
        });
        conn.start(self.forwarder());
        conn
    }

    /// Connect both streams and start the listen-key refresh timer.
    pub async fn start(&mut self) -> Result<()> {
        let mut public = WsConnection::new(WsConnConfig {
            label: "public".into(),
            url: self.settings.ws_public_url.clone(),
            subscribe_msg: Some(public_subscribe_msg(&self.settings.symbol)),
            ping_interval: Some(self.settings.ping_interval),
            ping_msg: Some(PING_MSG.into()),
        });
        public.start(self.forwarder());
        self.public = Some(public);

        let key = self.keys.create().await.context("initial listen key")?;
        *self.private.lock().await = Some(self.private_conn(&key));
        info!("[feed] public and private streams started for {}", self.settings.symbol);

        self.spawn_refresh_task(key);
        Ok(())
    }

    /// Periodic keepalive; a rejected key forces a private reconnect.
    fn spawn_refresh_task(&mut self, initial_key: String) {
        let keys = Arc::clone(&self.keys);
        let private = Arc::clone(&self.private);
        let interval = self.settings.refresh_interval;
        let events = self.events.clone();
        let ws_private_url = self.settings.ws_private_url.clone();
        let ping_interval = self.settings.ping_interval;

        self.refresh_task = Some(tokio::spawn(async move {
            let mut key = initial_key;
            let mut tick = tokio::time::interval(interval);
            tick.tick().await; // the key was just created

            loop {
                tick.tick().await;
                match keys.keepalive(&key).await {
                    Ok(()) => continue,
                    Err(e) => warn!("[feed] listen key keepalive failed: {e:#}"),
                }

                // Replace the key and rebuild the private connection.
                match keys.create().await {
                    Ok(new_key) => {
                        key = new_key;
                        let mut guard = private.lock().await;
                        if let Some(mut old) = guard.take() {
                            old.stop().await;
                        }
                        let mut conn = WsConnection::new(WsConnConfig {
                            label: "private".into(),
                            url: format!("{ws_private_url}?listenKey={key}"),
                            subscribe_msg: Some(private_subscribe_msg()),
                            ping_interval: Some(ping_interval),
                            ping_msg: Some(PING_MSG.into()),
                        });
                        let events = events.clone();
                        conn.start(Arc::new(move |text: &str| {
                            if let Some(event) = parser::parse_message(text) {
                                let _ = events.send(event);
                            }
                        }));
                        *guard = Some(conn);
                        info!("[feed] private stream rebuilt with a fresh listen key");
                    }
                    Err(e) => {
                        error!("[feed] listen key replacement failed, retrying next tick: {e:#}");
                    }
                }
            }
        }));
    }

    /// Stop both streams and the refresh timer.
    pub async fn stop(&mut self) {
        if let Some(task) = self.refresh_task.take() {
            task.abort();
        }
        if let Some(mut conn) = self.public.take() {
            conn.stop().await;
        }
        if let Some(mut conn) = self.private.lock().await.take() {
            conn.stop().await;
        }
        info!("[feed] stopped");
    }

    /// Inject an event as if it came from the exchange (paper trading and
    /// diagnostics).
    pub fn inject(&self, event: FeedEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_messages_follow_the_mexc_shape() {
        assert_eq!(
            public_subscribe_msg("BTCUSDC"),
            r#"{"method":"SUBSCRIPTION","params":["spot@public.bookTicker.batch.v3.api@BTCUSDC"]}"#
        );
        assert_eq!(
            private_subscribe_msg(),
            r#"{"method":"SUBSCRIPTION","params":["spot@private.orders.v3.api"]}"#
        );
        // Both messages are valid JSON.
        serde_json::from_str::<serde_json::Value>(&public_subscribe_msg("BTCUSDC")).unwrap();
        serde_json::from_str::<serde_json::Value>(PING_MSG).unwrap();
    }
}
