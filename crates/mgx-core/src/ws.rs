//! WebSocket connection with auto-reconnect and application-level ping.
//!
//! Each [`WsConnection`] runs as a tokio task that:
//! 1. Connects to the exchange WebSocket endpoint (TLS).
//! 2. Sends the subscription message.
//! 3. Forwards received text frames to a callback.
//! 4. Sends periodic application-level pings (MEXC expects a JSON `PING`).
//! 5. Reconnects on disconnection with bounded exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// Callback invoked for each received text message.
pub type OnMessageCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Configuration for a single WebSocket connection.
#[derive(Debug, Clone)]
pub struct WsConnConfig {
    /// Human-readable label for log lines (e.g. `"public"`, `"private"`).
    pub label: String,
    /// Full WebSocket URL.
    pub url: String,
    /// Message to send immediately after connection (subscription request).
    pub subscribe_msg: Option<String>,
    /// Interval between application-level ping messages.
    pub ping_interval: Option<Duration>,
    /// Ping message body (text frame). `None` sends a WS ping frame instead.
    pub ping_msg: Option<String>,
}

/// A WebSocket connection managed by a background tokio task.
pub struct WsConnection {
    /// Connection configuration.
    pub config: WsConnConfig,
    /// Channel to send outbound messages.
    outbound_tx: Option<mpsc::Sender<String>>,
    /// Shutdown signal sender.
    shutdown_tx: Option<watch::Sender<bool>>,
    /// Task join handle.
    task: Option<tokio::task::JoinHandle<()>>,
}

impl WsConnection {
    /// Create a new (not yet started) connection.
    pub fn new(config: WsConnConfig) -> Self {
        Self {
            config,
            outbound_tx: None,
            shutdown_tx: None,
            task: None,
        }
    }

    /// Start the connection task. Text frames are forwarded to `on_text`.
    pub fn start(&mut self, on_text: OnMessageCallback) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (outbound_tx, outbound_rx) = mpsc::channel::<String>(64);
        let config = self.config.clone();

        let task = tokio::spawn(async move {
            connection_loop(config, on_text, outbound_rx, shutdown_rx).await;
        });

        self.shutdown_tx = Some(shutdown_tx);
        self.outbound_tx = Some(outbound_tx);
        self.task = Some(task);
    }

    /// Send a text message on this connection.
    pub async fn send(&self, msg: String) -> anyhow::Result<()> {
        if let Some(tx) = &self.outbound_tx {
            tx.send(msg).await?;
        }
        Ok(())
    }

    /// Stop the connection and wait for the task to finish.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

/// Main connection loop — connects, subscribes, reads, pings, reconnects.
async fn connection_loop(
    config: WsConnConfig,
    on_text: OnMessageCallback,
    mut outbound_rx: mpsc::Receiver<String>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut backoff = Duration::from_millis(100);
    let max_backoff = Duration::from_secs(30);
    let label = config.label.clone();

    loop {
        // Check shutdown before connecting
        if *shutdown_rx.borrow() {
            info!("[ws-{label}] shutdown requested");
            return;
        }

        info!("[ws-{label}] connecting to {}", config.url);

        let ws_stream = match tokio_tungstenite::connect_async(&config.url).await {
            Ok((s, _response)) => {
                backoff = Duration::from_millis(100); // reset backoff on success
                info!("[ws-{label}] connected");
                s
            }
            Err(e) => {
                error!("[ws-{label}] connection failed: {e}, retrying in {backoff:?}");
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {},
                    _ = shutdown_rx.changed() => return,
                }
                backoff = (backoff * 2).min(max_backoff);
                continue;
            }
        };

        let (mut ws_write, mut ws_read) = ws_stream.split();

        // Send subscription message
        if let Some(ref sub_msg) = config.subscribe_msg {
            debug!("[ws-{label}] subscribing: {sub_msg}");
            if let Err(e) = ws_write.send(Message::Text(sub_msg.clone().into())).await {
                error!("[ws-{label}] subscribe send failed: {e}");
                continue;
            }
        }

        // Set up ping timer
        let mut ping_interval = config.ping_interval.map(tokio::time::interval);

        // Main read/write loop
        loop {
            tokio::select! {
                // Shutdown signal
                _ = shutdown_rx.changed() => {
                    info!("[ws-{label}] shutdown signal received");
                    let _ = ws_write.close().await;
                    return;
                }

                // Incoming message
                msg = ws_read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            on_text(&text);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = ws_write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) => {
                            warn!("[ws-{label}] received close frame");
                            break;
                        }
                        Some(Err(e)) => {
                            error!("[ws-{label}] read error: {e}");
                            break;
                        }
                        None => {
                            warn!("[ws-{label}] stream ended");
                            break;
                        }
                        _ => {} // Binary, Pong, Frame — ignore
                    }
                }

                // Outbound message from user
                Some(msg) = outbound_rx.recv() => {
                    if let Err(e) = ws_write.send(Message::Text(msg.into())).await {
                        error!("[ws-{label}] send error: {e}");
                        break;
                    }
                }

                // Ping timer (disabled when no interval is configured)
                _ = async {
                    match ping_interval.as_mut() {
                        Some(interval) => { interval.tick().await; }
                        None => std::future::pending().await,
                    }
                } => {
                    let ping_msg = match &config.ping_msg {
                        Some(body) => Message::Text(body.clone().into()),
                        None => Message::Ping(vec![].into()),
                    };
                    if let Err(e) = ws_write.send(ping_msg).await {
                        error!("[ws-{label}] ping send error: {e}");
                        break;
                    }
                }
            }
        }

        // Disconnected — will reconnect at the top of the outer loop
        warn!("[ws-{label}] disconnected, reconnecting in {backoff:?}");
        tokio::select! {
            _ = tokio::time::sleep(backoff) => {},
            _ = shutdown_rx.changed() => return,
        }
        backoff = (backoff * 2).min(max_backoff);
    }
}
