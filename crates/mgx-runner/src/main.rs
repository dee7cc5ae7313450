//! # mgx-runner
//!
//! Main entry point for the MGX grid trading system.
//!
//! Loads a JSON configuration file, wires the MEXC feed and trading gateway
//! into the grid engine, and manages their lifecycle.
//!
//! # Usage
//!
//! ```bash
//! mgx-runner config.json --log-level info
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use mgx_engine::{GridEngine, OrderGateway};
use tracing::{info, warn};

/// How often the engine status line is logged.
const STATUS_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for the feed's first price before giving up.
const FIRST_PRICE_TIMEOUT: Duration = Duration::from_secs(60);

/// MGX Grid Trading Runner.
#[derive(Parser)]
#[command(name = "mgx-runner", about = "MGX Grid Trading Runner")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output.
    #[arg(long)]
    log_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Initialize logging
    mgx_core::logging::init_logging(&cli.log_level, cli.log_dir.as_deref(), "mgx-runner");

    info!("mgx-runner starting — config={}, log_level={}", cli.config.display(), cli.log_level,);

    // 2. Load configuration
    let config = mgx_core::config::load_config(&cli.config)?;
    info!(
        "config loaded — symbol={}, max_orders={}, step={}",
        config.trading.symbol, config.trading.max_orders, config.trading.price_step,
    );

    // 3. Wire feed → engine → gateway
    let gateway: Arc<dyn OrderGateway> =
        Arc::new(mgx_td::MexcGateway::new(&config).context("trading gateway")?);

    let (feed_tx, feed_rx) = tokio::sync::mpsc::unbounded_channel();
    let mut feed = mgx_feed::MexcFeed::new(&config, feed_tx).context("feed")?;
    let mut engine = GridEngine::new(&config, gateway, feed_rx);

    feed.start().await.context("feed start")?;
    engine.start();

    // 4. Wait for the first price before declaring the system live
    let mut price_watch = engine.price_watch();
    info!("waiting for the first price update…");
    tokio::time::timeout(FIRST_PRICE_TIMEOUT, async {
        while price_watch.borrow_and_update().is_none() {
            price_watch.changed().await?;
        }
        Ok::<_, anyhow::Error>(())
    })
    .await
    .context("no price update received, check feed connectivity")??;
    info!("first price received — grid engine live, press Ctrl+C to stop");

    // 5. Periodic status line until shutdown
    let mut status_tick = tokio::time::interval(STATUS_INTERVAL);
    loop {
        tokio::select! {
            _ = status_tick.tick() => {
                let s = engine.status().await;
                info!(
                    "status: price={:?} buys={} sells={} in_flight={} last_pass_ms={}",
                    s.price, s.active_buys, s.active_sells, s.ops_in_flight, s.last_pass_ms,
                );
            }
            res = tokio::signal::ctrl_c() => {
                res?;
                info!("shutdown signal received");
                break;
            }
        }
    }

    // 6. Stop everything gracefully; resting orders stay on the exchange
    let s = engine.status().await;
    info!(
        "final status: price={:?} buys={} sells={} in_flight={}",
        s.price, s.active_buys, s.active_sells, s.ops_in_flight,
    );
    engine.stop();
    feed.stop().await;
    warn!("stopped — open orders remain on the book");
    Ok(())
}
