//! ohlcflow Server - live aggregation over a synthetic feed
//!
//! Replays one trading day of synthetic base candles against a virtual
//! clock, publishes closed buckets to the registered listeners, and pushes
//! metrics as structured JSON logs to stdout.
//!
//! # Usage
//! ```sh
//! METRICS_REPORT_INTERVAL_SECS=10 cargo run --bin server -- --tick-ms 200
//! ```
//!
//! # Environment Variables
//! - `OBSERVABILITY_ENABLED` - Enable metrics reporting (default: true)
//! - `METRICS_REPORT_INTERVAL_SECS` - Seconds between metric outputs (default: 60)

use anyhow::{Context, Result};
use chrono::{NaiveDate, TimeZone, Utc};
use clap::Parser;
use ohlcflow::application::Engine;
use ohlcflow::application::pipeline::cancellation;
use ohlcflow::config::Config;
use ohlcflow::domain::market::events::{FnCloseListener, LoggingCloseListener};
use ohlcflow::domain::ports::CandleSource;
use ohlcflow::infrastructure::SyntheticCandleSource;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{Level, info, warn};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Trading day to simulate (YYYY-MM-DD); defaults to today
    #[arg(long)]
    date: Option<String>,

    /// Wall-clock milliseconds per simulated base candle
    #[arg(long, default_value = "1000")]
    tick_ms: u64,

    /// Seed for the synthetic source
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Symbol(s) to simulate (comma separated); defaults to SYMBOLS
    #[arg(short, long)]
    symbols: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    info!("ohlcflow Server {} starting...", env!("CARGO_PKG_VERSION"));
    info!("Metrics: Push-based (JSON to stdout)");

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(symbols) = &cli.symbols {
        config.symbols = symbols
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    info!(
        "Configuration loaded: Interval={}, Symbols={:?}, Workers={}",
        config.indicators.interval, config.symbols, config.pipeline.max_workers
    );

    let session = Arc::new(config.session.to_session()?);
    let source = Arc::new(SyntheticCandleSource::new(session.clone(), cli.seed));
    let engine = Engine::build(config.clone(), source.clone()).await?;

    // Listeners
    let closed = Arc::new(AtomicUsize::new(0));
    let counter = closed.clone();
    engine
        .register_close_listener(Arc::new(LoggingCloseListener))
        .await;
    engine
        .register_close_listener(Arc::new(FnCloseListener::new("counter", move |event| {
            counter.fetch_add(event.candles.len(), Ordering::Relaxed);
            Ok(())
        })))
        .await;

    // Metrics reporter
    let (stop, stop_signal) = cancellation();
    let reporter = if config.observability.enabled {
        let reporter = engine.reporter();
        info!(
            "Metrics reporter started (interval: {}s)",
            config.observability.report_interval_secs
        );
        Some(tokio::spawn(reporter.run(stop_signal.clone())))
    } else {
        info!("Metrics reporting disabled.");
        None
    };

    // Virtual clock over one session
    let day = match &cli.date {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .with_context(|| format!("Dates must be YYYY-MM-DD, got '{}'", raw))?,
        None => Utc::now().with_timezone(&session.utc_offset()).date_naive(),
    };
    let midnight = session
        .utc_offset()
        .from_local_datetime(&day.and_time(chrono::NaiveTime::MIN))
        .single()
        .context("Ambiguous session date")?
        .timestamp_millis();
    let open = session
        .session_open_at(midnight)
        .context("Session open out of range")?;
    let close = session
        .session_close_at(midnight)
        .context("Session close out of range")?;
    if !session.is_trading_day(open) {
        warn!("{} is not a trading day, nothing will be produced", day);
    }

    let base = config.indicators.base_interval;
    let mut live = engine.live_aggregator()?;
    let mut ticker = tokio::time::interval(Duration::from_millis(cli.tick_ms.max(1)));
    let mut now = open;

    info!("Server running from {} to {}. Press Ctrl+C to shutdown.", open, close);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if now > close {
                    info!("Session closed.");
                    break;
                }
                let mut tick = Vec::with_capacity(config.symbols.len());
                for symbol in &config.symbols {
                    match source.fetch_candles(symbol, base, now, now).await {
                        Ok(candles) => tick.extend(candles),
                        Err(e) => warn!("Feed failed for {}: {}", symbol, e),
                    }
                }
                live.on_candles(&tick).await;
                now += base.to_millis();
                live.on_clock(now).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    live.flush_all().await;
    stop.cancel();
    if let Some(reporter) = reporter {
        reporter.await.ok();
    }

    let report = engine.shutdown().await;
    if !report.clean {
        warn!("Unfinished tasks at shutdown: {:?}", report.unfinished);
    }
    info!(
        "Exiting. {} buckets published across {} instruments.",
        closed.load(Ordering::Relaxed),
        live.instrument_count()
    );
    Ok(())
}
