//! ohlcflow Replay - offline aggregation and indicator computation
//!
//! Reads base candles from a CSV file (or the synthetic generator) and prints
//! aggregated candles and indicators as JSON.
//!
//! # Usage
//! ```sh
//! cargo run --bin replay -- aggregate --input candles.csv --symbols NIFTY --start 2024-01-02
//! cargo run --bin replay -- indicators --synthetic --symbols NIFTY,TCS --indicators sma:20,rsi:14
//! ```

use anyhow::{Context, Result};
use chrono::{NaiveDate, TimeZone};
use clap::{Args, Parser, Subcommand};
use ohlcflow::application::Engine;
use ohlcflow::application::pipeline::{CancelSignal, ComputationRequest};
use ohlcflow::config::{Config, parse_indicator_list};
use ohlcflow::domain::market::candle::AggregatedCandle;
use ohlcflow::domain::market::interval::Interval;
use ohlcflow::domain::market::session::TradingSession;
use ohlcflow::domain::ports::CandleSource;
use ohlcflow::infrastructure::{CsvCandleSource, SyntheticCandleSource};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, info};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct SourceArgs {
    /// CSV file with base candles (symbol,timestamp,open,high,low,close,volume[,open_interest])
    #[arg(short, long, conflicts_with = "synthetic")]
    input: Option<PathBuf>,

    /// Use the synthetic random-walk source instead of a file
    #[arg(long)]
    synthetic: bool,

    /// Seed for the synthetic source
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Symbol(s) to replay (comma separated); defaults to SYMBOLS
    #[arg(short, long)]
    symbols: Option<String>,

    /// First trading day (YYYY-MM-DD, session timezone)
    #[arg(long, default_value = "2024-01-02")]
    start: String,

    /// Last trading day (YYYY-MM-DD); defaults to the start day
    #[arg(long)]
    end: Option<String>,

    /// Bucket width, e.g. 5m, 15m, 1h; defaults to AGGREGATION_INTERVAL
    #[arg(long)]
    interval: Option<String>,

    /// Pretty-print JSON
    #[arg(long)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregated candles, one JSON document per symbol
    Aggregate {
        #[command(flatten)]
        source: SourceArgs,

        /// Emit one JSON line per closed bucket (with band width) instead
        #[arg(long)]
        stream: bool,
    },
    /// Indicators for every symbol, computed as one batch
    Indicators {
        #[command(flatten)]
        source: SourceArgs,

        /// Indicators (comma separated), e.g. sma:20,ema:9,bb_width:20:2; defaults to DEFAULT_INDICATORS
        #[arg(long)]
        indicators: Option<String>,

        /// Abort the batch after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
}

#[derive(Serialize)]
struct AggregateOutput<'a> {
    symbol: &'a str,
    interval: Interval,
    candles: Vec<AggregatedCandle>,
}

#[derive(Serialize)]
struct IndicatorOutput<'a> {
    symbol: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    indicators: Option<&'a ohlcflow::domain::indicators::IndicatorSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Resolved replay window and instruments
struct Replay {
    engine: Engine,
    symbols: Vec<String>,
    interval: Interval,
    start: i64,
    end: i64,
    pretty: bool,
}

impl Replay {
    async fn prepare(args: &SourceArgs) -> Result<Self> {
        let mut config = Config::from_env()?;
        if let Some(interval) = &args.interval {
            config.indicators.interval = interval.parse().context("Invalid --interval")?;
        }
        if let Some(symbols) = &args.symbols {
            config.symbols = symbols
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        let session = Arc::new(config.session.to_session()?);
        let source: Arc<dyn CandleSource> = match &args.input {
            Some(path) => {
                Arc::new(CsvCandleSource::from_path(path, config.indicators.base_interval).await?)
            }
            None => {
                if !args.synthetic {
                    info!("No --input given, using the synthetic source");
                }
                Arc::new(SyntheticCandleSource::new(session.clone(), args.seed))
            }
        };

        let start_day = parse_day(&args.start)?;
        let end_day = match &args.end {
            Some(end) => parse_day(end)?,
            None => start_day,
        };
        let start = day_bound(&session, start_day, 0, 0)?;
        let end = day_bound(&session, end_day, 23, 59)?;

        let interval = config.indicators.interval;
        let symbols = config.symbols.clone();
        let engine = Engine::build(config, source).await?;
        Ok(Self {
            engine,
            symbols,
            interval,
            start,
            end,
            pretty: args.pretty,
        })
    }

    fn print<T: Serialize>(&self, value: &T) -> Result<()> {
        let json = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        println!("{}", json);
        Ok(())
    }
}

fn parse_day(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("Dates must be YYYY-MM-DD, got '{}'", raw))
}

fn day_bound(session: &TradingSession, day: NaiveDate, hour: u32, minute: u32) -> Result<i64> {
    let naive = day
        .and_hms_opt(hour, minute, 0)
        .context("Invalid time of day")?;
    session
        .utc_offset()
        .from_local_datetime(&naive)
        .single()
        .map(|t| t.timestamp_millis())
        .context("Ambiguous local time")
}

async fn aggregate(replay: &Replay, stream: bool) -> Result<()> {
    let cancel = CancelSignal::never();
    for symbol in &replay.symbols {
        if stream {
            let mut lines = Vec::new();
            let emitted = replay
                .engine
                .aggregate_streaming(
                    symbol,
                    replay.start,
                    replay.end,
                    |bucket| lines.push(bucket.clone()),
                    &cancel,
                )
                .await?;
            for bucket in &lines {
                replay.print(bucket)?;
            }
            info!("{}: {} buckets streamed", symbol, emitted);
        } else {
            let candles = replay
                .engine
                .aggregate(symbol, replay.start, replay.end, &cancel)
                .await?;
            info!("{}: {} buckets", symbol, candles.len());
            replay.print(&AggregateOutput {
                symbol,
                interval: replay.interval,
                candles,
            })?;
        }
    }
    Ok(())
}

async fn indicators(replay: &Replay, indicators: Option<&str>, timeout: Option<u64>) -> Result<()> {
    let specs = match indicators {
        Some(list) => parse_indicator_list(list)?,
        None => replay.engine.config().indicators.default_indicators.clone(),
    };
    let cancel = match timeout {
        Some(secs) => CancelSignal::never().with_timeout(Duration::from_secs(secs)),
        None => CancelSignal::never(),
    };

    let request = ComputationRequest::new(
        replay.symbols.clone(),
        replay.interval,
        replay.start,
        replay.end,
        specs,
    );
    let batch = replay.engine.calculate_batch(request, &cancel).await?;

    let mut symbols: Vec<&String> = batch.results.keys().collect();
    symbols.sort();
    for symbol in symbols {
        let output = match &batch.results[symbol] {
            Ok(set) => IndicatorOutput {
                symbol,
                indicators: Some(set),
                error: None,
            },
            Err(e) => IndicatorOutput {
                symbol,
                indicators: None,
                error: Some(e.to_string()),
            },
        };
        replay.print(&output)?;
    }
    info!(
        "Batch {} finished in {}ms ({} ok, {} failed)",
        batch.request_id,
        batch.elapsed_ms,
        batch.succeeded(),
        batch.failed()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr so stdout stays pure JSON
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::WARN.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Aggregate { source, stream } => {
            let replay = Replay::prepare(&source).await?;
            aggregate(&replay, stream).await?;
            replay.engine.shutdown().await;
        }
        Commands::Indicators {
            source,
            indicators: list,
            timeout,
        } => {
            let replay = Replay::prepare(&source).await?;
            indicators(&replay, list.as_deref(), timeout).await?;
            replay.engine.shutdown().await;
        }
    }
    Ok(())
}
