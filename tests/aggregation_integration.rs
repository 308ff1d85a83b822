use chrono::{FixedOffset, TimeZone};
use ohlcflow::application::market_data::bucket_aggregator::BucketAggregator;
use ohlcflow::application::Engine;
use ohlcflow::application::pipeline::CancelSignal;
use ohlcflow::config::Config;
use ohlcflow::domain::market::candle::Candle;
use ohlcflow::domain::market::interval::Interval;
use ohlcflow::domain::market::session::{TradingSession, is_session_boundary};
use ohlcflow::domain::repositories::CandleRepository;
use ohlcflow::infrastructure::InMemoryCandleRepository;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

fn ist(h: u32, m: u32) -> i64 {
    FixedOffset::east_opt(19_800)
        .unwrap()
        .with_ymd_and_hms(2024, 1, 2, h, m, 0)
        .unwrap()
        .timestamp_millis()
}

fn minute(symbol: &str, ts: i64, o: f64, h: f64, l: f64, c: f64, v: u64) -> Candle {
    Candle {
        symbol: symbol.to_string(),
        interval: Interval::ONE_MIN,
        timestamp: ts,
        open: o,
        high: h,
        low: l,
        close: c,
        volume: v,
        open_interest: None,
    }
}

fn aggregator() -> BucketAggregator {
    BucketAggregator::new(Arc::new(TradingSession::default()), Interval::ONE_MIN)
}

#[test]
fn test_five_minute_example_scenario() {
    let opens = [100.0, 102.0, 105.0, 106.0, 107.0];
    let highs = [105.0, 107.0, 108.0, 109.0, 110.0];
    let lows = [98.0, 100.0, 103.0, 104.0, 105.0];
    let closes = [102.0, 105.0, 106.0, 107.0, 108.0];
    let volumes = [1000, 1500, 1200, 1300, 1100];
    let candles: Vec<Candle> = (0..5)
        .map(|i| {
            minute(
                "NIFTY",
                ist(9, 15 + i as u32),
                opens[i],
                highs[i],
                lows[i],
                closes[i],
                volumes[i],
            )
        })
        .collect();

    let out = aggregator()
        .aggregate(&candles, Interval::FIVE_MIN, ist(9, 20), false)
        .unwrap();
    assert_eq!(out.len(), 1);
    let bucket = &out[0];
    assert_eq!(bucket.timestamp, ist(9, 15));
    assert_eq!(bucket.open, 100.0);
    assert_eq!(bucket.high, 110.0);
    assert_eq!(bucket.low, 98.0);
    assert_eq!(bucket.close, 108.0);
    assert_eq!(bucket.volume, 6100);
    assert_eq!(bucket.candle_count, 5);
}

#[test]
fn test_boundary_alignment() {
    let open = ist(9, 15);
    let width = Interval::FIVE_MIN;
    assert!(is_session_boundary(open, width, open));
    assert!(!is_session_boundary(ist(9, 14), width, open));
    assert!(is_session_boundary(ist(9, 20), width, open));
    assert!(!is_session_boundary(ist(9, 23), width, open));
    assert!(TradingSession::default().is_boundary(ist(9, 30), width));
    assert!(!TradingSession::default().is_boundary(ist(9, 30), Interval::TEN_MIN));
}

#[test]
fn test_random_runs_fold_correctly() {
    let mut rng = StdRng::seed_from_u64(11);
    for bucket in 0..20u32 {
        let k = rng.random_range(1..=5usize);
        let offset = rng.random_range(0..=(5 - k));
        let start_minute = 15 + bucket * 5 + offset as u32;
        let candles: Vec<Candle> = (0..k)
            .map(|i| {
                let o = rng.random_range(90.0..110.0);
                let c = rng.random_range(90.0..110.0);
                let h = f64::max(o, c) + rng.random_range(0.0..2.0);
                let l = f64::min(o, c) - rng.random_range(0.0..2.0);
                let m = start_minute + i as u32;
                minute("X", ist(9 + m / 60, m % 60), o, h, l, c, rng.random_range(1..500))
            })
            .collect();

        let out = aggregator()
            .aggregate(&candles, Interval::FIVE_MIN, i64::MAX, false)
            .unwrap();
        assert_eq!(out.len(), 1, "bucket {} with {} candles", bucket, k);
        let agg = &out[0];
        assert_eq!(agg.open, candles[0].open);
        assert_eq!(agg.close, candles[k - 1].close);
        assert_eq!(
            agg.high,
            candles.iter().map(|c| c.high).fold(f64::MIN, f64::max)
        );
        assert_eq!(agg.low, candles.iter().map(|c| c.low).fold(f64::MAX, f64::min));
        assert_eq!(agg.volume, candles.iter().map(|c| c.volume).sum::<u64>());
        assert_eq!(agg.candle_count, k);
    }
}

#[test]
fn test_empty_input_is_empty_output() {
    let out = aggregator()
        .aggregate(&[], Interval::FIFTEEN_MIN, i64::MAX, true)
        .unwrap();
    assert!(out.is_empty());
}

#[tokio::test]
async fn test_engine_skips_out_of_session_and_orders_output() {
    let repo = InMemoryCandleRepository::new();
    let mut candles = vec![
        minute("NIFTY", ist(9, 10), 1.0, 2.0, 0.5, 1.5, 10),
        minute("NIFTY", ist(15, 31), 1.0, 2.0, 0.5, 1.5, 10),
    ];
    for m in 15..25 {
        candles.push(minute("NIFTY", ist(9, m), 10.0, 11.0, 9.0, 10.5, 5));
    }
    repo.store(&candles).await.unwrap();

    let engine = Engine::build(Config::default(), Arc::new(repo)).await.unwrap();
    let buckets = engine
        .aggregate("NIFTY", ist(9, 0), ist(15, 59), &CancelSignal::never())
        .await
        .unwrap();
    assert_eq!(
        buckets.iter().map(|b| b.timestamp).collect::<Vec<_>>(),
        vec![ist(9, 15), ist(9, 20)]
    );
    assert!(buckets.iter().all(|b| b.volume == 25));

    let none = engine
        .aggregate("UNKNOWN", ist(9, 0), ist(15, 59), &CancelSignal::never())
        .await
        .unwrap();
    assert!(none.is_empty());
    engine.shutdown().await;
}

#[tokio::test]
async fn test_cancelled_aggregation_returns_error() {
    let repo = InMemoryCandleRepository::new();
    let engine = Engine::build(Config::default(), Arc::new(repo)).await.unwrap();
    let (handle, signal) = ohlcflow::application::pipeline::cancellation();
    handle.cancel();

    let err = engine
        .aggregate("NIFTY", ist(9, 15), ist(10, 0), &signal)
        .await
        .unwrap_err();
    assert_eq!(err, ohlcflow::domain::errors::EngineError::Cancelled);
}
