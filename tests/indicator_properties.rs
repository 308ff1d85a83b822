use ohlcflow::application::indicators::moving_average::{ema, sma};
use ohlcflow::application::indicators::oscillators::rsi;
use ohlcflow::application::indicators::volatility::{atr, bollinger_bands};
use ohlcflow::application::indicators::volume::vwap;
use ohlcflow::application::indicators::{ComputeStrategy, IndicatorCalculator};
use ohlcflow::domain::errors::IndicatorError;
use ohlcflow::domain::indicators::{IndicatorKind, IndicatorParams, IndicatorSpec, IndicatorValue};
use ohlcflow::domain::market::candle::Candle;
use ohlcflow::domain::market::interval::Interval;

fn candle(i: usize, high: f64, low: f64, close: f64, volume: u64) -> Candle {
    Candle {
        symbol: "TEST".to_string(),
        interval: Interval::FIVE_MIN,
        timestamp: i as i64 * 300_000,
        open: close,
        high,
        low,
        close,
        volume,
        open_interest: None,
    }
}

fn from_closes(closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| candle(i, c + 0.5, c - 0.5, c, 100))
        .collect()
}

fn wave(n: usize) -> Vec<Candle> {
    (0..n)
        .map(|i| {
            let c = 100.0 + (i as f64 * 0.37).sin() * 5.0 + (i as f64 * 0.05).cos() * 2.0;
            candle(i, c + 1.0 + (i % 3) as f64 * 0.2, c - 1.0, c, 100 + (i as u64 % 7) * 10)
        })
        .collect()
}

fn value(series: &[IndicatorValue], i: usize) -> f64 {
    series[i].value.unwrap_or(f64::NAN)
}

fn undefined_prefix(series: &[IndicatorValue]) -> usize {
    series.iter().take_while(|v| !v.is_defined()).count()
}

#[test]
fn test_moving_average_warmup_and_reference() {
    let candles = from_closes(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    for strategy in [ComputeStrategy::Rolling, ComputeStrategy::Windowed] {
        let out = sma(&candles, 3, strategy);
        assert_eq!(out.len(), 6);
        assert_eq!(undefined_prefix(&out), 2);
        assert!((value(&out, 2) - 2.0).abs() < 1e-12);
        assert!((value(&out, 5) - 5.0).abs() < 1e-12);
    }

    let out = ema(&candles, 3);
    assert_eq!(undefined_prefix(&out), 2);
    assert!((value(&out, 2) - 2.0).abs() < 1e-12);
    assert!((value(&out, 3) - 3.0).abs() < 1e-12);
}

#[test]
fn test_rsi_reference() {
    let out = rsi(&from_closes(&[1.0, 2.0, 3.0, 2.0]), 2);
    assert_eq!(undefined_prefix(&out), 2);
    assert!((value(&out, 2) - 100.0).abs() < 1e-12);
    assert!((value(&out, 3) - 50.0).abs() < 1e-12);

    for v in rsi(&wave(200), 14).iter().filter_map(|v| v.value) {
        assert!((0.0..=100.0).contains(&v));
    }
}

#[test]
fn test_bollinger_reference_and_ordering() {
    let candles = from_closes(&[1.0, 2.0, 3.0, 4.0]);
    let bands = bollinger_bands(&candles, 3, 2.0, ComputeStrategy::Windowed);
    let std_dev = (2.0f64 / 3.0).sqrt();
    assert_eq!(undefined_prefix(&bands.upper), 2);
    assert!((value(&bands.middle, 2) - 2.0).abs() < 1e-12);
    assert!((value(&bands.upper, 2) - (2.0 + 2.0 * std_dev)).abs() < 1e-12);
    assert!((value(&bands.width, 2) - 2.0 * std_dev).abs() < 1e-12);

    let candles = wave(250);
    for strategy in [ComputeStrategy::Rolling, ComputeStrategy::Windowed] {
        let bands = bollinger_bands(&candles, 20, 2.0, strategy);
        assert_eq!(undefined_prefix(&bands.middle), 19);
        for i in 19..candles.len() {
            let (u, m, l) = (
                value(&bands.upper, i),
                value(&bands.middle, i),
                value(&bands.lower, i),
            );
            assert!(u > m && m > l, "bands out of order at {}", i);
            let w = value(&bands.width, i);
            assert!(w > 0.0);
            assert!((w - (u - l) / m).abs() < 1e-12);
        }
    }
}

#[test]
fn test_atr_reference() {
    let candles = vec![
        candle(0, 10.0, 8.0, 9.0, 1),
        candle(1, 11.0, 9.0, 10.0, 1),
        candle(2, 12.0, 9.0, 11.0, 1),
        candle(3, 11.0, 10.0, 10.5, 1),
    ];
    let out = atr(&candles, 2);
    assert_eq!(undefined_prefix(&out), 2);
    assert!((value(&out, 2) - 2.5).abs() < 1e-12);
    assert!((value(&out, 3) - 1.75).abs() < 1e-12);
    assert!(atr(&wave(100), 14).iter().filter_map(|v| v.value).all(|v| v > 0.0));
}

#[test]
fn test_vwap_is_cumulative() {
    let candles = vec![candle(0, 12.0, 9.0, 9.0, 100), candle(1, 13.0, 10.0, 13.0, 300)];
    let out = vwap(&candles);
    assert!((value(&out, 0) - 10.0).abs() < 1e-12);
    assert!((value(&out, 1) - (10.0 * 100.0 + 12.0 * 300.0) / 400.0).abs() < 1e-12);
}

#[test]
fn test_every_kind_keeps_length_and_short_series_undefined() {
    let calculator = IndicatorCalculator::default();
    let short = wave(5);
    let long = wave(60);
    for text in ["sma:5", "ema:5", "rsi:5", "bb_upper:5:2", "bb_width:5:2", "atr:5"] {
        let spec = IndicatorSpec::parse(text).unwrap();
        let out = calculator.calculate_indicator("TEST", &spec, &short).unwrap();
        assert_eq!(out.len(), 5, "{}", text);
        assert!(out.iter().all(|v| !v.is_defined()), "{}", text);

        let out = calculator.calculate_indicator("TEST", &spec, &long).unwrap();
        assert_eq!(out.len(), 60, "{}", text);
        assert!(out.last().unwrap().is_defined(), "{}", text);
    }
}

#[test]
fn test_strategies_agree() {
    let candles = wave(300);
    let rolling = IndicatorCalculator::new(ComputeStrategy::Rolling);
    let windowed = IndicatorCalculator::new(ComputeStrategy::Windowed);
    let specs: Vec<IndicatorSpec> = ["sma:20", "bb_upper:20:2", "bb_lower:20:2", "bb_width:20:2"]
        .iter()
        .map(|s| IndicatorSpec::parse(s).unwrap())
        .collect();

    for spec in &specs {
        let a = rolling.calculate_indicator("T", spec, &candles).unwrap();
        let b = windowed.calculate_indicator("T", spec, &candles).unwrap();
        for (x, y) in a.iter().zip(&b) {
            match (x.value, y.value) {
                (Some(x), Some(y)) => {
                    assert!((x - y).abs() <= 1e-9 * x.abs().max(1.0), "{}: {} vs {}", spec, x, y)
                }
                (None, None) => {}
                other => panic!("{}: definedness differs {:?}", spec, other),
            }
        }
    }
}

#[test]
fn test_invalid_parameters_rejected() {
    let calculator = IndicatorCalculator::default();
    let candles = wave(10);
    let err = calculator
        .calculate("T", IndicatorKind::Ema, IndicatorParams::period(-3), &candles)
        .unwrap_err();
    assert!(matches!(err, IndicatorError::InvalidPeriod { .. }));

    let err = calculator
        .calculate("T", IndicatorKind::BollingerWidth, IndicatorParams::period(20), &candles)
        .unwrap_err();
    assert!(matches!(err, IndicatorError::MissingParameter { .. }));

    assert!(matches!(
        IndicatorSpec::parse("macd:12"),
        Err(IndicatorError::UnsupportedKind(_))
    ));
    assert!(matches!(
        IndicatorSpec::parse("ema:abc"),
        Err(IndicatorError::MalformedParameter { name: "period", .. })
    ));

    // Specs arriving as JSON are validated before they reach the calculator
    assert!(
        serde_json::from_str::<Vec<IndicatorSpec>>(
            r#"[{"kind":"Ema","period":9},{"kind":"Sma","period":0,"multiplier":null}]"#
        )
        .is_err()
    );
    assert!(
        serde_json::from_str::<IndicatorSpec>(r#"{"kind":"BollingerWidth","period":20}"#)
            .is_err()
    );
    let spec: IndicatorSpec = serde_json::from_str(r#"{"kind":"Sma","period":3}"#).unwrap();
    let out = calculator.calculate_indicator("T", &spec, &candles).unwrap();
    assert_eq!(undefined_prefix(&out), 2);

    let err = calculator
        .calculate_indicator("EMPTY", &IndicatorSpec::parse("sma:3").unwrap(), &[])
        .unwrap_err();
    assert_eq!(
        err,
        IndicatorError::EmptySeries {
            symbol: "EMPTY".to_string()
        }
    );
}
