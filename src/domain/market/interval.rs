use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MINUTE_MS: i64 = 60_000;

/// Width of a candle bucket, in whole minutes.
///
/// Base candles are normally [`Interval::ONE_MIN`]; aggregated candles use any
/// wider interval that evenly tiles the trading session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Interval {
    minutes: u32,
}

impl Interval {
    pub const ONE_MIN: Interval = Interval { minutes: 1 };
    pub const THREE_MIN: Interval = Interval { minutes: 3 };
    pub const FIVE_MIN: Interval = Interval { minutes: 5 };
    pub const TEN_MIN: Interval = Interval { minutes: 10 };
    pub const FIFTEEN_MIN: Interval = Interval { minutes: 15 };
    pub const THIRTY_MIN: Interval = Interval { minutes: 30 };
    pub const ONE_HOUR: Interval = Interval { minutes: 60 };
    pub const ONE_DAY: Interval = Interval { minutes: 1440 };

    /// Builds an interval from a minute count. Zero is rejected.
    pub fn from_minutes(minutes: u32) -> Result<Self> {
        if minutes == 0 {
            return Err(anyhow!("Interval width must be at least one minute"));
        }
        Ok(Self { minutes })
    }

    /// Returns the duration of this interval in minutes
    pub fn to_minutes(&self) -> u32 {
        self.minutes
    }

    /// Returns the duration in milliseconds
    pub fn to_millis(&self) -> i64 {
        self.minutes as i64 * MINUTE_MS
    }

    /// Number of `base` candles that make up one full bucket of this interval.
    ///
    /// Returns `None` when `base` does not tile this interval evenly.
    pub fn base_candles_per_bucket(&self, base: Interval) -> Option<usize> {
        if base.minutes == 0 || self.minutes % base.minutes != 0 {
            return None;
        }
        Some((self.minutes / base.minutes) as usize)
    }

    /// Returns all named intervals in ascending order
    pub fn all() -> Vec<Interval> {
        vec![
            Interval::ONE_MIN,
            Interval::THREE_MIN,
            Interval::FIVE_MIN,
            Interval::TEN_MIN,
            Interval::FIFTEEN_MIN,
            Interval::THIRTY_MIN,
            Interval::ONE_HOUR,
            Interval::ONE_DAY,
        ]
    }
}

impl FromStr for Interval {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_lowercase();
        let split = lower
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(lower.len());
        let (digits, unit) = lower.split_at(split);

        let count: u32 = digits.parse().map_err(|_| {
            anyhow!(
                "Invalid interval: '{}'. Expected forms like 1m, 5min, 1h, 1d",
                s
            )
        })?;

        let factor = match unit {
            "" | "m" | "min" | "mins" | "minute" | "minutes" => 1,
            "h" | "hr" | "hour" | "hours" => 60,
            "d" | "day" | "days" => 1440,
            _ => {
                return Err(anyhow!(
                    "Invalid interval unit in '{}'. Valid units: m, h, d",
                    s
                ));
            }
        };

        Interval::from_minutes(count.saturating_mul(factor))
    }
}

impl TryFrom<String> for Interval {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Interval> for String {
    fn from(value: Interval) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.minutes % 1440 == 0 {
            write!(f, "{}d", self.minutes / 1440)
        } else if self.minutes % 60 == 0 {
            write!(f, "{}h", self.minutes / 60)
        } else {
            write!(f, "{}m", self.minutes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_minutes() {
        assert_eq!(Interval::ONE_MIN.to_minutes(), 1);
        assert_eq!(Interval::FIVE_MIN.to_minutes(), 5);
        assert_eq!(Interval::ONE_HOUR.to_minutes(), 60);
        assert_eq!(Interval::ONE_DAY.to_minutes(), 1440);
        assert_eq!(Interval::FIVE_MIN.to_millis(), 300_000);
    }

    #[test]
    fn test_from_str() {
        assert_eq!(Interval::from_str("1m").unwrap(), Interval::ONE_MIN);
        assert_eq!(Interval::from_str("5min").unwrap(), Interval::FIVE_MIN);
        assert_eq!(Interval::from_str("15").unwrap(), Interval::FIFTEEN_MIN);
        assert_eq!(Interval::from_str("1h").unwrap(), Interval::ONE_HOUR);
        assert_eq!(Interval::from_str("1Day").unwrap(), Interval::ONE_DAY);
        assert_eq!(Interval::from_str("75m").unwrap().to_minutes(), 75);
        assert!(Interval::from_str("0m").is_err());
        assert!(Interval::from_str("5w").is_err());
        assert!(Interval::from_str("abc").is_err());
    }

    #[test]
    fn test_display_round_trips_named_intervals() {
        for interval in Interval::all() {
            let parsed: Interval = interval.to_string().parse().unwrap();
            assert_eq!(parsed, interval);
        }
        assert_eq!(Interval::FIVE_MIN.to_string(), "5m");
        assert_eq!(Interval::ONE_HOUR.to_string(), "1h");
    }

    #[test]
    fn test_base_candles_per_bucket() {
        assert_eq!(
            Interval::FIVE_MIN.base_candles_per_bucket(Interval::ONE_MIN),
            Some(5)
        );
        assert_eq!(
            Interval::FIFTEEN_MIN.base_candles_per_bucket(Interval::FIVE_MIN),
            Some(3)
        );
        assert_eq!(
            Interval::TEN_MIN.base_candles_per_bucket(Interval::THREE_MIN),
            None
        );
    }
}
