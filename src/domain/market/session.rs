//! Trading session calendar.
//!
//! Every bucket boundary is measured from the session open of the local
//! trading day, not from midnight UTC. Two predicates gate all aggregation:
//! [`TradingSession::is_within_session`] and [`is_session_boundary`].

use crate::domain::market::interval::{Interval, MINUTE_MS};
use anyhow::{Result, anyhow};
use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Offset, TimeZone, Utc, Weekday};

/// True iff `timestamp >= session_open` and the distance from the open is an
/// exact multiple of `bucket_width`.
pub fn is_session_boundary(timestamp: i64, bucket_width: Interval, session_open: i64) -> bool {
    timestamp >= session_open && (timestamp - session_open) % bucket_width.to_millis() == 0
}

/// Wall-clock trading window in the exchange's timezone.
#[derive(Debug, Clone, PartialEq)]
pub struct TradingSession {
    open: NaiveTime,
    close: NaiveTime,
    utc_offset: FixedOffset,
    trading_days: Vec<Weekday>,
}

impl TradingSession {
    pub fn new(open: NaiveTime, close: NaiveTime, utc_offset: FixedOffset) -> Result<Self> {
        if open >= close {
            return Err(anyhow!(
                "Session open {} must be before session close {}",
                open,
                close
            ));
        }
        Ok(Self {
            open,
            close,
            utc_offset,
            trading_days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
        })
    }

    pub fn with_trading_days(mut self, days: Vec<Weekday>) -> Self {
        self.trading_days = days;
        self
    }

    pub fn open_time(&self) -> NaiveTime {
        self.open
    }

    pub fn close_time(&self) -> NaiveTime {
        self.close
    }

    pub fn utc_offset(&self) -> FixedOffset {
        self.utc_offset
    }

    fn local(&self, timestamp: i64) -> Option<DateTime<FixedOffset>> {
        Utc.timestamp_millis_opt(timestamp)
            .single()
            .map(|t| t.with_timezone(&self.utc_offset))
    }

    fn local_time_on_day(&self, timestamp: i64, time: NaiveTime) -> Option<i64> {
        let local = self.local(timestamp)?;
        let naive = local.date_naive().and_time(time);
        self.utc_offset
            .from_local_datetime(&naive)
            .single()
            .map(|t| t.timestamp_millis())
    }

    /// Session open (ms) of the local trading day containing `timestamp`
    pub fn session_open_at(&self, timestamp: i64) -> Option<i64> {
        self.local_time_on_day(timestamp, self.open)
    }

    /// Session close (ms) of the local trading day containing `timestamp`
    pub fn session_close_at(&self, timestamp: i64) -> Option<i64> {
        self.local_time_on_day(timestamp, self.close)
    }

    pub fn is_trading_day(&self, timestamp: i64) -> bool {
        self.local(timestamp)
            .is_some_and(|t| self.trading_days.contains(&t.weekday()))
    }

    /// Open and close are both inclusive; weekends (non-trading days) are rejected.
    pub fn is_within_session(&self, timestamp: i64) -> bool {
        match self.local(timestamp) {
            Some(local) if self.trading_days.contains(&local.weekday()) => {
                let time = local.time();
                time >= self.open && time <= self.close
            }
            _ => false,
        }
    }

    /// [`is_session_boundary`] against the open of `timestamp`'s own trading day.
    pub fn is_boundary(&self, timestamp: i64, bucket_width: Interval) -> bool {
        self.session_open_at(timestamp)
            .is_some_and(|open| is_session_boundary(timestamp, bucket_width, open))
    }

    /// Session-aligned start of the bucket containing `timestamp`.
    ///
    /// `None` when the timestamp falls outside the session.
    pub fn bucket_start(&self, timestamp: i64, bucket_width: Interval) -> Option<i64> {
        if !self.is_within_session(timestamp) {
            return None;
        }
        let open = self.session_open_at(timestamp)?;
        let width = bucket_width.to_millis();
        Some(open + ((timestamp - open) / width) * width)
    }

    /// Exclusive end of a bucket, clipped so the last bucket of the day ends
    /// one minute after the (inclusive) close.
    pub fn bucket_end(&self, bucket_start: i64, bucket_width: Interval) -> i64 {
        let nominal = bucket_start + bucket_width.to_millis();
        match self.session_close_at(bucket_start) {
            Some(close) => nominal.min(close + MINUTE_MS),
            None => nominal,
        }
    }
}

impl Default for TradingSession {
    /// 09:15–15:30 at UTC+05:30, Monday to Friday
    fn default() -> Self {
        Self {
            open: NaiveTime::from_hms_opt(9, 15, 0).unwrap_or(NaiveTime::MIN),
            close: NaiveTime::from_hms_opt(15, 30, 0).unwrap_or(NaiveTime::MIN),
            utc_offset: FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap_or_else(|| Utc.fix()),
            trading_days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
        }
    }
}
