//! Trading session configuration parsing from environment variables.

use crate::domain::market::session::TradingSession;
use anyhow::{Context, Result, anyhow};
use chrono::{FixedOffset, NaiveTime, Weekday};
use std::env;

/// Session calendar environment configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEnvConfig {
    pub open: NaiveTime,
    pub close: NaiveTime,
    /// Exchange offset from UTC in minutes (330 = UTC+05:30)
    pub utc_offset_minutes: i32,
    pub trading_days: Vec<Weekday>,
}

impl Default for SessionEnvConfig {
    fn default() -> Self {
        let session = TradingSession::default();
        Self {
            open: session.open_time(),
            close: session.close_time(),
            utc_offset_minutes: 330,
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

impl SessionEnvConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let open = match env::var("SESSION_OPEN") {
            Ok(raw) => parse_time(&raw).context("Failed to parse SESSION_OPEN")?,
            Err(_) => defaults.open,
        };
        let close = match env::var("SESSION_CLOSE") {
            Ok(raw) => parse_time(&raw).context("Failed to parse SESSION_CLOSE")?,
            Err(_) => defaults.close,
        };
        let utc_offset_minutes = super::parse_env(
            "SESSION_UTC_OFFSET_MINUTES",
            defaults.utc_offset_minutes,
        )?;
        let trading_days = match env::var("TRADING_DAYS") {
            Ok(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<Weekday>()
                        .map_err(|_| anyhow!("Invalid weekday '{}' in TRADING_DAYS", s))
                })
                .collect::<Result<Vec<_>>>()?,
            Err(_) => defaults.trading_days,
        };

        Ok(Self {
            open,
            close,
            utc_offset_minutes,
            trading_days,
        })
    }

    pub fn to_session(&self) -> Result<TradingSession> {
        let offset = FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            anyhow!(
                "SESSION_UTC_OFFSET_MINUTES out of range: {}",
                self.utc_offset_minutes
            )
        })?;
        if self.trading_days.is_empty() {
            return Err(anyhow!("TRADING_DAYS must name at least one weekday"));
        }
        Ok(TradingSession::new(self.open, self.close, offset)?
            .with_trading_days(self.trading_days.clone()))
    }
}

fn parse_time(raw: &str) -> Result<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .with_context(|| format!("Expected HH:MM, got '{}'", raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_session_matches_calendar_default() {
        let session = SessionEnvConfig::default().to_session().unwrap();
        assert_eq!(session, TradingSession::default());
    }

    #[test]
    fn test_parse_time_forms() {
        assert_eq!(
            parse_time("09:15").unwrap(),
            NaiveTime::from_hms_opt(9, 15, 0).unwrap()
        );
        assert_eq!(
            parse_time(" 15:30:00 ").unwrap(),
            NaiveTime::from_hms_opt(15, 30, 0).unwrap()
        );
        assert!(parse_time("9.15").is_err());
    }

    #[test]
    fn test_inverted_session_rejected() {
        let config = SessionEnvConfig {
            open: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            ..SessionEnvConfig::default()
        };
        assert!(config.to_session().is_err());
    }
}
