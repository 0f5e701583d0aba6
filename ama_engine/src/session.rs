/// session.rs — Weekly FX trading hours in a reference time zone
///
/// The market is closed from Friday `close_hour` until Sunday `open_hour`
/// (both in the reference zone, default America/New_York 17:00) and all of
/// Saturday.  DST is handled by `chrono-tz`.
///
/// `TradeCooldown` paces entries: after a trade is placed, no other entry is
/// allowed until the cooldown has elapsed.
use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};
use chrono_tz::Tz;

use crate::config::AppConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradingHours {
    pub open_hour:  u32,
    pub close_hour: u32,
    pub timezone:   Tz,
}

impl TradingHours {
    pub fn new(cfg: &AppConfig) -> Self {
        Self {
            open_hour:  cfg.market_open_hour,
            close_hour: cfg.market_close_hour,
            timezone:   cfg.market_timezone,
        }
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.timezone);
        match local.weekday() {
            Weekday::Sat => false,
            Weekday::Sun => local.hour() >= self.open_hour,
            Weekday::Fri => local.hour() < self.close_hour,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeCooldown {
    period:     Duration,
    last_trade: Option<DateTime<Utc>>,
}

impl TradeCooldown {
    pub fn new(cfg: &AppConfig) -> Self {
        let minutes = i64::try_from(cfg.trade_cooldown_minutes).unwrap_or(i64::MAX / 60_000);
        Self {
            period:     Duration::try_minutes(minutes).unwrap_or(Duration::MAX),
            last_trade: None,
        }
    }

    pub fn record(&mut self, at: DateTime<Utc>) {
        self.last_trade = Some(at);
    }

    /// Time left before the next entry is allowed; `None` when free to trade.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        let last = self.last_trade?;
        let left = self.period.checked_sub(&(now - last)).unwrap_or(self.period);
        (left > Duration::zero()).then_some(left)
    }
}
