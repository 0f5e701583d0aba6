/// config.rs — Centralised configuration loaded from .env
///
/// Every parameter the signal engine, risk sizing and trading-hours guard
/// consume is defined here.  Loading happens once at startup and is followed
/// by `validate()`; an invalid configuration is fatal and the engine never
/// starts.  Every module borrows &AppConfig.
use std::env;
use std::str::FromStr;

use anyhow::Result;
use chrono_tz::Tz;
use thiserror::Error;

/// Confirmations required from the enabled filters before a signal fires.
///
/// Fixed regardless of how many filters are enabled: with fewer than two
/// filters switched on no signal can ever fire.
pub const REQUIRED_FILTER_CONFIRMATIONS: usize = 2;

/// Take-profit distance as a multiple of the stop-loss distance.
pub const TAKE_PROFIT_MULTIPLIER: f64 = 2.0;

/// Hard bounds on configurable risk and lot sizes.
pub const MAX_RISK_PERCENT: f64 = 5.0;
pub const LOT_FLOOR:        f64 = 0.01;
pub const LOT_CEILING:      f64 = 10.0;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{key} must be positive, got {value}")]
    NonPositive { key: &'static str, value: f64 },

    #[error("RISK_PERCENT must be in (0, 5], got {0}")]
    RiskOutOfRange(f64),

    #[error("lot bounds must lie within [0.01, 10] with min <= max, got [{min}, {max}]")]
    LotBoundsOutOfRange { min: f64, max: f64 },

    #[error("{low_key} ({low}) must be below {high_key} ({high})")]
    InvertedRange {
        low_key:  &'static str,
        low:      f64,
        high_key: &'static str,
        high:     f64,
    },

    #[error("{key} must be an hour of day (0-23), got {value}")]
    InvalidHour { key: &'static str, value: u32 },

    #[error("MAX_TOTAL_DRAWDOWN_PERCENT must be in [0, 100), got {0}")]
    DrawdownOutOfRange(f64),

    #[error("unknown time zone: {0}")]
    UnknownTimeZone(String),

    #[error("config key {key}: {message}")]
    Parse { key: &'static str, message: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // ── Instrument ───────────────────────────────────────────────────
    pub symbol: String,

    // ── Main signal: AMA crossover ───────────────────────────────────
    pub ama_medium_period:   usize,
    pub ama_long_period:     usize,
    pub ama_fast_ema:        usize,
    pub ama_slow_ema:        usize,
    /// Minimum |AMA_m − AMA_l| / AMA_l in percent
    pub min_ama_gap_percent: f64,

    // ── ADX trend-strength filter ────────────────────────────────────
    pub use_adx_filter: bool,
    pub adx_period:     usize,
    pub adx_threshold:  f64,

    // ── MACD histogram momentum filter ───────────────────────────────
    pub use_macd_filter:       bool,
    pub macd_fast:             usize,
    pub macd_slow:             usize,
    pub macd_signal:           usize,
    /// Each histogram bar must be >= growth_factor × the previous one
    pub macd_growth_factor:    f64,
    pub macd_consecutive_bars: usize,

    // ── RSI filter ───────────────────────────────────────────────────
    pub use_rsi_filter: bool,
    pub rsi_period:     usize,
    pub rsi_overbought: f64,
    pub rsi_oversold:   f64,

    // ── Capital & risk ───────────────────────────────────────────────
    /// Percent of balance risked per trade
    pub risk_percent: f64,
    pub min_lot:      f64,
    pub max_lot:      f64,
    pub lot_step:     f64,
    /// Stop-loss distance in points; take-profit is TAKE_PROFIT_MULTIPLIER × this
    pub stop_loss_points: f64,

    // ── Execution guards ─────────────────────────────────────────────
    pub max_spread_points:   f64,
    pub max_slippage_points: u32,
    /// Pause between closing an opposite position and opening the new one
    pub settle_delay_ms:     u64,
    pub order_comment:       String,
    pub magic_number:        u64,

    // ── Trading hours (reference time zone) ──────────────────────────
    /// Sunday hour the week opens
    pub market_open_hour:  u32,
    /// Friday hour the week closes
    pub market_close_hour: u32,
    pub market_timezone:   Tz,

    // ── Daily P&L guard (0 disables) ─────────────────────────────────
    pub daily_profit_target: f64,
    pub daily_max_loss:      f64,

    /// Stop opening trades once balance falls this many percent below its
    /// high-water mark (0 disables)
    pub max_total_drawdown_percent: f64,

    // ── Trade management ─────────────────────────────────────────────
    /// Minimum time between two entries (0 disables)
    pub trade_cooldown_minutes: u64,
    pub use_trailing_stop:        bool,
    /// Profit in pips before the stop starts to trail
    pub trailing_activation_pips: f64,
    /// Distance in pips the stop keeps behind the best price
    pub trailing_distance_pips:   f64,

    // ── Backtesting ──────────────────────────────────────────────────
    pub initial_balance: f64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            symbol: "EURUSD".into(),

            ama_medium_period:   50,
            ama_long_period:     200,
            ama_fast_ema:        2,
            ama_slow_ema:        30,
            min_ama_gap_percent: 0.05,

            use_adx_filter: true,
            adx_period:     14,
            adx_threshold:  20.0,

            use_macd_filter:       true,
            macd_fast:             12,
            macd_slow:             26,
            macd_signal:           9,
            macd_growth_factor:    1.05,
            macd_consecutive_bars: 3,

            use_rsi_filter: true,
            rsi_period:     14,
            rsi_overbought: 70.0,
            rsi_oversold:   30.0,

            risk_percent:     1.0,
            min_lot:          0.01,
            max_lot:          10.0,
            lot_step:         0.01,
            stop_loss_points: 300.0,

            max_spread_points:   20.0,
            max_slippage_points: 100,
            settle_delay_ms:     500,
            order_comment:       "AMA_CROSS".into(),
            magic_number:        123_456,

            market_open_hour:  17,
            market_close_hour: 17,
            market_timezone:   chrono_tz::America::New_York,

            daily_profit_target: 0.0,
            daily_max_loss:      0.0,

            max_total_drawdown_percent: 0.0,

            trade_cooldown_minutes:   0,
            use_trailing_stop:        false,
            trailing_activation_pips: 15.0,
            trailing_distance_pips:   10.0,

            initial_balance: 10_000.0,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables (after dotenv) and
    /// validate it.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok(); // ignore missing .env

        let d = Self::default();

        let market_timezone = match env::var("MARKET_TIMEZONE") {
            Ok(name) => Tz::from_str(&name).map_err(|_| ConfigError::UnknownTimeZone(name))?,
            Err(_) => d.market_timezone,
        };

        let cfg = Self {
            symbol: env::var("SYMBOL").unwrap_or(d.symbol),

            ama_medium_period:   parse_env("AMA_MEDIUM_PERIOD",   d.ama_medium_period)?,
            ama_long_period:     parse_env("AMA_LONG_PERIOD",     d.ama_long_period)?,
            ama_fast_ema:        parse_env("AMA_FAST_EMA",        d.ama_fast_ema)?,
            ama_slow_ema:        parse_env("AMA_SLOW_EMA",        d.ama_slow_ema)?,
            min_ama_gap_percent: parse_env("MIN_AMA_GAP_PERCENT", d.min_ama_gap_percent)?,

            use_adx_filter: parse_env("USE_ADX_FILTER", d.use_adx_filter)?,
            adx_period:     parse_env("ADX_PERIOD",     d.adx_period)?,
            adx_threshold:  parse_env("ADX_THRESHOLD",  d.adx_threshold)?,

            use_macd_filter:       parse_env("USE_MACD_FILTER",       d.use_macd_filter)?,
            macd_fast:             parse_env("MACD_FAST",             d.macd_fast)?,
            macd_slow:             parse_env("MACD_SLOW",             d.macd_slow)?,
            macd_signal:           parse_env("MACD_SIGNAL",           d.macd_signal)?,
            macd_growth_factor:    parse_env("MACD_GROWTH_FACTOR",    d.macd_growth_factor)?,
            macd_consecutive_bars: parse_env("MACD_CONSECUTIVE_BARS", d.macd_consecutive_bars)?,

            use_rsi_filter: parse_env("USE_RSI_FILTER", d.use_rsi_filter)?,
            rsi_period:     parse_env("RSI_PERIOD",     d.rsi_period)?,
            rsi_overbought: parse_env("RSI_OVERBOUGHT", d.rsi_overbought)?,
            rsi_oversold:   parse_env("RSI_OVERSOLD",   d.rsi_oversold)?,

            risk_percent:     parse_env("RISK_PERCENT",     d.risk_percent)?,
            min_lot:          parse_env("MIN_LOT",          d.min_lot)?,
            max_lot:          parse_env("MAX_LOT",          d.max_lot)?,
            lot_step:         parse_env("LOT_STEP",         d.lot_step)?,
            stop_loss_points: parse_env("STOP_LOSS_POINTS", d.stop_loss_points)?,

            max_spread_points:   parse_env("MAX_SPREAD_POINTS",   d.max_spread_points)?,
            max_slippage_points: parse_env("MAX_SLIPPAGE_POINTS", d.max_slippage_points)?,
            settle_delay_ms:     parse_env("SETTLE_DELAY_MS",     d.settle_delay_ms)?,
            order_comment:       env::var("ORDER_COMMENT").unwrap_or(d.order_comment),
            magic_number:        parse_env("MAGIC_NUMBER",        d.magic_number)?,

            market_open_hour:  parse_env("MARKET_OPEN_HOUR",  d.market_open_hour)?,
            market_close_hour: parse_env("MARKET_CLOSE_HOUR", d.market_close_hour)?,
            market_timezone,

            daily_profit_target: parse_env("DAILY_PROFIT_TARGET", d.daily_profit_target)?,
            daily_max_loss:      parse_env("DAILY_MAX_LOSS",      d.daily_max_loss)?,

            max_total_drawdown_percent: parse_env("MAX_TOTAL_DRAWDOWN_PERCENT", d.max_total_drawdown_percent)?,

            trade_cooldown_minutes:   parse_env("TRADE_COOLDOWN_MINUTES",   d.trade_cooldown_minutes)?,
            use_trailing_stop:        parse_env("USE_TRAILING_STOP",        d.use_trailing_stop)?,
            trailing_activation_pips: parse_env("TRAILING_ACTIVATION_PIPS", d.trailing_activation_pips)?,
            trailing_distance_pips:   parse_env("TRAILING_DISTANCE_PIPS",   d.trailing_distance_pips)?,

            initial_balance: parse_env("INITIAL_BALANCE", d.initial_balance)?,
        };

        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations the engine must not run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let periods = [
            ("AMA_MEDIUM_PERIOD",     self.ama_medium_period),
            ("AMA_LONG_PERIOD",       self.ama_long_period),
            ("AMA_FAST_EMA",          self.ama_fast_ema),
            ("AMA_SLOW_EMA",          self.ama_slow_ema),
            ("ADX_PERIOD",            self.adx_period),
            ("MACD_FAST",             self.macd_fast),
            ("MACD_SLOW",             self.macd_slow),
            ("MACD_SIGNAL",           self.macd_signal),
            ("MACD_CONSECUTIVE_BARS", self.macd_consecutive_bars),
            ("RSI_PERIOD",            self.rsi_period),
        ];
        for (key, value) in periods {
            if value == 0 {
                return Err(ConfigError::NonPositive { key, value: 0.0 });
            }
        }

        let positives = [
            ("MACD_GROWTH_FACTOR", self.macd_growth_factor),
            ("LOT_STEP",           self.lot_step),
            ("STOP_LOSS_POINTS",   self.stop_loss_points),
            ("MAX_SPREAD_POINTS",  self.max_spread_points),
            ("INITIAL_BALANCE",    self.initial_balance),
        ];
        for (key, value) in positives {
            if value.is_nan() || value <= 0.0 {
                return Err(ConfigError::NonPositive { key, value });
            }
        }

        if self.risk_percent.is_nan() || self.risk_percent <= 0.0 || self.risk_percent > MAX_RISK_PERCENT {
            return Err(ConfigError::RiskOutOfRange(self.risk_percent));
        }

        let lot_ok = |v: f64| (LOT_FLOOR..=LOT_CEILING).contains(&v);
        if !(lot_ok(self.min_lot) && lot_ok(self.max_lot) && self.min_lot <= self.max_lot) {
            return Err(ConfigError::LotBoundsOutOfRange { min: self.min_lot, max: self.max_lot });
        }

        if self.ama_medium_period >= self.ama_long_period {
            return Err(ConfigError::InvertedRange {
                low_key:  "AMA_MEDIUM_PERIOD",
                low:      self.ama_medium_period as f64,
                high_key: "AMA_LONG_PERIOD",
                high:     self.ama_long_period as f64,
            });
        }
        if self.macd_fast >= self.macd_slow {
            return Err(ConfigError::InvertedRange {
                low_key:  "MACD_FAST",
                low:      self.macd_fast as f64,
                high_key: "MACD_SLOW",
                high:     self.macd_slow as f64,
            });
        }
        if self.rsi_oversold >= self.rsi_overbought {
            return Err(ConfigError::InvertedRange {
                low_key:  "RSI_OVERSOLD",
                low:      self.rsi_oversold,
                high_key: "RSI_OVERBOUGHT",
                high:     self.rsi_overbought,
            });
        }

        if self.use_trailing_stop {
            for (key, value) in [
                ("TRAILING_ACTIVATION_PIPS", self.trailing_activation_pips),
                ("TRAILING_DISTANCE_PIPS",   self.trailing_distance_pips),
            ] {
                if value.is_nan() || value <= 0.0 {
                    return Err(ConfigError::NonPositive { key, value });
                }
            }
        }

        let dd = self.max_total_drawdown_percent;
        if dd.is_nan() || !(0.0..100.0).contains(&dd) {
            return Err(ConfigError::DrawdownOutOfRange(dd));
        }

        for (key, value) in [
            ("MARKET_OPEN_HOUR",  self.market_open_hour),
            ("MARKET_CLOSE_HOUR", self.market_close_hour),
        ] {
            if value > 23 {
                return Err(ConfigError::InvalidHour { key, value });
            }
        }

        Ok(())
    }

    /// Number of confirmation filters switched on.
    pub fn enabled_filter_count(&self) -> usize {
        [self.use_adx_filter, self.use_macd_filter, self.use_rsi_filter]
            .iter()
            .filter(|&&on| on)
            .count()
    }
}

fn parse_env<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(v) => v
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::Parse { key, message: e.to_string() }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(AppConfig::default().validate(), Ok(()));
    }

    #[test]
    fn zero_period_rejected() {
        let cfg = AppConfig { rsi_period: 0, ..AppConfig::default() };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::NonPositive { key: "RSI_PERIOD", value: 0.0 })
        );
    }

    #[test]
    fn risk_percent_bounds() {
        for bad in [0.0, -1.0, 5.01, f64::NAN] {
            let cfg = AppConfig { risk_percent: bad, ..AppConfig::default() };
            assert!(matches!(cfg.validate(), Err(ConfigError::RiskOutOfRange(_))), "risk={bad}");
        }
        let cfg = AppConfig { risk_percent: 5.0, ..AppConfig::default() };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn lot_bounds_enforced() {
        let low = AppConfig { min_lot: 0.001, ..AppConfig::default() };
        assert!(matches!(low.validate(), Err(ConfigError::LotBoundsOutOfRange { .. })));

        let high = AppConfig { max_lot: 50.0, ..AppConfig::default() };
        assert!(matches!(high.validate(), Err(ConfigError::LotBoundsOutOfRange { .. })));

        let inverted = AppConfig { min_lot: 2.0, max_lot: 1.0, ..AppConfig::default() };
        assert!(matches!(inverted.validate(), Err(ConfigError::LotBoundsOutOfRange { .. })));
    }

    #[test]
    fn inverted_ama_periods_rejected() {
        let cfg = AppConfig { ama_medium_period: 200, ama_long_period: 50, ..AppConfig::default() };
        assert!(matches!(cfg.validate(), Err(ConfigError::InvertedRange { .. })));
    }

    #[test]
    fn trailing_distances_checked_only_when_enabled() {
        let off = AppConfig { trailing_distance_pips: 0.0, ..AppConfig::default() };
        assert!(off.validate().is_ok());

        let on = AppConfig { use_trailing_stop: true, ..off };
        assert_eq!(
            on.validate(),
            Err(ConfigError::NonPositive { key: "TRAILING_DISTANCE_PIPS", value: 0.0 })
        );
    }

    #[test]
    fn drawdown_stop_bounds() {
        for bad in [-1.0, 100.0, f64::NAN] {
            let cfg = AppConfig { max_total_drawdown_percent: bad, ..AppConfig::default() };
            assert!(matches!(cfg.validate(), Err(ConfigError::DrawdownOutOfRange(_))), "dd={bad}");
        }
        let cfg = AppConfig { max_total_drawdown_percent: 10.0, ..AppConfig::default() };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn counts_enabled_filters() {
        let cfg = AppConfig { use_macd_filter: false, ..AppConfig::default() };
        assert_eq!(cfg.enabled_filter_count(), 2);
    }
}
