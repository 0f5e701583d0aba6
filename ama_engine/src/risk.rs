/// risk.rs — Position sizing, protective levels, daily P&L and drawdown guards
///
///   risk_amount = balance · risk% / 100
///   lots        = risk_amount / (distance · tick_value / point)
///   lots        → floor to lot_step, clamp to [min_lot, max_lot]
///
/// `distance` is a price distance (stop_loss_points × point), so
/// distance / point is the stop in points and tick_value prices one point
/// for one lot.
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::{info, warn};

use crate::config::{AppConfig, TAKE_PROFIT_MULTIPLIER};
use crate::models::{Quote, Side, SymbolInfo};

#[derive(Debug, Clone, PartialEq)]
pub struct RiskManager {
    pub risk_percent:     f64,
    pub min_lot:          f64,
    pub max_lot:          f64,
    pub lot_step:         f64,
    pub stop_loss_points: f64,
}

impl RiskManager {
    pub fn new(cfg: &AppConfig) -> Self {
        Self {
            risk_percent:     cfg.risk_percent,
            min_lot:          cfg.min_lot,
            max_lot:          cfg.max_lot,
            lot_step:         cfg.lot_step,
            stop_loss_points: cfg.stop_loss_points,
        }
    }

    /// Stop-loss distance as a price difference.
    pub fn stop_distance(&self, symbol: &SymbolInfo) -> f64 {
        self.stop_loss_points * symbol.point
    }

    /// Lots risking `risk_percent` of `balance` over `stop_distance`.
    ///
    /// Always within [min_lot, max_lot]; degenerate inputs (zero distance,
    /// zero tick value, non-finite balance) fall back to `min_lot`.
    pub fn lot_size(&self, balance: f64, stop_distance: f64, symbol: &SymbolInfo) -> f64 {
        let risk_amount = balance * self.risk_percent / 100.0;
        let loss_per_lot = stop_distance * symbol.tick_value / symbol.point;
        let raw = risk_amount / loss_per_lot;

        if !raw.is_finite() || raw <= 0.0 {
            warn!(
                "Lot sizing degenerate (balance={balance}, distance={stop_distance}, tick_value={}), using min lot {}",
                symbol.tick_value, self.min_lot
            );
            return self.min_lot;
        }

        let stepped = floor_to_step(raw, self.lot_step);
        let lots = stepped.clamp(self.min_lot, self.max_lot);
        info!(
            "Lot size: risk ${:.2} over {:.1} points → {:.4} raw → {:.2} lots",
            risk_amount,
            stop_distance / symbol.point,
            raw,
            lots
        );
        lots
    }

    /// (stop_loss, take_profit) for a market entry on `side`.
    ///
    /// Longs enter at the ask, shorts at the bid; TP sits
    /// TAKE_PROFIT_MULTIPLIER × the stop distance away.
    pub fn protective_levels(&self, side: Side, quote: &Quote, symbol: &SymbolInfo) -> (f64, f64) {
        let distance = self.stop_distance(symbol);
        let entry = entry_price(side, quote);
        let sign = side.sign();
        (
            symbol.normalize(entry - sign * distance),
            symbol.normalize(entry + sign * distance * TAKE_PROFIT_MULTIPLIER),
        )
    }
}

/// Quote side a market order on `side` fills against.
pub fn entry_price(side: Side, quote: &Quote) -> f64 {
    match side {
        Side::Buy => quote.ask,
        Side::Sell => quote.bid,
    }
}

/// Floor `value` to a multiple of `step`, tolerant of float noise
/// (0.29 / 0.01 = 28.999999999999996).
pub fn floor_to_step(value: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return value;
    }
    let steps = (value / step + 1e-9).floor();
    (steps * step * 1e8).round() / 1e8
}

// ── Daily P&L guard ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DailyLimit {
    ProfitTarget { pnl: f64 },
    MaxLoss { pnl: f64 },
}

/// Blocks new entries for the rest of the reference-zone day once the day's
/// P&L reaches the profit target or the loss limit.  A zero limit disables
/// that side.
///
/// The day's baseline is the first equity observed after the reference-zone
/// date changes, so `observe` must see every tick, not only signal ticks.
#[derive(Debug, Clone)]
pub struct DailyPnlGuard {
    profit_target: f64,
    max_loss:      f64,
    timezone:      Tz,
    day:           Option<NaiveDate>,
    start_equity:  f64,
}

impl DailyPnlGuard {
    pub fn new(cfg: &AppConfig) -> Self {
        Self {
            profit_target: cfg.daily_profit_target,
            max_loss:      cfg.daily_max_loss.abs(),
            timezone:      cfg.market_timezone,
            day:           None,
            start_equity:  0.0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.profit_target > 0.0 || self.max_loss > 0.0
    }

    /// P&L since the start of the current day, rolling the day if needed.
    pub fn day_pnl(&mut self, now: DateTime<Utc>, equity: f64) -> f64 {
        let today = now.with_timezone(&self.timezone).date_naive();
        if self.day != Some(today) {
            self.day = Some(today);
            self.start_equity = equity;
        }
        equity - self.start_equity
    }

    /// Record equity for `now`; rolls the day and resets the baseline on the
    /// first observation of a new reference-zone date.
    pub fn observe(&mut self, now: DateTime<Utc>, equity: f64) {
        if self.is_enabled() {
            self.day_pnl(now, equity);
        }
    }

    /// `Some` when today's limit has been hit.
    pub fn check(&mut self, now: DateTime<Utc>, equity: f64) -> Option<DailyLimit> {
        if !self.is_enabled() {
            return None;
        }
        let pnl = self.day_pnl(now, equity);
        if self.profit_target > 0.0 && pnl >= self.profit_target {
            Some(DailyLimit::ProfitTarget { pnl })
        } else if self.max_loss > 0.0 && pnl <= -self.max_loss {
            Some(DailyLimit::MaxLoss { pnl })
        } else {
            None
        }
    }
}

// ── Total drawdown stop ───────────────────────────────────────────────────

/// Stops new entries for good once balance falls `max_percent` below the
/// highest balance seen.  Zero disables it.
#[derive(Debug, Clone)]
pub struct DrawdownGuard {
    max_percent: f64,
    peak:        Option<f64>,
    tripped:     Option<f64>,
}

impl DrawdownGuard {
    pub fn new(cfg: &AppConfig) -> Self {
        Self {
            max_percent: cfg.max_total_drawdown_percent,
            peak:        None,
            tripped:     None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_percent > 0.0
    }

    /// Update the high-water mark; returns the current drawdown in percent
    /// (0 at the peak, positive below it).
    pub fn observe(&mut self, balance: f64) -> f64 {
        let peak = match self.peak {
            Some(p) if p >= balance => p,
            _ => {
                self.peak = Some(balance);
                balance
            }
        };
        if peak <= 0.0 {
            return 0.0;
        }
        let drawdown = (peak - balance) / peak * 100.0;

        if self.is_enabled() && self.tripped.is_none() && drawdown >= self.max_percent {
            warn!(
                "Total drawdown {:.2}% from peak ${:.2} reached the {:.2}% limit, trading stopped",
                drawdown, peak, self.max_percent
            );
            self.tripped = Some(drawdown);
        }
        drawdown
    }

    /// Drawdown in percent at the moment the stop tripped, if it has.
    pub fn tripped(&self) -> Option<f64> {
        self.tripped
    }
}
