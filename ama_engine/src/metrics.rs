/// metrics.rs — Performance Metrics
///
/// ─────────────────────────────────────────────────────────────────────────
/// MATHEMATICAL SPECIFICATION
/// ─────────────────────────────────────────────────────────────────────────
///
/// TRADE STATISTICS (account currency)
///   WinRate       = count(pnl > 0) / N_trades
///   AvgWin        = mean(pnl | pnl > 0)
///   AvgLoss       = mean(|pnl| | pnl ≤ 0)
///   ProfitFactor  = Σ gains / Σ |losses|      (∞ with no losing trade)
///   NetProfit     = Σ pnl
///
/// SHARPE RATIO (annualised, per-bar equity returns)
///   r_t = E_t / E_{t−1} − 1
///   SR  = mean(r) / std(r) × √N_annual        (r_f = 0)
///
/// SORTINO RATIO
///   σ_d = √(mean(min(r_t, 0)²))
///   SoR = mean(r) / σ_d × √N_annual
///
/// MAXIMUM DRAWDOWN
///   peak_t = max_{s ≤ t}(E_s)
///   MaxDD  = min_t (E_t − peak_t) / peak_t    (most negative)
/// ─────────────────────────────────────────────────────────────────────────
use std::fmt;

use serde::Serialize;

use crate::executor::ClosedTrade;

/// Backtest performance summary, in account currency unless noted.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PerfReport {
    pub n_trades:          usize,
    pub win_rate:          f64,
    pub avg_win:           f64,
    /// Positive
    pub avg_loss:          f64,
    pub profit_factor:     f64,
    pub net_profit:        f64,
    /// Fraction of initial equity
    pub total_return:      f64,
    pub sharpe:            f64,
    pub sortino:           f64,
    /// Fraction, ≤ 0
    pub max_drawdown:      f64,
    /// Bars from the drawdown's peak to its trough
    pub max_drawdown_bars: usize,
    pub initial_equity:    f64,
    pub final_equity:      f64,
}

impl fmt::Display for PerfReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "─".repeat(46);
        writeln!(f, "{rule}")?;
        writeln!(f, " AMA crossover backtest")?;
        writeln!(f, "{rule}")?;
        writeln!(
            f,
            " trades {:>5}   won {:>6.2}%   PF {:>7.3}",
            self.n_trades,
            self.win_rate * 100.0,
            self.profit_factor
        )?;
        writeln!(f, " avg win  {:>+12.2}   avg loss {:>12.2}", self.avg_win, -self.avg_loss)?;
        writeln!(
            f,
            " net      {:>+12.2}   return   {:>+11.2}%",
            self.net_profit,
            self.total_return * 100.0
        )?;
        writeln!(f, " sharpe   {:>12.3}   sortino  {:>12.3}", self.sharpe, self.sortino)?;
        writeln!(
            f,
            " max DD   {:>11.2}%   over {} bars",
            self.max_drawdown * 100.0,
            self.max_drawdown_bars
        )?;
        writeln!(f, " equity   {:.2} → {:.2}", self.initial_equity, self.final_equity)?;
        write!(f, "{rule}")
    }
}

/// Summarise a run from the broker journal and the per-bar equity curve.
pub fn compute_metrics(
    trades:         &[ClosedTrade],
    equity_curve:   &[f64],
    initial_equity: f64,
    bars_per_year:  f64,
) -> PerfReport {
    let final_equity = equity_curve.last().copied().unwrap_or(initial_equity);
    let total_return = if initial_equity.abs() < 1e-12 {
        0.0
    } else {
        (final_equity - initial_equity) / initial_equity
    };

    // ── Per-trade statistics ──────────────────────────────────────────────
    let n = trades.len();
    let gains:  Vec<f64> = trades.iter().map(|t| t.pnl).filter(|&p| p > 0.0).collect();
    let losses: Vec<f64> = trades.iter().map(|t| t.pnl).filter(|&p| p <= 0.0).map(f64::abs).collect();

    let win_rate = if n == 0 { 0.0 } else { gains.len() as f64 / n as f64 };
    let win_stats = Moments::of(gains.iter().copied());
    let loss_stats = Moments::of(losses.iter().copied());
    let gross_win:  f64 = gains.iter().sum();
    let gross_loss: f64 = losses.iter().sum();
    let profit_factor = if n == 0 {
        0.0
    } else if gross_loss < 1e-10 {
        f64::INFINITY
    } else {
        gross_win / gross_loss
    };

    // ── Sharpe / Sortino over per-bar equity returns ──────────────────────
    let returns: Vec<f64> = equity_curve
        .windows(2)
        .filter(|w| w[0].abs() > 1e-12)
        .map(|w| w[1] / w[0] - 1.0)
        .collect();
    let r = Moments::of(returns.iter().copied());
    let r_mean = r.mean().unwrap_or(0.0);
    let annual = bars_per_year.sqrt();
    let sharpe = ratio(r_mean, r.sample_std()) * annual;

    let downside = Moments::of(returns.iter().map(|&x| x.min(0.0).powi(2)));
    let sortino = ratio(r_mean, downside.mean().unwrap_or(0.0).sqrt()) * annual;
    let dd = deepest_drawdown(equity_curve);

    PerfReport {
        n_trades: n,
        win_rate,
        avg_win: win_stats.mean().unwrap_or(0.0),
        avg_loss: loss_stats.mean().unwrap_or(0.0),
        profit_factor,
        net_profit: trades.iter().map(|t| t.pnl).sum(),
        total_return,
        sharpe,
        sortino,
        max_drawdown: dd.depth,
        max_drawdown_bars: dd.trough_index - dd.peak_index,
        initial_equity,
        final_equity,
    }
}

/// Deepest peak-to-trough fall of an equity curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Drawdown {
    /// (trough − peak) / peak, ≤ 0
    pub depth:        f64,
    pub peak_index:   usize,
    pub trough_index: usize,
}

pub fn deepest_drawdown(equity_curve: &[f64]) -> Drawdown {
    let flat = Drawdown { depth: 0.0, peak_index: 0, trough_index: 0 };
    let mut peak = (0, f64::NEG_INFINITY);

    equity_curve.iter().enumerate().fold(flat, |worst, (i, &e)| {
        if e > peak.1 {
            peak = (i, e);
        }
        if peak.1 <= 0.0 {
            return worst;
        }
        let depth = (e - peak.1) / peak.1;
        if depth < worst.depth {
            Drawdown { depth, peak_index: peak.0, trough_index: i }
        } else {
            worst
        }
    })
}

/// Deepest drawdown as a fraction (e.g. −0.15).
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    deepest_drawdown(equity_curve).depth
}

/// `num / den`, or 0 when the denominator vanishes.
fn ratio(num: f64, den: f64) -> f64 {
    if den < 1e-12 { 0.0 } else { num / den }
}

/// Running count, mean and squared deviations (Welford).
#[derive(Debug, Clone, Copy, Default)]
struct Moments {
    n:    usize,
    mean: f64,
    m2:   f64,
}

impl Moments {
    fn of(values: impl Iterator<Item = f64>) -> Self {
        values.fold(Self::default(), |mut m, x| {
            m.n += 1;
            let delta = x - m.mean;
            m.mean += delta / m.n as f64;
            m.m2 += delta * (x - m.mean);
            m
        })
    }

    fn mean(&self) -> Option<f64> {
        (self.n > 0).then_some(self.mean)
    }

    fn sample_std(&self) -> f64 {
        if self.n < 2 { 0.0 } else { (self.m2 / (self.n - 1) as f64).sqrt() }
    }
}
