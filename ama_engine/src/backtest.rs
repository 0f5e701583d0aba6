/// backtest.rs — Bar-driven backtest of the trading engine
///
/// Each bar is one tick.  The engine runs against a `BarReplay` data source
/// and a `PaperBroker`, exactly as it would against a live terminal.
///
/// ARCHITECTURE
/// ┌─────────────────────────────────────────────────────┐
/// │  Bar Feed (Vec<Kline>)                              │
/// │        │                                            │
/// │        ▼                                            │
/// │  replay.advance_to(i)  → quote, indicator buffers   │
/// │  broker.set_quote()                                 │
/// │  broker.mark_bar()     → SL / TP fills on bar range │
/// │        │                                            │
/// │   ┌────┴──────────────────────────────────┐         │
/// │   │  TradingEngine::on_tick               │         │
/// │   │  ├─ hours guard, trailing stops       │         │
/// │   │  ├─ spread guard                      │         │
/// │   │  ├─ SignalEngine.evaluate(snapshot)   │         │
/// │   │  ├─ drawdown / daily / cooldown       │         │
/// │   │  └─ process_signal → broker orders    │         │
/// │   └───────────────────────────────────────┘         │
/// │        │                                            │
/// │   equity_curve[t] = broker.equity()                 │
/// └─────────────────────────────────────────────────────┘
use anyhow::{bail, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::data::{BarReplay, MarketData};
use crate::engine::{TickOutcome, TradingEngine};
use crate::executor::{Broker, ClosedTrade, ExitReason, PaperBroker};
use crate::metrics::{compute_metrics, PerfReport};
use crate::models::{Kline, SymbolInfo};

/// Backtest run parameters (separate from strategy config).
#[derive(Debug, Clone)]
pub struct BacktestConfig {
    /// Log every order (true) or only the summary (false)
    pub verbose: bool,
    /// Bars per year (for annualisation in metrics)
    pub bars_per_year: f64,
    /// Spread applied to bars without a recorded one
    pub default_spread_points: f64,
    /// Contract spec; defaults to a five-digit FX major named after the config symbol
    pub symbol: Option<SymbolInfo>,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        // M15 bars, 24h × 5d × 52w
        Self {
            verbose: false,
            bars_per_year: 24_960.0,
            default_spread_points: 10.0,
            symbol: None,
        }
    }
}

/// Tally of tick outcomes over a run.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct TickCounts {
    pub market_closed:   usize,
    pub spread_too_wide: usize,
    pub daily_limit:     usize,
    pub drawdown_stop:   usize,
    pub cooldown:        usize,
    pub no_signal:       usize,
    pub held:            usize,
    pub opened:          usize,
    pub reversed:        usize,
    pub rejected:        usize,
    pub errors:          usize,
}

impl TickCounts {
    fn record(&mut self, outcome: &TickOutcome) {
        match outcome {
            TickOutcome::MarketClosed => self.market_closed += 1,
            TickOutcome::SpreadTooWide { .. } => self.spread_too_wide += 1,
            TickOutcome::DailyLimit(_) => self.daily_limit += 1,
            TickOutcome::DrawdownStop { .. } => self.drawdown_stop += 1,
            TickOutcome::Cooldown { .. } => self.cooldown += 1,
            TickOutcome::NoSignal => self.no_signal += 1,
            TickOutcome::Held { .. } => self.held += 1,
            TickOutcome::Opened { .. } => self.opened += 1,
            TickOutcome::Reversed { .. } => self.reversed += 1,
            TickOutcome::OrderRejected { .. } | TickOutcome::CloseRejected { .. } => self.rejected += 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BacktestResult {
    pub report:       PerfReport,
    pub ticks:        TickCounts,
    pub trades:       Vec<ClosedTrade>,
    pub equity_curve: Vec<f64>,
}

/// Run a complete backtest over a kline series (oldest-first).
pub fn run_backtest(klines: Vec<Kline>, cfg: AppConfig, bt_cfg: &BacktestConfig) -> Result<BacktestResult> {
    if klines.len() < 2 {
        bail!("backtest requires at least 2 bars, got {}", klines.len());
    }

    let symbol = bt_cfg
        .symbol
        .clone()
        .unwrap_or_else(|| SymbolInfo::fx_major(&cfg.symbol));
    let initial_equity = cfg.initial_balance;
    let replay = BarReplay::new(klines, symbol.clone(), &cfg, bt_cfg.default_spread_points)?;
    let broker = PaperBroker::new(symbol, initial_equity);
    let mut engine = TradingEngine::new(cfg, replay, broker);

    let n_bars = engine.data().len();
    let mut equity_curve: Vec<f64> = Vec::with_capacity(n_bars);
    let mut ticks = TickCounts::default();

    if bt_cfg.verbose {
        info!("═══════════════════════════════════════════════");
        info!("  AMA CROSSOVER BACKTEST — {} bars", n_bars);
        info!("═══════════════════════════════════════════════");
    }

    // ── Main event loop ───────────────────────────────────────────────────
    for i in 0..n_bars {
        engine.data_mut().advance_to(i);
        let quote = engine.data().quote()?;
        let bar = engine.data().current().clone();

        engine.broker_mut().set_quote(quote);
        // Positions opened on earlier bars can be stopped out inside this one
        engine.broker_mut().mark_bar(&bar);

        match engine.on_tick() {
            Ok(outcome) => {
                if bt_cfg.verbose && matches!(outcome, TickOutcome::Opened { .. } | TickOutcome::Reversed { .. }) {
                    info!("  [Bar {:>6}] {} {:?}", i, bar.time, outcome);
                }
                ticks.record(&outcome);
            }
            Err(e) => {
                warn!("Tick {} ({}) failed: {:#}", i, bar.time, e);
                ticks.errors += 1;
            }
        }

        equity_curve.push(engine.broker().equity()?);
    }

    // ── Force-close any remaining open position at last quote ─────────────
    engine.broker_mut().flatten(ExitReason::EndOfData);
    let final_equity = engine.broker().balance()?;
    if let Some(last) = equity_curve.last_mut() {
        *last = final_equity;
    }

    let (_, broker) = engine.into_parts();
    let trades = broker.journal().to_vec();
    let report = compute_metrics(&trades, &equity_curve, initial_equity, bt_cfg.bars_per_year);

    if bt_cfg.verbose {
        info!("\n{}", report);
    }
    Ok(BacktestResult { report, ticks, trades, equity_curve })
}

/// Print a table of closed trades (top N by absolute P&L).
pub fn print_trade_log(trades: &[ClosedTrade], top_n: usize) {
    let mut sorted: Vec<&ClosedTrade> = trades.iter().collect();
    sorted.sort_by(|a, b| b.pnl.abs().total_cmp(&a.pnl.abs()));

    println!(
        "\n{:<6} {:<5} {:<6} {:<10} {:<10} {:<11} {:<10}",
        "TICKET", "DIR", "LOTS", "ENTRY", "EXIT", "PNL", "REASON"
    );
    println!("{}", "─".repeat(64));

    for t in sorted.into_iter().take(top_n) {
        println!(
            "{:<6} {:<5} {:<6.2} {:<10.5} {:<10.5} {:<+11.2} {:?}",
            t.ticket,
            format!("{:?}", t.side).to_uppercase(),
            t.volume,
            t.entry_price,
            t.exit_price,
            t.pnl,
            t.reason,
        );
    }
}
