/// engine.rs — Per-tick orchestration
///
/// One call to `on_tick` runs to completion:
///
///   quote ─► P&L guards observe ─► trading hours ─► trailing stops
///                                                        │
///        signal ◄── snapshot ◄── spread guard ◄──────────┘
///          │
///          └─► drawdown stop ─► daily P&L guard ─► cooldown
///                                                     │
///                                              process_signal
///                                              ├─ None            → nothing
///                                              ├─ same direction  → hold
///                                              └─ opposite / flat → close, settle, open
///
/// The data source and broker are injected; nothing here knows whether it
/// is driving a live terminal or a replay.
use std::time::Duration;

use anyhow::Result;
use chrono::Duration as TimeDelta;
use tracing::{debug, info, warn};

use crate::config::{AppConfig, REQUIRED_FILTER_CONFIRMATIONS};
use crate::data::MarketData;
use crate::executor::Broker;
use crate::models::{OrderRequest, Quote, Side, Signal};
use crate::risk::{entry_price, DailyLimit, DailyPnlGuard, DrawdownGuard, RiskManager};
use crate::session::{TradeCooldown, TradingHours};
use crate::strategy::{SignalDecision, SignalEngine};
use crate::trailing::TrailingStop;

/// What a tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    MarketClosed,
    SpreadTooWide { spread_points: f64 },
    DailyLimit(DailyLimit),
    /// Balance fell too far below its high-water mark; no more entries
    DrawdownStop { drawdown_percent: f64 },
    /// Too soon after the last entry
    Cooldown { remaining: TimeDelta },
    NoSignal,
    /// Position already open in the signal's direction
    Held { ticket: u64 },
    Opened { ticket: u64, side: Side, volume: f64 },
    Reversed { closed: Vec<u64>, opened: u64, side: Side, volume: f64 },
    OrderRejected { code: Option<i64>, message: String },
    /// Opposite position could not be closed; reversal abandoned
    CloseRejected { ticket: u64, code: Option<i64>, message: String },
}

pub struct TradingEngine<D: MarketData, B: Broker> {
    cfg:    AppConfig,
    data:   D,
    broker: B,
    signal: SignalEngine,
    risk:   RiskManager,
    hours:  TradingHours,
    daily:  DailyPnlGuard,
    drawdown: DrawdownGuard,
    cooldown: TradeCooldown,
    trailing: TrailingStop,
    last_decision: Option<SignalDecision>,
}

impl<D: MarketData, B: Broker> TradingEngine<D, B> {
    pub fn new(cfg: AppConfig, data: D, broker: B) -> Self {
        let enabled = cfg.enabled_filter_count();
        if enabled < REQUIRED_FILTER_CONFIRMATIONS {
            warn!(
                "Only {} filter(s) enabled but {} confirmations are required: no signal can fire",
                enabled, REQUIRED_FILTER_CONFIRMATIONS
            );
        }
        info!(
            "Engine ready: {} AMA {}/{} gap≥{}% | ADX={} MACD={} RSI={} | risk {}% SL {} pts",
            cfg.symbol,
            cfg.ama_medium_period,
            cfg.ama_long_period,
            cfg.min_ama_gap_percent,
            cfg.use_adx_filter,
            cfg.use_macd_filter,
            cfg.use_rsi_filter,
            cfg.risk_percent,
            cfg.stop_loss_points,
        );
        if cfg.use_trailing_stop {
            info!(
                "Trailing stop: activate at {} pips, trail {} pips",
                cfg.trailing_activation_pips, cfg.trailing_distance_pips
            );
        }
        if cfg.trade_cooldown_minutes > 0 || cfg.max_total_drawdown_percent > 0.0 {
            info!(
                "Entry pacing: cooldown {} min, drawdown stop {}%",
                cfg.trade_cooldown_minutes, cfg.max_total_drawdown_percent
            );
        }

        Self {
            signal: SignalEngine::new(&cfg),
            risk:   RiskManager::new(&cfg),
            hours:  TradingHours::new(&cfg),
            daily:  DailyPnlGuard::new(&cfg),
            drawdown: DrawdownGuard::new(&cfg),
            cooldown: TradeCooldown::new(&cfg),
            trailing: TrailingStop::new(&cfg),
            cfg,
            data,
            broker,
            last_decision: None,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.cfg
    }

    pub fn data(&self) -> &D {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut D {
        &mut self.data
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    pub fn broker_mut(&mut self) -> &mut B {
        &mut self.broker
    }

    pub fn signal_engine(&self) -> &SignalEngine {
        &self.signal
    }

    /// Decision from the most recent evaluated tick.
    pub fn last_decision(&self) -> Option<&SignalDecision> {
        self.last_decision.as_ref()
    }

    /// Give back the collaborators.
    pub fn into_parts(self) -> (D, B) {
        (self.data, self.broker)
    }

    /// Evaluate one tick and act on it.
    pub fn on_tick(&mut self) -> Result<TickOutcome> {
        let quote = self.data.quote()?;

        // Every tick feeds the guards so the day's baseline and the
        // high-water mark are set before any signal shows up.
        if self.daily.is_enabled() {
            self.daily.observe(quote.time, self.broker.equity()?);
        }
        if self.drawdown.is_enabled() {
            self.drawdown.observe(self.broker.balance()?);
        }

        if !self.hours.is_open(quote.time) {
            debug!("Market closed at {}", quote.time);
            return Ok(TickOutcome::MarketClosed);
        }

        self.trail_stops(&quote)?;

        if let Some(outcome) = self.spread_guard(&quote) {
            return Ok(outcome);
        }

        let snap = self.data.snapshot(self.signal.lookback())?;
        let decision = self.signal.evaluate(&snap);
        let signal = decision.signal;
        self.last_decision = Some(decision);

        if signal == Signal::None {
            return Ok(TickOutcome::NoSignal);
        }

        if let Some(drawdown_percent) = self.drawdown.tripped() {
            debug!("Drawdown stop active ({:.2}%), ignoring {:?}", drawdown_percent, signal);
            return Ok(TickOutcome::DrawdownStop { drawdown_percent });
        }
        let equity = self.broker.equity()?;
        if let Some(limit) = self.daily.check(quote.time, equity) {
            warn!("Daily limit reached ({:?}), no new trades today", limit);
            return Ok(TickOutcome::DailyLimit(limit));
        }
        if let Some(remaining) = self.cooldown.remaining(quote.time) {
            debug!("Cooldown active, {}s until the next entry", remaining.num_seconds());
            return Ok(TickOutcome::Cooldown { remaining });
        }

        let outcome = self.process_signal(signal, &quote)?;
        if matches!(outcome, TickOutcome::Opened { .. } | TickOutcome::Reversed { .. }) {
            self.cooldown.record(quote.time);
        }
        Ok(outcome)
    }

    fn spread_guard(&self, quote: &Quote) -> Option<TickOutcome> {
        if quote.spread_points <= self.cfg.max_spread_points {
            return None;
        }
        debug!(
            "Spread {:.1} pts above limit {:.1}, skipping",
            quote.spread_points, self.cfg.max_spread_points
        );
        Some(TickOutcome::SpreadTooWide { spread_points: quote.spread_points })
    }

    /// Move trailing stops of open positions; returns how many moved.
    ///
    /// A rejected modification is logged and retried on the next tick.
    pub fn trail_stops(&mut self, quote: &Quote) -> Result<usize> {
        if !self.trailing.is_enabled() {
            return Ok(0);
        }
        let positions = self.broker.positions(&self.cfg.symbol)?;
        let open: Vec<u64> = positions.iter().map(|p| p.ticket).collect();
        self.trailing.retain_open(&open);

        let symbol = self.data.symbol_info().clone();
        let mut moved = 0;
        for p in &positions {
            let Some(stop_loss) = self.trailing.update(p, quote, &symbol) else {
                continue;
            };
            match self.broker.modify_stops(p.ticket, stop_loss, p.take_profit) {
                Ok(()) => {
                    info!("Trailed {:?} #{} stop {:.5} → {:.5}", p.side, p.ticket, p.stop_loss, stop_loss);
                    moved += 1;
                }
                Err(e) => warn!("Trailing #{} to {:.5} failed (retcode {:?}): {}", p.ticket, stop_loss, e.code(), e),
            }
        }
        Ok(moved)
    }

    /// Act on a signal against the broker's current position.
    pub fn process_signal(&mut self, signal: Signal, quote: &Quote) -> Result<TickOutcome> {
        let Some(side) = signal.side() else {
            return Ok(TickOutcome::NoSignal);
        };

        let positions = self.broker.positions(&self.cfg.symbol)?;
        if let Some(p) = positions.iter().find(|p| p.side == side) {
            debug!("Already {:?} with #{}, holding", side, p.ticket);
            return Ok(TickOutcome::Held { ticket: p.ticket });
        }

        let opposite: Vec<u64> = positions
            .iter()
            .filter(|p| p.side == side.opposite())
            .map(|p| p.ticket)
            .collect();
        if opposite.is_empty() {
            return self.open(side, quote);
        }

        for &ticket in &opposite {
            info!("Reversing: closing {:?} #{}", side.opposite(), ticket);
            if let Err(e) = self.broker.close_position(ticket) {
                warn!("Close of #{} failed (retcode {:?}): {}", ticket, e.code(), e);
                return Ok(TickOutcome::CloseRejected {
                    ticket,
                    code: e.code(),
                    message: e.to_string(),
                });
            }
        }
        self.broker.settle(Duration::from_millis(self.cfg.settle_delay_ms));

        let quote = self.data.quote()?;
        if let Some(outcome) = self.spread_guard(&quote) {
            warn!("Spread widened to {:.1} pts while reversing, new {:?} not opened", quote.spread_points, side);
            return Ok(outcome);
        }
        match self.open(side, &quote)? {
            TickOutcome::Opened { ticket, side, volume } => Ok(TickOutcome::Reversed {
                closed: opposite,
                opened: ticket,
                side,
                volume,
            }),
            other => Ok(other),
        }
    }

    fn open(&mut self, side: Side, quote: &Quote) -> Result<TickOutcome> {
        let symbol = self.data.symbol_info().clone();
        let balance = self.broker.balance()?;
        let distance = self.risk.stop_distance(&symbol);
        let volume = self.risk.lot_size(balance, distance, &symbol);
        let (stop_loss, take_profit) = self.risk.protective_levels(side, quote, &symbol);

        let request = OrderRequest {
            symbol:      self.cfg.symbol.clone(),
            side,
            volume,
            price:       entry_price(side, quote),
            stop_loss,
            take_profit,
            deviation:   self.cfg.max_slippage_points,
            comment:     self.cfg.order_comment.clone(),
            magic:       self.cfg.magic_number,
        };

        match self.broker.submit_order(&request) {
            Ok(position) => {
                info!(
                    "Opened {:?} #{} {:.2} lots @ {:.5} SL {:.5} TP {:.5}",
                    side, position.ticket, volume, request.price, stop_loss, take_profit
                );
                Ok(TickOutcome::Opened { ticket: position.ticket, side, volume })
            }
            Err(e) => {
                warn!("Order {:?} {:.2} lots failed (retcode {:?}): {}", side, volume, e.code(), e);
                Ok(TickOutcome::OrderRejected { code: e.code(), message: e.to_string() })
            }
        }
    }
}
