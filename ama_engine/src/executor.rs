/// executor.rs — Broker interface and the paper broker used for backtests
///
/// The engine only ever talks to a `Broker`: balance, open positions for a
/// symbol, market order submission, stop modification and closing by ticket.  Calls are
/// blocking.  Failures carry the broker's retcode so the caller can log it.
///
/// PaperBroker fills market orders at the request price, checks protective
/// levels against each bar's range (stop first when one bar touches both)
/// and keeps a journal of closed trades in account currency.
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::models::{Kline, OrderRequest, Position, Quote, Side, SymbolInfo};

/// Broker return codes surfaced by the paper broker (MT5 numbering).
pub mod retcode {
    pub const INVALID_VOLUME: i64 = 10014;
    pub const INVALID_STOPS:  i64 = 10016;
    pub const NO_PRICES:      i64 = 10021;
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BrokerError {
    #[error("order rejected (retcode {code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("invalid stops: sl={stop_loss} tp={take_profit} around {price}")]
    InvalidStops { price: f64, stop_loss: f64, take_profit: f64 },

    #[error("unknown position ticket {0}")]
    UnknownTicket(u64),

    #[error("broker unavailable: {0}")]
    Unavailable(String),
}

impl BrokerError {
    /// Broker retcode, when one applies.
    pub fn code(&self) -> Option<i64> {
        match self {
            BrokerError::Rejected { code, .. } => Some(*code),
            BrokerError::InvalidStops { .. } => Some(retcode::INVALID_STOPS),
            BrokerError::UnknownTicket(_) | BrokerError::Unavailable(_) => None,
        }
    }
}

pub trait Broker {
    fn balance(&self) -> Result<f64, BrokerError>;

    /// Balance plus open P&L.  Defaults to the balance.
    fn equity(&self) -> Result<f64, BrokerError> {
        self.balance()
    }

    fn positions(&self, symbol: &str) -> Result<Vec<Position>, BrokerError>;

    /// Submit a market order; returns the opened position.
    fn submit_order(&mut self, request: &OrderRequest) -> Result<Position, BrokerError>;

    fn close_position(&mut self, ticket: u64) -> Result<(), BrokerError>;

    /// Replace the protective levels of an open position.
    fn modify_stops(&mut self, ticket: u64, stop_loss: f64, take_profit: f64) -> Result<(), BrokerError>;

    /// Wait for a close to settle before re-opening.
    fn settle(&mut self, delay: Duration) {
        std::thread::sleep(delay);
    }
}

// ── Paper broker ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    /// Closed by the engine on an opposite signal
    Reversal,
    EndOfData,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClosedTrade {
    pub ticket:      u64,
    pub side:        Side,
    pub volume:      f64,
    pub entry_price: f64,
    pub exit_price:  f64,
    pub opened_at:   DateTime<Utc>,
    pub closed_at:   DateTime<Utc>,
    /// Account currency
    pub pnl:         f64,
    pub reason:      ExitReason,
}

impl ClosedTrade {
    /// P&L as a fraction of the balance before the trade closed.
    pub fn return_frac(&self, balance_before: f64) -> f64 {
        if balance_before.abs() < 1e-12 {
            0.0
        } else {
            self.pnl / balance_before
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaperBroker {
    symbol:      SymbolInfo,
    balance:     f64,
    positions:   Vec<Position>,
    journal:     Vec<ClosedTrade>,
    quote:       Option<Quote>,
    next_ticket: u64,
}

impl PaperBroker {
    pub fn new(symbol: SymbolInfo, initial_balance: f64) -> Self {
        Self {
            symbol,
            balance: initial_balance,
            positions: Vec::new(),
            journal: Vec::new(),
            quote: None,
            next_ticket: 1,
        }
    }

    /// Latest top of book; closes and open P&L use it.
    pub fn set_quote(&mut self, quote: Quote) {
        self.quote = Some(quote);
    }

    pub fn journal(&self) -> &[ClosedTrade] {
        &self.journal
    }

    pub fn open_positions(&self) -> &[Position] {
        &self.positions
    }

    /// Close positions whose stop or target lies inside `bar`'s range.
    ///
    /// Bars are bid prices; shorts are tested against bid + current spread.
    /// When a bar touches both levels the stop is assumed to fill first.
    pub fn mark_bar(&mut self, bar: &Kline) -> Vec<ClosedTrade> {
        let spread = self.quote.map(|q| q.ask - q.bid).unwrap_or(0.0);
        let mut hits = Vec::new();
        for p in &self.positions {
            let hit = match p.side {
                Side::Buy if bar.low <= p.stop_loss => Some((p.stop_loss, ExitReason::StopLoss)),
                Side::Buy if bar.high >= p.take_profit => Some((p.take_profit, ExitReason::TakeProfit)),
                Side::Sell if bar.high + spread >= p.stop_loss => Some((p.stop_loss, ExitReason::StopLoss)),
                Side::Sell if bar.low + spread <= p.take_profit => Some((p.take_profit, ExitReason::TakeProfit)),
                _ => None,
            };
            if let Some((price, reason)) = hit {
                hits.push((p.ticket, price, reason));
            }
        }

        hits.into_iter()
            .filter_map(|(ticket, price, reason)| self.close_at(ticket, price, bar.time, reason))
            .collect()
    }

    /// Close everything at the current quote.
    pub fn flatten(&mut self, reason: ExitReason) -> Vec<ClosedTrade> {
        let Some(quote) = self.quote else {
            return Vec::new();
        };
        let open: Vec<(u64, Side)> = self.positions.iter().map(|p| (p.ticket, p.side)).collect();
        open.into_iter()
            .filter_map(|(ticket, side)| self.close_at(ticket, exit_price(side, &quote), quote.time, reason))
            .collect()
    }

    fn pnl(&self, side: Side, volume: f64, entry: f64, exit: f64) -> f64 {
        (exit - entry) * side.sign() * volume * self.symbol.tick_value / self.symbol.point
    }

    fn close_at(&mut self, ticket: u64, price: f64, time: DateTime<Utc>, reason: ExitReason) -> Option<ClosedTrade> {
        let idx = self.positions.iter().position(|p| p.ticket == ticket)?;
        let p = self.positions.remove(idx);
        let pnl = self.pnl(p.side, p.volume, p.entry_price, price);
        self.balance += pnl;

        let trade = ClosedTrade {
            ticket,
            side: p.side,
            volume: p.volume,
            entry_price: p.entry_price,
            exit_price: price,
            opened_at: p.opened_at,
            closed_at: time,
            pnl,
            reason,
        };
        info!(
            "Closed #{} {:?} {:.2} lots @ {:.5} ({:?}) P&L ${:+.2} → balance ${:.2}",
            ticket, p.side, p.volume, price, reason, pnl, self.balance
        );
        self.journal.push(trade.clone());
        Some(trade)
    }
}

/// Quote side a position closes against.
fn exit_price(side: Side, quote: &Quote) -> f64 {
    match side {
        Side::Buy => quote.bid,
        Side::Sell => quote.ask,
    }
}

impl Broker for PaperBroker {
    fn balance(&self) -> Result<f64, BrokerError> {
        Ok(self.balance)
    }

    fn equity(&self) -> Result<f64, BrokerError> {
        let Some(quote) = self.quote else {
            return Ok(self.balance);
        };
        let open: f64 = self
            .positions
            .iter()
            .map(|p| self.pnl(p.side, p.volume, p.entry_price, exit_price(p.side, &quote)))
            .sum();
        Ok(self.balance + open)
    }

    fn positions(&self, symbol: &str) -> Result<Vec<Position>, BrokerError> {
        Ok(self.positions.iter().filter(|p| p.symbol == symbol).cloned().collect())
    }

    fn submit_order(&mut self, request: &OrderRequest) -> Result<Position, BrokerError> {
        let Some(quote) = self.quote else {
            return Err(BrokerError::Rejected {
                code: retcode::NO_PRICES,
                message: "no quote".into(),
            });
        };
        if request.volume.is_nan() || request.volume <= 0.0 {
            return Err(BrokerError::Rejected {
                code: retcode::INVALID_VOLUME,
                message: format!("volume {}", request.volume),
            });
        }
        let sign = request.side.sign();
        if (request.price - request.stop_loss) * sign <= 0.0 || (request.take_profit - request.price) * sign <= 0.0 {
            return Err(BrokerError::InvalidStops {
                price:       request.price,
                stop_loss:   request.stop_loss,
                take_profit: request.take_profit,
            });
        }

        let position = Position {
            ticket:      self.next_ticket,
            symbol:      request.symbol.clone(),
            side:        request.side,
            volume:      request.volume,
            entry_price: request.price,
            stop_loss:   request.stop_loss,
            take_profit: request.take_profit,
            opened_at:   quote.time,
        };
        self.next_ticket += 1;
        self.positions.push(position.clone());
        Ok(position)
    }

    fn close_position(&mut self, ticket: u64) -> Result<(), BrokerError> {
        let quote = self
            .quote
            .ok_or_else(|| BrokerError::Unavailable("no quote to close against".into()))?;
        let side = self
            .positions
            .iter()
            .find(|p| p.ticket == ticket)
            .map(|p| p.side)
            .ok_or(BrokerError::UnknownTicket(ticket))?;
        self.close_at(ticket, exit_price(side, &quote), quote.time, ExitReason::Reversal);
        Ok(())
    }

    /// Levels must sit on the right side of the price the position would
    /// close at; a zero take-profit means none.
    fn modify_stops(&mut self, ticket: u64, stop_loss: f64, take_profit: f64) -> Result<(), BrokerError> {
        let quote = self
            .quote
            .ok_or_else(|| BrokerError::Unavailable("no quote to check stops against".into()))?;
        let position = self
            .positions
            .iter_mut()
            .find(|p| p.ticket == ticket)
            .ok_or(BrokerError::UnknownTicket(ticket))?;

        let price = exit_price(position.side, &quote);
        let sign = position.side.sign();
        let sl_ok = (price - stop_loss) * sign > 0.0;
        let tp_ok = take_profit == 0.0 || (take_profit - price) * sign > 0.0;
        if !(sl_ok && tp_ok) {
            return Err(BrokerError::InvalidStops { price, stop_loss, take_profit });
        }

        position.stop_loss = stop_loss;
        position.take_profit = take_profit;
        Ok(())
    }

    /// Simulated time; nothing to wait for.
    fn settle(&mut self, _delay: Duration) {}
}
