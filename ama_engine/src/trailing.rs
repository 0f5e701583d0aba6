/// trailing.rs — Pip-based trailing stop
///
///   long : best = max(bid since first seen)    profit = (bid − entry) / pip
///   short: best = min(ask since first seen)    profit = (entry − ask) / pip
///
/// Once profit reaches `activation` pips the stop follows `best` at
/// `distance` pips and only ever moves in the trade's favour.  Activation
/// is sticky per ticket: a pull-back below the activation level keeps
/// trailing.
use std::collections::HashMap;

use tracing::info;

use crate::config::AppConfig;
use crate::models::{Position, Quote, Side, SymbolInfo};

#[derive(Debug, Clone, Copy)]
struct TrailState {
    best:   f64,
    active: bool,
}

#[derive(Debug, Clone)]
pub struct TrailingStop {
    enabled:         bool,
    activation_pips: f64,
    distance_pips:   f64,
    states:          HashMap<u64, TrailState>,
}

impl TrailingStop {
    pub fn new(cfg: &AppConfig) -> Self {
        Self {
            enabled:         cfg.use_trailing_stop,
            activation_pips: cfg.trailing_activation_pips,
            distance_pips:   cfg.trailing_distance_pips,
            states:          HashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Stop level `position` should move to, or `None` to leave it.
    pub fn update(&mut self, position: &Position, quote: &Quote, symbol: &SymbolInfo) -> Option<f64> {
        if !self.enabled {
            return None;
        }
        let pip = symbol.pip();
        let current = match position.side {
            Side::Buy => quote.bid,
            Side::Sell => quote.ask,
        };
        let state = self
            .states
            .entry(position.ticket)
            .or_insert(TrailState { best: current, active: false });

        let profit_pips = match position.side {
            Side::Buy => {
                state.best = state.best.max(current);
                (current - position.entry_price) / pip
            }
            Side::Sell => {
                state.best = state.best.min(current);
                (position.entry_price - current) / pip
            }
        };

        if !state.active && profit_pips >= self.activation_pips {
            state.active = true;
            info!(
                "Trailing stop active for {:?} #{} at {:.1} pips profit",
                position.side, position.ticket, profit_pips
            );
        }
        if !state.active {
            return None;
        }

        let sign = position.side.sign();
        let candidate = symbol.normalize(state.best - sign * self.distance_pips * pip);
        let unset = position.stop_loss <= 0.0;
        let tighter = (candidate - position.stop_loss) * sign > symbol.point * 0.5;
        (unset || tighter).then_some(candidate)
    }

    /// Drop state for tickets that are no longer open.
    pub fn retain_open(&mut self, open: &[u64]) {
        self.states.retain(|ticket, _| open.contains(ticket));
    }
}
