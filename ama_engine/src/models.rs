pub mod adx;
pub mod ama;
pub mod macd;
pub mod rsi;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one signal evaluation. Never persisted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Signal {
    Buy,
    Sell,
    None,
}

impl Signal {
    /// Direction a position would take on this signal.
    pub fn side(self) -> Option<Side> {
        match self {
            Signal::Buy => Some(Side::Buy),
            Signal::Sell => Some(Side::Sell),
            Signal::None => None,
        }
    }
}

/// Order / position direction: Buy is long, Sell is short.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// +1 for long, −1 for short.
    pub fn sign(self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }
}

/// Current top of book.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub time:          DateTime<Utc>,
    pub bid:           f64,
    pub ask:           f64,
    pub spread_points: f64,
}

/// Contract specification supplied by the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolInfo {
    pub name:       String,
    /// Smallest price increment (e.g. 0.00001 for a 5-digit FX pair)
    pub point:      f64,
    pub digits:     u32,
    /// Account-currency value of one point move for one lot
    pub tick_value: f64,
}

impl SymbolInfo {
    /// Five-digit FX major with a $1 point value per lot.
    pub fn fx_major(name: &str) -> Self {
        Self {
            name:       name.to_owned(),
            point:      0.000_01,
            digits:     5,
            tick_value: 1.0,
        }
    }

    /// One pip: ten points on fractional-pip quotes (3 or 5 digits).
    pub fn pip(&self) -> f64 {
        match self.digits {
            3 | 5 => self.point * 10.0,
            _ => self.point,
        }
    }

    /// Round a price to the symbol's quoted precision.
    pub fn normalize(&self, price: f64) -> f64 {
        let scale = 10f64.powi(self.digits as i32);
        (price * scale).round() / scale
    }
}

/// An open position as reported by the broker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub ticket:      u64,
    pub symbol:      String,
    pub side:        Side,
    pub volume:      f64,
    pub entry_price: f64,
    pub stop_loss:   f64,
    pub take_profit: f64,
    pub opened_at:   DateTime<Utc>,
}

/// Market order sent to the broker.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OrderRequest {
    pub symbol:      String,
    pub side:        Side,
    pub volume:      f64,
    /// Expected fill price (ask for buys, bid for sells)
    pub price:       f64,
    pub stop_loss:   f64,
    pub take_profit: f64,
    /// Maximum allowed slippage in points
    pub deviation:   u32,
    pub comment:     String,
    pub magic:       u64,
}

/// One OHLC bar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Kline {
    pub time:          DateTime<Utc>,
    pub open:          f64,
    pub high:          f64,
    pub low:           f64,
    pub close:         f64,
    /// Spread recorded for the bar, in points
    pub spread_points: Option<f64>,
}
