use std::cell::RefCell;
use std::collections::VecDeque;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};

use ama_engine::config::AppConfig;
use ama_engine::data::{IndicatorSnapshot, MacdBuffers, MarketData};
use ama_engine::engine::{TickOutcome, TradingEngine};
use ama_engine::executor::{Broker, BrokerError};
use ama_engine::models::{OrderRequest, Position, Quote, Side, SymbolInfo};
use ama_engine::risk::DailyLimit;

// ── Test doubles ──────────────────────────────────────────────────────────

struct FakeData {
    symbol:   SymbolInfo,
    quote:    Quote,
    snap:     IndicatorSnapshot,
    /// Served one per `quote()` call before falling back to `quote`
    requotes: RefCell<VecDeque<Quote>>,
}

impl MarketData for FakeData {
    fn symbol_info(&self) -> &SymbolInfo {
        &self.symbol
    }

    fn quote(&self) -> Result<Quote> {
        Ok(self.requotes.borrow_mut().pop_front().unwrap_or(self.quote))
    }

    fn ama_prices(&self, count: usize) -> Result<Vec<f64>> {
        Ok(self.snap.ama_prices.iter().take(count).copied().collect())
    }

    fn macd(&self, count: usize) -> Result<MacdBuffers> {
        let take = |v: &Vec<f64>| -> Vec<f64> { v.iter().take(count).copied().collect() };
        Ok(MacdBuffers {
            main:      take(&self.snap.macd.main),
            signal:    take(&self.snap.macd.signal),
            histogram: take(&self.snap.macd.histogram),
        })
    }

    fn adx(&self, count: usize) -> Result<Vec<f64>> {
        Ok(self.snap.adx.iter().take(count).copied().collect())
    }

    fn rsi(&self, count: usize) -> Result<Vec<f64>> {
        Ok(self.snap.rsi.iter().take(count).copied().collect())
    }
}

#[derive(Default)]
struct FakeBroker {
    balance:     f64,
    equity:      Option<f64>,
    positions:   Vec<Position>,
    orders:      Vec<OrderRequest>,
    closed:      Vec<u64>,
    modified:    Vec<(u64, f64, f64)>,
    settles:     Vec<Duration>,
    fail_close:  bool,
    reject_with: Option<BrokerError>,
}

impl Broker for FakeBroker {
    fn balance(&self) -> Result<f64, BrokerError> {
        Ok(self.balance)
    }

    fn equity(&self) -> Result<f64, BrokerError> {
        Ok(self.equity.unwrap_or(self.balance))
    }

    fn positions(&self, symbol: &str) -> Result<Vec<Position>, BrokerError> {
        Ok(self.positions.iter().filter(|p| p.symbol == symbol).cloned().collect())
    }

    fn submit_order(&mut self, request: &OrderRequest) -> Result<Position, BrokerError> {
        self.orders.push(request.clone());
        if let Some(err) = self.reject_with.clone() {
            return Err(err);
        }
        let position = Position {
            ticket:      100 + self.orders.len() as u64,
            symbol:      request.symbol.clone(),
            side:        request.side,
            volume:      request.volume,
            entry_price: request.price,
            stop_loss:   request.stop_loss,
            take_profit: request.take_profit,
            opened_at:   wednesday(),
        };
        self.positions.push(position.clone());
        Ok(position)
    }

    fn close_position(&mut self, ticket: u64) -> Result<(), BrokerError> {
        if self.fail_close {
            return Err(BrokerError::Rejected { code: 10018, message: "market closed".into() });
        }
        self.positions.retain(|p| p.ticket != ticket);
        self.closed.push(ticket);
        Ok(())
    }

    fn modify_stops(&mut self, ticket: u64, stop_loss: f64, take_profit: f64) -> Result<(), BrokerError> {
        let p = self
            .positions
            .iter_mut()
            .find(|p| p.ticket == ticket)
            .ok_or(BrokerError::UnknownTicket(ticket))?;
        p.stop_loss = stop_loss;
        p.take_profit = take_profit;
        self.modified.push((ticket, stop_loss, take_profit));
        Ok(())
    }

    fn settle(&mut self, delay: Duration) {
        self.settles.push(delay);
    }
}

// ── Fixtures ──────────────────────────────────────────────────────────────

fn wednesday() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 6, 12, 0, 0).unwrap()
}

fn config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.ama_medium_period = 2;
    cfg.ama_long_period = 4;
    cfg
}

fn quote(time: DateTime<Utc>, bid: f64, spread_points: f64) -> Quote {
    Quote { time, bid, ask: bid + spread_points * 0.00001, spread_points }
}

/// Flat window: seeds both AMAs at 1.1.
fn seed_snapshot() -> IndicatorSnapshot {
    IndicatorSnapshot {
        ama_prices: vec![1.1; 5],
        macd: MacdBuffers {
            main:      vec![0.0; 4],
            signal:    vec![0.0; 4],
            histogram: vec![0.0; 4],
        },
        adx: vec![25.0],
        rsi: vec![50.0],
    }
}

/// Clean two-bar break above chop: medium AMA jumps, long AMA lags.
/// ADX 25 and RSI 28 confirm the long.
fn bullish_snapshot() -> IndicatorSnapshot {
    IndicatorSnapshot {
        ama_prices: vec![1.2, 1.1, 1.1, 1.2, 1.1],
        rsi: vec![28.0],
        ..seed_snapshot()
    }
}

/// Mirror image: ADX 25 and RSI 75 confirm the short.
fn bearish_snapshot() -> IndicatorSnapshot {
    IndicatorSnapshot {
        ama_prices: vec![1.0, 1.1, 1.1, 1.0, 1.1],
        rsi: vec![75.0],
        ..seed_snapshot()
    }
}

fn position(ticket: u64, side: Side) -> Position {
    Position {
        ticket,
        symbol: "EURUSD".into(),
        side,
        volume: 0.5,
        entry_price: 1.1,
        stop_loss: 0.0,
        take_profit: 0.0,
        opened_at: wednesday(),
    }
}

/// Engine whose AMAs have been seeded by one flat tick, primed with `next`.
fn fake_data() -> FakeData {
    FakeData {
        symbol:   SymbolInfo::fx_major("EURUSD"),
        quote:    quote(wednesday(), 1.2, 10.0),
        snap:     seed_snapshot(),
        requotes: RefCell::new(VecDeque::new()),
    }
}

fn warmed_engine(cfg: AppConfig, broker: FakeBroker, next: IndicatorSnapshot) -> TradingEngine<FakeData, FakeBroker> {
    let data = fake_data();
    let mut engine = TradingEngine::new(cfg, data, broker);
    assert_eq!(engine.on_tick().unwrap(), TickOutcome::NoSignal);
    engine.data_mut().snap = next;
    engine
}

fn broker() -> FakeBroker {
    FakeBroker { balance: 10_000.0, ..FakeBroker::default() }
}

// ── Scenarios ─────────────────────────────────────────────────────────────

#[test]
fn flat_account_opens_long_with_protective_levels() {
    let mut engine = warmed_engine(config(), broker(), bullish_snapshot());

    let outcome = engine.on_tick().unwrap();
    assert!(matches!(outcome, TickOutcome::Opened { side: Side::Buy, .. }), "{outcome:?}");

    let order = &engine.broker().orders[0];
    assert_eq!(order.symbol, "EURUSD");
    assert_eq!(order.side, Side::Buy);
    assert!((order.volume - 0.33).abs() < 1e-9, "volume = {}", order.volume);
    assert!((order.price - 1.2001).abs() < 1e-9);
    assert!((order.stop_loss - 1.1971).abs() < 1e-9, "sl = {}", order.stop_loss);
    assert!((order.take_profit - 1.2061).abs() < 1e-9, "tp = {}", order.take_profit);
    assert_eq!(order.deviation, 100);
    assert_eq!(order.comment, "AMA_CROSS");
    assert_eq!(order.magic, 123456);
}

#[test]
fn bearish_break_opens_short_from_bid() {
    let mut engine = warmed_engine(config(), broker(), bearish_snapshot());
    engine.data_mut().quote = quote(wednesday(), 1.0, 10.0);

    let outcome = engine.on_tick().unwrap();
    assert!(matches!(outcome, TickOutcome::Opened { side: Side::Sell, .. }), "{outcome:?}");
    let order = &engine.broker().orders[0];
    assert!((order.price - 1.0).abs() < 1e-9);
    assert!((order.stop_loss - 1.003).abs() < 1e-9);
    assert!((order.take_profit - 0.994).abs() < 1e-9);
}

#[test]
fn opposite_position_is_reversed() {
    let mut b = broker();
    b.positions.push(position(7, Side::Sell));
    let mut engine = warmed_engine(config(), b, bullish_snapshot());

    let outcome = engine.on_tick().unwrap();
    match outcome {
        TickOutcome::Reversed { closed, side, .. } => {
            assert_eq!(closed, vec![7]);
            assert_eq!(side, Side::Buy);
        }
        other => panic!("expected reversal, got {other:?}"),
    }
    assert_eq!(engine.broker().closed, vec![7]);
    assert_eq!(engine.broker().settles, vec![Duration::from_millis(500)]);
    assert_eq!(engine.broker().positions.len(), 1);
    assert_eq!(engine.broker().positions[0].side, Side::Buy);
}

#[test]
fn same_direction_position_is_held() {
    let mut b = broker();
    b.positions.push(position(9, Side::Buy));
    let mut engine = warmed_engine(config(), b, bullish_snapshot());

    assert_eq!(engine.on_tick().unwrap(), TickOutcome::Held { ticket: 9 });
    assert!(engine.broker().orders.is_empty());
    assert!(engine.broker().closed.is_empty());
}

#[test]
fn failed_close_aborts_reversal() {
    let mut b = broker();
    b.positions.push(position(7, Side::Sell));
    b.fail_close = true;
    let mut engine = warmed_engine(config(), b, bullish_snapshot());

    let outcome = engine.on_tick().unwrap();
    assert!(
        matches!(outcome, TickOutcome::CloseRejected { ticket: 7, code: Some(10018), .. }),
        "{outcome:?}"
    );
    assert!(engine.broker().orders.is_empty());
    assert!(engine.broker().settles.is_empty());
}

#[test]
fn rejected_order_is_reported_not_retried() {
    let mut b = broker();
    b.reject_with = Some(BrokerError::Rejected { code: 10019, message: "no money".into() });
    let mut engine = warmed_engine(config(), b, bullish_snapshot());

    let outcome = engine.on_tick().unwrap();
    assert!(matches!(outcome, TickOutcome::OrderRejected { code: Some(10019), .. }), "{outcome:?}");
    assert_eq!(engine.broker().orders.len(), 1);
}

#[test]
fn wide_spread_skips_tick() {
    let mut engine = warmed_engine(config(), broker(), bullish_snapshot());
    engine.data_mut().quote = quote(wednesday(), 1.2, 25.0);

    assert_eq!(
        engine.on_tick().unwrap(),
        TickOutcome::SpreadTooWide { spread_points: 25.0 }
    );
    assert!(engine.broker().orders.is_empty());
    // the AMAs did not advance on the skipped tick
    assert_eq!(engine.signal_engine().ama_values(), (Some(1.1), Some(1.1)));
}

#[test]
fn weekend_is_closed() {
    let mut engine = warmed_engine(config(), broker(), bullish_snapshot());
    let saturday = Utc.with_ymd_and_hms(2024, 3, 9, 15, 0, 0).unwrap();
    engine.data_mut().quote = quote(saturday, 1.2, 10.0);

    assert_eq!(engine.on_tick().unwrap(), TickOutcome::MarketClosed);
    assert!(engine.broker().orders.is_empty());
}

#[test]
fn single_filter_cannot_fire() {
    let mut cfg = config();
    cfg.use_macd_filter = false;
    cfg.use_rsi_filter = false;
    let mut engine = warmed_engine(cfg, broker(), bullish_snapshot());

    assert_eq!(engine.on_tick().unwrap(), TickOutcome::NoSignal);
    assert!(engine.broker().orders.is_empty());
}

#[test]
fn short_history_gives_no_signal() {
    let mut engine = warmed_engine(config(), broker(), bullish_snapshot());
    engine.data_mut().snap.ama_prices.truncate(3);

    assert_eq!(engine.on_tick().unwrap(), TickOutcome::NoSignal);
    assert!(engine.broker().orders.is_empty());
}

#[test]
fn daily_loss_limit_blocks_entries() {
    let mut cfg = config();
    cfg.daily_max_loss = 50.0;
    let mut b = broker();
    b.equity = Some(10_000.0);
    let mut engine = warmed_engine(cfg, b, bullish_snapshot());

    assert!(matches!(engine.on_tick().unwrap(), TickOutcome::Opened { .. }));

    engine.broker_mut().positions.clear();
    engine.broker_mut().equity = Some(9_940.0);
    let outcome = engine.on_tick().unwrap();
    assert_eq!(outcome, TickOutcome::DailyLimit(DailyLimit::MaxLoss { pnl: -60.0 }));
    assert_eq!(engine.broker().orders.len(), 1);
}

#[test]
fn loss_taken_before_the_first_signal_counts_toward_the_day() {
    let mut cfg = config();
    cfg.daily_max_loss = 50.0;
    let mut b = broker();
    b.equity = Some(10_000.0);
    // the warm-up tick has no signal but opens the day at 10 000
    let mut engine = warmed_engine(cfg, b, bullish_snapshot());

    engine.broker_mut().equity = Some(9_920.0);
    let outcome = engine.on_tick().unwrap();
    assert_eq!(outcome, TickOutcome::DailyLimit(DailyLimit::MaxLoss { pnl: -80.0 }));
    assert!(engine.broker().orders.is_empty());
}

#[test]
fn day_opens_on_a_skipped_tick() {
    let mut cfg = config();
    cfg.daily_max_loss = 50.0;
    let mut b = broker();
    b.equity = Some(10_000.0);
    let mut data = fake_data();
    // Wednesday 00:30 New York, before the warm-up tick below
    data.quote = quote(Utc.with_ymd_and_hms(2024, 3, 6, 5, 30, 0).unwrap(), 1.2, 40.0);
    let mut engine = TradingEngine::new(cfg, data, b);
    assert_eq!(engine.on_tick().unwrap(), TickOutcome::SpreadTooWide { spread_points: 40.0 });

    engine.data_mut().quote = quote(wednesday(), 1.2, 10.0);
    assert_eq!(engine.on_tick().unwrap(), TickOutcome::NoSignal);

    engine.data_mut().snap = bullish_snapshot();
    engine.broker_mut().equity = Some(9_930.0);
    assert_eq!(
        engine.on_tick().unwrap(),
        TickOutcome::DailyLimit(DailyLimit::MaxLoss { pnl: -70.0 })
    );
}

#[test]
fn drawdown_stop_blocks_entries_for_good() {
    let mut cfg = config();
    cfg.max_total_drawdown_percent = 5.0;
    let mut engine = warmed_engine(cfg, broker(), bullish_snapshot());

    engine.broker_mut().balance = 9_400.0;
    let outcome = engine.on_tick().unwrap();
    match outcome {
        TickOutcome::DrawdownStop { drawdown_percent } => assert!((drawdown_percent - 6.0).abs() < 1e-9),
        other => panic!("expected drawdown stop, got {other:?}"),
    }

    engine.broker_mut().balance = 10_000.0;
    assert!(matches!(engine.on_tick().unwrap(), TickOutcome::DrawdownStop { .. }));
    assert!(engine.broker().orders.is_empty());
}

#[test]
fn cooldown_spaces_out_entries() {
    let mut cfg = config();
    cfg.trade_cooldown_minutes = 5;
    let mut engine = warmed_engine(cfg, broker(), bullish_snapshot());

    assert!(matches!(engine.on_tick().unwrap(), TickOutcome::Opened { .. }));
    // stopped out straight away
    engine.broker_mut().positions.clear();

    let outcome = engine.on_tick().unwrap();
    assert_eq!(outcome, TickOutcome::Cooldown { remaining: chrono::Duration::minutes(5) });

    engine.data_mut().quote = quote(wednesday() + chrono::Duration::minutes(6), 1.2, 10.0);
    assert!(matches!(engine.on_tick().unwrap(), TickOutcome::Opened { .. }));
    assert_eq!(engine.broker().orders.len(), 2);
}

#[test]
fn trailing_stop_follows_price_up_only() {
    let mut cfg = config();
    cfg.use_trailing_stop = true;
    let mut b = broker();
    b.positions.push(Position {
        entry_price: 1.2,
        stop_loss: 1.197,
        take_profit: 1.206,
        ..position(7, Side::Buy)
    });
    // flat window: no signal, only stop management
    let mut engine = warmed_engine(cfg, b, seed_snapshot());

    engine.data_mut().quote = quote(wednesday(), 1.2020, 10.0);
    assert_eq!(engine.on_tick().unwrap(), TickOutcome::NoSignal);
    let (ticket, sl, tp) = engine.broker().modified[0];
    assert_eq!(ticket, 7);
    assert!((sl - 1.2010).abs() < 1e-9, "sl = {sl}");
    assert_eq!(tp, 1.206);

    engine.data_mut().quote = quote(wednesday(), 1.2012, 10.0);
    engine.on_tick().unwrap();
    assert_eq!(engine.broker().modified.len(), 1);

    engine.data_mut().quote = quote(wednesday(), 1.2040, 10.0);
    engine.on_tick().unwrap();
    assert_eq!(engine.broker().modified.len(), 2);
    assert!((engine.broker().positions[0].stop_loss - 1.2030).abs() < 1e-9);
}

#[test]
fn reversal_rechecks_spread_after_settle() {
    let mut b = broker();
    b.positions.push(position(7, Side::Sell));
    let mut engine = warmed_engine(config(), b, bullish_snapshot());
    engine
        .data()
        .requotes
        .borrow_mut()
        .extend([quote(wednesday(), 1.2, 10.0), quote(wednesday(), 1.2, 30.0)]);

    let outcome = engine.on_tick().unwrap();
    assert_eq!(outcome, TickOutcome::SpreadTooWide { spread_points: 30.0 });
    assert_eq!(engine.broker().closed, vec![7]);
    assert!(engine.broker().orders.is_empty());
}
