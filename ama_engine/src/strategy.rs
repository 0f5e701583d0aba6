/// strategy.rs — AMA crossover signal with ADX / MACD / RSI confirmation
///
/// Decision per tick:
///   1. Advance both AMAs on the latest price window.
///   2. gap% = |AMA_m − AMA_l| / AMA_l · 100, must reach the configured minimum.
///   3. Bias: bullish when AMA_m > AMA_l and price > AMA_m,
///            bearish when AMA_m < AMA_l and price < AMA_m.
///   4. Each enabled filter votes on the bias; REQUIRED_FILTER_CONFIRMATIONS
///      votes are needed for a Buy / Sell.
use tracing::{debug, info};

use crate::config::{AppConfig, REQUIRED_FILTER_CONFIRMATIONS};
use crate::data::{IndicatorSnapshot, Lookback};
use crate::models::ama::AdaptiveMovingAverage;
use crate::models::Signal;

/// Direction implied by the AMA stack before filter confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bias {
    Bullish,
    Bearish,
}

/// Per-filter vote.  `None` means the filter is disabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterVotes {
    pub adx:  Option<bool>,
    pub macd: Option<bool>,
    pub rsi:  Option<bool>,
}

impl FilterVotes {
    pub fn confirmations(&self) -> usize {
        [self.adx, self.macd, self.rsi]
            .iter()
            .filter(|v| **v == Some(true))
            .count()
    }

    pub fn enabled(&self) -> usize {
        [self.adx, self.macd, self.rsi].iter().filter(|v| v.is_some()).count()
    }
}

/// Why an evaluation produced no signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SkipReason {
    InsufficientHistory { series: &'static str, have: usize, need: usize },
    ZeroLongAma,
    GapTooNarrow { gap_percent: f64 },
    NoBias,
    NotConfirmed { confirmations: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalDecision {
    pub signal:      Signal,
    pub ama_medium:  Option<f64>,
    pub ama_long:    Option<f64>,
    pub gap_percent: Option<f64>,
    pub bias:        Option<Bias>,
    pub votes:       FilterVotes,
    pub skip:        Option<SkipReason>,
}

impl SignalDecision {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            signal:      Signal::None,
            ama_medium:  None,
            ama_long:    None,
            gap_percent: None,
            bias:        None,
            votes:       FilterVotes::default(),
            skip:        Some(reason),
        }
    }
}

/// Thresholds the signal reads from configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalSettings {
    pub min_gap_percent:       f64,
    pub use_adx:               bool,
    pub adx_threshold:         f64,
    pub use_macd:              bool,
    pub macd_growth_factor:    f64,
    pub macd_consecutive_bars: usize,
    pub use_rsi:               bool,
    pub rsi_overbought:        f64,
    pub rsi_oversold:          f64,
}

impl SignalSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            min_gap_percent:       cfg.min_ama_gap_percent,
            use_adx:               cfg.use_adx_filter,
            adx_threshold:         cfg.adx_threshold,
            use_macd:              cfg.use_macd_filter,
            macd_growth_factor:    cfg.macd_growth_factor,
            macd_consecutive_bars: cfg.macd_consecutive_bars,
            use_rsi:               cfg.use_rsi_filter,
            rsi_overbought:        cfg.rsi_overbought,
            rsi_oversold:          cfg.rsi_oversold,
        }
    }
}

// ── Signal engine ─────────────────────────────────────────────────────────

/// Owns the running medium and long AMA state.
#[derive(Debug, Clone)]
pub struct SignalEngine {
    settings: SignalSettings,
    lookback: Lookback,
    medium:   AdaptiveMovingAverage,
    long:     AdaptiveMovingAverage,
}

impl SignalEngine {
    pub fn new(cfg: &AppConfig) -> Self {
        Self {
            settings: SignalSettings::from_config(cfg),
            lookback: Lookback::from_config(cfg),
            medium:   AdaptiveMovingAverage::new(cfg.ama_medium_period, cfg.ama_fast_ema, cfg.ama_slow_ema),
            long:     AdaptiveMovingAverage::new(cfg.ama_long_period, cfg.ama_fast_ema, cfg.ama_slow_ema),
        }
    }

    pub fn lookback(&self) -> &Lookback {
        &self.lookback
    }

    pub fn settings(&self) -> &SignalSettings {
        &self.settings
    }

    /// Current (medium, long) AMA values.
    pub fn ama_values(&self) -> (Option<f64>, Option<f64>) {
        (self.medium.value(), self.long.value())
    }

    /// Drop both AMA states; the next evaluation re-seeds them.
    pub fn reset(&mut self) {
        self.medium.reset();
        self.long.reset();
    }

    /// Evaluate one tick.  Both AMAs advance whenever their price window is
    /// complete, even if a filter series is still warming up.
    pub fn evaluate(&mut self, snap: &IndicatorSnapshot) -> SignalDecision {
        let need = self.lookback.ama_prices;
        if snap.ama_prices.len() < need {
            let decision = SignalDecision::skipped(SkipReason::InsufficientHistory {
                series: "ama_prices",
                have:   snap.ama_prices.len(),
                need,
            });
            debug!("Not enough price history: {}/{}", snap.ama_prices.len(), need);
            return decision;
        }

        let ama_m = self.medium.update(&snap.ama_prices);
        let ama_l = self.long.update(&snap.ama_prices);
        let (Some(ama_m), Some(ama_l)) = (ama_m, ama_l) else {
            return SignalDecision::skipped(SkipReason::InsufficientHistory {
                series: "ama_prices",
                have:   snap.ama_prices.len(),
                need,
            });
        };

        if let Some(reason) = self.missing_filter_history(snap) {
            debug!("Filter history incomplete: {:?}", reason);
            let mut decision = SignalDecision::skipped(reason);
            decision.ama_medium = Some(ama_m);
            decision.ama_long = Some(ama_l);
            return decision;
        }

        let price = snap.ama_prices[0];
        let decision = classify(&self.settings, ama_m, ama_l, price, snap);

        match decision.signal {
            Signal::None => debug!(
                "No signal | AMA_m={:.5} AMA_l={:.5} price={:.5} skip={:?} votes={:?}",
                ama_m, ama_l, price, decision.skip, decision.votes
            ),
            s => info!(
                "Signal {:?} | AMA_m={:.5} AMA_l={:.5} gap={:.3}% price={:.5} confirmations={}/{}",
                s,
                ama_m,
                ama_l,
                decision.gap_percent.unwrap_or_default(),
                price,
                decision.votes.confirmations(),
                decision.votes.enabled(),
            ),
        }
        decision
    }

    fn missing_filter_history(&self, snap: &IndicatorSnapshot) -> Option<SkipReason> {
        let checks = [
            (self.settings.use_adx, "adx", snap.adx.len(), self.lookback.adx),
            (self.settings.use_macd, "macd_histogram", snap.macd.histogram.len(), self.lookback.macd),
            (self.settings.use_rsi, "rsi", snap.rsi.len(), self.lookback.rsi),
        ];
        checks
            .into_iter()
            .find(|(enabled, _, have, need)| *enabled && have < need)
            .map(|(_, series, have, need)| SkipReason::InsufficientHistory { series, have, need })
    }
}

// ── Pure decision logic ───────────────────────────────────────────────────

/// Signal from already-computed AMA values and the snapshot's filter series.
pub fn classify(
    settings: &SignalSettings,
    ama_m: f64,
    ama_l: f64,
    price: f64,
    snap: &IndicatorSnapshot,
) -> SignalDecision {
    let mut decision = SignalDecision::skipped(SkipReason::NoBias);
    decision.ama_medium = Some(ama_m);
    decision.ama_long = Some(ama_l);

    let Some(gap) = gap_percent(ama_m, ama_l) else {
        decision.skip = Some(SkipReason::ZeroLongAma);
        return decision;
    };
    decision.gap_percent = Some(gap);
    if gap < settings.min_gap_percent {
        decision.skip = Some(SkipReason::GapTooNarrow { gap_percent: gap });
        return decision;
    }

    let Some(bias) = bias(ama_m, ama_l, price) else {
        return decision;
    };
    decision.bias = Some(bias);

    let votes = FilterVotes {
        adx: settings
            .use_adx
            .then(|| adx_confirms(&snap.adx, settings.adx_threshold)),
        macd: settings.use_macd.then(|| {
            macd_confirms(
                &snap.macd.histogram,
                bias,
                settings.macd_consecutive_bars,
                settings.macd_growth_factor,
            )
        }),
        rsi: settings
            .use_rsi
            .then(|| rsi_confirms(&snap.rsi, bias, settings.rsi_overbought, settings.rsi_oversold)),
    };
    decision.votes = votes;

    let confirmations = votes.confirmations();
    if confirmations < REQUIRED_FILTER_CONFIRMATIONS {
        decision.skip = Some(SkipReason::NotConfirmed { confirmations });
        return decision;
    }

    decision.skip = None;
    decision.signal = match bias {
        Bias::Bullish => Signal::Buy,
        Bias::Bearish => Signal::Sell,
    };
    decision
}

/// |AMA_m − AMA_l| / AMA_l · 100; `None` when AMA_l is zero.
pub fn gap_percent(ama_m: f64, ama_l: f64) -> Option<f64> {
    if ama_l == 0.0 {
        return None;
    }
    Some((ama_m - ama_l).abs() / ama_l.abs() * 100.0)
}

pub fn bias(ama_m: f64, ama_l: f64, price: f64) -> Option<Bias> {
    if ama_m > ama_l && price > ama_m {
        Some(Bias::Bullish)
    } else if ama_m < ama_l && price < ama_m {
        Some(Bias::Bearish)
    } else {
        None
    }
}

/// Trend strong enough: latest ADX at or above the threshold.
pub fn adx_confirms(adx: &[f64], threshold: f64) -> bool {
    adx.first().is_some_and(|v| *v >= threshold)
}

/// Momentum building in the bias direction.
///
/// `hist` is most-recent-first.  The `bars` most recent values must all carry
/// the bias sign and each must be at least `growth` × the magnitude of the
/// bar before it, so `bars + 1` values are needed.
pub fn macd_confirms(hist: &[f64], bias: Bias, bars: usize, growth: f64) -> bool {
    if hist.len() < bars + 1 {
        return false;
    }
    (0..bars).all(|i| {
        let (cur, prev) = (hist[i], hist[i + 1]);
        match bias {
            Bias::Bullish => cur > 0.0 && cur >= prev * growth,
            Bias::Bearish => cur < 0.0 && cur.abs() >= prev.abs() * growth,
        }
    })
}

/// Mean-reversion entry: oversold for longs, overbought for shorts.
pub fn rsi_confirms(rsi: &[f64], bias: Bias, overbought: f64, oversold: f64) -> bool {
    match (rsi.first(), bias) {
        (Some(v), Bias::Bullish) => *v < oversold,
        (Some(v), Bias::Bearish) => *v > overbought,
        (None, _) => false,
    }
}
