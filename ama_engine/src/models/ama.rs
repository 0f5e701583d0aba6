/// models/ama.rs — Kaufman Adaptive Moving Average
///
/// ─────────────────────────────────────────────────────────────────────────
/// MATHEMATICAL SPECIFICATION
/// ─────────────────────────────────────────────────────────────────────────
///
/// Prices p are indexed most-recent-first: p[0] is the latest close.
///
///   Direction:   D = |p[0] − p[n]|
///   Volatility:  V = Σ_{i=0}^{n−1} |p[i] − p[i+1]|
///
///   Efficiency ratio:
///       ER = D / V          (ER = 0 when V = 0)
///
///   ER → 1 in a clean trend, ER → 0 in chop.
///
///   Smoothing constant:
///       fastSC = 2 / (fast + 1)
///       slowSC = 2 / (slow + 1)
///       SC     = (ER · (fastSC − slowSC) + slowSC)²
///
///   Update:
///       AMA_t = AMA_{t−1} + SC · (p[0] − AMA_{t−1})
///
///   The first evaluation seeds AMA with p[0].
///
/// The running value is state: each configured average (medium, long) owns
/// one `AdaptiveMovingAverage` and advances it once per evaluation.
/// ─────────────────────────────────────────────────────────────────────────

/// Running Kaufman AMA for one (period, fast, slow) configuration.
#[derive(Debug, Clone)]
pub struct AdaptiveMovingAverage {
    pub period:  usize,
    /// 2 / (fast + 1)
    pub fast_sc: f64,
    /// 2 / (slow + 1)
    pub slow_sc: f64,
    value:       Option<f64>,
}

impl AdaptiveMovingAverage {
    pub fn new(period: usize, fast_ema: usize, slow_ema: usize) -> Self {
        Self {
            period,
            fast_sc: 2.0 / (fast_ema as f64 + 1.0),
            slow_sc: 2.0 / (slow_ema as f64 + 1.0),
            value: None,
        }
    }

    /// Advance the average with the latest price window (most-recent-first).
    ///
    /// Returns `None` while fewer than `period + 1` prices are available;
    /// the running value is left untouched in that case.
    pub fn update(&mut self, prices: &[f64]) -> Option<f64> {
        if prices.len() < self.period + 1 {
            return None;
        }

        let latest = prices[0];
        let next = match self.value {
            None => latest,
            Some(prev) => {
                let er = efficiency_ratio(prices, self.period);
                let sc = (er * (self.fast_sc - self.slow_sc) + self.slow_sc).powi(2);
                prev + sc * (latest - prev)
            }
        };

        self.value = Some(next);
        Some(next)
    }

    /// Last computed value, if seeded.
    pub fn value(&self) -> Option<f64> {
        self.value
    }

    /// Forget the running value; the next update re-seeds.
    pub fn reset(&mut self) {
        self.value = None;
    }
}

/// Kaufman efficiency ratio over `period` steps of a most-recent-first window.
pub fn efficiency_ratio(prices: &[f64], period: usize) -> f64 {
    if period == 0 || prices.len() < period + 1 {
        return 0.0;
    }
    let direction = (prices[0] - prices[period]).abs();
    let volatility: f64 = prices[..=period]
        .windows(2)
        .map(|w| (w[0] - w[1]).abs())
        .sum();

    if volatility == 0.0 {
        0.0
    } else {
        direction / volatility
    }
}

/// Full AMA series over oldest-first closes, as a charting/back-fill helper.
///
/// Entries before index `period` are `None`; index `period` is seeded with the
/// close and every later bar applies one update step.
pub fn ama_series(closes: &[f64], period: usize, fast_ema: usize, slow_ema: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    let mut ama = AdaptiveMovingAverage::new(period, fast_ema, slow_ema);
    let mut window: Vec<f64> = Vec::with_capacity(period + 1);

    for i in period..closes.len() {
        window.clear();
        window.extend(closes[i - period..=i].iter().rev());
        out[i] = ama.update(&window);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_without_enough_history() {
        let mut ama = AdaptiveMovingAverage::new(10, 2, 30);
        assert_eq!(ama.update(&[1.0; 10]), None);
        assert_eq!(ama.value(), None);
    }

    #[test]
    fn first_call_seeds_with_latest_price() {
        let mut ama = AdaptiveMovingAverage::new(3, 2, 30);
        assert_eq!(ama.update(&[1.2, 1.1, 1.0, 0.9]), Some(1.2));
    }

    #[test]
    fn converges_without_reaching_latest_price() {
        let mut ama = AdaptiveMovingAverage::new(3, 2, 30);
        let first  = ama.update(&[1.00, 0.99, 0.98, 0.97]).unwrap();
        let second = ama.update(&[1.10, 1.00, 0.99, 0.98]).unwrap();
        let third  = ama.update(&[1.20, 1.10, 1.00, 0.99]).unwrap();

        assert_eq!(first, 1.00);
        assert!(second > first && second < 1.10, "second = {second}");
        assert!(third > second && third < 1.20, "third = {third}");
    }

    #[test]
    fn clean_trend_uses_fast_constant() {
        // ER = 1 → SC = fastSC² = (2/3)² = 4/9
        let mut ama = AdaptiveMovingAverage::new(2, 2, 30);
        ama.update(&[1.0, 1.0, 1.0]);
        let v = ama.update(&[1.9, 1.5, 1.0]).unwrap();
        assert!((v - (1.0 + 4.0 / 9.0 * 0.9)).abs() < 1e-12, "v = {v}");
    }

    #[test]
    fn flat_prices_give_zero_efficiency() {
        assert_eq!(efficiency_ratio(&[1.0, 1.0, 1.0, 1.0], 3), 0.0);
    }

    #[test]
    fn independent_instances_do_not_share_state() {
        let mut medium = AdaptiveMovingAverage::new(2, 2, 30);
        let mut long   = AdaptiveMovingAverage::new(4, 2, 30);
        medium.update(&[2.0, 1.0, 1.0]);
        assert_eq!(long.value(), None);
        long.update(&[5.0, 4.0, 3.0, 2.0, 1.0]);
        assert_eq!(medium.value(), Some(2.0));
        assert_eq!(long.value(), Some(5.0));
    }

    #[test]
    fn reset_reseeds() {
        let mut ama = AdaptiveMovingAverage::new(1, 2, 30);
        ama.update(&[1.0, 1.0]);
        ama.update(&[2.0, 1.0]);
        ama.reset();
        assert_eq!(ama.update(&[3.0, 2.0]), Some(3.0));
    }

    #[test]
    fn series_matches_incremental_updates() {
        let closes = [1.0, 1.1, 1.05, 1.2, 1.3, 1.25];
        let series = ama_series(&closes, 2, 2, 30);
        assert!(series[0].is_none() && series[1].is_none());
        assert_eq!(series[2], Some(1.05));
        assert!(series[5].is_some());
    }
}
