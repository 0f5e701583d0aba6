/// models/macd.rs — MACD line, signal line and histogram
///
///   EMA_n(x)_t = α·x_t + (1 − α)·EMA_n(x)_{t−1},   α = 2/(n + 1)
///   seeded with the first observation (no SMA warm-up).
///
///   MACD      = EMA_fast(close) − EMA_slow(close)
///   Signal    = EMA_signal(MACD)
///   Histogram = MACD − Signal
///
/// Values are reported from bar `slow + signal − 2` onward; earlier bars are
/// still dominated by the seed and come back as `None`.

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MacdSeries {
    pub main:      Vec<Option<f64>>,
    pub signal:    Vec<Option<f64>>,
    pub histogram: Vec<Option<f64>>,
}

/// Exponential moving average over an oldest-first series.
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;
    for &v in values {
        let next = match prev {
            None => v,
            Some(p) => alpha * v + (1.0 - alpha) * p,
        };
        out.push(next);
        prev = Some(next);
    }
    out
}

/// MACD over oldest-first closes.
pub fn macd_series(closes: &[f64], fast: usize, slow: usize, signal: usize) -> MacdSeries {
    let fast_ema = ema(closes, fast);
    let slow_ema = ema(closes, slow);
    let main: Vec<f64> = fast_ema.iter().zip(&slow_ema).map(|(f, s)| f - s).collect();
    let signal_line = ema(&main, signal);

    let warmup = (slow + signal).saturating_sub(2);
    let gate = |i: usize, v: f64| if i >= warmup { Some(v) } else { None };

    MacdSeries {
        main:      main.iter().enumerate().map(|(i, &v)| gate(i, v)).collect(),
        signal:    signal_line.iter().enumerate().map(|(i, &v)| gate(i, v)).collect(),
        histogram: main
            .iter()
            .zip(&signal_line)
            .enumerate()
            .map(|(i, (m, s))| gate(i, m - s))
            .collect(),
    }
}
