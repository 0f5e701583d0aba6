/// data.rs — Market data interface, indicator snapshots, historical bars
///
/// The engine never reaches into a venue directly.  Everything it reads per
/// tick comes through `MarketData`: the current quote, the contract spec and
/// the indicator buffers (indexed most-recent-first).  A fresh
/// `IndicatorSnapshot` is assembled every tick and dropped afterwards.
///
/// `BarReplay` is the historical implementation used by backtests: it loads
/// OHLC bars, precomputes MACD / ADX / RSI over the whole file with causal
/// formulas, and only ever exposes values up to the replay cursor.
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use chrono::DateTime;
use polars::prelude::*;
use tracing::info;

use crate::config::AppConfig;
use crate::models::adx::adx_series;
use crate::models::macd::{macd_series, MacdSeries};
use crate::models::rsi::rsi_series;
use crate::models::{Kline, Quote, SymbolInfo};

// ── Snapshot types ────────────────────────────────────────────────────────

/// MACD buffers, most-recent-first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MacdBuffers {
    pub main:      Vec<f64>,
    pub signal:    Vec<f64>,
    pub histogram: Vec<f64>,
}

/// History each series must hold before a signal can be evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lookback {
    pub ama_prices: usize,
    pub macd:       usize,
    pub adx:        usize,
    pub rsi:        usize,
}

impl Lookback {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            ama_prices: cfg.ama_long_period.max(cfg.ama_medium_period) + 1,
            macd:       cfg.macd_consecutive_bars + 1,
            adx:        1,
            rsi:        1,
        }
    }
}

/// Immutable per-tick view of prices and indicator buffers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorSnapshot {
    /// Source prices for both AMAs
    pub ama_prices: Vec<f64>,
    pub macd:       MacdBuffers,
    pub adx:        Vec<f64>,
    pub rsi:        Vec<f64>,
}

impl IndicatorSnapshot {
    /// Latest price, if any.
    pub fn price(&self) -> Option<f64> {
        self.ama_prices.first().copied()
    }
}

// ── Data source interface ─────────────────────────────────────────────────

/// Market data collaborator.  All series are most-recent-first and may be
/// shorter than requested when history is missing.
pub trait MarketData {
    fn symbol_info(&self) -> &SymbolInfo;

    fn quote(&self) -> Result<Quote>;

    fn ama_prices(&self, count: usize) -> Result<Vec<f64>>;

    fn macd(&self, count: usize) -> Result<MacdBuffers>;

    fn adx(&self, count: usize) -> Result<Vec<f64>>;

    fn rsi(&self, count: usize) -> Result<Vec<f64>>;

    /// Assemble this tick's snapshot.
    fn snapshot(&self, lookback: &Lookback) -> Result<IndicatorSnapshot> {
        Ok(IndicatorSnapshot {
            ama_prices: self.ama_prices(lookback.ama_prices)?,
            macd:       self.macd(lookback.macd)?,
            adx:        self.adx(lookback.adx)?,
            rsi:        self.rsi(lookback.rsi)?,
        })
    }
}

// ── Historical bars ───────────────────────────────────────────────────────

/// Load bars from a `.csv` or `.parquet` file.
///
/// Required columns: `time` (unix seconds), `open`, `high`, `low`, `close`.
/// Optional: `spread` (points).  Rows come back sorted oldest-first.
pub fn load_klines(path: &Path) -> Result<Vec<Kline>> {
    let lf = match path.extension().and_then(|e| e.to_str()) {
        Some("parquet") => LazyFrame::scan_parquet(path, Default::default())?,
        Some("csv") => LazyCsvReader::new(path).with_has_header(true).finish()?,
        other => bail!("unsupported bar file extension {:?} ({})", other, path.display()),
    };
    let df = lf
        .collect()
        .with_context(|| format!("failed to read bars from {}", path.display()))?;

    let times = df.column("time")?.cast(&DataType::Int64)?;
    let times = times.i64()?;
    let float_col = |name: &str| -> Result<Vec<Option<f64>>> {
        let col = df.column(name)?.cast(&DataType::Float64)?;
        Ok(col.f64()?.into_iter().collect())
    };
    let opens  = float_col("open")?;
    let highs  = float_col("high")?;
    let lows   = float_col("low")?;
    let closes = float_col("close")?;
    let spreads = if df.column("spread").is_ok() {
        float_col("spread")?
    } else {
        vec![None; df.height()]
    };

    let mut klines = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let row_err = || anyhow!("row {i}: missing OHLC value in {}", path.display());
        let secs = times.get(i).ok_or_else(row_err)?;
        let time = DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| anyhow!("row {i}: timestamp {secs} out of range"))?;

        klines.push(Kline {
            time,
            open:  opens[i].ok_or_else(row_err)?,
            high:  highs[i].ok_or_else(row_err)?,
            low:   lows[i].ok_or_else(row_err)?,
            close: closes[i].ok_or_else(row_err)?,
            spread_points: spreads[i],
        });
    }
    klines.sort_by_key(|k| k.time);

    info!(
        "Loaded {} bars from {} ({} → {})",
        klines.len(),
        path.display(),
        klines.first().map(|k| k.time.to_rfc3339()).unwrap_or_default(),
        klines.last().map(|k| k.time.to_rfc3339()).unwrap_or_default(),
    );
    Ok(klines)
}

// ── Bar replay ────────────────────────────────────────────────────────────

/// Historical `MarketData` over a bar series.  Each bar is one tick.
pub struct BarReplay {
    bars:    Vec<Kline>,
    symbol:  SymbolInfo,
    /// Used when a bar has no recorded spread
    default_spread_points: f64,
    macd:    MacdSeries,
    adx:     Vec<Option<f64>>,
    rsi:     Vec<Option<f64>>,
    cursor:  usize,
}

impl BarReplay {
    pub fn new(bars: Vec<Kline>, symbol: SymbolInfo, cfg: &AppConfig, default_spread_points: f64) -> Result<Self> {
        if bars.is_empty() {
            bail!("bar replay needs at least one bar");
        }
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let macd = macd_series(&closes, cfg.macd_fast, cfg.macd_slow, cfg.macd_signal);
        let adx  = adx_series(&bars, cfg.adx_period);
        let rsi  = rsi_series(&closes, cfg.rsi_period);

        Ok(Self {
            bars,
            symbol,
            default_spread_points,
            macd,
            adx,
            rsi,
            cursor: 0,
        })
    }

    /// Move the replay to bar `index` (clamped to the last bar).
    pub fn advance_to(&mut self, index: usize) {
        self.cursor = index.min(self.bars.len() - 1);
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn current(&self) -> &Kline {
        &self.bars[self.cursor]
    }

    pub fn bars(&self) -> &[Kline] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Up to `count` values ending at the cursor, most-recent-first; stops at
    /// the first warm-up gap.
    fn recent(&self, series: &[Option<f64>], count: usize) -> Vec<f64> {
        series[..=self.cursor]
            .iter()
            .rev()
            .take(count)
            .map_while(|v| *v)
            .collect()
    }
}

impl MarketData for BarReplay {
    fn symbol_info(&self) -> &SymbolInfo {
        &self.symbol
    }

    fn quote(&self) -> Result<Quote> {
        let bar = self.current();
        let spread_points = bar.spread_points.unwrap_or(self.default_spread_points);
        Ok(Quote {
            time: bar.time,
            bid: bar.close,
            ask: self.symbol.normalize(bar.close + spread_points * self.symbol.point),
            spread_points,
        })
    }

    fn ama_prices(&self, count: usize) -> Result<Vec<f64>> {
        Ok(self.bars[..=self.cursor]
            .iter()
            .rev()
            .take(count)
            .map(|b| b.close)
            .collect())
    }

    fn macd(&self, count: usize) -> Result<MacdBuffers> {
        Ok(MacdBuffers {
            main:      self.recent(&self.macd.main, count),
            signal:    self.recent(&self.macd.signal, count),
            histogram: self.recent(&self.macd.histogram, count),
        })
    }

    fn adx(&self, count: usize) -> Result<Vec<f64>> {
        Ok(self.recent(&self.adx, count))
    }

    fn rsi(&self, count: usize) -> Result<Vec<f64>> {
        Ok(self.recent(&self.rsi, count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::io::Write;

    fn bars(n: usize) -> Vec<Kline> {
        (0..n)
            .map(|i| {
                let c = 1.1 + i as f64 * 0.0001;
                Kline {
                    time: Utc.timestamp_opt(1_700_000_000 + i as i64 * 900, 0).unwrap(),
                    open: c,
                    high: c + 0.0002,
                    low: c - 0.0002,
                    close: c,
                    spread_points: None,
                }
            })
            .collect()
    }

    #[test]
    fn replay_never_looks_ahead() {
        let cfg = AppConfig::default();
        let mut replay = BarReplay::new(bars(100), SymbolInfo::fx_major("EURUSD"), &cfg, 10.0).unwrap();
        replay.advance_to(10);
        let prices = replay.ama_prices(50).unwrap();
        assert_eq!(prices.len(), 11);
        assert_eq!(prices[0], replay.bars()[10].close);
    }

    #[test]
    fn warmup_gaps_truncate_series() {
        let cfg = AppConfig::default();
        let mut replay = BarReplay::new(bars(100), SymbolInfo::fx_major("EURUSD"), &cfg, 10.0).unwrap();
        replay.advance_to(14);
        assert_eq!(replay.rsi(5).unwrap().len(), 1);
        replay.advance_to(5);
        assert!(replay.rsi(5).unwrap().is_empty());
    }

    #[test]
    fn quote_applies_default_spread() {
        let cfg = AppConfig::default();
        let replay = BarReplay::new(bars(3), SymbolInfo::fx_major("EURUSD"), &cfg, 12.0).unwrap();
        let q = replay.quote().unwrap();
        assert_eq!(q.spread_points, 12.0);
        assert!((q.ask - q.bid - 0.00012).abs() < 1e-9);
    }

    #[test]
    fn empty_replay_is_an_error() {
        let cfg = AppConfig::default();
        assert!(BarReplay::new(Vec::new(), SymbolInfo::fx_major("EURUSD"), &cfg, 10.0).is_err());
    }

    #[test]
    fn loads_csv_sorted() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "time,open,high,low,close,spread").unwrap();
        writeln!(file, "1700000900,1.1010,1.1020,1.1000,1.1015,12").unwrap();
        writeln!(file, "1700000000,1.1000,1.1012,1.0995,1.1010,11").unwrap();
        file.flush().unwrap();

        let klines = load_klines(file.path()).unwrap();
        assert_eq!(klines.len(), 2);
        assert!(klines[0].time < klines[1].time);
        assert_eq!(klines[0].close, 1.1010);
        assert_eq!(klines[1].spread_points, Some(12.0));
    }

    #[test]
    fn rejects_unknown_extension() {
        assert!(load_klines(Path::new("bars.txt")).is_err());
    }
}
