/// sweep.rs — Parallel parameter sweep
///
/// Every (min gap, ADX threshold, stop distance) combination runs as an
/// independent backtest on its own engine; rayon spreads the runs across
/// cores.  Results come back ranked by net profit.
use ama_engine::backtest::{run_backtest, BacktestConfig};
use ama_engine::config::AppConfig;
use ama_engine::metrics::PerfReport;
use ama_engine::models::Kline;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct SweepGrid {
    pub min_gap_percent:  Vec<f64>,
    pub adx_threshold:    Vec<f64>,
    pub stop_loss_points: Vec<f64>,
}

impl SweepGrid {
    pub fn combinations(&self) -> Vec<(f64, f64, f64)> {
        let mut out = Vec::with_capacity(
            self.min_gap_percent.len() * self.adx_threshold.len() * self.stop_loss_points.len(),
        );
        for &gap in &self.min_gap_percent {
            for &adx in &self.adx_threshold {
                for &sl in &self.stop_loss_points {
                    out.push((gap, adx, sl));
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepResult {
    pub min_gap_percent:  f64,
    pub adx_threshold:    f64,
    pub stop_loss_points: f64,
    pub report:           PerfReport,
}

/// Run every grid combination; invalid or failing combinations are skipped.
pub fn run_sweep(
    klines: &[Kline],
    base:   &AppConfig,
    grid:   &SweepGrid,
    bt_cfg: &BacktestConfig,
) -> Vec<SweepResult> {
    let combos = grid.combinations();
    info!("Sweeping {} parameter combinations over {} bars", combos.len(), klines.len());

    let mut results: Vec<SweepResult> = combos
        .par_iter()
        .filter_map(|&(gap, adx, sl)| {
            let mut cfg = base.clone();
            cfg.min_ama_gap_percent = gap;
            cfg.adx_threshold = adx;
            cfg.stop_loss_points = sl;
            if let Err(e) = cfg.validate() {
                warn!("Skipping gap={gap} adx={adx} sl={sl}: {e}");
                return None;
            }

            match run_backtest(klines.to_vec(), cfg, bt_cfg) {
                Ok(result) => Some(SweepResult {
                    min_gap_percent:  gap,
                    adx_threshold:    adx,
                    stop_loss_points: sl,
                    report:           result.report,
                }),
                Err(e) => {
                    warn!("Run gap={gap} adx={adx} sl={sl} failed: {e:#}");
                    None
                }
            }
        })
        .collect();

    results.sort_by(|a, b| b.report.net_profit.total_cmp(&a.report.net_profit));
    results
}

/// Print the top `n` sweep rows.
pub fn print_ranking(results: &[SweepResult], n: usize) {
    println!(
        "\n{:<4} {:<8} {:<8} {:<8} {:<8} {:<9} {:<12} {:<9}",
        "#", "GAP%", "ADX", "SL_PTS", "TRADES", "WIN%", "NET", "MAXDD%"
    );
    println!("{}", "─".repeat(72));
    for (i, r) in results.iter().take(n).enumerate() {
        println!(
            "{:<4} {:<8.3} {:<8.1} {:<8.0} {:<8} {:<9.2} {:<+12.2} {:<9.2}",
            i + 1,
            r.min_gap_percent,
            r.adx_threshold,
            r.stop_loss_points,
            r.report.n_trades,
            r.report.win_rate * 100.0,
            r.report.net_profit,
            r.report.max_drawdown * 100.0,
        );
    }
}
