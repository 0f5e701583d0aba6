/// main.rs — AMA crossover backtest CLI
///
/// Usage:
///   ama_backtest run --data bars/EURUSD_M15.parquet --output report.json
///   ama_backtest sweep --data bars/EURUSD_M15.csv --gaps 0.02,0.05 --adx 15,20,25
///   ama_backtest check-config
///
/// Strategy parameters come from the environment / .env (see AppConfig);
/// the flags here only shape the run.
mod sweep;

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use ama_engine::backtest::{print_trade_log, run_backtest, BacktestConfig};
use ama_engine::config::{AppConfig, REQUIRED_FILTER_CONFIRMATIONS};
use ama_engine::data::load_klines;
use ama_engine::logging::init_logging;
use ama_engine::models::Kline;

use crate::sweep::{print_ranking, run_sweep, SweepGrid};

#[derive(Parser)]
#[command(name = "ama_backtest")]
#[command(about = "Backtest the AMA crossover signal engine on historical bars")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a single backtest
    Run {
        /// Bar file (.csv or .parquet): time, open, high, low, close[, spread]
        #[arg(short, long)]
        data: PathBuf,

        /// First day to include (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// Last day to include (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,

        /// Spread in points for bars without one
        #[arg(long, default_value = "10")]
        spread: f64,

        /// Bars per year for annualised ratios (M15 default)
        #[arg(long, default_value = "24960")]
        bars_per_year: f64,

        /// Number of trades to print
        #[arg(long, default_value = "20")]
        top: usize,

        /// Write the full result (report, trades, equity) as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Log every order
        #[arg(short, long)]
        verbose: bool,
    },

    /// Grid search over min gap, ADX threshold and stop distance
    Sweep {
        #[arg(short, long)]
        data: PathBuf,

        /// Comma-separated MIN_AMA_GAP_PERCENT values
        #[arg(long, value_delimiter = ',', default_value = "0.02,0.05,0.1")]
        gaps: Vec<f64>,

        /// Comma-separated ADX_THRESHOLD values
        #[arg(long, value_delimiter = ',', default_value = "15,20,25")]
        adx: Vec<f64>,

        /// Comma-separated STOP_LOSS_POINTS values
        #[arg(long, value_delimiter = ',', default_value = "200,300,400")]
        stops: Vec<f64>,

        #[arg(long, default_value = "10")]
        spread: f64,

        #[arg(long, default_value = "24960")]
        bars_per_year: f64,

        /// Rows of the ranking to print
        #[arg(long, default_value = "10")]
        top: usize,

        /// Write all ranked rows as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Load and validate the configuration, then print it
    CheckConfig,
}

fn main() -> Result<()> {
    init_logging()?;
    let cli = Cli::parse();

    // Invalid configuration is fatal before anything runs
    let cfg = AppConfig::from_env().context("invalid configuration")?;

    match cli.command {
        Commands::Run { data, from, to, spread, bars_per_year, top, output, verbose } => {
            let klines = load_range(&data, from.as_deref(), to.as_deref())?;
            let bt_cfg = BacktestConfig {
                verbose,
                bars_per_year,
                default_spread_points: spread,
                symbol: None,
            };

            info!("╔══════════════════════════════════════════════╗");
            info!("║      AMA CROSSOVER  —  BACKTEST MODE         ║");
            info!("╚══════════════════════════════════════════════╝");

            let result = run_backtest(klines, cfg, &bt_cfg)?;
            println!("{}", result.report);
            println!("Ticks: {:?}", result.ticks);
            print_trade_log(&result.trades, top);

            if let Some(path) = output {
                write_json(&path, &result)?;
            }
        }

        Commands::Sweep { data, gaps, adx, stops, spread, bars_per_year, top, output } => {
            let klines = load_klines(&data)?;
            let grid = SweepGrid {
                min_gap_percent:  gaps,
                adx_threshold:    adx,
                stop_loss_points: stops,
            };
            let bt_cfg = BacktestConfig {
                verbose: false,
                bars_per_year,
                default_spread_points: spread,
                symbol: None,
            };

            let results = run_sweep(&klines, &cfg, &grid, &bt_cfg);
            if results.is_empty() {
                bail!("no sweep combination produced a result");
            }
            print_ranking(&results, top);

            if let Some(path) = output {
                write_json(&path, &results)?;
            }
        }

        Commands::CheckConfig => {
            println!("{cfg:#?}");
            let enabled = cfg.enabled_filter_count();
            if enabled < REQUIRED_FILTER_CONFIRMATIONS {
                println!(
                    "WARNING: {enabled} filter(s) enabled, {REQUIRED_FILTER_CONFIRMATIONS} confirmations required: the engine will never trade"
                );
            } else {
                println!("Configuration OK ({enabled} filters enabled)");
            }
        }
    }

    Ok(())
}

/// Load bars, optionally restricted to whole UTC days [from, to].
fn load_range(path: &Path, from: Option<&str>, to: Option<&str>) -> Result<Vec<Kline>> {
    let parse = |s: &str| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date {s:?}, expected YYYY-MM-DD"))
    };
    let from = from.map(parse).transpose()?;
    let to = to.map(parse).transpose()?;
    if let (Some(f), Some(t)) = (from, to) {
        if f > t {
            bail!("--from {f} is after --to {t}");
        }
    }

    let klines: Vec<Kline> = load_klines(path)?
        .into_iter()
        .filter(|k| {
            let day = k.time.date_naive();
            from.map_or(true, |f| day >= f) && to.map_or(true, |t| day <= t)
        })
        .collect();
    info!("{} bars in selected range", klines.len());
    Ok(klines)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)?;
    info!("Wrote {}", path.display());
    Ok(())
}
