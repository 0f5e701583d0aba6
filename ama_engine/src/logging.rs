//! Logging initialisation
//!
//! - `APP_ENV=production` (or `prod`): JSON lines for log aggregation
//! - anything else: human-readable, coloured output
//!
//! Filtering follows `RUST_LOG`, defaulting to `info`.

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn is_production() -> bool {
    let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".into());
    matches!(env.to_lowercase().as_str(), "production" | "prod")
}

/// Install the global subscriber.  Fails if one is already set.
pub fn init_logging() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if is_production() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_writer(std::io::stdout),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_ansi(true).with_writer(std::io::stdout))
            .try_init()?;
    }
    Ok(())
}
