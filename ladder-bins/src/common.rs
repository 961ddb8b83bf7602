//! Common utilities for all binaries.

use anyhow::Result;
use clap::Parser;
use rust_decimal::Decimal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Common CLI arguments.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CommonArgs {
    /// Symbol to quote
    #[arg(short, long, default_value = "DOGEUSDT")]
    pub symbol: String,

    /// Equity committed to the engine, in quote units
    #[arg(short, long, default_value = "1000")]
    pub equity: Decimal,

    /// Configuration profile: default | conservative | aggressive
    #[arg(short, long, default_value = "default")]
    pub profile: String,

    /// Metrics listen port (0 disables the endpoint)
    #[arg(long, default_value = "9464")]
    pub metrics_port: u16,

    /// Log level
    #[arg(short, long, default_value = "info")]
    pub log_level: String,
}

impl CommonArgs {
    pub fn engine_config(&self) -> Result<ladder_core::EngineConfig> {
        let cfg = match self.profile.as_str() {
            "default" => ladder_core::config::default_profile(&self.symbol, self.equity),
            "conservative" => ladder_core::config::conservative(&self.symbol, self.equity),
            "aggressive" => ladder_core::config::aggressive(&self.symbol, self.equity),
            other => anyhow::bail!("unknown profile: {other}"),
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Initialize tracing/logging.
pub fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
    Ok(())
}

/// Print final statistics on exit.
pub fn print_stats(stats: &ladder_core::engine::EngineStats) {
    tracing::info!(
        ticks = stats.ticks,
        fills = stats.fills,
        plans = stats.plans,
        skipped_stale = stats.skipped_stale,
        normalize_errors = stats.normalize_errors,
        integrity_errors = stats.integrity_errors,
        "final engine statistics"
    );
}
