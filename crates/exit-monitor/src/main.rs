//! Exit Monitor
//!
//! Replays recorded ticks, candle closes and operator actions through the
//! options exit engine and prints the resulting status.

mod events;
mod replay;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use options_core::config::ExitConfig;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "exit-monitor",
    about = "Replay market events through the options exit engine"
)]
struct Cli {
    /// JSON-lines event file. Reads stdin when omitted.
    #[arg(long)]
    events: Option<PathBuf>,

    /// Config file (TOML/YAML/JSON). Falls back to EXIT_* environment variables.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Trading day the ledger starts on (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    trading_day: Option<NaiveDate>,

    /// Open positions from candle signals through the entry gate.
    #[arg(long, default_value_t = false)]
    auto_entry: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Status goes to stdout, logs to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "exit_monitor=info,trading_engine=info,risk_manager=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    info!("Starting Exit Monitor");

    let config = match &cli.config {
        Some(path) => ExitConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ExitConfig::from_env().context("failed to load config from environment")?,
    };

    let trading_day = cli
        .trading_day
        .unwrap_or_else(|| chrono::Utc::now().date_naive());
    let mut replay = replay::Replay::new(config, trading_day, cli.auto_entry)?;

    match &cli.events {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            replay.run(BufReader::new(file)).await?;
        }
        None => replay.run(io::stdin().lock()).await?,
    }

    let report = replay.report().await;
    info!(
        events = report.events_processed,
        rejected = report.events_rejected,
        exits = report.exits,
        daily_pnl = %report.ledger.cumulative_realized_pnl,
        breached = report.ledger.breached,
        "Replay complete"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
