//! # Navis Environment Command Line
//!
//! Thin front end over the resolution engine for checking the live upstream
//! feeds by hand: resolve the environment at a point, find the nearest
//! bookable sailing of a boat, or list a boat's sailings over a few days.

// Test modules
#[cfg(test)]
mod tests;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use navis_env_lib::config::{Config, Credentials, DEFAULT_CONFIG_PATH};
use navis_env_lib::providers::{HttpFetcher, JsonFetcher};
use navis_env_lib::reference::ReferenceData;
use navis_env_lib::{kst_wall_clock, logging, report, EnvironmentFusionEngine, ScheduleResolver};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "navis-env", version, about = "Marine conditions and charter schedules for Korean coastal fishing")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level for this crate when RUST_LOG is unset
    #[arg(long, env = "NAVIS_LOG", default_value = "info")]
    log_level: String,

    /// Print JSON instead of the text summary
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fused environment record at a point
    Environment {
        #[arg(long)]
        lat: f64,
        #[arg(long)]
        lon: f64,
        /// 쭈꾸미, 갑오징어 or 쭈갑
        #[arg(long)]
        fish: Option<String>,
        /// Request time (RFC 3339); defaults to now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Earliest bookable sailing of a boat
    Nearest {
        vessel: u32,
        /// First day of the window (YYYY-MM-DD); defaults to today in Korea
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long, default_value_t = 7)]
        days: i64,
        /// Seats needed
        #[arg(long, default_value_t = 1)]
        seats: u32,
    },
    /// All sailings of a boat over a few days
    Window {
        vessel: u32,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long, default_value_t = 7)]
        days: i64,
    },
    /// Write the default configuration to --config
    InitConfig,
}

fn today_kst() -> NaiveDate {
    kst_wall_clock(&Utc::now()).date()
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("serialize output")?);
    Ok(())
}

fn http_fetcher(config: &Config) -> anyhow::Result<Arc<dyn JsonFetcher>> {
    Ok(Arc::new(HttpFetcher::new(&config.http).context("build HTTP client")?))
}

async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    match cli.command {
        Command::InitConfig => {
            Config::default()
                .save(&cli.config)
                .with_context(|| format!("write {}", cli.config.display()))?;
            info!(path = %cli.config.display(), "default configuration written");
        }
        Command::Environment { lat, lon, fish, at } => {
            let reference = ReferenceData::load(&config.reference_path)
                .with_context(|| format!("load reference data from {}", config.reference_path.display()))?
                .shared();
            let credentials = Credentials::from_env(&config.credentials);
            let engine = EnvironmentFusionEngine::from_config(&config, reference, &credentials, http_fetcher(&config)?);

            let requested_at = at.unwrap_or_else(Utc::now);
            let record = engine
                .resolve_environment(lat, lon, fish.as_deref(), requested_at)
                .await
                .context("resolve environment")?;
            if cli.json {
                print_json(&record)?;
            } else {
                print!("{}", report::render_environment(&record));
            }
        }
        Command::Nearest {
            vessel,
            from,
            days,
            seats,
        } => {
            let resolver = ScheduleResolver::from_config(&config.schedule, http_fetcher(&config)?);
            let from = from.unwrap_or_else(today_kst);
            let slot = resolver
                .nearest_available(vessel, from, days, seats)
                .await
                .context("search schedule")?;
            if cli.json {
                print_json(&slot)?;
            } else {
                println!("{}", report::render_nearest(slot.as_ref()));
            }
        }
        Command::Window { vessel, from, days } => {
            let resolver = ScheduleResolver::from_config(&config.schedule, http_fetcher(&config)?);
            let slots = resolver.in_range(vessel, from.unwrap_or_else(today_kst), days).await;
            if cli.json {
                print_json(&slots)?;
            } else {
                print!("{}", report::render_schedule(&slots));
            }
        }
    }
    Ok(())
}

/// Main application entry point.
fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);
    let config = Config::load_from_path(&cli.config);

    // Create Tokio runtime for the upstream calls
    let rt = tokio::runtime::Runtime::new().context("start async runtime")?;
    rt.block_on(run(cli, config))
}
