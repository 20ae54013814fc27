//! Ratekeeper Binary
//!
//! Fetches exchange rates on a schedule and answers rate lookups from the
//! local cache.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};

use ratekeeper_common::{time, Timestamp};
use ratekeeper_daemon::{logging, RateService, ServiceConfig};
use ratekeeper_fx::CachedRate;

/// Ratekeeper CLI
#[derive(Parser, Debug)]
#[command(name = "ratekeeper")]
#[command(about = "Multi-source exchange rate fetcher and cache")]
struct Args {
    /// JSON settings file applied over the defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run scheduled updates until Ctrl+C
    Serve,
    /// Run one update and print the report
    Update {
        /// Only query sources whose name matches this filter
        #[arg(short, long)]
        source: Option<String>,
    },
    /// Print the rate for one pair
    Rate {
        from: String,
        to: String,
    },
    /// Print every cached rate
    Rates,
}

#[derive(Serialize)]
struct RatesOutput {
    pairs: BTreeMap<String, CachedRate>,
    #[serde(with = "time::iso8601::option")]
    last_refresh: Option<Timestamp>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = ServiceConfig::load(args.config.as_deref())?;
    logging::init(&config);

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let service = RateService::new(config)?;

    match args.command {
        Command::Serve => serve(service).await?,
        Command::Update { source } => {
            let report = service.run_update(source.as_deref()).await?;
            print_json(&report)?;
        }
        Command::Rate { from, to } => {
            let quote = service.get_rate(&from, &to)?;
            print_json(&quote)?;
        }
        Command::Rates => {
            print_json(&RatesOutput {
                pairs: service.get_all_rates(),
                last_refresh: service.last_refresh(),
            })?;
        }
    }

    Ok(())
}

async fn serve(service: RateService) -> anyhow::Result<()> {
    info!(
        interval_secs = service.config().update_interval.as_secs(),
        "Starting Ratekeeper"
    );
    service.start();

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    service.stop().await;
    info!("Ratekeeper shutdown complete");
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
