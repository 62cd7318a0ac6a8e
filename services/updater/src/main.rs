//! Updater binary - one end-to-end run
//!
//! Usage:
//!   # Fetch the live feed and load it:
//!   cargo run --bin updater
//!
//!   # Load a saved export, computing the writes without committing them:
//!   cargo run --bin updater -- --feed-file carburants.csv --dry-run

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use collector::{load_snapshot_file, FeedClient};
use std::path::PathBuf;
use tracing::{error, info, info_span, warn, Instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use updater::config::Config;
use updater::normalize::normalize;
use updater::{PgWarehouse, SyncReport, Updater};

#[derive(Parser, Debug)]
#[command(name = "updater", about = "Loads fuel prices into the warehouse")]
struct Args {
    /// Compute the run's writes without committing them
    #[arg(long, default_value = "false")]
    dry_run: bool,

    /// Region code to keep (overrides REGION_CODE)
    #[arg(long)]
    region: Option<String>,

    /// Read the feed from a saved CSV export instead of the API
    #[arg(long)]
    feed_file: Option<PathBuf>,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn log_report(report: &SyncReport) {
    info!(
        date_id = report.date_id,
        stations = report.stations_inserted,
        facts = report.facts_inserted,
        first_price_id = ?report.first_price_id,
        last_price_id = ?report.last_price_id,
        unknown_fuels = report.unknown_fuels,
        dry_run = report.dry_run,
        "run summary"
    );
}

async fn run(args: Args, config: Config) -> Result<()> {
    let region = args.region.unwrap_or(config.region_code);

    let snapshot = match &args.feed_file {
        Some(path) => load_snapshot_file(path).await?,
        None => FeedClient::new()?.fetch_snapshot(&config.feed_url).await?,
    };
    info!(records = snapshot.len(), "feed snapshot loaded");

    let normalized = normalize(&snapshot, &region).context("Failed to normalize feed")?;
    info!(
        rows = normalized.rows.len(),
        malformed = normalized.rejected.len(),
        other_region = normalized.other_region,
        region = %region,
        "snapshot normalized"
    );

    let warehouse = PgWarehouse::connect(&config.db_url, config.max_connections)
        .await
        .context("Failed to connect to warehouse")?;
    let updater = Updater::new(warehouse, config.tables);
    let observed_at = Local::now().naive_local();

    let report = if args.dry_run {
        let plan = updater
            .plan(&normalized.rows, observed_at)
            .await
            .context("Failed to plan sync")?;
        warn!("dry run - nothing written to the warehouse");
        plan.report(true)
    } else {
        updater
            .run(&normalized.rows, observed_at)
            .await
            .context("Sync run failed")?
    };

    log_report(&report);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let args = Args::parse();
    let config = Config::from_env()?;

    let run_id = Uuid::new_v4();
    let span = info_span!("run", %run_id);

    info!(%run_id, "starting fuel price update");
    match run(args, config).instrument(span).await {
        Ok(()) => {
            info!(%run_id, "update completed");
            Ok(())
        }
        Err(e) => {
            error!(%run_id, error = ?e, "update failed");
            Err(e)
        }
    }
}
