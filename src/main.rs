//! Catalog Crawler main entry point
//!
//! This is the command-line interface for the catalog crawler.

use anyhow::Context;
use catalog_crawler::config::{load_config_with_hash, Config};
use catalog_crawler::crawler::{crawl, open_target_storage, ModePlan, RunMode};
use catalog_crawler::output::{load_status, print_plan, print_statistics, print_summary};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Catalog Crawler: a resumable audiobook catalog crawl
///
/// Drains a durable URL queue at bounded concurrency, validates and
/// normalizes every fetched record, and upserts accepted books into SQLite.
/// Interrupted runs resume where they stopped.
#[derive(Parser, Debug)]
#[command(name = "catalog-crawler")]
#[command(version)]
#[command(about = "A resumable catalog crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Run mode
    #[arg(short, long, value_enum, default_value_t = RunMode::Full)]
    mode: RunMode,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what the mode would do without crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show queue and book statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        print_plan(&ModePlan::new(cli.mode, &config, Utc::now()));
    } else if cli.stats {
        handle_stats(&config, cli.mode)?;
    } else {
        handle_crawl(&config, &config_hash, cli.mode).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("catalog_crawler=info,warn"),
            1 => EnvFilter::new("catalog_crawler=debug,info"),
            2 => EnvFilter::new("catalog_crawler=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles --stats: prints counts from the database the mode writes to
fn handle_stats(config: &Config, mode: RunMode) -> anyhow::Result<()> {
    let plan = ModePlan::new(mode, config, Utc::now());
    let storage = open_target_storage(&plan.store).context("failed to open database")?;
    let report = load_status(&storage).context("failed to load statistics")?;
    print_statistics(&report);
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config, config_hash: &str, mode: RunMode) -> anyhow::Result<()> {
    tracing::info!(
        "Starting {} crawl with {} seed URLs, {} workers",
        mode,
        config.seeds.len(),
        config.crawler.max_concurrent_urls
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; finishing in-flight pages");
            on_signal.cancel();
        }
    });

    match crawl(config, config_hash, mode, cancel).await {
        Ok(summary) => {
            print_summary(&summary);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
