//! Crawl orchestration
//!
//! This module contains the core crawling logic, including:
//! - The page-fetch collaborator contract and its HTTP adapter
//! - Retry policy for transient failures
//! - The bounded-concurrency fetch engine
//! - The upsert/dedup layer that validates and persists records
//! - Run modes and the run lifecycle

mod coordinator;
mod engine;
mod fetcher;
mod modes;
mod retry;
mod upsert;

pub use coordinator::{Crawler, RunSummary};
pub use engine::{resolve_discovered, CrawlLimits, EngineReport, FetchEngine};
pub use fetcher::{
    classify_status, discovered, FetchError, FetchedPage, HttpPageFetcher, PageFetcher,
    DISCOVERED_DETAIL_PRIORITY, DISCOVERED_LISTING_PRIORITY,
};
pub use modes::{ModePlan, RunMode, Seeding, StoreTarget};
pub use retry::RetryPolicy;
pub use upsert::{persist_candidate, UpsertOutcome};

use crate::config::Config;
use crate::storage::SqliteStorage;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Opens the store a mode plan points at
pub fn open_target_storage(target: &StoreTarget) -> crate::Result<SqliteStorage> {
    match target {
        StoreTarget::Primary(path) | StoreTarget::Isolated(Some(path)) => {
            info!("Opening database {}", path.display());
            SqliteStorage::new(path)
        }
        StoreTarget::Isolated(None) => {
            info!("Using an in-memory database");
            SqliteStorage::new_in_memory()
        }
    }
}

/// Runs a complete crawl in the given mode
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Build the mode plan from the configuration
/// 2. Open the store the mode targets
/// 3. Build the HTTP page fetcher
/// 4. Run the crawl until the queue drains or `cancel` fires
///
/// # Arguments
///
/// * `config` - Resolved configuration
/// * `config_hash` - Hash recorded with the run
/// * `mode` - Run mode
/// * `cancel` - Stops new claims when fired; in-flight fetches still settle
pub async fn crawl(
    config: &Config,
    config_hash: &str,
    mode: RunMode,
    cancel: CancellationToken,
) -> crate::Result<RunSummary> {
    let plan = ModePlan::new(mode, config, Utc::now());
    let storage = open_target_storage(&plan.store)?;
    let fetcher = HttpPageFetcher::new(&config.fetcher, plan.limits.timeout)?;

    Crawler::new(storage, fetcher, plan, config_hash)
        .with_cancel_token(cancel)
        .run()
        .await
}
