//! Mode controller
//!
//! A run mode only decides how the queue is seeded and which limits the engine
//! runs with. The engine, the queue and the upsert layer behave the same in
//! every mode.

use crate::config::Config;
use crate::crawler::engine::CrawlLimits;
use crate::storage::{format_timestamp, SeedUrl, Storage, StorageResult};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::fmt;
use std::path::PathBuf;
use tracing::info;

/// A century; anything longer means "every completed page"
const MAX_FRESHNESS_HOURS: u64 = 24 * 365 * 100;

/// Supported run modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RunMode {
    /// Seed every discovery URL, one listing page at a time
    Full,
    /// Refresh completed detail pages older than the freshness threshold
    Update,
    /// Refetch detail pages whose audio or download link was rejected
    FixDownloadAll,
    /// Like `full`, with listing pagination in parallel
    FullDatabase,
    /// A capped crawl against an isolated store
    Test,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Update => "update",
            Self::FixDownloadAll => "fix-download-all",
            Self::FullDatabase => "full-database",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the queue gets its work before the engine starts
#[derive(Debug, Clone, PartialEq)]
pub enum Seeding {
    /// Idempotent seed of the given URLs
    Seeds(Vec<SeedUrl>),

    /// Put completed detail items last settled before `older_than` back to pending
    RefreshCompleted {
        older_than: DateTime<Utc>,
        limit: Option<u32>,
    },

    /// Put detail items whose last rejection involved a link back to pending
    RequeueUrlRejected { limit: Option<u32> },
}

/// Which store a run writes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTarget {
    /// The configured production database
    Primary(PathBuf),

    /// A separate database, or an in-memory one when no path is given
    Isolated(Option<PathBuf>),
}

/// Everything a mode decides for one run
#[derive(Debug, Clone)]
pub struct ModePlan {
    pub mode: RunMode,
    pub seeding: Seeding,
    pub limits: CrawlLimits,
    /// Cap on URLs a run may add to the queue, discovered ones included
    pub seed_budget: Option<u64>,
    pub store: StoreTarget,
}

impl ModePlan {
    /// Builds the plan for `mode` from a resolved configuration
    ///
    /// # Arguments
    ///
    /// * `mode` - The requested run mode
    /// * `config` - Resolved configuration
    /// * `now` - Reference time for freshness thresholds
    pub fn new(mode: RunMode, config: &Config, now: DateTime<Utc>) -> Self {
        let mut limits = CrawlLimits::from_config(&config.crawler);
        let modes = &config.modes;
        let primary = StoreTarget::Primary(PathBuf::from(&config.output.database_path));

        if mode != RunMode::FullDatabase {
            limits.max_concurrent_pages = 1;
        }

        match mode {
            RunMode::Full | RunMode::FullDatabase => Self {
                mode,
                seeding: Seeding::Seeds(config.seeds.clone()),
                limits,
                seed_budget: None,
                store: primary,
            },
            RunMode::Update => {
                let freshness =
                    ChronoDuration::hours(modes.update_freshness_hours.min(MAX_FRESHNESS_HOURS) as i64);
                Self {
                    mode,
                    seeding: Seeding::RefreshCompleted {
                        older_than: now - freshness,
                        limit: modes.update_limit,
                    },
                    limits,
                    seed_budget: None,
                    store: primary,
                }
            }
            RunMode::FixDownloadAll => Self {
                mode,
                seeding: Seeding::RequeueUrlRejected {
                    limit: modes.fix_limit,
                },
                limits,
                seed_budget: None,
                store: primary,
            },
            RunMode::Test => {
                let limit = modes.test_limit as usize;
                Self {
                    mode,
                    seeding: Seeding::Seeds(config.seeds.iter().take(limit).cloned().collect()),
                    limits,
                    seed_budget: Some(modes.test_limit as u64),
                    store: StoreTarget::Isolated(
                        config.output.test_database_path.as_ref().map(PathBuf::from),
                    ),
                }
            }
        }
    }

    /// Applies the seeding policy to the queue
    ///
    /// # Returns
    ///
    /// The number of URLs newly inserted into the queue (the part that counts
    /// against a seed budget)
    pub fn apply_seeding<S: Storage + ?Sized>(&self, storage: &mut S) -> StorageResult<u64> {
        match &self.seeding {
            Seeding::Seeds(seeds) => {
                let report = storage.seed(seeds)?;
                info!(
                    "Seeded {} URLs ({} new, {} refreshed, {} requeued)",
                    report.total(),
                    report.inserted,
                    report.updated,
                    report.requeued
                );
                Ok(report.inserted)
            }
            Seeding::RefreshCompleted { older_than, limit } => {
                let count = storage.refresh_completed(&format_timestamp(*older_than), *limit)?;
                info!("Requeued {} completed detail pages older than {}", count, older_than);
                Ok(0)
            }
            Seeding::RequeueUrlRejected { limit } => {
                let count = storage.requeue_url_rejected(*limit)?;
                info!("Requeued {} detail pages with rejected links", count);
                Ok(0)
            }
        }
    }

    /// Budget left for discovered URLs once seeding inserted `seeded` URLs
    pub fn remaining_budget(&self, seeded: u64) -> Option<u64> {
        self.seed_budget.map(|budget| budget.saturating_sub(seeded))
    }
}
