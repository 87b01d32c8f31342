//! Crawl coordinator - run lifecycle around the fetch engine
//!
//! A run goes through these steps:
//! - Put items a crashed run left in `processing` back to pending
//! - Record a new run row with the mode and config hash
//! - Seed the queue the way the mode plan says
//! - Drain the queue with the fetch engine
//! - Record the final run status and counters

use crate::crawler::engine::FetchEngine;
use crate::crawler::fetcher::PageFetcher;
use crate::crawler::modes::{ModePlan, RunMode};
use crate::storage::{RunStatus, RunTotals, Storage, StorageError};
use crate::CatalogError;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Result of one crawl run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: i64,
    pub mode: RunMode,
    pub status: RunStatus,
    pub totals: RunTotals,
    /// Items put back after stale `processing` claims were found at startup
    pub recovered: u64,
    /// URLs inserted by seeding
    pub seeded: u64,
    /// URLs inserted from listing pages
    pub discovered: u64,
    /// Transient failures that were requeued
    pub retried: u64,
    pub elapsed: Duration,
}

/// Runs one crawl against a store and a page fetcher
pub struct Crawler<S, F> {
    storage: Arc<Mutex<S>>,
    fetcher: Arc<F>,
    plan: ModePlan,
    config_hash: String,
    cancel: CancellationToken,
}

impl<S, F> Crawler<S, F>
where
    S: Storage + Send + 'static,
    F: PageFetcher + 'static,
{
    /// Creates a crawler
    ///
    /// # Arguments
    ///
    /// * `storage` - Store the run reads its queue from and writes books to
    /// * `fetcher` - Page-fetch collaborator
    /// * `plan` - Seeding policy, limits and store choice for the mode
    /// * `config_hash` - Hash of the configuration, recorded with the run
    pub fn new(storage: S, fetcher: F, plan: ModePlan, config_hash: impl Into<String>) -> Self {
        Self {
            storage: Arc::new(Mutex::new(storage)),
            fetcher: Arc::new(fetcher),
            plan,
            config_hash: config_hash.into(),
            cancel: CancellationToken::new(),
        }
    }

    /// Uses an externally owned cancellation token (e.g. wired to Ctrl-C)
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Shared handle to the underlying store
    pub fn storage(&self) -> Arc<Mutex<S>> {
        Arc::clone(&self.storage)
    }

    pub fn plan(&self) -> &ModePlan {
        &self.plan
    }

    fn lock(&self) -> Result<MutexGuard<'_, S>, StorageError> {
        self.storage
            .lock()
            .map_err(|_| StorageError::Database("storage lock poisoned".to_string()))
    }

    /// Runs the crawl to completion or cancellation
    ///
    /// # Returns
    ///
    /// * `Ok(RunSummary)` - The run finished as `completed` or `interrupted`
    /// * `Err(CatalogError)` - Setup failed, or a worker hit an unrecoverable
    ///   store error (the run is recorded as `failed`)
    pub async fn run(&self) -> crate::Result<RunSummary> {
        let started = Instant::now();
        let mode = self.plan.mode;

        let (run_id, recovered, seeded) = {
            let mut storage = self.lock()?;

            let recovered = storage.reset_stuck_processing()?;
            if recovered > 0 {
                warn!("Recovered {} items left in processing by a previous run", recovered);
            }

            let run_id = storage.create_run(mode.as_str(), &self.config_hash)?;
            info!("Started run {} in {} mode", run_id, mode);

            let seeded = match self.plan.apply_seeding(&mut *storage) {
                Ok(seeded) => seeded,
                Err(e) => {
                    error!("Seeding failed: {}", e);
                    storage.finish_run(run_id, RunStatus::Failed, &RunTotals::default())?;
                    return Err(e.into());
                }
            };

            (run_id, recovered, seeded)
        };

        let engine = FetchEngine::new(
            Arc::clone(&self.storage),
            Arc::clone(&self.fetcher),
            self.plan.limits.clone(),
            self.cancel.clone(),
        )
        .with_seed_budget(self.plan.remaining_budget(seeded));
        let report = engine.run().await;

        let status = if report.error.is_some() {
            RunStatus::Failed
        } else if report.cancelled {
            RunStatus::Interrupted
        } else {
            RunStatus::Completed
        };
        self.lock()?.finish_run(run_id, status, &report.totals)?;

        let elapsed = started.elapsed();
        info!(
            "Run {} {}: {} persisted, {} rejected, {} failed in {:.1}s",
            run_id,
            status.to_db_string(),
            report.totals.persisted,
            report.totals.rejected,
            report.totals.failed,
            elapsed.as_secs_f64()
        );

        if let Some(message) = report.error {
            return Err(CatalogError::Worker(message));
        }

        Ok(RunSummary {
            run_id,
            mode,
            status,
            totals: report.totals,
            recovered,
            seeded,
            discovered: report.discovered,
            retried: report.retried,
            elapsed,
        })
    }
}
