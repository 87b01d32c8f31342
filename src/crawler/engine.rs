//! Fetch/retry engine
//!
//! A fixed pool of `max_concurrent_urls` workers drains the shared queue. Each
//! worker loops:
//!
//! 1. Claim the next eligible item (atomic `pending -> processing`)
//! 2. Fetch it through the page-fetch collaborator, bounded by `timeout`
//! 3. Settle the outcome: persist/reject a record, expand a listing, requeue
//!    with backoff, or retire the item as failed
//! 4. Pause for `delay_between_requests` before claiming again
//!
//! No lock is held across a fetch. The run ends once nothing is pending and no
//! claim is in flight, or when the cancellation token fires; in-flight fetches
//! always settle before a worker exits.

use crate::config::CrawlerConfig;
use crate::crawler::fetcher::{FetchError, FetchedPage, PageFetcher};
use crate::crawler::retry::RetryPolicy;
use crate::crawler::upsert::{persist_candidate, UpsertOutcome};
use crate::storage::{
    LogLevel, QueueItem, RunTotals, SeedUrl, Storage, StorageError, StorageResult, UrlKind,
};
use crate::url::has_valid_scheme;
use crate::CatalogError;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

/// Idle wait while other workers hold claims
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Longest a worker sleeps before re-checking the queue
const MAX_IDLE_WAIT: Duration = Duration::from_secs(1);

/// Resolved engine limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlLimits {
    pub max_concurrent_urls: usize,
    pub max_concurrent_pages: usize,
    pub delay_between_requests: Duration,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub save_404s: bool,
}

impl CrawlLimits {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            max_concurrent_urls: config.max_concurrent_urls as usize,
            max_concurrent_pages: config.max_concurrent_pages as usize,
            delay_between_requests: Duration::from_millis(config.delay_between_requests),
            timeout: Duration::from_millis(config.timeout),
            retry: RetryPolicy::from_config(config),
            save_404s: config.save_404s,
        }
    }
}

/// Counters collected while the engine runs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineReport {
    pub totals: RunTotals,
    /// Transient failures put back to pending
    pub retried: u64,
    /// New URLs added from listing pages
    pub discovered: u64,
    /// The run stopped because the cancellation token fired
    pub cancelled: bool,
    /// First error that stopped a worker, if any
    pub error: Option<String>,
}

#[derive(Debug, Default)]
struct Tracker {
    in_flight: usize,
    listing_in_flight: usize,
    seed_budget: Option<u64>,
    settled: u64,
    report: EngineReport,
}

enum Step {
    Work(QueueItem),
    Wait(Duration),
    Done,
}

/// Drains the queue at bounded concurrency
pub struct FetchEngine<S, F> {
    storage: Arc<Mutex<S>>,
    fetcher: Arc<F>,
    limits: CrawlLimits,
    cancel: CancellationToken,
    halt: CancellationToken,
    tracker: Mutex<Tracker>,
}

impl<S, F> FetchEngine<S, F>
where
    S: Storage + Send + 'static,
    F: PageFetcher + 'static,
{
    /// Creates an engine over a shared store
    ///
    /// # Arguments
    ///
    /// * `storage` - Queue and book store shared by all workers
    /// * `fetcher` - Page-fetch collaborator
    /// * `limits` - Concurrency, pacing, timeout and retry limits
    /// * `cancel` - Run-level cancellation; stops new claims when fired
    pub fn new(
        storage: Arc<Mutex<S>>,
        fetcher: Arc<F>,
        limits: CrawlLimits,
        cancel: CancellationToken,
    ) -> Self {
        let halt = cancel.child_token();
        Self {
            storage,
            fetcher,
            limits,
            cancel,
            halt,
            tracker: Mutex::new(Tracker::default()),
        }
    }

    /// Caps how many new URLs listing pages may add to the queue
    pub fn with_seed_budget(self, budget: Option<u64>) -> Self {
        if let Ok(mut tracker) = self.tracker.lock() {
            tracker.seed_budget = budget;
        }
        self
    }

    /// Runs the worker pool until the queue drains or the run is cancelled
    pub async fn run(self) -> EngineReport {
        let workers = self.limits.max_concurrent_urls.max(1);
        info!(
            "Starting {} workers ({} listing pages at a time)",
            workers, self.limits.max_concurrent_pages
        );

        let engine = Arc::new(self);
        let mut set = JoinSet::new();
        for worker_id in 0..workers {
            let worker = Arc::clone(&engine);
            set.spawn(async move { worker.worker(worker_id).await });
        }

        let mut first_error: Option<String> = None;
        while let Some(joined) = set.join_next().await {
            let result = joined
                .map_err(|e| CatalogError::Worker(e.to_string()))
                .and_then(|r| r);
            if let Err(e) = result {
                error!("Worker stopped: {}", e);
                engine.halt.cancel();
                first_error.get_or_insert_with(|| e.to_string());
            }
        }

        let mut report = match engine.tracker.lock() {
            Ok(tracker) => tracker.report.clone(),
            Err(poisoned) => poisoned.into_inner().report.clone(),
        };
        report.cancelled = engine.cancel.is_cancelled();
        report.error = first_error;
        report
    }

    async fn worker(&self, worker_id: usize) -> crate::Result<()> {
        debug!(worker_id, "Worker started");

        loop {
            if self.halt.is_cancelled() {
                break;
            }

            match self.next_step()? {
                Step::Done => break,
                Step::Wait(wait) => {
                    tokio::select! {
                        _ = self.halt.cancelled() => break,
                        _ = sleep(wait) => {}
                    }
                }
                Step::Work(item) => {
                    self.process(item).await;

                    if !self.limits.delay_between_requests.is_zero() {
                        tokio::select! {
                            _ = self.halt.cancelled() => break,
                            _ = sleep(self.limits.delay_between_requests) => {}
                        }
                    }
                }
            }
        }

        debug!(worker_id, "Worker finished");
        Ok(())
    }

    fn lock_storage(&self) -> Result<MutexGuard<'_, S>, StorageError> {
        self.storage
            .lock()
            .map_err(|_| StorageError::Database("storage lock poisoned".to_string()))
    }

    fn lock_tracker(&self) -> crate::Result<MutexGuard<'_, Tracker>> {
        self.tracker
            .lock()
            .map_err(|_| CatalogError::Worker("tracker lock poisoned".to_string()))
    }

    /// Claims work, or decides whether to wait or stop
    ///
    /// Lock order is always storage, then tracker.
    fn next_step(&self) -> crate::Result<Step> {
        let mut storage = self.lock_storage()?;
        let mut tracker = self.lock_tracker()?;

        let allow_listing = tracker.listing_in_flight < self.limits.max_concurrent_pages;
        let now_ms = Utc::now().timestamp_millis();
        let claim = storage.claim_next(allow_listing, self.limits.retry.retry_attempts, now_ms)?;

        for url in &claim.exhausted {
            warn!(url = %url, "Retry budget exhausted, marking failed");
            tracker.report.totals.failed += 1;
        }

        if let Some(item) = claim.item {
            tracker.in_flight += 1;
            if item.kind == UrlKind::Listing {
                tracker.listing_in_flight += 1;
            }
            return Ok(Step::Work(item));
        }

        if storage.count_pending()? == 0 && tracker.in_flight == 0 {
            return Ok(Step::Done);
        }

        let wait = match storage.next_pending_at()? {
            Some(at) if at > now_ms => {
                Duration::from_millis((at - now_ms) as u64).clamp(IDLE_POLL, MAX_IDLE_WAIT)
            }
            _ => IDLE_POLL,
        };
        Ok(Step::Wait(wait))
    }

    async fn process(&self, item: QueueItem) {
        debug!(url = %item.url, kind = %item.kind, attempt = item.attempts, "Fetching");

        let fetched = match timeout(
            self.limits.timeout,
            self.fetcher.fetch_page(&item.url, item.kind),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(FetchError::Transient(format!(
                "timed out after {}ms",
                self.limits.timeout.as_millis()
            ))),
        };

        if let Err(e) = self.settle(&item, fetched) {
            error!(url = %item.url, "Failed to record outcome: {}", e);
            self.fail_after_error(&item, &e);
        }

        self.release(&item);
    }

    /// Writes the outcome of one fetch to the store
    fn settle(&self, item: &QueueItem, fetched: Result<FetchedPage, FetchError>) -> crate::Result<()> {
        let mut storage = self.lock_storage()?;

        match fetched {
            Ok(FetchedPage::Record(candidate)) => {
                let outcome = persist_candidate(&mut *storage, &item.url, candidate)?;
                let mut tracker = self.lock_tracker()?;
                tracker.report.totals.completed += 1;
                match outcome {
                    UpsertOutcome::Persisted(_) => tracker.report.totals.persisted += 1,
                    UpsertOutcome::Rejected { .. } => tracker.report.totals.rejected += 1,
                }
            }

            Ok(FetchedPage::Listing(urls)) => {
                let found = urls.len();
                let mut tracker = self.lock_tracker()?;
                let mut seeds = resolve_discovered(&item.url, urls);
                if let Some(remaining) = tracker.seed_budget {
                    seeds = cap_new_urls(&*storage, seeds, remaining)?;
                }

                let report = storage.seed(&seeds)?;
                storage.mark_completed(&item.url)?;

                if let Some(remaining) = tracker.seed_budget.as_mut() {
                    *remaining = remaining.saturating_sub(report.inserted);
                }
                tracker.report.discovered += report.inserted;
                tracker.report.totals.completed += 1;
                info!(
                    url = %item.url,
                    "Listing expanded: {} links, {} new",
                    found, report.inserted
                );
            }

            Err(error) if error.is_retryable() && self.limits.retry.can_retry(item.attempts) => {
                let delay = self.limits.retry.delay_for(item.attempts);
                let next_attempt_at = Utc::now().timestamp_millis()
                    + i64::try_from(delay.as_millis()).unwrap_or(i64::MAX / 2);
                storage.requeue(&item.url, error.message(), next_attempt_at)?;
                self.lock_tracker()?.report.retried += 1;
                warn!(
                    url = %item.url,
                    attempt = item.attempts,
                    "{}; retrying in {}ms",
                    error,
                    delay.as_millis()
                );
            }

            Err(FetchError::Transient(message)) => {
                let reason = format!("retries exhausted: {}", message);
                storage.mark_failed(&item.url, &reason, LogLevel::Error)?;
                self.lock_tracker()?.report.totals.failed += 1;
                warn!(url = %item.url, attempts = item.attempts, "{}", reason);
            }

            Err(FetchError::Permanent(message)) => {
                let level = if self.limits.save_404s {
                    LogLevel::Info
                } else {
                    LogLevel::Warn
                };
                storage.mark_failed(&item.url, &message, level)?;
                self.lock_tracker()?.report.totals.failed += 1;
                info!(url = %item.url, "Permanent failure: {}", message);
            }
        }

        Ok(())
    }

    /// Retires an item whose outcome could not be recorded
    ///
    /// If even that fails the item stays `processing` and the next run's
    /// crash recovery puts it back to pending.
    fn fail_after_error(&self, item: &QueueItem, cause: &CatalogError) {
        let reason = format!("persistence error: {}", cause);
        let marked = self
            .lock_storage()
            .map_err(CatalogError::from)
            .and_then(|mut storage| {
                storage
                    .mark_failed(&item.url, &reason, LogLevel::Error)
                    .map_err(CatalogError::from)
            });

        match marked {
            Ok(()) => {
                if let Ok(mut tracker) = self.lock_tracker() {
                    tracker.report.totals.failed += 1;
                }
            }
            Err(e) => error!(url = %item.url, "Could not mark item failed: {}", e),
        }
    }

    fn release(&self, item: &QueueItem) {
        let Ok(mut tracker) = self.lock_tracker() else {
            return;
        };

        tracker.in_flight = tracker.in_flight.saturating_sub(1);
        if item.kind == UrlKind::Listing {
            tracker.listing_in_flight = tracker.listing_in_flight.saturating_sub(1);
        }

        tracker.settled += 1;
        if tracker.settled % 10 == 0 {
            let totals = tracker.report.totals;
            info!(
                "Progress: {} settled, {} persisted, {} rejected, {} failed, {} in flight",
                tracker.settled, totals.persisted, totals.rejected, totals.failed, tracker.in_flight
            );
        }
    }
}

/// Resolves URLs found on a listing page against the page URL
///
/// Anything that does not end up as an absolute http(s) URL is dropped, as are
/// duplicates within the same listing.
pub fn resolve_discovered(page_url: &str, urls: Vec<SeedUrl>) -> Vec<SeedUrl> {
    let base = Url::parse(page_url).ok();
    let mut seen = HashSet::new();
    let mut resolved = Vec::with_capacity(urls.len());

    for mut seed in urls {
        let absolute = match &base {
            Some(base) => base.join(seed.url.trim()).map(String::from).ok(),
            None => Some(seed.url.trim().to_string()),
        };

        match absolute {
            Some(url) if has_valid_scheme(&url) => {
                if seen.insert(url.clone()) {
                    seed.url = url;
                    resolved.push(seed);
                }
            }
            _ => debug!(url = %seed.url, page = page_url, "Dropping unusable discovered URL"),
        }
    }

    resolved
}

/// Keeps at most `remaining` URLs the queue doesn't hold yet
///
/// URLs already queued cost nothing to re-seed and never count against the cap.
fn cap_new_urls<S: Storage + ?Sized>(
    storage: &S,
    seeds: Vec<SeedUrl>,
    remaining: u64,
) -> StorageResult<Vec<SeedUrl>> {
    let mut left = remaining;
    let mut kept = Vec::with_capacity(seeds.len());

    for seed in seeds {
        if storage.get_queue_item(&seed.url)?.is_some() {
            kept.push(seed);
        } else if left > 0 {
            left -= 1;
            kept.push(seed);
        }
    }

    Ok(kept)
}
