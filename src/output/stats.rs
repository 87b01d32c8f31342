//! Status query over the crawl database
//!
//! Aggregate queue and book counts plus the latest run, and their console
//! rendering.

use crate::state::{CrawlStatus, QueueStatus};
use crate::storage::{RunRecord, Storage, StorageResult};
use std::collections::HashMap;

/// Aggregate counts of the store
#[derive(Debug, Clone)]
pub struct StatusReport {
    /// Queue items per status, every status present
    pub queue: HashMap<QueueStatus, u64>,

    /// Books per crawl status, every status present
    pub books: HashMap<CrawlStatus, u64>,

    /// Most recent run, if any
    pub latest_run: Option<RunRecord>,
}

impl StatusReport {
    pub fn total_urls(&self) -> u64 {
        self.queue.values().sum()
    }

    pub fn total_books(&self) -> u64 {
        self.books.values().sum()
    }

    pub fn queue_count(&self, status: QueueStatus) -> u64 {
        self.queue.get(&status).copied().unwrap_or(0)
    }

    pub fn book_count(&self, status: CrawlStatus) -> u64 {
        self.books.get(&status).copied().unwrap_or(0)
    }
}

/// Loads the status report from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(StatusReport)` - Successfully loaded counts
/// * `Err(StorageError)` - Failed to query the store
pub fn load_status<S: Storage + ?Sized>(storage: &S) -> StorageResult<StatusReport> {
    Ok(StatusReport {
        queue: storage.count_queue_by_status()?,
        books: storage.count_books_by_status()?,
        latest_run: storage.get_latest_run()?,
    })
}

fn percentage(part: u64, total: u64) -> f64 {
    if total > 0 {
        (part as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}

/// Prints the status report to stdout
pub fn print_statistics(report: &StatusReport) {
    println!("=== Crawl Status ===\n");

    let total_urls = report.total_urls();
    println!("URL Queue ({} total):", total_urls);
    for status in QueueStatus::all_statuses() {
        let count = report.queue_count(status);
        println!(
            "  {:<11} {:>8} ({:.1}%)",
            status.to_db_string(),
            count,
            percentage(count, total_urls)
        );
    }
    println!();

    let total_books = report.total_books();
    println!("Books ({} total):", total_books);
    for status in CrawlStatus::all_statuses() {
        let count = report.book_count(status);
        println!(
            "  {:<11} {:>8} ({:.1}%)",
            status.to_db_string(),
            count,
            percentage(count, total_books)
        );
    }
    println!();

    match &report.latest_run {
        Some(run) => {
            println!("Latest Run:");
            println!("  ID: {}", run.id);
            println!("  Mode: {}", run.mode);
            println!("  Status: {}", run.status.to_db_string());
            println!("  Started: {}", run.started_at);
            if let Some(finished) = &run.finished_at {
                println!("  Finished: {}", finished);
            }
            println!(
                "  Persisted: {}, rejected: {}, failed: {}",
                run.totals.persisted, run.totals.rejected, run.totals.failed
            );
        }
        None => println!("No crawl runs recorded yet"),
    }
}
