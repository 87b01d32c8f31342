//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::{CrawlStatus, QueueStatus};
use crate::storage::{
    Book, BookId, Claim, CrawlLogEntry, LogLevel, QueueItem, RunRecord, RunStatus, RunTotals,
    SeedReport, SeedUrl,
};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Queue item not found: {0}")]
    QueueItemNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Invalid queue transition for {url}: {from} -> {to}")]
    InvalidTransition {
        url: String,
        from: QueueStatus,
        to: QueueStatus,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Every queue transition is checked against `QueueStatus::can_transition_to`.
/// Operations that touch more than one table commit atomically.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new crawl run in the `running` state
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, mode: &str, config_hash: &str) -> StorageResult<i64>;

    /// Records the final status and counters of a run
    fn finish_run(&mut self, run_id: i64, status: RunStatus, totals: &RunTotals)
        -> StorageResult<()>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    // ===== Queue =====

    /// Seeds URLs into the queue
    ///
    /// Idempotent per URL: a new URL is inserted as `pending`; an existing one
    /// has its kind and priority refreshed; a `failed` one is put back to
    /// `pending` with a fresh budget. A `completed` URL stays completed.
    fn seed(&mut self, urls: &[SeedUrl]) -> StorageResult<SeedReport>;

    /// Gets a queue item by URL
    fn get_queue_item(&self, url: &str) -> StorageResult<Option<QueueItem>>;

    /// Atomically claims the next eligible pending item
    ///
    /// Items are ordered by descending priority, then oldest first. Claiming
    /// increments `attempts`; an item whose attempts would exceed
    /// `max_attempts` is retired to `failed` and the search continues.
    ///
    /// # Arguments
    ///
    /// * `allow_listing` - Whether listing items may be claimed
    /// * `max_attempts` - Retry budget per item
    /// * `now_ms` - Current time, epoch milliseconds; items backing off past it are skipped
    fn claim_next(
        &mut self,
        allow_listing: bool,
        max_attempts: u32,
        now_ms: i64,
    ) -> StorageResult<Claim>;

    /// Puts a claimed item back to `pending` after a transient failure
    fn requeue(&mut self, url: &str, error: &str, next_attempt_at: i64) -> StorageResult<()>;

    /// Settles a claimed item as `failed` and writes the audit entry
    ///
    /// A book linked to the URL is marked failed; its fields are untouched.
    fn mark_failed(&mut self, url: &str, error: &str, level: LogLevel) -> StorageResult<()>;

    /// Settles a claimed listing item as `completed`
    fn mark_completed(&mut self, url: &str) -> StorageResult<()>;

    /// Returns every `processing` item to `pending` (crash recovery)
    ///
    /// # Returns
    ///
    /// The number of items reset
    fn reset_stuck_processing(&mut self) -> StorageResult<u64>;

    /// Requeues completed detail items last settled before `older_than`
    ///
    /// Linked books go back to `discovered`. `None` means no limit.
    fn refresh_completed(&mut self, older_than: &str, limit: Option<u32>) -> StorageResult<u64>;

    /// Requeues completed detail items whose last rejection involved a link field
    fn requeue_url_rejected(&mut self, limit: Option<u32>) -> StorageResult<u64>;

    /// Counts `pending` items, including ones still backing off
    fn count_pending(&self) -> StorageResult<u64>;

    /// Earliest `next_attempt_at` among pending items
    fn next_pending_at(&self) -> StorageResult<Option<i64>>;

    // ===== Books =====

    /// Inserts or replaces a book by id
    ///
    /// A new id gets a fresh row with `created_at` set; an existing id keeps
    /// its `created_at` and has every mutable field replaced and `updated_at`
    /// refreshed. Either way the book ends `completed`.
    fn upsert_book(&mut self, book: &Book) -> StorageResult<()>;

    /// Upserts a book and settles its queue item as `completed` in one transaction
    fn commit_book(&mut self, url: &str, book: &Book) -> StorageResult<()>;

    /// Records a validation rejection
    ///
    /// Writes a warn-level audit entry, settles the queue item as `completed`
    /// with the errors as `last_error`, and marks a linked book failed. Nothing
    /// is written to the book's fields.
    fn record_rejection(
        &mut self,
        url: &str,
        book_id: Option<&BookId>,
        errors: &[String],
        url_rejected: bool,
    ) -> StorageResult<()>;

    /// Gets a book by id
    fn get_book(&self, id: &BookId) -> StorageResult<Option<Book>>;

    /// Gets total book count
    fn count_books(&self) -> StorageResult<u64>;

    // ===== Audit Log =====

    /// Appends an audit entry
    fn append_log(
        &mut self,
        level: LogLevel,
        message: &str,
        book_id: Option<&str>,
        url: Option<&str>,
        error_details: Option<&str>,
    ) -> StorageResult<i64>;

    /// Gets audit entries, oldest first, optionally for one URL
    fn get_logs(&self, url: Option<&str>) -> StorageResult<Vec<CrawlLogEntry>>;

    // ===== Statistics =====

    /// Counts queue items per status
    fn count_queue_by_status(&self) -> StorageResult<HashMap<QueueStatus, u64>>;

    /// Counts books per crawl status
    fn count_books_by_status(&self) -> StorageResult<HashMap<CrawlStatus, u64>>;
}
