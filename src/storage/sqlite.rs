//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::state::{CrawlStatus, QueueStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    Book, BookId, Claim, CrawlLogEntry, LogLevel, QueueItem, RunRecord, RunStatus, RunTotals,
    SeedReport, SeedUrl, UrlKind,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::collections::HashMap;
use std::path::Path;

const QUEUE_COLUMNS: &str = "url, kind, priority, status, attempts, last_error, url_rejected, \
     next_attempt_at, created_at, updated_at";

const BOOK_COLUMNS: &str = "id, title, author, description, duration_total_minutes, \
     duration_formatted, type, language, category, rating, rating_count, cover_image_url, \
     main_audio_url, download_url, file_size, published_at, source_url, created_at, updated_at, \
     crawl_status";

const RUN_COLUMNS: &str =
    "id, mode, config_hash, status, started_at, finished_at, completed, failed, rejected, persisted";

/// Formats a timestamp the way every `*_at` TEXT column stores it
///
/// Fixed-width UTC with microseconds, so lexical order is time order.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn now() -> String {
    format_timestamp(Utc::now())
}

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(CatalogError)` - Failed to open database
    pub fn new(path: &Path) -> crate::Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    ///
    /// Used by test mode when no isolated database path is configured.
    pub fn new_in_memory() -> crate::Result<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn row_to_queue_item(row: &Row<'_>) -> rusqlite::Result<QueueItem> {
    Ok(QueueItem {
        url: row.get(0)?,
        kind: UrlKind::from_db_string(&row.get::<_, String>(1)?).unwrap_or(UrlKind::Detail),
        priority: row.get(2)?,
        status: QueueStatus::from_db_string(&row.get::<_, String>(3)?)
            .unwrap_or(QueueStatus::Failed),
        attempts: row.get(4)?,
        last_error: row.get(5)?,
        url_rejected: row.get(6)?,
        next_attempt_at: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn row_to_book(row: &Row<'_>) -> rusqlite::Result<Book> {
    Ok(Book {
        id: BookId::from_key(&row.get::<_, String>(0)?),
        title: row.get(1)?,
        author: row.get(2)?,
        description: row.get(3)?,
        duration_total_minutes: row.get(4)?,
        duration_formatted: row.get(5)?,
        book_type: row.get(6)?,
        language: row.get(7)?,
        category: row.get(8)?,
        rating: row.get(9)?,
        rating_count: row.get(10)?,
        cover_image_url: row.get(11)?,
        main_audio_url: row.get(12)?,
        download_url: row.get(13)?,
        file_size: row.get(14)?,
        published_at: row.get(15)?,
        source_url: row.get(16)?,
        created_at: row.get(17)?,
        updated_at: row.get(18)?,
        crawl_status: CrawlStatus::from_db_string(&row.get::<_, String>(19)?)
            .unwrap_or(CrawlStatus::Discovered),
    })
}

fn row_to_run(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        mode: row.get(1)?,
        config_hash: row.get(2)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(3)?)
            .unwrap_or(RunStatus::Running),
        started_at: row.get(4)?,
        finished_at: row.get(5)?,
        totals: RunTotals {
            completed: row.get::<_, i64>(6)? as u64,
            failed: row.get::<_, i64>(7)? as u64,
            rejected: row.get::<_, i64>(8)? as u64,
            persisted: row.get::<_, i64>(9)? as u64,
        },
    })
}

fn row_to_log(row: &Row<'_>) -> rusqlite::Result<CrawlLogEntry> {
    Ok(CrawlLogEntry {
        id: row.get(0)?,
        level: LogLevel::from_db_string(&row.get::<_, String>(1)?).unwrap_or(LogLevel::Info),
        message: row.get(2)?,
        book_id: row.get(3)?,
        url: row.get(4)?,
        error_details: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Checks that the item at `url` may move to `to` and returns its current status
fn check_transition(conn: &Connection, url: &str, to: QueueStatus) -> StorageResult<QueueStatus> {
    let current: Option<String> = conn
        .query_row(
            "SELECT status FROM url_queue WHERE url = ?1",
            params![url],
            |row| row.get(0),
        )
        .optional()?;

    let current = current.ok_or_else(|| StorageError::QueueItemNotFound(url.to_string()))?;
    let from = QueueStatus::from_db_string(&current)
        .ok_or_else(|| StorageError::Serialization(format!("unknown queue status: {}", current)))?;

    if !from.can_transition_to(to) {
        return Err(StorageError::InvalidTransition {
            url: url.to_string(),
            from,
            to,
        });
    }

    Ok(from)
}

fn insert_log(
    conn: &Connection,
    level: LogLevel,
    message: &str,
    book_id: Option<&str>,
    url: Option<&str>,
    error_details: Option<&str>,
) -> StorageResult<i64> {
    conn.execute(
        "INSERT INTO crawl_logs (level, message, book_id, url, error_details, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![level.to_db_string(), message, book_id, url, error_details, now()],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Sets the crawl status of books fetched from `url` (or carrying `book_id`)
fn set_linked_book_status(
    conn: &Connection,
    url: &str,
    book_id: Option<&str>,
    status: CrawlStatus,
) -> StorageResult<usize> {
    let changed = conn.execute(
        "UPDATE books SET crawl_status = ?1 WHERE source_url = ?2 OR id = ?3",
        params![status.to_db_string(), url, book_id],
    )?;
    Ok(changed)
}

fn upsert_book_row(conn: &Connection, book: &Book) -> StorageResult<()> {
    let now = now();
    conn.execute(
        "INSERT INTO books (id, title, author, description, duration_total_minutes,
             duration_formatted, type, language, category, rating, rating_count,
             cover_image_url, main_audio_url, download_url, file_size, published_at,
             source_url, created_at, updated_at, crawl_status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
             ?17, ?18, ?18, ?19)
         ON CONFLICT(id) DO UPDATE SET
             title = excluded.title,
             author = excluded.author,
             description = excluded.description,
             duration_total_minutes = excluded.duration_total_minutes,
             duration_formatted = excluded.duration_formatted,
             type = excluded.type,
             language = excluded.language,
             category = excluded.category,
             rating = excluded.rating,
             rating_count = excluded.rating_count,
             cover_image_url = excluded.cover_image_url,
             main_audio_url = excluded.main_audio_url,
             download_url = excluded.download_url,
             file_size = excluded.file_size,
             published_at = excluded.published_at,
             source_url = COALESCE(excluded.source_url, books.source_url),
             updated_at = excluded.updated_at,
             crawl_status = excluded.crawl_status",
        params![
            book.id.key(),
            book.title,
            book.author,
            book.description,
            book.duration_total_minutes,
            book.duration_formatted,
            book.book_type,
            book.language,
            book.category,
            book.rating,
            book.rating_count,
            book.cover_image_url,
            book.main_audio_url,
            book.download_url,
            book.file_size,
            book.published_at,
            book.source_url,
            now,
            CrawlStatus::Completed.to_db_string(),
        ],
    )?;
    Ok(())
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, mode: &str, config_hash: &str) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO crawl_runs (mode, config_hash, status, started_at) VALUES (?1, ?2, ?3, ?4)",
            params![mode, config_hash, RunStatus::Running.to_db_string(), now()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        totals: &RunTotals,
    ) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE crawl_runs SET status = ?1, finished_at = ?2, completed = ?3, failed = ?4,
             rejected = ?5, persisted = ?6 WHERE id = ?7",
            params![
                status.to_db_string(),
                now(),
                totals.completed as i64,
                totals.failed as i64,
                totals.rejected as i64,
                totals.persisted as i64,
                run_id
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let sql = format!("SELECT {} FROM crawl_runs WHERE id = ?1", RUN_COLUMNS);
        self.conn
            .query_row(&sql, params![run_id], row_to_run)
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let sql = format!("SELECT {} FROM crawl_runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS);
        let run = self.conn.query_row(&sql, [], row_to_run).optional()?;
        Ok(run)
    }

    // ===== Queue =====

    fn seed(&mut self, urls: &[SeedUrl]) -> StorageResult<SeedReport> {
        let tx = self.conn.transaction()?;
        let mut report = SeedReport::default();

        for seed in urls {
            let now = now();
            let existing: Option<String> = tx
                .query_row(
                    "SELECT status FROM url_queue WHERE url = ?1",
                    params![seed.url],
                    |row| row.get(0),
                )
                .optional()?;

            match existing.as_deref().and_then(QueueStatus::from_db_string) {
                None if existing.is_none() => {
                    tx.execute(
                        "INSERT INTO url_queue (url, kind, priority, status, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                        params![
                            seed.url,
                            seed.kind.to_db_string(),
                            seed.priority,
                            QueueStatus::Pending.to_db_string(),
                            now
                        ],
                    )?;
                    report.inserted += 1;
                }
                Some(QueueStatus::Failed) => {
                    check_transition(&tx, &seed.url, QueueStatus::Pending)?;
                    tx.execute(
                        "UPDATE url_queue SET kind = ?1, priority = ?2, status = ?3, attempts = 0,
                         last_error = NULL, next_attempt_at = 0, updated_at = ?4 WHERE url = ?5",
                        params![
                            seed.kind.to_db_string(),
                            seed.priority,
                            QueueStatus::Pending.to_db_string(),
                            now,
                            seed.url
                        ],
                    )?;
                    report.requeued += 1;
                }
                _ => {
                    tx.execute(
                        "UPDATE url_queue SET kind = ?1, priority = ?2 WHERE url = ?3",
                        params![seed.kind.to_db_string(), seed.priority, seed.url],
                    )?;
                    report.updated += 1;
                }
            }
        }

        tx.commit()?;
        Ok(report)
    }

    fn get_queue_item(&self, url: &str) -> StorageResult<Option<QueueItem>> {
        let sql = format!("SELECT {} FROM url_queue WHERE url = ?1", QUEUE_COLUMNS);
        let item = self
            .conn
            .query_row(&sql, params![url], row_to_queue_item)
            .optional()?;
        Ok(item)
    }

    fn claim_next(
        &mut self,
        allow_listing: bool,
        max_attempts: u32,
        now_ms: i64,
    ) -> StorageResult<Claim> {
        let kind_filter = if allow_listing {
            String::new()
        } else {
            format!(" AND kind = '{}'", UrlKind::Detail.to_db_string())
        };
        let sql = format!(
            "SELECT {} FROM url_queue
             WHERE status = ?1 AND next_attempt_at <= ?2{}
             ORDER BY priority DESC, created_at ASC, rowid ASC
             LIMIT 1",
            QUEUE_COLUMNS, kind_filter
        );

        // IMMEDIATE takes the write lock up front so two claimers never read
        // the same pending row
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut claim = Claim::default();

        loop {
            let next = tx
                .query_row(
                    &sql,
                    params![QueueStatus::Pending.to_db_string(), now_ms],
                    row_to_queue_item,
                )
                .optional()?;

            let Some(mut item) = next else {
                break;
            };
            let now = now();

            if item.attempts >= max_attempts {
                let error = format!("retry budget exhausted after {} attempts", item.attempts);
                check_transition(&tx, &item.url, QueueStatus::Failed)?;
                tx.execute(
                    "UPDATE url_queue SET status = ?1, last_error = ?2, updated_at = ?3 WHERE url = ?4",
                    params![QueueStatus::Failed.to_db_string(), error, now, item.url],
                )?;
                insert_log(
                    &tx,
                    LogLevel::Error,
                    "Queue item failed",
                    None,
                    Some(&item.url),
                    Some(&error),
                )?;
                set_linked_book_status(&tx, &item.url, None, CrawlStatus::Failed)?;
                claim.exhausted.push(item.url);
                continue;
            }

            check_transition(&tx, &item.url, QueueStatus::Processing)?;
            item.attempts += 1;
            tx.execute(
                "UPDATE url_queue SET status = ?1, attempts = ?2, updated_at = ?3 WHERE url = ?4",
                params![
                    QueueStatus::Processing.to_db_string(),
                    item.attempts,
                    now,
                    item.url
                ],
            )?;
            if item.kind == UrlKind::Detail {
                set_linked_book_status(&tx, &item.url, None, CrawlStatus::Processing)?;
            }

            item.status = QueueStatus::Processing;
            item.updated_at = now;
            claim.item = Some(item);
            break;
        }

        tx.commit()?;
        Ok(claim)
    }

    fn requeue(&mut self, url: &str, error: &str, next_attempt_at: i64) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        check_transition(&tx, url, QueueStatus::Pending)?;
        tx.execute(
            "UPDATE url_queue SET status = ?1, last_error = ?2, next_attempt_at = ?3,
             updated_at = ?4 WHERE url = ?5",
            params![
                QueueStatus::Pending.to_db_string(),
                error,
                next_attempt_at,
                now(),
                url
            ],
        )?;
        insert_log(&tx, LogLevel::Warn, "Fetch failed, retrying", None, Some(url), Some(error))?;
        tx.commit()?;
        Ok(())
    }

    fn mark_failed(&mut self, url: &str, error: &str, level: LogLevel) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        check_transition(&tx, url, QueueStatus::Failed)?;
        tx.execute(
            "UPDATE url_queue SET status = ?1, last_error = ?2, updated_at = ?3 WHERE url = ?4",
            params![QueueStatus::Failed.to_db_string(), error, now(), url],
        )?;
        insert_log(&tx, level, "Queue item failed", None, Some(url), Some(error))?;
        set_linked_book_status(&tx, url, None, CrawlStatus::Failed)?;
        tx.commit()?;
        Ok(())
    }

    fn mark_completed(&mut self, url: &str) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        check_transition(&tx, url, QueueStatus::Completed)?;
        tx.execute(
            "UPDATE url_queue SET status = ?1, last_error = NULL, updated_at = ?2 WHERE url = ?3",
            params![QueueStatus::Completed.to_db_string(), now(), url],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn reset_stuck_processing(&mut self) -> StorageResult<u64> {
        let tx = self.conn.transaction()?;
        let urls: Vec<String> = {
            let mut stmt = tx.prepare("SELECT url FROM url_queue WHERE status = ?1")?;
            let rows = stmt.query_map(params![QueueStatus::Processing.to_db_string()], |row| {
                row.get(0)
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        for url in &urls {
            check_transition(&tx, url, QueueStatus::Pending)?;
            tx.execute(
                "UPDATE url_queue SET status = ?1, updated_at = ?2 WHERE url = ?3",
                params![QueueStatus::Pending.to_db_string(), now(), url],
            )?;
            tx.execute(
                "UPDATE books SET crawl_status = ?1 WHERE source_url = ?2 AND crawl_status = ?3",
                params![
                    CrawlStatus::Discovered.to_db_string(),
                    url,
                    CrawlStatus::Processing.to_db_string()
                ],
            )?;
            insert_log(
                &tx,
                LogLevel::Warn,
                "Reset item stuck in processing",
                None,
                Some(url),
                None,
            )?;
        }

        tx.commit()?;
        Ok(urls.len() as u64)
    }

    fn refresh_completed(&mut self, older_than: &str, limit: Option<u32>) -> StorageResult<u64> {
        let tx = self.conn.transaction()?;
        let urls: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT url FROM url_queue
                 WHERE status = ?1 AND kind = ?2 AND updated_at < ?3
                 ORDER BY updated_at ASC
                 LIMIT ?4",
            )?;
            let rows = stmt.query_map(
                params![
                    QueueStatus::Completed.to_db_string(),
                    UrlKind::Detail.to_db_string(),
                    older_than,
                    limit.map(i64::from).unwrap_or(-1)
                ],
                |row| row.get(0),
            )?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        for url in &urls {
            check_transition(&tx, url, QueueStatus::Pending)?;
            tx.execute(
                "UPDATE url_queue SET status = ?1, attempts = 0, next_attempt_at = 0,
                 updated_at = ?2 WHERE url = ?3",
                params![QueueStatus::Pending.to_db_string(), now(), url],
            )?;
            set_linked_book_status(&tx, url, None, CrawlStatus::Discovered)?;
        }

        tx.commit()?;
        Ok(urls.len() as u64)
    }

    fn requeue_url_rejected(&mut self, limit: Option<u32>) -> StorageResult<u64> {
        let tx = self.conn.transaction()?;
        let urls: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT url FROM url_queue
                 WHERE status = ?1 AND kind = ?2 AND url_rejected = 1
                 ORDER BY priority DESC, updated_at ASC
                 LIMIT ?3",
            )?;
            let rows = stmt.query_map(
                params![
                    QueueStatus::Completed.to_db_string(),
                    UrlKind::Detail.to_db_string(),
                    limit.map(i64::from).unwrap_or(-1)
                ],
                |row| row.get(0),
            )?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        for url in &urls {
            check_transition(&tx, url, QueueStatus::Pending)?;
            tx.execute(
                "UPDATE url_queue SET status = ?1, attempts = 0, next_attempt_at = 0,
                 updated_at = ?2 WHERE url = ?3",
                params![QueueStatus::Pending.to_db_string(), now(), url],
            )?;
        }

        tx.commit()?;
        Ok(urls.len() as u64)
    }

    fn count_pending(&self) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM url_queue WHERE status = ?1",
            params![QueueStatus::Pending.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn next_pending_at(&self) -> StorageResult<Option<i64>> {
        let next: Option<i64> = self.conn.query_row(
            "SELECT MIN(next_attempt_at) FROM url_queue WHERE status = ?1",
            params![QueueStatus::Pending.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(next)
    }

    // ===== Books =====

    fn upsert_book(&mut self, book: &Book) -> StorageResult<()> {
        upsert_book_row(&self.conn, book)
    }

    fn commit_book(&mut self, url: &str, book: &Book) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        check_transition(&tx, url, QueueStatus::Completed)?;
        upsert_book_row(&tx, book)?;
        tx.execute(
            "UPDATE url_queue SET status = ?1, last_error = NULL, url_rejected = 0,
             updated_at = ?2 WHERE url = ?3",
            params![QueueStatus::Completed.to_db_string(), now(), url],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn record_rejection(
        &mut self,
        url: &str,
        book_id: Option<&BookId>,
        errors: &[String],
        url_rejected: bool,
    ) -> StorageResult<()> {
        let details = errors.join("; ");
        let book_key = book_id.map(BookId::key);

        let tx = self.conn.transaction()?;
        check_transition(&tx, url, QueueStatus::Completed)?;
        insert_log(
            &tx,
            LogLevel::Warn,
            "Validation failed",
            book_key.as_deref(),
            Some(url),
            Some(&details),
        )?;
        tx.execute(
            "UPDATE url_queue SET status = ?1, last_error = ?2, url_rejected = ?3,
             updated_at = ?4 WHERE url = ?5",
            params![
                QueueStatus::Completed.to_db_string(),
                details,
                url_rejected,
                now(),
                url
            ],
        )?;
        set_linked_book_status(&tx, url, book_key.as_deref(), CrawlStatus::Failed)?;
        tx.commit()?;
        Ok(())
    }

    fn get_book(&self, id: &BookId) -> StorageResult<Option<Book>> {
        let sql = format!("SELECT {} FROM books WHERE id = ?1", BOOK_COLUMNS);
        let book = self
            .conn
            .query_row(&sql, params![id.key()], row_to_book)
            .optional()?;
        Ok(book)
    }

    fn count_books(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM books", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ===== Audit Log =====

    fn append_log(
        &mut self,
        level: LogLevel,
        message: &str,
        book_id: Option<&str>,
        url: Option<&str>,
        error_details: Option<&str>,
    ) -> StorageResult<i64> {
        insert_log(&self.conn, level, message, book_id, url, error_details)
    }

    fn get_logs(&self, url: Option<&str>) -> StorageResult<Vec<CrawlLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, level, message, book_id, url, error_details, created_at
             FROM crawl_logs
             WHERE ?1 IS NULL OR url = ?1
             ORDER BY id ASC",
        )?;
        let logs = stmt
            .query_map(params![url], row_to_log)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(logs)
    }

    // ===== Statistics =====

    fn count_queue_by_status(&self) -> StorageResult<HashMap<QueueStatus, u64>> {
        let mut counts: HashMap<QueueStatus, u64> = QueueStatus::all_statuses()
            .into_iter()
            .map(|status| (status, 0))
            .collect();

        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM url_queue GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        for row in rows {
            let (status, count) = row?;
            if let Some(status) = QueueStatus::from_db_string(&status) {
                counts.insert(status, count as u64);
            }
        }

        Ok(counts)
    }

    fn count_books_by_status(&self) -> StorageResult<HashMap<CrawlStatus, u64>> {
        let mut counts: HashMap<CrawlStatus, u64> = CrawlStatus::all_statuses()
            .into_iter()
            .map(|status| (status, 0))
            .collect();

        let mut stmt = self
            .conn
            .prepare("SELECT crawl_status, COUNT(*) FROM books GROUP BY crawl_status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        for row in rows {
            let (status, count) = row?;
            if let Some(status) = CrawlStatus::from_db_string(&status) {
                counts.insert(status, count as u64);
            }
        }

        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const FAR_FUTURE_MS: i64 = i64::MAX;

    fn detail(url: &str, priority: i64) -> SeedUrl {
        SeedUrl::new(url, UrlKind::Detail, priority)
    }

    fn sample_book(id: u64, title: &str, source_url: Option<&str>) -> Book {
        Book {
            id: BookId::Numeric(id),
            title: title.to_string(),
            author: "Author".to_string(),
            description: String::new(),
            duration_total_minutes: 60,
            duration_formatted: "1ժ 0ր".to_string(),
            book_type: None,
            language: Some("hy".to_string()),
            category: "Unknown".to_string(),
            rating: Some(4.0),
            rating_count: Some(3),
            cover_image_url: None,
            main_audio_url: Some("https://cdn.example.com/a.mp3".to_string()),
            download_url: None,
            file_size: None,
            published_at: None,
            source_url: source_url.map(str::to_string),
            created_at: String::new(),
            updated_at: String::new(),
            crawl_status: CrawlStatus::Completed,
        }
    }

    fn claim(storage: &mut SqliteStorage) -> Option<QueueItem> {
        storage.claim_next(true, 3, FAR_FUTURE_MS).unwrap().item
    }

    #[test]
    fn test_create_in_memory() {
        let storage = SqliteStorage::new_in_memory();
        assert!(storage.is_ok());
    }

    #[test]
    fn test_run_lifecycle() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("full", "hash").unwrap();
        assert!(run_id > 0);

        let totals = RunTotals {
            completed: 3,
            failed: 1,
            rejected: 1,
            persisted: 2,
        };
        storage
            .finish_run(run_id, RunStatus::Completed, &totals)
            .unwrap();

        let run = storage.get_latest_run().unwrap().unwrap();
        assert_eq!(run.id, run_id);
        assert_eq!(run.mode, "full");
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.totals, totals);
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn test_finish_unknown_run() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let result = storage.finish_run(99, RunStatus::Completed, &RunTotals::default());
        assert!(matches!(result, Err(StorageError::RunNotFound(99))));
    }

    #[test]
    fn test_seed_inserts_pending() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let report = storage.seed(&[detail("a", 0), detail("b", 5)]).unwrap();
        assert_eq!(report.inserted, 2);

        let item = storage.get_queue_item("b").unwrap().unwrap();
        assert_eq!(item.status, QueueStatus::Pending);
        assert_eq!(item.priority, 5);
        assert_eq!(item.attempts, 0);
    }

    #[test]
    fn test_reseed_updates_priority_and_kind() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.seed(&[detail("a", 0)]).unwrap();

        let report = storage
            .seed(&[SeedUrl::new("a", UrlKind::Listing, 9)])
            .unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.inserted, 0);

        let item = storage.get_queue_item("a").unwrap().unwrap();
        assert_eq!(item.kind, UrlKind::Listing);
        assert_eq!(item.priority, 9);
    }

    #[test]
    fn test_reseed_completed_stays_completed() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.seed(&[detail("a", 0)]).unwrap();
        claim(&mut storage).unwrap();
        storage.mark_completed("a").unwrap();

        storage.seed(&[detail("a", 1)]).unwrap();

        let item = storage.get_queue_item("a").unwrap().unwrap();
        assert_eq!(item.status, QueueStatus::Completed);
        assert_eq!(item.priority, 1);
    }

    #[test]
    fn test_reseed_failed_requeues_with_fresh_budget() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.seed(&[detail("a", 0)]).unwrap();
        claim(&mut storage).unwrap();
        storage.mark_failed("a", "HTTP 404", LogLevel::Info).unwrap();

        let report = storage.seed(&[detail("a", 0)]).unwrap();
        assert_eq!(report.requeued, 1);

        let item = storage.get_queue_item("a").unwrap().unwrap();
        assert_eq!(item.status, QueueStatus::Pending);
        assert_eq!(item.attempts, 0);
        assert_eq!(item.last_error, None);
    }

    #[test]
    fn test_claim_order_priority_then_fifo() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .seed(&[detail("low", 0), detail("first", 10), detail("second", 10)])
            .unwrap();

        assert_eq!(claim(&mut storage).unwrap().url, "first");
        assert_eq!(claim(&mut storage).unwrap().url, "second");
        assert_eq!(claim(&mut storage).unwrap().url, "low");
        assert!(claim(&mut storage).is_none());
    }

    #[test]
    fn test_claim_marks_processing_and_counts_attempt() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.seed(&[detail("a", 0)]).unwrap();

        let item = claim(&mut storage).unwrap();
        assert_eq!(item.status, QueueStatus::Processing);
        assert_eq!(item.attempts, 1);

        let stored = storage.get_queue_item("a").unwrap().unwrap();
        assert_eq!(stored.status, QueueStatus::Processing);
        assert_eq!(stored.attempts, 1);
    }

    #[test]
    fn test_claim_skips_listing_when_not_allowed() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .seed(&[SeedUrl::new("list", UrlKind::Listing, 100), detail("d", 0)])
            .unwrap();

        let item = storage.claim_next(false, 3, FAR_FUTURE_MS).unwrap().item;
        assert_eq!(item.unwrap().url, "d");

        let item = storage.claim_next(false, 3, FAR_FUTURE_MS).unwrap().item;
        assert!(item.is_none());
    }

    #[test]
    fn test_claim_respects_backoff() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.seed(&[detail("a", 0)]).unwrap();
        claim(&mut storage).unwrap();
        storage.requeue("a", "timeout", 5_000).unwrap();

        assert!(storage.claim_next(true, 3, 4_999).unwrap().item.is_none());
        assert_eq!(storage.next_pending_at().unwrap(), Some(5_000));
        assert_eq!(storage.count_pending().unwrap(), 1);

        let item = storage.claim_next(true, 3, 5_000).unwrap().item.unwrap();
        assert_eq!(item.attempts, 2);
    }

    #[test]
    fn test_claim_retires_exhausted_items() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.seed(&[detail("a", 5), detail("b", 0)]).unwrap();

        for _ in 0..2 {
            let item = claim(&mut storage).unwrap();
            assert_eq!(item.url, "a");
            storage.requeue("a", "timeout", 0).unwrap();
        }

        let outcome = storage.claim_next(true, 2, FAR_FUTURE_MS).unwrap();
        assert_eq!(outcome.exhausted, vec!["a".to_string()]);
        assert_eq!(outcome.item.unwrap().url, "b");

        let a = storage.get_queue_item("a").unwrap().unwrap();
        assert_eq!(a.status, QueueStatus::Failed);
        assert!(a.last_error.unwrap().contains("retry budget exhausted"));
    }

    #[test]
    fn test_settle_requires_claim() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.seed(&[detail("a", 0)]).unwrap();

        let result = storage.mark_completed("a");
        assert!(matches!(
            result,
            Err(StorageError::InvalidTransition {
                from: QueueStatus::Pending,
                to: QueueStatus::Completed,
                ..
            })
        ));

        let result = storage.requeue("missing", "x", 0);
        assert!(matches!(result, Err(StorageError::QueueItemNotFound(_))));
    }

    #[test]
    fn test_upsert_same_id_twice() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.upsert_book(&sample_book(1, "First", None)).unwrap();
        let first = storage.get_book(&BookId::Numeric(1)).unwrap().unwrap();

        std::thread::sleep(Duration::from_millis(5));
        storage.upsert_book(&sample_book(1, "Second", None)).unwrap();
        let second = storage.get_book(&BookId::Numeric(1)).unwrap().unwrap();

        assert_eq!(storage.count_books().unwrap(), 1);
        assert_eq!(second.title, "Second");
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);
    }

    #[test]
    fn test_text_and_numeric_ids_share_a_key() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.upsert_book(&sample_book(7, "Numeric", None)).unwrap();

        let mut text = sample_book(7, "Text", None);
        text.id = BookId::from_key("7");
        storage.upsert_book(&text).unwrap();

        assert_eq!(storage.count_books().unwrap(), 1);
    }

    #[test]
    fn test_commit_book_settles_queue_item() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.seed(&[detail("a", 0)]).unwrap();
        claim(&mut storage).unwrap();

        storage
            .commit_book("a", &sample_book(1, "T", Some("a")))
            .unwrap();

        let item = storage.get_queue_item("a").unwrap().unwrap();
        assert_eq!(item.status, QueueStatus::Completed);
        let book = storage.get_book(&BookId::Numeric(1)).unwrap().unwrap();
        assert_eq!(book.crawl_status, CrawlStatus::Completed);
        assert_eq!(book.source_url.as_deref(), Some("a"));
    }

    #[test]
    fn test_commit_book_rolls_back_without_claim() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.seed(&[detail("a", 0)]).unwrap();

        let result = storage.commit_book("a", &sample_book(1, "T", Some("a")));
        assert!(result.is_err());
        assert_eq!(storage.count_books().unwrap(), 0);
    }

    #[test]
    fn test_record_rejection() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.upsert_book(&sample_book(1, "Old", Some("a"))).unwrap();
        storage.seed(&[detail("a", 0)]).unwrap();
        claim(&mut storage).unwrap();
        assert_eq!(
            storage
                .get_book(&BookId::Numeric(1))
                .unwrap()
                .unwrap()
                .crawl_status,
            CrawlStatus::Processing
        );

        let errors = vec!["mainAudioUrl: is present but empty".to_string()];
        storage
            .record_rejection("a", Some(&BookId::Numeric(1)), &errors, true)
            .unwrap();

        let item = storage.get_queue_item("a").unwrap().unwrap();
        assert_eq!(item.status, QueueStatus::Completed);
        assert!(item.url_rejected);
        assert_eq!(
            item.last_error.as_deref(),
            Some("mainAudioUrl: is present but empty")
        );

        let book = storage.get_book(&BookId::Numeric(1)).unwrap().unwrap();
        assert_eq!(book.title, "Old");
        assert_eq!(book.crawl_status, CrawlStatus::Failed);

        let logs = storage.get_logs(Some("a")).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].level, LogLevel::Warn);
        assert_eq!(logs[0].book_id.as_deref(), Some("1"));
    }

    #[test]
    fn test_reset_stuck_processing() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.seed(&[detail("a", 0), detail("b", 0)]).unwrap();
        claim(&mut storage).unwrap();

        assert_eq!(storage.reset_stuck_processing().unwrap(), 1);

        let item = storage.get_queue_item("a").unwrap().unwrap();
        assert_eq!(item.status, QueueStatus::Pending);
        assert_eq!(item.attempts, 1);
        assert_eq!(storage.get_logs(Some("a")).unwrap().len(), 1);
    }

    #[test]
    fn test_refresh_completed() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .seed(&[
                detail("a", 0),
                detail("b", 0),
                SeedUrl::new("list", UrlKind::Listing, 0),
            ])
            .unwrap();
        for _ in 0..3 {
            let item = claim(&mut storage).unwrap();
            if item.url == "a" {
                storage
                    .commit_book("a", &sample_book(1, "T", Some("a")))
                    .unwrap();
            } else {
                storage.mark_completed(&item.url).unwrap();
            }
        }

        let cutoff = format_timestamp(Utc::now() + chrono::Duration::hours(1));
        assert_eq!(storage.refresh_completed(&cutoff, Some(1)).unwrap(), 1);
        assert_eq!(storage.refresh_completed(&cutoff, None).unwrap(), 1);
        assert_eq!(storage.refresh_completed(&cutoff, None).unwrap(), 0);

        assert_eq!(
            storage.get_queue_item("list").unwrap().unwrap().status,
            QueueStatus::Completed
        );
        let book = storage.get_book(&BookId::Numeric(1)).unwrap().unwrap();
        assert_eq!(book.crawl_status, CrawlStatus::Discovered);
    }

    #[test]
    fn test_refresh_completed_skips_fresh_items() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.seed(&[detail("a", 0)]).unwrap();
        claim(&mut storage).unwrap();
        storage.mark_completed("a").unwrap();

        let cutoff = format_timestamp(Utc::now() - chrono::Duration::hours(1));
        assert_eq!(storage.refresh_completed(&cutoff, None).unwrap(), 0);
    }

    #[test]
    fn test_requeue_url_rejected() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.seed(&[detail("a", 0), detail("b", 0)]).unwrap();
        claim(&mut storage).unwrap();
        claim(&mut storage).unwrap();
        storage
            .record_rejection("a", None, &["downloadUrl: bad".to_string()], true)
            .unwrap();
        storage
            .record_rejection("b", None, &["author: is required".to_string()], false)
            .unwrap();

        assert_eq!(storage.requeue_url_rejected(None).unwrap(), 1);
        let a = storage.get_queue_item("a").unwrap().unwrap();
        assert_eq!(a.status, QueueStatus::Pending);
        assert_eq!(a.attempts, 0);
        assert_eq!(
            storage.get_queue_item("b").unwrap().unwrap().status,
            QueueStatus::Completed
        );
    }

    #[test]
    fn test_status_counts() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .seed(&[detail("a", 0), detail("b", 0), detail("c", 0)])
            .unwrap();
        claim(&mut storage).unwrap();
        storage.upsert_book(&sample_book(1, "T", None)).unwrap();

        let queue = storage.count_queue_by_status().unwrap();
        assert_eq!(queue[&QueueStatus::Pending], 2);
        assert_eq!(queue[&QueueStatus::Processing], 1);
        assert_eq!(queue[&QueueStatus::Failed], 0);

        let books = storage.count_books_by_status().unwrap();
        assert_eq!(books[&CrawlStatus::Completed], 1);
        assert_eq!(books[&CrawlStatus::Failed], 0);
    }

    #[test]
    fn test_get_logs_filters_by_url() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .append_log(LogLevel::Info, "one", None, Some("a"), None)
            .unwrap();
        storage
            .append_log(LogLevel::Error, "two", Some("9"), Some("b"), Some("boom"))
            .unwrap();

        assert_eq!(storage.get_logs(None).unwrap().len(), 2);
        let logs = storage.get_logs(Some("b")).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].error_details.as_deref(), Some("boom"));
    }
}
