//! Storage module for persisting crawl data
//!
//! This module owns the only shared mutable state of a crawl:
//! - the durable URL queue (`url_queue`)
//! - the book store (`books`), written through an id-keyed upsert
//! - the append-only audit trail (`crawl_logs`)
//! - crawl run records (`crawl_runs`)
//!
//! Queue transitions and book writes that belong together are committed in
//! one SQLite transaction.

mod schema;
mod sqlite;
mod traits;

pub use sqlite::{format_timestamp, SqliteStorage};
pub use traits::{Storage, StorageError, StorageResult};

use crate::state::{CrawlStatus, QueueStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// What a queued URL points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlKind {
    /// Catalog, search, or author page that yields more URLs
    Listing,

    /// A single book page that yields a candidate record
    Detail,
}

impl UrlKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Listing => "listing",
            Self::Detail => "detail",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "listing" => Some(Self::Listing),
            "detail" => Some(Self::Detail),
            _ => None,
        }
    }
}

impl fmt::Display for UrlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// One entry handed to the queue's seed API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedUrl {
    pub url: String,
    pub kind: UrlKind,
    #[serde(default)]
    pub priority: i64,
}

impl SeedUrl {
    pub fn new(url: impl Into<String>, kind: UrlKind, priority: i64) -> Self {
        Self {
            url: url.into(),
            kind,
            priority,
        }
    }
}

/// What a seeding pass did to the queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    /// URLs that were not queued before
    pub inserted: u64,
    /// Existing URLs whose kind and priority were refreshed
    pub updated: u64,
    /// Failed URLs put back to pending
    pub requeued: u64,
}

impl SeedReport {
    pub fn total(&self) -> u64 {
        self.inserted + self.updated + self.requeued
    }
}

/// Represents a URL in the work queue
#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    pub url: String,
    pub kind: UrlKind,
    pub priority: i64,
    pub status: QueueStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    /// Set when the last validation rejection involved an audio or download link
    pub url_rejected: bool,
    /// Earliest claim time, epoch milliseconds
    pub next_attempt_at: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Outcome of a claim attempt
#[derive(Debug, Default)]
pub struct Claim {
    /// The item now held in `processing`, if any was eligible
    pub item: Option<QueueItem>,
    /// URLs retired to `failed` at claim time because their budget was spent
    pub exhausted: Vec<String>,
}

/// Natural key of a book: a positive integer or a non-empty string
///
/// Integer ids are stored in decimal, so `1` and `"1"` name the same book.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BookId {
    Numeric(u64),
    Text(String),
}

impl BookId {
    /// Extracts an id from a JSON value, if it is a usable one
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_u64().filter(|id| *id > 0).map(Self::Numeric),
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(Self::from_key(trimmed))
                }
            }
            _ => None,
        }
    }

    /// Rebuilds an id from its stored key
    pub fn from_key(key: &str) -> Self {
        match key.parse::<u64>() {
            Ok(n) if n > 0 && n.to_string() == key => Self::Numeric(n),
            _ => Self::Text(key.to_string()),
        }
    }

    /// The TEXT primary key value
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Canonical stored book
#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub author: String,
    pub description: String,
    pub duration_total_minutes: u32,
    pub duration_formatted: String,
    pub book_type: Option<String>,
    pub language: Option<String>,
    pub category: String,
    pub rating: Option<f64>,
    pub rating_count: Option<u32>,
    pub cover_image_url: Option<String>,
    pub main_audio_url: Option<String>,
    pub download_url: Option<String>,
    pub file_size: Option<String>,
    pub published_at: Option<String>,
    /// Detail URL the book was last fetched from
    pub source_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub crawl_status: CrawlStatus,
}

/// Severity of an audit log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "info" => Some(Self::Info),
            "warn" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// One row of the append-only audit trail
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlLogEntry {
    pub id: i64,
    pub level: LogLevel,
    pub message: String,
    pub book_id: Option<String>,
    pub url: Option<String>,
    pub error_details: Option<String>,
    pub created_at: String,
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub mode: String,
    pub config_hash: String,
    pub status: RunStatus,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub totals: RunTotals,
}

/// Per-run outcome counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTotals {
    /// Queue items settled as completed (persisted or rejected)
    pub completed: u64,
    /// Queue items settled as failed
    pub failed: u64,
    /// Candidates rejected by validation
    pub rejected: u64,
    /// Books written
    pub persisted: u64,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
