//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the catalog database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS crawl_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    mode TEXT NOT NULL,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    completed INTEGER NOT NULL DEFAULT 0,
    failed INTEGER NOT NULL DEFAULT 0,
    rejected INTEGER NOT NULL DEFAULT 0,
    persisted INTEGER NOT NULL DEFAULT 0
);

-- Durable work list
CREATE TABLE IF NOT EXISTS url_queue (
    url TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    priority INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    url_rejected INTEGER NOT NULL DEFAULT 0,
    next_attempt_at INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_url_queue_claim ON url_queue(status, priority DESC, created_at);
CREATE INDEX IF NOT EXISTS idx_url_queue_kind ON url_queue(kind);

-- Canonical book records, keyed by natural id
CREATE TABLE IF NOT EXISTS books (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    author TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    duration_total_minutes INTEGER NOT NULL DEFAULT 0,
    duration_formatted TEXT NOT NULL DEFAULT '',
    type TEXT,
    language TEXT,
    category TEXT NOT NULL,
    rating REAL,
    rating_count INTEGER,
    cover_image_url TEXT,
    main_audio_url TEXT,
    download_url TEXT,
    file_size TEXT,
    published_at TEXT,
    source_url TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    crawl_status TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_books_source_url ON books(source_url);
CREATE INDEX IF NOT EXISTS idx_books_crawl_status ON books(crawl_status);

-- Append-only audit trail
CREATE TABLE IF NOT EXISTS crawl_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    level TEXT NOT NULL,
    message TEXT NOT NULL,
    book_id TEXT,
    url TEXT,
    error_details TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_crawl_logs_url ON crawl_logs(url);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
