//! Catalog Crawler: a resumable catalog crawl pipeline
//!
//! This crate drains a durable URL queue at bounded concurrency, hands each
//! fetched page to a validation and normalization pipeline, and upserts the
//! accepted book records into SQLite while tracking per-URL and per-record
//! lifecycle status, so an interrupted crawl can resume without duplicating
//! or corrupting data.

pub mod config;
pub mod crawler;
pub mod normalize;
pub mod output;
pub mod state;
pub mod storage;
pub mod url;
pub mod validation;

use thiserror::Error;

/// Main error type for catalog crawler operations
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Worker task failed: {0}")]
    Worker(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for catalog crawler operations
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Crawler, RunMode, RunSummary};
pub use state::{CrawlStatus, QueueStatus};
pub use validation::{validate, CandidateRecord, ValidationResult};
