use crate::storage::SeedUrl;
use serde::Deserialize;

/// Main configuration structure for the catalog crawler
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub fetcher: FetcherConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub modes: ModesConfig,
    /// Discovery URLs (category, search, author pages) and hand-picked detail pages
    #[serde(default)]
    pub seeds: Vec<SeedUrl>,
}

/// Fetch engine limits
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Size of the worker pool
    #[serde(rename = "max-concurrent-urls")]
    pub max_concurrent_urls: u32,

    /// Listing pages allowed in flight at once (only `full-database` uses more than one)
    #[serde(rename = "max-concurrent-pages", default = "default_max_concurrent_pages")]
    pub max_concurrent_pages: u32,

    /// Pause each worker takes after finishing an item (milliseconds)
    #[serde(rename = "delay-between-requests")]
    pub delay_between_requests: u64,

    /// Per-fetch timeout (milliseconds)
    pub timeout: u64,

    /// Claims allowed per queue item before it is retired as failed
    #[serde(rename = "retry-attempts")]
    pub retry_attempts: u32,

    /// First retry backoff (milliseconds); doubles per attempt
    #[serde(rename = "retry-backoff", default = "default_retry_backoff")]
    pub retry_backoff: u64,

    /// Upper bound on any retry backoff (milliseconds)
    #[serde(rename = "max-retry-backoff", default = "default_max_retry_backoff")]
    pub max_retry_backoff: u64,

    /// Record not-found pages in the audit log at info level
    #[serde(rename = "save-404s", default = "default_true")]
    pub save_404s: bool,
}

/// Extraction service the crawler calls for each page
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    pub endpoint: String,

    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Isolated database for `test` mode; in-memory when absent
    #[serde(rename = "test-database-path", default)]
    pub test_database_path: Option<String>,
}

/// Per-mode parameters
#[derive(Debug, Clone, Deserialize)]
pub struct ModesConfig {
    /// Completed detail pages older than this are refreshed by `update`
    #[serde(rename = "update-freshness-hours", default = "default_freshness_hours")]
    pub update_freshness_hours: u64,

    #[serde(rename = "update-limit", default)]
    pub update_limit: Option<u32>,

    #[serde(rename = "fix-limit", default)]
    pub fix_limit: Option<u32>,

    /// Total URLs a `test` run may seed, discovered ones included
    #[serde(rename = "test-limit", default = "default_test_limit")]
    pub test_limit: u32,
}

impl Default for ModesConfig {
    fn default() -> Self {
        Self {
            update_freshness_hours: default_freshness_hours(),
            update_limit: None,
            fix_limit: None,
            test_limit: default_test_limit(),
        }
    }
}

fn default_max_concurrent_pages() -> u32 {
    1
}

fn default_retry_backoff() -> u64 {
    1_000
}

fn default_max_retry_backoff() -> u64 {
    60_000
}

fn default_true() -> bool {
    true
}

fn default_user_agent() -> String {
    format!("catalog-crawler/{}", env!("CARGO_PKG_VERSION"))
}

fn default_freshness_hours() -> u64 {
    168
}

fn default_test_limit() -> u32 {
    10
}
