//! Page-fetch collaborator
//!
//! The crawl core never touches markup. It asks a `PageFetcher` for a page and
//! gets back either a candidate record (detail pages) or the URLs a listing
//! page links to. Failures come back classified as transient or permanent.
//!
//! `HttpPageFetcher` is the production adapter: it calls an external
//! extraction service over HTTP and classifies the response:
//!
//! | Condition | Classification |
//! |-----------|----------------|
//! | 2xx with a JSON body | success |
//! | 404, 410 | permanent |
//! | 408, 429, 5xx | transient |
//! | other 4xx | permanent |
//! | timeout, connection error | transient |
//! | body that is not the expected JSON | permanent |

use crate::config::FetcherConfig;
use crate::storage::{SeedUrl, UrlKind};
use crate::validation::CandidateRecord;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Default priority of listing pages found while crawling
pub const DISCOVERED_LISTING_PRIORITY: i64 = 50;

/// Default priority of detail pages found while crawling
pub const DISCOVERED_DETAIL_PRIORITY: i64 = 0;

/// What a fetched page yielded
#[derive(Debug, Clone)]
pub enum FetchedPage {
    /// Raw field dictionary from a detail page
    Record(CandidateRecord),

    /// URLs linked from a listing page, possibly relative to it
    Listing(Vec<SeedUrl>),
}

/// Classified fetch failure
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Worth retrying: timeouts, network errors, overloaded upstream
    #[error("transient fetch error: {0}")]
    Transient(String),

    /// Retrying cannot help: not found, gone, unusable response
    #[error("permanent fetch error: {0}")]
    Permanent(String),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Transient(msg) | Self::Permanent(msg) => msg,
        }
    }
}

/// Contract of the external page-fetch collaborator
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, url: &str, kind: UrlKind) -> Result<FetchedPage, FetchError>;
}

/// Builds a seed entry for a URL found on a listing page, with the default priority
pub fn discovered(url: impl Into<String>, kind: UrlKind) -> SeedUrl {
    let priority = match kind {
        UrlKind::Listing => DISCOVERED_LISTING_PRIORITY,
        UrlKind::Detail => DISCOVERED_DETAIL_PRIORITY,
    };
    SeedUrl::new(url, kind, priority)
}

#[derive(Debug, Deserialize)]
struct ListingResponse {
    urls: Vec<DiscoveredUrl>,
}

#[derive(Debug, Deserialize)]
struct DiscoveredUrl {
    url: String,
    kind: UrlKind,
    #[serde(default)]
    priority: Option<i64>,
}

impl From<DiscoveredUrl> for SeedUrl {
    fn from(found: DiscoveredUrl) -> Self {
        match found.priority {
            Some(priority) => SeedUrl::new(found.url, found.kind, priority),
            None => discovered(found.url, found.kind),
        }
    }
}

/// Page fetcher backed by an HTTP extraction service
///
/// Sends `GET {endpoint}?url=<page>&kind=<listing|detail>`. A detail response
/// is the candidate record as a JSON object; a listing response is
/// `{"urls": [{"url": ..., "kind": ..., "priority": ...}]}`.
pub struct HttpPageFetcher {
    client: Client,
    endpoint: String,
}

impl HttpPageFetcher {
    /// Creates a fetcher from configuration
    ///
    /// # Arguments
    ///
    /// * `config` - Extraction service settings
    /// * `timeout` - Client-level request timeout
    pub fn new(config: &FetcherConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_page(&self, url: &str, kind: UrlKind) -> Result<FetchedPage, FetchError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("url", url), ("kind", kind.to_db_string())])
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }

        match kind {
            UrlKind::Detail => {
                let body: Value = response
                    .json()
                    .await
                    .map_err(|e| FetchError::Permanent(format!("invalid record body: {}", e)))?;
                CandidateRecord::from_value(body)
                    .map(FetchedPage::Record)
                    .ok_or_else(|| {
                        FetchError::Permanent("record body is not a JSON object".to_string())
                    })
            }
            UrlKind::Listing => {
                let body: ListingResponse = response
                    .json()
                    .await
                    .map_err(|e| FetchError::Permanent(format!("invalid listing body: {}", e)))?;
                Ok(FetchedPage::Listing(
                    body.urls.into_iter().map(SeedUrl::from).collect(),
                ))
            }
        }
    }
}

/// Maps a non-success HTTP status to a fetch error class
pub fn classify_status(status: StatusCode) -> FetchError {
    let message = format!("HTTP {}", status.as_u16());
    match status.as_u16() {
        404 | 410 => FetchError::Permanent(message),
        408 | 429 => FetchError::Transient(message),
        _ if status.is_server_error() => FetchError::Transient(message),
        _ => FetchError::Permanent(message),
    }
}

fn classify_request_error(error: reqwest::Error) -> FetchError {
    if error.is_timeout() || error.is_connect() || error.is_request() {
        FetchError::Transient(error.to_string())
    } else {
        FetchError::Permanent(error.to_string())
    }
}
