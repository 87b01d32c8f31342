//! URL validation for audio and download links
//!
//! Extracted links are only trusted when they parse as absolute URLs with an
//! `http` or `https` scheme. Everything here is a pure function.

use serde_json::Value;
use url::Url;

/// Outcome of validating a single audio or download link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlCheck {
    pub valid: bool,
    pub error: Option<String>,
}

impl UrlCheck {
    fn ok() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
        }
    }
}

/// A URL rejected by `filter_valid_urls`, with the reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedUrl {
    pub url: String,
    pub error: String,
}

/// Partition of a batch of URLs into accepted and rejected
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlPartition {
    pub valid: Vec<String>,
    pub invalid: Vec<RejectedUrl>,
}

/// Returns true only for well-formed URLs with an `http` or `https` scheme
///
/// # Examples
///
/// ```
/// use catalog_crawler::url::has_valid_scheme;
///
/// assert!(has_valid_scheme("https://cdn.example.com/a.mp3"));
/// assert!(!has_valid_scheme("ftp://cdn.example.com/a.mp3"));
/// assert!(!has_valid_scheme("not a url"));
/// ```
pub fn has_valid_scheme(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => is_http_scheme(&parsed),
        Err(_) => false,
    }
}

/// Same as `has_valid_scheme` for an arbitrary JSON value; non-strings are invalid
pub fn has_valid_scheme_value(value: &Value) -> bool {
    value.as_str().map(has_valid_scheme).unwrap_or(false)
}

/// Validates an audio (or download) link
///
/// # Returns
///
/// * missing, empty, or whitespace-only → invalid with a presence error
/// * unparseable or non-http(s) → invalid with a format error
/// * otherwise valid
pub fn validate_audio_url(url: Option<&str>) -> UrlCheck {
    let url = match url {
        Some(u) if !u.trim().is_empty() => u.trim(),
        _ => return UrlCheck::invalid("URL is required"),
    };

    match Url::parse(url) {
        Ok(parsed) if is_http_scheme(&parsed) => UrlCheck::ok(),
        Ok(parsed) => UrlCheck::invalid(format!(
            "URL must use http or https, got: {}",
            parsed.scheme()
        )),
        Err(e) => UrlCheck::invalid(format!("Malformed URL: {}", e)),
    }
}

/// Splits a batch of URLs into valid ones and rejected ones with reasons
///
/// A non-array value yields two empty sequences. Non-string array entries are
/// rejected with their JSON rendering as the url.
pub fn filter_valid_urls(urls: &Value) -> UrlPartition {
    let mut partition = UrlPartition::default();

    let Some(items) = urls.as_array() else {
        return partition;
    };

    for item in items {
        match item {
            Value::String(s) => {
                let check = validate_audio_url(Some(s));
                match check.error {
                    None => partition.valid.push(s.clone()),
                    Some(error) => partition.invalid.push(RejectedUrl {
                        url: s.clone(),
                        error,
                    }),
                }
            }
            other => partition.invalid.push(RejectedUrl {
                url: other.to_string(),
                error: "URL must be a string".to_string(),
            }),
        }
    }

    partition
}

fn is_http_scheme(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https") && url.has_host()
}
