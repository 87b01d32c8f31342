//! Candidate records as produced by the scraping collaborator

use crate::normalize::{
    clean_value, format_duration, normalize_author, normalize_category,
    normalize_duration_for_storage,
};
use crate::state::CrawlStatus;
use crate::storage::{Book, BookId};
use crate::validation::record::as_non_negative_integer;
use crate::validation::FieldError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Raw field dictionary extracted from one detail page
///
/// Field names follow the extractor's camelCase keys (`mainAudioUrl`,
/// `ratingCount`, ...). Values are untrusted until `validate` accepts them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateRecord {
    fields: Map<String, Value>,
}

impl CandidateRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Wraps a JSON object; returns None for any other JSON value
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Returns a field, treating `null` as absent
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|v| !v.is_null())
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.fields.insert(name.to_string(), value);
    }

    /// Identity of the record, if it carries a usable one
    pub fn book_id(&self) -> Option<BookId> {
        self.get("id").and_then(BookId::from_value)
    }

    /// Parses a raw-text duration into canonical minutes ahead of validation
    ///
    /// A string `duration` is replaced by its total minutes and the display
    /// form is kept in `durationFormatted`. A numeric duration only gains the
    /// display form. Anything else is left for the validator to reject.
    pub fn prepare(mut self) -> Self {
        match self.get("duration").cloned() {
            Some(raw @ Value::String(_)) => {
                let stored = normalize_duration_for_storage(Some(&raw));
                self.set("duration", Value::from(stored.total_minutes));
                self.set("durationFormatted", Value::from(stored.formatted));
            }
            Some(Value::Number(n)) => {
                if let Some(minutes) = n.as_f64().filter(|m| m.is_finite() && *m >= 0.0) {
                    let minutes = minutes.round().min(u32::MAX as f64) as u32;
                    self.set("durationFormatted", Value::from(format_duration(minutes)));
                }
            }
            _ => {}
        }
        self
    }

    /// Builds the canonical book from a prepared, validated candidate
    ///
    /// Free text is cleaned, author and category fall back to their sentinels,
    /// and links are trimmed. Timestamps are left for the store to fill.
    pub fn to_book(&self, source_url: Option<&str>) -> Result<Book, FieldError> {
        let id = self
            .book_id()
            .ok_or_else(|| FieldError::new("id", "must be a positive integer or a non-empty string"))?;

        let duration_total_minutes = self
            .get("duration")
            .and_then(Value::as_f64)
            .filter(|m| m.is_finite() && *m >= 0.0)
            .map(|m| m.round().min(u32::MAX as f64) as u32)
            .unwrap_or(0);

        let duration_formatted = self
            .get("durationFormatted")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format_duration(duration_total_minutes));

        Ok(Book {
            id,
            title: clean_value(self.get("title")),
            author: normalize_author(self.get("author")),
            description: clean_value(self.get("description")),
            duration_total_minutes,
            duration_formatted,
            book_type: self.optional_text("type"),
            language: self.optional_text("language"),
            category: normalize_category(self.get("category")),
            rating: self.get("rating").and_then(Value::as_f64),
            rating_count: self
                .get("ratingCount")
                .and_then(as_non_negative_integer)
                .and_then(|c| u32::try_from(c).ok()),
            cover_image_url: self.optional_link("coverImageUrl"),
            main_audio_url: self.optional_link("mainAudioUrl"),
            download_url: self.optional_link("downloadUrl"),
            file_size: self.optional_text("fileSize"),
            published_at: self.optional_text("publishedAt"),
            source_url: source_url.map(str::to_string),
            created_at: String::new(),
            updated_at: String::new(),
            crawl_status: CrawlStatus::Completed,
        })
    }

    fn optional_text(&self, name: &str) -> Option<String> {
        let cleaned = clean_value(self.get(name));
        (!cleaned.is_empty()).then_some(cleaned)
    }

    fn optional_link(&self, name: &str) -> Option<String> {
        self.get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

impl From<Map<String, Value>> for CandidateRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self::new(fields)
    }
}
