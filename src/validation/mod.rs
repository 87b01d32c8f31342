//! Record validation
//!
//! A candidate record is the raw field dictionary produced by the scraping
//! collaborator. Before anything reaches storage it is prepared (raw duration
//! text parsed into minutes) and then validated field by field. Errors
//! accumulate; nothing short-circuits.

mod candidate;
mod record;

pub use candidate::CandidateRecord;
pub use record::{validate, validate_value};

use std::fmt;

/// Fields whose validation failures make a record eligible for the
/// download-fix pass
pub const URL_FIELDS: &[&str] = &["mainAudioUrl", "downloadUrl"];

/// A single validation failure, tied to the field that caused it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Source field name as it appears in the candidate dictionary
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Accept/reject decision for a candidate
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<FieldError>,
}

impl ValidationResult {
    pub(crate) fn from_errors(errors: Vec<FieldError>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// Error messages in the order they were found
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }

    /// Returns true if any error concerns an audio or download link
    pub fn has_url_errors(&self) -> bool {
        self.errors.iter().any(|e| URL_FIELDS.contains(&e.field))
    }
}
