use crate::normalize::clean;
use crate::url::validate_audio_url;
use crate::validation::{CandidateRecord, FieldError, ValidationResult};
use serde_json::{Map, Value};

/// Maximum length of a language code, in characters
const MAX_LANGUAGE_LEN: usize = 10;

/// Validates a candidate record
///
/// # Rules
///
/// | Field | Rule |
/// |-------|------|
/// | `id`, `title`, `author` | required, non-blank after trimming |
/// | `id` | positive integer or non-empty string |
/// | `mainAudioUrl` | if present: non-blank and an http(s) URL |
/// | `downloadUrl` | if present and non-blank: an http(s) URL |
/// | `title` | if present: a string with text left after markup is stripped |
/// | `duration` | if present: a finite number >= 0 (minutes) |
/// | `rating` | if present: a finite number in [0, 5] |
/// | `ratingCount` | if present: a non-negative integer that fits in `u32` |
/// | `language` | if present: at most 10 characters |
///
/// `null` counts as absent. Every rule runs; the record is valid iff no
/// rule produced an error.
///
/// # Examples
///
/// ```
/// use catalog_crawler::validation::{validate, CandidateRecord};
/// use serde_json::json;
///
/// let candidate = CandidateRecord::from_value(json!({})).unwrap();
/// let result = validate(&candidate);
/// assert!(!result.valid);
/// assert_eq!(result.errors.len(), 3);
/// ```
pub fn validate(candidate: &CandidateRecord) -> ValidationResult {
    ValidationResult::from_errors(check_fields(candidate.fields()))
}

/// Validates an arbitrary JSON value, rejecting anything that isn't an object
pub fn validate_value(value: &Value) -> ValidationResult {
    match value.as_object() {
        Some(fields) => ValidationResult::from_errors(check_fields(fields)),
        None => ValidationResult::from_errors(vec![FieldError::new(
            "record",
            "must be an object",
        )]),
    }
}

fn check_fields(fields: &Map<String, Value>) -> Vec<FieldError> {
    let mut errors = Vec::new();

    let id_missing = check_required(fields, "id", &mut errors);
    check_required(fields, "title", &mut errors);
    check_required(fields, "author", &mut errors);

    if !id_missing {
        check_id(fields, &mut errors);
    }
    check_main_audio_url(fields, &mut errors);
    check_download_url(fields, &mut errors);
    check_title(fields, &mut errors);
    check_duration(fields, &mut errors);
    check_rating(fields, &mut errors);
    check_rating_count(fields, &mut errors);
    check_language(fields, &mut errors);

    errors
}

fn present<'a>(fields: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    fields.get(name).filter(|v| !v.is_null())
}

/// Pushes a presence error and returns true when the field is missing or blank
fn check_required(
    fields: &Map<String, Value>,
    name: &'static str,
    errors: &mut Vec<FieldError>,
) -> bool {
    let blank = match present(fields, name) {
        None => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    };

    if blank {
        errors.push(FieldError::new(name, "is required"));
    }
    blank
}

fn check_id(fields: &Map<String, Value>, errors: &mut Vec<FieldError>) {
    let ok = match present(fields, "id") {
        None => true,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_u64().map(|v| v > 0).unwrap_or(false),
        Some(_) => false,
    };

    if !ok {
        errors.push(FieldError::new(
            "id",
            "must be a positive integer or a non-empty string",
        ));
    }
}

fn check_main_audio_url(fields: &Map<String, Value>, errors: &mut Vec<FieldError>) {
    match present(fields, "mainAudioUrl") {
        None => {}
        Some(Value::String(s)) if s.trim().is_empty() => {
            errors.push(FieldError::new("mainAudioUrl", "is present but empty"));
        }
        Some(Value::String(s)) => {
            if let Some(error) = validate_audio_url(Some(s)).error {
                errors.push(FieldError::new("mainAudioUrl", error));
            }
        }
        Some(_) => errors.push(FieldError::new("mainAudioUrl", "must be a string")),
    }
}

fn check_download_url(fields: &Map<String, Value>, errors: &mut Vec<FieldError>) {
    match present(fields, "downloadUrl") {
        None => {}
        Some(Value::String(s)) if s.trim().is_empty() => {}
        Some(Value::String(s)) => {
            if let Some(error) = validate_audio_url(Some(s)).error {
                errors.push(FieldError::new("downloadUrl", error));
            }
        }
        Some(_) => errors.push(FieldError::new("downloadUrl", "must be a string")),
    }
}

fn check_title(fields: &Map<String, Value>, errors: &mut Vec<FieldError>) {
    match present(fields, "title") {
        None => {}
        // blank titles are already reported as missing
        Some(Value::String(s)) if s.trim().is_empty() => {}
        Some(Value::String(s)) => {
            if clean(s).is_empty() {
                errors.push(FieldError::new("title", "must contain text outside markup"));
            }
        }
        Some(_) => errors.push(FieldError::new("title", "must be a string")),
    }
}

fn check_duration(fields: &Map<String, Value>, errors: &mut Vec<FieldError>) {
    let Some(value) = present(fields, "duration") else {
        return;
    };

    match value.as_f64() {
        Some(minutes) if minutes.is_finite() && minutes >= 0.0 => {}
        Some(_) => errors.push(FieldError::new("duration", "must not be negative")),
        None => errors.push(FieldError::new(
            "duration",
            "must be a number of minutes",
        )),
    }
}

fn check_rating(fields: &Map<String, Value>, errors: &mut Vec<FieldError>) {
    let Some(value) = present(fields, "rating") else {
        return;
    };

    match value.as_f64() {
        Some(rating) if rating.is_finite() && (0.0..=5.0).contains(&rating) => {}
        Some(rating) => errors.push(FieldError::new(
            "rating",
            format!("must be between 0 and 5, got {}", rating),
        )),
        None => errors.push(FieldError::new("rating", "must be a number")),
    }
}

fn check_rating_count(fields: &Map<String, Value>, errors: &mut Vec<FieldError>) {
    let Some(value) = present(fields, "ratingCount") else {
        return;
    };

    match as_non_negative_integer(value) {
        Some(count) if count <= u64::from(u32::MAX) => {}
        Some(_) => errors.push(FieldError::new(
            "ratingCount",
            format!("must be at most {}", u32::MAX),
        )),
        None => errors.push(FieldError::new(
            "ratingCount",
            "must be a non-negative integer",
        )),
    }
}

fn check_language(fields: &Map<String, Value>, errors: &mut Vec<FieldError>) {
    match present(fields, "language") {
        None => {}
        Some(Value::String(s)) => {
            let len = s.chars().count();
            if len > MAX_LANGUAGE_LEN {
                errors.push(FieldError::new(
                    "language",
                    format!(
                        "must be at most {} characters, got {}",
                        MAX_LANGUAGE_LEN, len
                    ),
                ));
            }
        }
        Some(_) => errors.push(FieldError::new("language", "must be a string")),
    }
}

/// Accepts `12` and `12.0`, rejects negatives and fractions
pub(crate) fn as_non_negative_integer(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    value
        .as_f64()
        .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
        .map(|f| f as u64)
}
