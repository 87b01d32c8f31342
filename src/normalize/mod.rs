//! Normalization helpers for scraped free-text fields
//!
//! Both submodules are pure functions with no state:
//! - `text`: markup stripping, entity decoding, whitespace collapsing
//! - `duration`: source-locale duration strings to canonical minutes

mod duration;
mod text;

pub use duration::{
    format_duration, normalize_duration_for_storage, parse_duration, parse_duration_value,
    ParsedDuration, StoredDuration,
};
pub use text::{
    clean, clean_value, normalize_author, normalize_category, UNKNOWN_AUTHOR, UNKNOWN_CATEGORY,
};
