//! Duration parsing
//!
//! The catalog shows running times in the source locale (`1ժ 30ր`, hour and
//! minute markers), sometimes in English (`1 hour 30 mins`), and sometimes as a
//! bare minute count. Everything is reduced to total minutes plus one canonical
//! display string.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Hour marker in the source locale
const HOUR_MARK: &str = "ժ";

/// Minute marker in the source locale
const MINUTE_MARK: &str = "ր";

static LOCALE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*ժ\s*(\d+)\s*ր").expect("locale pattern is valid"));

/// Hours with optional minutes (groups 1, 2), or minutes alone (group 3)
static GENERIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:(\d+)\s*hours?\b(?:[\s,]*(?:and\s+)?(\d+)\s*min(?:ute)?s?\b)?|(\d+)\s*min(?:ute)?s?\b)",
    )
    .expect("generic pattern is valid")
});

static MINUTES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s*ր?$").expect("minutes pattern is valid"));

/// Result of parsing a duration string
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedDuration {
    pub hours: u32,
    pub minutes: u32,
    pub total_minutes: u32,
    pub formatted: String,
}

/// The two duration fields that are persisted on a book
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDuration {
    pub total_minutes: u32,
    pub formatted: String,
}

/// Renders minutes in the canonical locale form, e.g. `1ժ 30ր`
pub fn format_duration(total_minutes: u32) -> String {
    format!(
        "{}{} {}{}",
        total_minutes / 60,
        HOUR_MARK,
        total_minutes % 60,
        MINUTE_MARK
    )
}

/// Parses a duration string into hours, minutes, and a display string
///
/// Patterns are tried in order:
///
/// | Input | Rule | `formatted` |
/// |-------|------|-------------|
/// | `1ժ 30ր` | locale hour + minute | trimmed original |
/// | `1 hour 30 mins` | English, either half optional | canonical when total > 0 |
/// | `45` or `45ր` | bare minutes | always canonical |
/// | anything else | no match | trimmed original, totals zero |
///
/// The parser never fails; unrecognized input passes through as display text.
///
/// # Examples
///
/// ```
/// use catalog_crawler::normalize::parse_duration;
///
/// assert_eq!(parse_duration("1ժ 30ր").total_minutes, 90);
/// assert_eq!(parse_duration("45").formatted, "0ժ 45ր");
/// ```
pub fn parse_duration(raw: &str) -> ParsedDuration {
    let trimmed = raw.trim();

    if let Some(caps) = LOCALE_RE.captures(trimmed) {
        let (Some(hours), Some(minutes)) = (capture_number(&caps, 1), capture_number(&caps, 2))
        else {
            return unmatched(trimmed);
        };
        return ParsedDuration {
            hours,
            minutes,
            total_minutes: total(hours, minutes),
            formatted: trimmed.to_string(),
        };
    }

    if let Some(caps) = GENERIC_RE.captures(trimmed) {
        let minutes_group = if caps.get(3).is_some() { 3 } else { 2 };
        let (Some(hours), Some(minutes)) =
            (capture_number(&caps, 1), capture_number(&caps, minutes_group))
        else {
            return unmatched(trimmed);
        };
        let total_minutes = total(hours, minutes);
        let formatted = if total_minutes > 0 {
            format_duration(total_minutes)
        } else {
            trimmed.to_string()
        };
        return ParsedDuration {
            hours,
            minutes,
            total_minutes,
            formatted,
        };
    }

    if let Some(caps) = MINUTES_RE.captures(trimmed) {
        let Some(total_minutes) = capture_number(&caps, 1) else {
            return unmatched(trimmed);
        };
        return ParsedDuration {
            hours: total_minutes / 60,
            minutes: total_minutes % 60,
            total_minutes,
            formatted: format_duration(total_minutes),
        };
    }

    unmatched(trimmed)
}

fn unmatched(trimmed: &str) -> ParsedDuration {
    ParsedDuration {
        formatted: trimmed.to_string(),
        ..ParsedDuration::default()
    }
}

/// Parses a JSON value; anything but a string yields the all-zero result
pub fn parse_duration_value(value: Option<&Value>) -> ParsedDuration {
    match value {
        Some(Value::String(s)) => parse_duration(s),
        _ => ParsedDuration::default(),
    }
}

/// Reduces a raw duration value to the fields stored on a book
///
/// When the parse produced no display text, one is derived from the hour and
/// minute components.
pub fn normalize_duration_for_storage(value: Option<&Value>) -> StoredDuration {
    let parsed = parse_duration_value(value);
    let formatted = if parsed.formatted.is_empty() {
        format!("{}{} {}{}", parsed.hours, HOUR_MARK, parsed.minutes, MINUTE_MARK)
    } else {
        parsed.formatted
    };

    StoredDuration {
        total_minutes: parsed.total_minutes,
        formatted,
    }
}

/// A missing group counts as zero; `None` means the digits overflow `u32`
fn capture_number(caps: &regex::Captures<'_>, group: usize) -> Option<u32> {
    match caps.get(group) {
        None => Some(0),
        Some(m) => m.as_str().parse::<u32>().ok(),
    }
}

fn total(hours: u32, minutes: u32) -> u32 {
    hours.saturating_mul(60).saturating_add(minutes)
}
