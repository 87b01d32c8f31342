//! Free-text cleaning
//!
//! Scraped titles, authors, and descriptions routinely carry inline markup and
//! HTML entities. `clean` turns them into plain single-line text.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Sentinel stored when a book has no usable author
pub const UNKNOWN_AUTHOR: &str = "Unknown Author";

/// Sentinel stored when a book has no usable category
pub const UNKNOWN_CATEGORY: &str = "Unknown";

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"));

/// A dangling tag opener: `<` right before a name, `/` or `!` with no closing `>`
static OPEN_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<+([A-Za-z/!])").expect("open tag pattern is valid"));

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Entities decoded by `clean`; `&amp;` goes last so one pass never decodes twice
const ENTITIES: &[(&str, &str)] = &[
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&apos;", "'"),
    ("&nbsp;", " "),
    ("&amp;", "&"),
];

/// Strips markup and entities from a free-text field
///
/// # Cleaning Steps
///
/// 1. Remove every `<...>` tag
/// 2. Drop the `<` of any unterminated tag opener (`x <b`, `<<b`)
/// 3. Decode the fixed entity set (`&amp;`, `&lt;`, `&gt;`, `&quot;`, `&#39;`, `&apos;`, `&nbsp;`)
/// 4. Repeat 1-3 until the text stops changing, so decoded `&lt;b&gt;` cannot smuggle a tag back in
/// 5. Collapse whitespace runs to a single space and trim
///
/// The output never contains a `<...>` substring, never has `<` directly
/// followed by a letter, `/` or `!`, and `clean(clean(x)) == clean(x)`.
/// A bare comparison such as `1 < 2` survives.
///
/// # Examples
///
/// ```
/// use catalog_crawler::normalize::clean;
///
/// assert_eq!(clean("<p>Tom &amp; Jerry</p>\n\t"), "Tom & Jerry");
/// ```
pub fn clean(raw: &str) -> String {
    let mut current = raw.to_string();

    loop {
        let stripped = TAG_RE.replace_all(&current, "");
        let stripped = OPEN_TAG_RE.replace_all(&stripped, "$1");
        let decoded = decode_entities(&stripped);
        if decoded == current {
            break;
        }
        current = decoded;
    }

    WHITESPACE_RE.replace_all(&current, " ").trim().to_string()
}

/// Cleans an arbitrary JSON value
///
/// `null` and a missing value become `""`; strings are cleaned; anything else is
/// stringified first.
pub fn clean_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => clean(s),
        Some(other) => clean(&other.to_string()),
    }
}

/// Cleans an author name, substituting `UNKNOWN_AUTHOR` when nothing is left
pub fn normalize_author(value: Option<&Value>) -> String {
    with_sentinel(clean_value(value), UNKNOWN_AUTHOR)
}

/// Cleans a category name, substituting `UNKNOWN_CATEGORY` when nothing is left
pub fn normalize_category(value: Option<&Value>) -> String {
    with_sentinel(clean_value(value), UNKNOWN_CATEGORY)
}

fn with_sentinel(cleaned: String, sentinel: &str) -> String {
    if cleaned.is_empty() {
        sentinel.to_string()
    } else {
        cleaned
    }
}

fn decode_entities(text: &str) -> String {
    ENTITIES
        .iter()
        .fold(text.to_string(), |acc, (entity, replacement)| {
            acc.replace(entity, replacement)
        })
}
