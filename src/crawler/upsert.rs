//! Upsert/dedup layer
//!
//! Takes the candidate a detail page produced, runs it through preparation and
//! validation, and either commits the resulting book together with its queue
//! item or records the rejection. Nothing reaches the `books` table without
//! passing validation.

use crate::storage::{BookId, Storage, StorageResult};
use crate::validation::{validate, CandidateRecord};
use tracing::{debug, warn};

/// What happened to one candidate
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    /// The book was written (inserted or replaced) and the queue item completed
    Persisted(BookId),

    /// Validation failed; the queue item completed without a write
    Rejected {
        errors: Vec<String>,
        /// Whether an audio or download link was among the failures
        url_rejected: bool,
    },
}

/// Validates a candidate fetched from `url` and persists or rejects it
///
/// # Arguments
///
/// * `storage` - Store holding the claimed queue item for `url`
/// * `url` - Detail URL the candidate came from
/// * `candidate` - Raw field dictionary
///
/// # Returns
///
/// * `Ok(UpsertOutcome)` - The queue item is settled as `completed` either way
/// * `Err(StorageError)` - Nothing was committed; the item is still `processing`
pub fn persist_candidate<S: Storage + ?Sized>(
    storage: &mut S,
    url: &str,
    candidate: CandidateRecord,
) -> StorageResult<UpsertOutcome> {
    let prepared = candidate.prepare();
    let result = validate(&prepared);

    if !result.valid {
        let errors = result.messages();
        let url_rejected = result.has_url_errors();
        warn!(url, errors = %errors.join("; "), "Candidate rejected by validation");
        storage.record_rejection(url, prepared.book_id().as_ref(), &errors, url_rejected)?;
        return Ok(UpsertOutcome::Rejected {
            errors,
            url_rejected,
        });
    }

    let book = match prepared.to_book(Some(url)) {
        Ok(book) => book,
        Err(error) => {
            let errors = vec![error.to_string()];
            storage.record_rejection(url, None, &errors, false)?;
            return Ok(UpsertOutcome::Rejected {
                errors,
                url_rejected: false,
            });
        }
    };

    storage.commit_book(url, &book)?;
    debug!(url, id = %book.id, "Book persisted");
    Ok(UpsertOutcome::Persisted(book.id))
}
