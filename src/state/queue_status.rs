/// Queue status definitions for tracking URL work items
///
/// A queue item moves `pending -> processing -> {completed | failed}`. The only
/// way back is an explicit re-seed or requeue from the mode controller, or a
/// transient failure that still has retry budget.
use std::fmt;

/// Represents the current status of a URL in the work queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueStatus {
    /// Waiting to be claimed by a worker
    Pending,

    /// Claimed by exactly one worker
    Processing,

    /// Fetch succeeded (regardless of what validation decided)
    Completed,

    /// Terminal failure; stays failed until explicitly requeued
    Failed,
}

impl QueueStatus {
    /// Checks whether the engine or the mode controller may move an item
    /// from `self` to `to`
    ///
    /// - `pending -> processing` is a claim
    /// - `processing -> pending` is a retry or crash recovery
    /// - `processing -> completed | failed` settles a claim
    /// - `pending -> failed` is the claim-time retry budget check
    /// - `completed | failed -> pending` is an explicit requeue
    pub fn can_transition_to(&self, to: QueueStatus) -> bool {
        use QueueStatus::*;
        matches!(
            (self, to),
            (Pending, Processing)
                | (Pending, Failed)
                | (Processing, Pending)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Completed, Pending)
                | (Failed, Pending)
        )
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all possible queue statuses
    pub fn all_statuses() -> Vec<Self> {
        vec![
            Self::Pending,
            Self::Processing,
            Self::Completed,
            Self::Failed,
        ]
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
