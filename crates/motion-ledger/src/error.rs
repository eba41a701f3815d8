//! Ledger errors

use crate::ids::JobId;
use crate::job::JobStatus;

/// Errors raised by the job, quota and stats ledgers
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Job does not exist in the caller's partition
    ///
    /// Also returned for jobs owned by someone else, so existence never leaks
    /// across owners.
    #[error("job not found: {0}")]
    NotFound(JobId),

    /// Requested status change is not allowed
    #[error("illegal job transition {from:?} -> {to:?} for {job_id}")]
    InvalidTransition {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    /// Rejected input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Backing store failure
    #[error("ledger backend error: {0}")]
    Backend(String),
}

impl LedgerError {
    /// Check if this is a not-found error
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
