//! Structured results returned to callers

use crate::error::Stage;
use motion_ledger::{AggregateUsageStats, JobId, PlanTier};
use serde::{Deserialize, Serialize};

/// Result of one pipeline invocation
///
/// Failure details stay in the job record; `message` is safe to show users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GenerationOutcome {
    Completed {
        job_id: JobId,
        title: String,
        artifact_url: String,
        /// Seconds
        render_duration: f64,
    },
    Failed {
        job_id: JobId,
        stage: Stage,
        message: String,
        retryable: bool,
    },
    QuotaExceeded {
        used: u32,
        limit: u32,
        plan: PlanTier,
    },
}

impl GenerationOutcome {
    #[inline]
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// Job id, absent when admission was denied
    #[must_use]
    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            Self::Completed { job_id, .. } | Self::Failed { job_id, .. } => Some(job_id),
            Self::QuotaExceeded { .. } => None,
        }
    }
}

impl Stage {
    /// Generic user-facing description of a failure at this stage
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Admission => "Could not verify your plan. Please try again.",
            Self::Generation => "Could not generate animation code for this request.",
            Self::Record => "Could not record the job. Please try again.",
            Self::Execution => "The animation failed to render.",
            Self::Publish => "The rendered video could not be uploaded.",
            Self::Finalize => "The job could not be finalized.",
        }
    }
}

/// Non-consuming usage view for one owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub plan: PlanTier,
    pub used_today: u32,
    pub limit: u32,
    pub remaining: u32,
    pub stats: AggregateUsageStats,
}
