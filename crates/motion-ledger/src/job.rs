//! Job model and status state machine
//!
//! A job moves `processing -> completed | failed`. A re-render of an existing
//! job re-enters `processing` from either terminal state, keeping its title
//! and creation time.
//!
//! Field invariant, held after every transition:
//! - `completed`: `artifact_url` and `render_duration` set, no `error_detail`
//! - `failed`: `error_detail` set, no `artifact_url`
//! - `processing`: neither `artifact_url` nor `error_detail`

use crate::error::LedgerError;
use crate::ids::{JobId, OwnerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum length of a derived title, in characters
pub const MAX_TITLE_CHARS: usize = 60;

const UNTITLED: &str = "Untitled";

/// Job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Terminal states end one execution
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Wire name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// States reachable from `from`
///
/// `processing -> processing` restarts an interrupted execution under the
/// same id; concurrent executions are refused earlier, by the workspace claim.
#[must_use]
pub fn allowed_transitions(from: JobStatus) -> &'static [JobStatus] {
    use JobStatus::*;
    match from {
        Processing => &[Processing, Completed, Failed],
        Completed => &[Processing],
        Failed => &[Processing],
    }
}

/// Validate a status change
///
/// # Errors
/// Returns [`LedgerError::InvalidTransition`] when `to` is not reachable from `from`.
pub fn validate_transition(job_id: &JobId, from: JobStatus, to: JobStatus) -> Result<(), LedgerError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(LedgerError::InvalidTransition {
            job_id: job_id.clone(),
            from,
            to,
        })
    }
}

/// Derive a short label from the originating prompt
///
/// Collapses whitespace and cuts on a word boundary at [`MAX_TITLE_CHARS`].
#[must_use]
pub fn derive_title(prompt: &str) -> String {
    let mut title = String::new();
    for word in prompt.split_whitespace() {
        let separator = usize::from(!title.is_empty());
        let needed = separator + word.chars().count();
        if title.chars().count() + needed > MAX_TITLE_CHARS {
            if title.is_empty() {
                // single oversized word
                title = word.chars().take(MAX_TITLE_CHARS).collect();
            }
            break;
        }
        if !title.is_empty() {
            title.push(' ');
        }
        title.push_str(word);
    }

    if title.is_empty() {
        UNTITLED.to_string()
    } else {
        title
    }
}

/// One generation attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    job_id: JobId,
    owner_id: OwnerId,
    source_code: String,
    status: JobStatus,
    title: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    render_duration: Option<f64>,
    artifact_url: Option<String>,
    error_detail: Option<String>,
}

impl Job {
    /// New job in `processing`
    pub(crate) fn new(
        job_id: JobId,
        owner_id: OwnerId,
        source_code: String,
        title: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id,
            owner_id,
            source_code,
            status: JobStatus::Processing,
            title,
            created_at: now,
            updated_at: now,
            render_duration: None,
            artifact_url: None,
            error_detail: None,
        }
    }

    /// Re-enter `processing` with new source; title and `created_at` survive
    pub(crate) fn restart(&mut self, source_code: String, now: DateTime<Utc>) -> Result<(), LedgerError> {
        validate_transition(&self.job_id, self.status, JobStatus::Processing)?;
        self.source_code = source_code;
        self.status = JobStatus::Processing;
        self.updated_at = now;
        self.render_duration = None;
        self.artifact_url = None;
        self.error_detail = None;
        Ok(())
    }

    /// Transition to `completed`
    ///
    /// Completing an already completed job with the same URL is a no-op.
    pub(crate) fn complete(
        &mut self,
        artifact_url: String,
        render_duration: f64,
        now: DateTime<Utc>,
    ) -> Result<bool, LedgerError> {
        if self.status == JobStatus::Completed && self.artifact_url.as_deref() == Some(artifact_url.as_str()) {
            return Ok(false);
        }
        validate_transition(&self.job_id, self.status, JobStatus::Completed)?;
        self.status = JobStatus::Completed;
        self.updated_at = now;
        self.render_duration = Some(render_duration.max(0.0));
        self.artifact_url = Some(artifact_url);
        self.error_detail = None;
        Ok(true)
    }

    /// Transition to `failed`
    pub(crate) fn fail(&mut self, error_detail: String, now: DateTime<Utc>) -> Result<(), LedgerError> {
        validate_transition(&self.job_id, self.status, JobStatus::Failed)?;
        self.status = JobStatus::Failed;
        self.updated_at = now;
        self.render_duration = None;
        self.artifact_url = None;
        self.error_detail = Some(if error_detail.trim().is_empty() {
            "unknown failure".to_string()
        } else {
            error_detail
        });
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    #[inline]
    #[must_use]
    pub fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }

    #[inline]
    #[must_use]
    pub fn source_code(&self) -> &str {
        &self.source_code
    }

    #[inline]
    #[must_use]
    pub fn status(&self) -> JobStatus {
        self.status
    }

    #[inline]
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[inline]
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[inline]
    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Seconds spent rendering; set only when completed
    #[inline]
    #[must_use]
    pub fn render_duration(&self) -> Option<f64> {
        self.render_duration
    }

    #[inline]
    #[must_use]
    pub fn artifact_url(&self) -> Option<&str> {
        self.artifact_url.as_deref()
    }

    #[inline]
    #[must_use]
    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    /// Check the status/field invariant
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        match self.status {
            JobStatus::Processing => self.artifact_url.is_none() && self.error_detail.is_none(),
            JobStatus::Completed => {
                self.artifact_url.is_some() && self.render_duration.is_some() && self.error_detail.is_none()
            }
            JobStatus::Failed => self.error_detail.is_some() && self.artifact_url.is_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn job() -> Job {
        Job::new(
            JobId::parse("job1").unwrap(),
            OwnerId::parse("alice").unwrap(),
            "class GeneratedScene(Scene): pass".to_string(),
            "circle".to_string(),
            Utc::now(),
        )
    }

    #[test]
    fn terminal_states_only_restart() {
        assert_eq!(allowed_transitions(JobStatus::Completed), &[JobStatus::Processing]);
        assert_eq!(allowed_transitions(JobStatus::Failed), &[JobStatus::Processing]);
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn complete_sets_url_and_duration() {
        let mut job = job();
        assert!(job.is_consistent());

        job.complete("https://cdn/x.mp4".into(), 1.5, Utc::now()).unwrap();
        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(job.artifact_url(), Some("https://cdn/x.mp4"));
        assert_eq!(job.render_duration(), Some(1.5));
        assert!(job.is_consistent());
    }

    #[test]
    fn failed_job_cannot_complete_without_restart() {
        let mut job = job();
        job.fail("boom".into(), Utc::now()).unwrap();

        let err = job.complete("u".into(), 1.0, Utc::now()).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition { .. }));
        assert!(job.is_consistent());
    }

    #[test]
    fn restart_clears_outcome_but_keeps_title() {
        let mut job = job();
        let created = job.created_at();
        job.complete("u".into(), 2.0, Utc::now()).unwrap();

        job.restart("new code".into(), Utc::now()).unwrap();
        assert_eq!(job.status(), JobStatus::Processing);
        assert_eq!(job.title(), "circle");
        assert_eq!(job.created_at(), created);
        assert_eq!(job.source_code(), "new code");
        assert!(job.artifact_url().is_none());
        assert!(job.is_consistent());
    }

    #[test]
    fn complete_twice_with_same_url_is_noop() {
        let mut job = job();
        assert!(job.complete("u".into(), 2.0, Utc::now()).unwrap());
        assert!(!job.complete("u".into(), 2.0, Utc::now()).unwrap());
        assert!(job.complete("other".into(), 2.0, Utc::now()).is_err());
    }

    #[test]
    fn empty_failure_detail_is_replaced() {
        let mut job = job();
        job.fail("  ".into(), Utc::now()).unwrap();
        assert_eq!(job.error_detail(), Some("unknown failure"));
    }

    #[test]
    fn title_cuts_on_word_boundary() {
        assert_eq!(derive_title("  draw a   circle\nthat turns into a square "), "draw a circle that turns into a square");
        assert_eq!(derive_title(""), "Untitled");

        let long = "word ".repeat(40);
        let title = derive_title(&long);
        assert!(title.chars().count() <= MAX_TITLE_CHARS);
        assert!(title.ends_with("word"));
    }

    proptest! {
        #[test]
        fn title_is_bounded_and_non_empty(prompt in "\\PC{0,200}") {
            let title = derive_title(&prompt);
            prop_assert!(!title.is_empty());
            prop_assert!(title.chars().count() <= MAX_TITLE_CHARS);
            prop_assert_eq!(title.trim(), title.as_str());
        }
    }
}
