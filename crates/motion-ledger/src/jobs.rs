//! Job Ledger
//!
//! Per-job state keyed by [`JobId`] and partitioned by [`OwnerId`]. Reads and
//! writes naming the wrong owner fail with [`LedgerError::NotFound`].

use crate::clock::{Clock, SystemClock};
use crate::error::LedgerError;
use crate::ids::{JobId, OwnerId};
use crate::job::Job;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// Default page size for [`JobLedger::list_by_owner`]
pub const DEFAULT_LIST_LIMIT: usize = 10;

/// Upper bound for [`JobLedger::list_by_owner`]
pub const MAX_LIST_LIMIT: usize = 100;

/// Durable job state
#[async_trait]
pub trait JobLedger: Send + Sync {
    /// Record a job in `processing`
    ///
    /// For an existing `job_id` in the owner's partition this is a re-render:
    /// the source is replaced and the status restarts, while the stored title
    /// and `created_at` are kept (the `title` argument is ignored).
    async fn create(
        &self,
        job_id: &JobId,
        owner_id: &OwnerId,
        source_code: &str,
        title: &str,
    ) -> Result<Job, LedgerError>;

    /// Transition to `completed`
    async fn mark_completed(
        &self,
        owner_id: &OwnerId,
        job_id: &JobId,
        artifact_url: &str,
        render_duration: f64,
    ) -> Result<Job, LedgerError>;

    /// Transition to `failed`
    async fn mark_failed(
        &self,
        owner_id: &OwnerId,
        job_id: &JobId,
        error_detail: &str,
    ) -> Result<Job, LedgerError>;

    /// Fetch one job from the owner's partition
    async fn get(&self, owner_id: &OwnerId, job_id: &JobId) -> Result<Job, LedgerError>;

    /// Most recent jobs first, at most `limit` (clamped to [`MAX_LIST_LIMIT`])
    async fn list_by_owner(&self, owner_id: &OwnerId, limit: usize) -> Result<Vec<Job>, LedgerError>;
}

/// Job ledger backed by a concurrent map
#[derive(Debug)]
pub struct InMemoryJobLedger {
    jobs: DashMap<JobId, Job>,
    clock: Arc<dyn Clock>,
}

impl InMemoryJobLedger {
    /// Create empty ledger on the wall clock
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create empty ledger on a custom clock
    #[inline]
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            jobs: DashMap::new(),
            clock,
        }
    }

    /// Number of stored jobs across all owners
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Apply `f` to the owner's job under the entry lock
    fn update<F>(&self, owner_id: &OwnerId, job_id: &JobId, f: F) -> Result<Job, LedgerError>
    where
        F: FnOnce(&mut Job) -> Result<(), LedgerError>,
    {
        let mut entry = self
            .jobs
            .get_mut(job_id)
            .filter(|job| job.owner_id() == owner_id)
            .ok_or_else(|| LedgerError::NotFound(job_id.clone()))?;
        f(entry.value_mut())?;
        Ok(entry.value().clone())
    }
}

impl Default for InMemoryJobLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobLedger for InMemoryJobLedger {
    async fn create(
        &self,
        job_id: &JobId,
        owner_id: &OwnerId,
        source_code: &str,
        title: &str,
    ) -> Result<Job, LedgerError> {
        let now = self.clock.now();
        match self.jobs.entry(job_id.clone()) {
            Entry::Occupied(mut occupied) => {
                let job = occupied.get_mut();
                if job.owner_id() != owner_id {
                    return Err(LedgerError::NotFound(job_id.clone()));
                }
                job.restart(source_code.to_string(), now)?;
                tracing::debug!("Re-render recorded for job {}", job_id);
                Ok(job.clone())
            }
            Entry::Vacant(vacant) => {
                let job = Job::new(
                    job_id.clone(),
                    owner_id.clone(),
                    source_code.to_string(),
                    title.to_string(),
                    now,
                );
                vacant.insert(job.clone());
                tracing::debug!("Job {} created for {}", job_id, owner_id);
                Ok(job)
            }
        }
    }

    async fn mark_completed(
        &self,
        owner_id: &OwnerId,
        job_id: &JobId,
        artifact_url: &str,
        render_duration: f64,
    ) -> Result<Job, LedgerError> {
        let now = self.clock.now();
        self.update(owner_id, job_id, |job| {
            job.complete(artifact_url.to_string(), render_duration, now)
                .map(|_| ())
        })
    }

    async fn mark_failed(
        &self,
        owner_id: &OwnerId,
        job_id: &JobId,
        error_detail: &str,
    ) -> Result<Job, LedgerError> {
        let now = self.clock.now();
        self.update(owner_id, job_id, |job| job.fail(error_detail.to_string(), now))
    }

    async fn get(&self, owner_id: &OwnerId, job_id: &JobId) -> Result<Job, LedgerError> {
        self.jobs
            .get(job_id)
            .filter(|job| job.owner_id() == owner_id)
            .map(|job| job.value().clone())
            .ok_or_else(|| LedgerError::NotFound(job_id.clone()))
    }

    async fn list_by_owner(&self, owner_id: &OwnerId, limit: usize) -> Result<Vec<Job>, LedgerError> {
        let limit = limit.min(MAX_LIST_LIMIT);
        let mut jobs: Vec<Job> = self
            .jobs
            .iter()
            .filter(|entry| entry.value().owner_id() == owner_id)
            .map(|entry| entry.value().clone())
            .collect();

        jobs.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| a.job_id().cmp(b.job_id()))
        });
        jobs.truncate(limit);
        Ok(jobs)
    }
}
