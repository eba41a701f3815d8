//! Per-job working directories
//!
//! A [`JobWorkspace`] is the exclusive scratch area of one execution:
//! `<work_root>/<job_id>/`. The registry refuses a second live claim for the
//! same job id. Dropping the workspace deletes the directory (source file,
//! rendered media, partial files) and releases the claim.

use crate::error::RenderError;
use dashmap::DashMap;
use motion_ledger::JobId;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Claims on job workspaces under one root
#[derive(Debug)]
pub struct WorkspaceRegistry {
    root: PathBuf,
    claims: DashMap<JobId, ()>,
}

impl WorkspaceRegistry {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            root: root.into(),
            claims: DashMap::new(),
        })
    }

    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check if a workspace for `job_id` is currently held
    #[inline]
    #[must_use]
    pub fn is_claimed(&self, job_id: &JobId) -> bool {
        self.claims.contains_key(job_id)
    }

    /// Number of live workspaces
    #[inline]
    #[must_use]
    pub fn active(&self) -> usize {
        self.claims.len()
    }

    /// Claim and create the workspace for `job_id`
    ///
    /// Leftovers from an earlier crash at the same path are removed first.
    ///
    /// # Errors
    /// - `Busy` if the job already holds a workspace
    /// - `Io` if the directory cannot be prepared
    pub async fn claim(self: &Arc<Self>, job_id: &JobId) -> Result<JobWorkspace, RenderError> {
        match self.claims.entry(job_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(RenderError::Busy(job_id.clone()));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(());
            }
        }

        // From here on the guard owns the claim, so early returns release it
        let workspace = JobWorkspace {
            job_id: job_id.clone(),
            path: self.root.join(job_id.as_str()),
            registry: Arc::clone(self),
            closed: false,
        };

        if tokio::fs::try_exists(&workspace.path).await? {
            tracing::warn!("Removing stale workspace {}", workspace.path.display());
            tokio::fs::remove_dir_all(&workspace.path).await?;
        }
        tokio::fs::create_dir_all(&workspace.path).await?;

        tracing::debug!("Claimed workspace {}", workspace.path.display());
        Ok(workspace)
    }

    fn release(&self, job_id: &JobId) {
        self.claims.remove(job_id);
    }
}

/// Exclusive scratch directory of one job execution
#[derive(Debug)]
pub struct JobWorkspace {
    job_id: JobId,
    path: PathBuf,
    registry: Arc<WorkspaceRegistry>,
    closed: bool,
}

impl JobWorkspace {
    #[inline]
    #[must_use]
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Source file path; the file name embeds the job id
    #[must_use]
    pub fn source_path(&self) -> PathBuf {
        self.path.join(format!("{}.py", self.job_id))
    }

    /// Root the renderer writes media under
    #[must_use]
    pub fn media_dir(&self) -> PathBuf {
        self.path.join("media")
    }

    /// Delete the directory and release the claim, reporting I/O failure
    ///
    /// # Errors
    /// Returns the removal error; the claim is released regardless
    pub async fn close(mut self) -> std::io::Result<()> {
        self.closed = true;
        let result = match tokio::fs::remove_dir_all(&self.path).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        };
        self.registry.release(&self.job_id);
        tracing::debug!("Closed workspace {}", self.path.display());
        result
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => tracing::debug!("Removed workspace {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove workspace {}: {}", self.path.display(), e),
        }
        self.registry.release(&self.job_id);
    }
}
