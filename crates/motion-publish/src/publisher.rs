//! Upload with scoped workspace release

use crate::error::PublishError;
use crate::key::{content_type_for, ObjectKey};
use crate::store::ObjectStore;
use motion_ledger::OwnerId;
use motion_sandbox::JobWorkspace;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Publisher tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    /// Pause before the single re-read of a vanished artifact
    pub vanish_retry_delay_ms: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            vanish_retry_delay_ms: 250,
        }
    }
}

/// Uploads artifacts and releases their workspaces
#[derive(Clone)]
pub struct ArtifactPublisher {
    store: Arc<dyn ObjectStore>,
    config: PublisherConfig,
}

impl std::fmt::Debug for ArtifactPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactPublisher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ArtifactPublisher {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, config: PublisherConfig) -> Self {
        Self { store, config }
    }

    /// Upload `artifact` under `<owner_id>/<job_id>/` and return its public URL
    ///
    /// `workspace` is deleted before returning, whatever the outcome. If the
    /// future is dropped mid-upload the workspace guard removes it instead.
    ///
    /// # Errors
    /// - `ArtifactMissing` if the file is still gone after one retry
    /// - `Store` on upload failure
    pub async fn publish(
        &self,
        workspace: JobWorkspace,
        artifact: &Path,
        owner_id: &OwnerId,
    ) -> Result<String, PublishError> {
        let result = self.upload(&workspace, artifact, owner_id).await;

        let job_id = workspace.job_id().clone();
        if let Err(e) = workspace.close().await {
            tracing::warn!("Failed to clean up workspace of job {}: {}", job_id, e);
        }

        match &result {
            Ok(url) => tracing::info!("Published job {} to {}", job_id, url),
            Err(e) => tracing::warn!("Publish failed for job {}: {}", job_id, e),
        }
        result
    }

    async fn upload(&self, workspace: &JobWorkspace, artifact: &Path, owner_id: &OwnerId) -> Result<String, PublishError> {
        let key = ObjectKey::for_artifact(owner_id, workspace.job_id(), artifact)?;
        let body = self.read_artifact(artifact).await?;
        self.store
            .put_object(&key, body, content_type_for(artifact))
            .await?;
        Ok(self.store.public_url(&key))
    }

    async fn read_artifact(&self, artifact: &Path) -> Result<Vec<u8>, PublishError> {
        match tokio::fs::read(artifact).await {
            Ok(body) => return Ok(body),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("Artifact {} vanished, retrying once", artifact.display());
            }
            Err(source) => {
                return Err(PublishError::Read {
                    path: artifact.to_path_buf(),
                    source,
                })
            }
        }

        tokio::time::sleep(Duration::from_millis(self.config.vanish_retry_delay_ms)).await;
        tokio::fs::read(artifact).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                PublishError::ArtifactMissing {
                    path: artifact.to_path_buf(),
                }
            } else {
                PublishError::Read {
                    path: artifact.to_path_buf(),
                    source,
                }
            }
        })
    }
}
