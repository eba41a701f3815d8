//! Generation Orchestrator
//!
//! One pipeline run per request, strictly sequential:
//!
//! 1. admission (plan tier -> quota check-and-consume)
//! 2. code acquisition (model backend, or caller-supplied code)
//! 3. workspace claim
//! 4. ledger `create`
//! 5. execution
//! 6. publish (releases the workspace)
//! 7. ledger `mark_completed`, then stats
//!
//! Any failure after step 4 is written to the job record with its
//! diagnostic. The caller always receives a [`GenerationOutcome`].

use crate::error::{PipelineError, Stage};
use crate::outcome::GenerationOutcome;
use crate::plans::PlanDirectory;
use motion_codegen::{normalize_model_output, CodeGenerator};
use motion_ledger::{derive_title, JobId, JobLedger, OwnerId, QuotaLedger, StatsLedger};
use motion_publish::ArtifactPublisher;
use motion_sandbox::{SceneRenderer, WorkspaceRegistry};
use std::sync::Arc;

/// Handles the orchestrator is built from, constructed once at startup
#[derive(Clone)]
pub struct Collaborators {
    pub generator: Arc<dyn CodeGenerator>,
    pub renderer: Arc<dyn SceneRenderer>,
    pub workspaces: Arc<WorkspaceRegistry>,
    pub publisher: ArtifactPublisher,
    pub jobs: Arc<dyn JobLedger>,
    pub quota: Arc<dyn QuotaLedger>,
    pub stats: Arc<dyn StatsLedger>,
    pub plans: PlanDirectory,
}

/// Where the scene source comes from
#[derive(Debug, Clone)]
enum Acquisition {
    Prompt(String),
    Supplied { code: String, title: String },
}

/// Composes ledgers, generator, renderer and publisher into one pipeline
#[derive(Clone)]
pub struct GenerationOrchestrator {
    parts: Collaborators,
}

impl std::fmt::Debug for GenerationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationOrchestrator")
            .field("active_workspaces", &self.parts.workspaces.active())
            .finish_non_exhaustive()
    }
}

impl GenerationOrchestrator {
    #[must_use]
    pub fn new(parts: Collaborators) -> Self {
        Self { parts }
    }

    /// Prompt-to-artifact run under a fresh job id
    pub async fn generate(&self, owner_id: &OwnerId, prompt: &str) -> GenerationOutcome {
        let job_id = JobId::generate();
        self.run(owner_id, job_id, Acquisition::Prompt(prompt.to_string()))
            .await
    }

    /// Render caller-supplied code as a new job
    pub async fn submit_code(&self, owner_id: &OwnerId, code: &str, title: &str) -> GenerationOutcome {
        let job_id = JobId::generate();
        self.run(
            owner_id,
            job_id,
            Acquisition::Supplied {
                code: code.to_string(),
                title: derive_title(title),
            },
        )
        .await
    }

    /// Edit flow: render caller-supplied code under an existing job id
    ///
    /// The caller is expected to have confirmed the job exists in the
    /// owner's partition; the stored title and `created_at` are kept.
    pub async fn rerender(&self, owner_id: &OwnerId, job_id: &JobId, code: &str, title: &str) -> GenerationOutcome {
        self.run(
            owner_id,
            job_id.clone(),
            Acquisition::Supplied {
                code: code.to_string(),
                title: title.to_string(),
            },
        )
        .await
    }

    async fn run(&self, owner_id: &OwnerId, job_id: JobId, acquisition: Acquisition) -> GenerationOutcome {
        let p = &self.parts;

        // 1. admission
        let tier = match p.plans.tier_of(owner_id).await {
            Ok(tier) => tier,
            Err(e) => return self.failed(owner_id, &job_id, Stage::Admission, e.into(), false).await,
        };
        let admission = match p.quota.check_and_consume(owner_id, tier).await {
            Ok(admission) => admission,
            Err(e) => return self.failed(owner_id, &job_id, Stage::Admission, e.into(), false).await,
        };
        if !admission.is_allowed() {
            tracing::info!(
                "Quota exceeded for {} ({}): {}/{}",
                owner_id,
                tier,
                admission.used(),
                admission.limit()
            );
            return GenerationOutcome::QuotaExceeded {
                used: admission.used(),
                limit: admission.limit(),
                plan: tier,
            };
        }
        tracing::info!(
            "Admitted job {} for {} ({}/{} on {})",
            job_id,
            owner_id,
            admission.used(),
            admission.limit(),
            tier
        );

        // 2. code acquisition
        let (code, title) = match acquisition {
            Acquisition::Prompt(prompt) => match p.generator.generate(&prompt).await {
                Ok(code) => (code, derive_title(&prompt)),
                Err(e) => return self.failed(owner_id, &job_id, Stage::Generation, e.into(), false).await,
            },
            Acquisition::Supplied { code, title } => match normalize_model_output(&code) {
                Ok(scene) => (scene.into_string(), title),
                Err(e) => return self.failed(owner_id, &job_id, Stage::Generation, e.into(), false).await,
            },
        };
        tracing::debug!("Acquired {} bytes of source for job {}", code.len(), job_id);

        // 3. exclusive workspace; a busy job id belongs to another live run
        let workspace = match p.workspaces.claim(&job_id).await {
            Ok(ws) => ws,
            Err(e) => return self.failed(owner_id, &job_id, Stage::Execution, e.into(), false).await,
        };

        // 4. record
        if let Err(e) = p.jobs.create(&job_id, owner_id, &code, &title).await {
            return self.failed(owner_id, &job_id, Stage::Record, e.into(), false).await;
        }

        // 5. execution
        let execution = match p.renderer.run(&workspace, &code).await {
            Ok(result) => result,
            Err(e) => {
                if let Err(cleanup) = workspace.close().await {
                    tracing::warn!("Failed to remove workspace of job {}: {}", job_id, cleanup);
                }
                return self.failed(owner_id, &job_id, Stage::Execution, e.into(), true).await;
            }
        };

        // 6. publish
        let artifact_url = match p
            .publisher
            .publish(workspace, &execution.output_path, owner_id)
            .await
        {
            Ok(url) => url,
            Err(e) => return self.failed(owner_id, &job_id, Stage::Publish, e.into(), true).await,
        };

        // 7. finalize
        let render_duration = execution.duration.as_secs_f64();
        let job = match p
            .jobs
            .mark_completed(owner_id, &job_id, &artifact_url, render_duration)
            .await
        {
            Ok(job) => job,
            Err(e) => return self.failed(owner_id, &job_id, Stage::Finalize, e.into(), true).await,
        };
        if let Err(e) = p.stats.record_completion(owner_id, render_duration).await {
            tracing::warn!("Failed to update usage stats for {}: {}", owner_id, e);
        }

        tracing::info!("Job {} completed in {:.2}s", job_id, render_duration);
        GenerationOutcome::Completed {
            job_id,
            title: job.title().to_string(),
            artifact_url,
            render_duration,
        }
    }

    async fn failed(
        &self,
        owner_id: &OwnerId,
        job_id: &JobId,
        stage: Stage,
        error: PipelineError,
        recorded: bool,
    ) -> GenerationOutcome {
        let diagnostic = error.diagnostic();
        tracing::warn!("Job {} failed at {}: {}", job_id, stage, error);

        if recorded {
            if let Err(e) = self.parts.jobs.mark_failed(owner_id, job_id, &diagnostic).await {
                tracing::error!("Failed to record failure of job {}: {}", job_id, e);
            }
        }

        GenerationOutcome::Failed {
            job_id: job_id.clone(),
            stage,
            message: stage.user_message().to_string(),
            retryable: error.is_retryable(),
        }
    }
}
