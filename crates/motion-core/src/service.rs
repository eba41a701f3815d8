//! Service facade
//!
//! The surface a transport layer (HTTP, CLI) talks to. Owns the
//! orchestrator plus the query side of the ledgers, the identity boundary
//! and the billing webhook.

use crate::billing::{BillingWebhook, WebhookOutcome};
use crate::config::MotionConfig;
use crate::error::{ConfigError, PipelineError};
use crate::identity::{bearer_token, IdentityProvider, StaticTokenIdentity};
use crate::orchestrator::{Collaborators, GenerationOrchestrator};
use crate::outcome::{GenerationOutcome, UsageSnapshot};
use crate::plans::{InMemoryPlanStore, PlanDirectory};
use motion_codegen::ChatCompletionGenerator;
use motion_ledger::{
    InMemoryJobLedger, InMemoryQuotaLedger, InMemoryStatsLedger, Job, JobId, JobLedger, OwnerId, QuotaLedger,
    StatsLedger, DEFAULT_LIST_LIMIT,
};
use motion_publish::ArtifactPublisher;
use motion_sandbox::{ManimRenderer, WorkspaceRegistry};
use std::sync::Arc;
use std::time::Duration;

/// PromptMotion service
#[derive(Clone)]
pub struct MotionService {
    orchestrator: GenerationOrchestrator,
    jobs: Arc<dyn JobLedger>,
    quota: Arc<dyn QuotaLedger>,
    stats: Arc<dyn StatsLedger>,
    plans: PlanDirectory,
    identity: Arc<dyn IdentityProvider>,
    billing: BillingWebhook,
}

impl std::fmt::Debug for MotionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MotionService")
            .field("orchestrator", &self.orchestrator)
            .field("plans", &self.plans)
            .finish_non_exhaustive()
    }
}

impl MotionService {
    /// Assemble from explicitly constructed collaborators
    #[must_use]
    pub fn new(parts: Collaborators, identity: Arc<dyn IdentityProvider>, billing: BillingWebhook) -> Self {
        Self {
            jobs: Arc::clone(&parts.jobs),
            quota: Arc::clone(&parts.quota),
            stats: Arc::clone(&parts.stats),
            plans: parts.plans.clone(),
            orchestrator: GenerationOrchestrator::new(parts),
            identity,
            billing,
        }
    }

    /// Build production collaborators from config
    ///
    /// # Errors
    /// Returns `Invalid` from validation or `Build` if a component cannot be
    /// constructed (e.g. missing model API key)
    pub fn from_config(config: &MotionConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let generator = ChatCompletionGenerator::new(config.generator.clone()).map_err(|e| ConfigError::Build {
            component: "generator",
            reason: e.to_string(),
        })?;
        let store = config.storage.build().map_err(|e| ConfigError::Build {
            component: "object store",
            reason: e.to_string(),
        })?;
        let identity = StaticTokenIdentity::new(&config.identity.tokens).map_err(|e| ConfigError::Build {
            component: "identity",
            reason: e.to_string(),
        })?;

        let plans = PlanDirectory::new(
            Arc::new(InMemoryPlanStore::new()),
            config.plans.capacity,
            Duration::from_secs(config.plans.ttl_secs),
        );
        let billing = BillingWebhook::new(
            config.billing.webhook_secret.clone(),
            config.billing.plan_ids.clone(),
            plans.clone(),
        );

        let parts = Collaborators {
            generator: Arc::new(generator),
            renderer: Arc::new(ManimRenderer::new(config.renderer.clone())),
            workspaces: WorkspaceRegistry::new(config.renderer.work_root.clone()),
            publisher: ArtifactPublisher::new(store, config.publisher),
            jobs: Arc::new(InMemoryJobLedger::new()),
            quota: Arc::new(InMemoryQuotaLedger::new(config.quota)),
            stats: Arc::new(InMemoryStatsLedger::new()),
            plans,
        };

        tracing::info!(
            "Service ready: model {}, renderer {} {}",
            config.generator.model,
            config.renderer.program,
            config.renderer.quality.flag()
        );
        Ok(Self::new(parts, Arc::new(identity), billing))
    }

    #[inline]
    #[must_use]
    pub fn orchestrator(&self) -> &GenerationOrchestrator {
        &self.orchestrator
    }

    /// Resolve an `Authorization` header value to an owner
    ///
    /// # Errors
    /// Returns `Auth` for a missing, malformed or unknown credential
    pub async fn authenticate(&self, authorization: Option<&str>) -> Result<OwnerId, PipelineError> {
        let token = bearer_token(authorization)?;
        Ok(self.identity.authenticate(token).await?)
    }

    /// Prompt-to-artifact generation
    pub async fn generate(&self, owner_id: &OwnerId, prompt: &str) -> GenerationOutcome {
        self.orchestrator.generate(owner_id, prompt).await
    }

    /// Render caller-supplied code as a new job
    pub async fn submit_code(&self, owner_id: &OwnerId, code: &str, title: &str) -> GenerationOutcome {
        self.orchestrator.submit_code(owner_id, code, title).await
    }

    /// Re-render edited code under an existing job id
    ///
    /// # Errors
    /// Returns `NotFound` (no quota consumed) if the job is not in the
    /// owner's partition
    pub async fn rerender(&self, owner_id: &OwnerId, job_id: &JobId, code: &str) -> Result<GenerationOutcome, PipelineError> {
        let job = self.jobs.get(owner_id, job_id).await?;
        Ok(self.orchestrator.rerender(owner_id, job_id, code, job.title()).await)
    }

    /// # Errors
    /// Returns `NotFound` for unknown or foreign jobs
    pub async fn get_job(&self, owner_id: &OwnerId, job_id: &JobId) -> Result<Job, PipelineError> {
        Ok(self.jobs.get(owner_id, job_id).await?)
    }

    /// Recent jobs, newest first
    ///
    /// # Errors
    /// Returns ledger backend errors
    pub async fn list_jobs(&self, owner_id: &OwnerId, limit: Option<usize>) -> Result<Vec<Job>, PipelineError> {
        Ok(self
            .jobs
            .list_by_owner(owner_id, limit.unwrap_or(DEFAULT_LIST_LIMIT))
            .await?)
    }

    /// Current source of a job
    ///
    /// # Errors
    /// Returns `NotFound` for unknown or foreign jobs
    pub async fn source(&self, owner_id: &OwnerId, job_id: &JobId) -> Result<String, PipelineError> {
        Ok(self.jobs.get(owner_id, job_id).await?.source_code().to_string())
    }

    /// Plan, today's consumption and aggregate stats; consumes nothing
    ///
    /// # Errors
    /// Returns ledger or plan store errors
    pub async fn usage(&self, owner_id: &OwnerId) -> Result<UsageSnapshot, PipelineError> {
        let plan = self.plans.tier_of(owner_id).await?;
        let limit = self.quota.limit_for(plan);
        let today = self.quota.today(owner_id).await?;
        let stats = self.stats.get(owner_id).await?;
        Ok(UsageSnapshot {
            plan,
            used_today: today.count,
            limit,
            remaining: limit.saturating_sub(today.count),
            stats,
        })
    }

    /// Verify and apply a billing provider event
    ///
    /// # Errors
    /// Returns `Billing` for bad signatures, payloads or store failures
    pub async fn handle_billing_webhook(&self, body: &[u8], signature: &str) -> Result<WebhookOutcome, PipelineError> {
        Ok(self.billing.handle(body, signature).await?)
    }
}
