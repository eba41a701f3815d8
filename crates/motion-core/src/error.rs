//! Error types for the generation service
//!
//! Each collaborator crate owns its error enum; [`PipelineError`] folds them
//! together for the orchestrator and service facade. Failures inside a
//! pipeline run are turned into a [`crate::GenerationOutcome`] and never
//! escape as errors.

use motion_codegen::GenerationError;
use motion_ledger::{IdError, LedgerError};
use motion_publish::{PublishError, StoreError};
use motion_sandbox::RenderError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline step a failure is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Admission,
    Generation,
    Record,
    Execution,
    Publish,
    Finalize,
}

impl Stage {
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admission => "admission",
            Self::Generation => "generation",
            Self::Record => "record",
            Self::Execution => "execution",
            Self::Publish => "publish",
            Self::Finalize => "finalize",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity boundary failure
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing bearer credential")]
    MissingCredential,

    #[error("malformed authorization header")]
    MalformedHeader,

    #[error("invalid credential")]
    InvalidCredential,

    #[error("identity provider returned an invalid owner id: {0}")]
    InvalidOwner(#[from] IdError),
}

/// Billing webhook failure
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("webhook secret is not configured")]
    MissingSecret,

    #[error("webhook signature mismatch")]
    InvalidSignature,

    #[error("malformed webhook payload: {0}")]
    MalformedPayload(String),

    #[error("webhook event carries no owner id")]
    MissingOwner,

    #[error("webhook owner id is invalid: {0}")]
    InvalidOwner(#[from] IdError),

    #[error("plan store error: {0}")]
    Store(#[from] LedgerError),
}

/// Configuration failure
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("failed to build {component}: {reason}")]
    Build { component: &'static str, reason: String },
}

/// Any failure surfaced by the service
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("render failed: {0}")]
    Render(#[from] RenderError),

    #[error("publish failed: {0}")]
    Publish(#[from] PublishError),

    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("billing error: {0}")]
    Billing(#[from] BillingError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}

impl From<StoreError> for PipelineError {
    fn from(e: StoreError) -> Self {
        Self::Publish(PublishError::Store(e))
    }
}

impl PipelineError {
    /// Default stage for this failure
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            Self::Generation(_) => Stage::Generation,
            Self::Render(_) => Stage::Execution,
            Self::Publish(_) => Stage::Publish,
            Self::Auth(_) | Self::Billing(_) | Self::Config(_) | Self::InvalidId(_) => Stage::Admission,
            Self::Ledger(_) => Stage::Record,
        }
    }

    /// Check if resubmitting may succeed
    ///
    /// Render failures are not retryable: the usual cause is a defect in
    /// the generated code.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Generation(e) => e.is_retryable(),
            Self::Publish(e) => e.is_retryable(),
            Self::Render(RenderError::Busy(_)) => true,
            Self::Ledger(LedgerError::Backend(_)) => true,
            _ => false,
        }
    }

    /// Check if this is a not-found lookup
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Ledger(e) if e.is_not_found())
    }

    /// Detail worth persisting on the job record
    #[must_use]
    pub fn diagnostic(&self) -> String {
        match self {
            Self::Render(e) => e.diagnostic(),
            other => other.to_string(),
        }
    }
}
