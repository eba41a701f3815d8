//! PromptMotion core
//!
//! Turns a text prompt into a published animation:
//! - [`GenerationOrchestrator`] sequences admission, code generation,
//!   sandboxed rendering, publishing and bookkeeping
//! - [`MotionService`] is the facade transports call into
//! - [`BillingWebhook`] applies verified plan changes
//!
//! Collaborators are constructed once (see [`MotionService::from_config`])
//! and passed in explicitly; nothing here reaches for process-wide state.

#![warn(unreachable_pub)]

pub mod billing;
pub mod config;
pub mod error;
pub mod identity;
pub mod orchestrator;
pub mod outcome;
pub mod plans;
pub mod service;

pub use billing::{parse_event, sign_payload, verify_signature, BillingEvent, BillingWebhook, WebhookOutcome};
pub use config::{BillingConfig, IdentityConfig, MotionConfig, PlanCacheConfig};
pub use error::{AuthError, BillingError, ConfigError, PipelineError, Stage};
pub use identity::{bearer_token, IdentityProvider, StaticTokenIdentity};
pub use orchestrator::{Collaborators, GenerationOrchestrator};
pub use outcome::{GenerationOutcome, UsageSnapshot};
pub use plans::{InMemoryPlanStore, PlanDirectory, PlanStore};
pub use service::MotionService;
