//! Service configuration
//!
//! Loaded from TOML; secrets come from the environment only:
//! `OPENAI_API_KEY` for the model backend and `MOTION_WEBHOOK_SECRET` for
//! billing webhooks.

use crate::error::ConfigError;
use motion_codegen::GeneratorConfig;
use motion_ledger::{PlanTier, QuotaPolicy};
use motion_publish::{PublisherConfig, StorageConfig};
use motion_sandbox::RendererConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Environment variable holding the model backend key
pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
/// Environment variable holding the billing webhook secret
pub const ENV_WEBHOOK_SECRET: &str = "MOTION_WEBHOOK_SECRET";
/// Environment variable naming the config file
pub const ENV_CONFIG_PATH: &str = "MOTION_CONFIG";

/// Billing provider settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    /// Provider plan id -> tier
    pub plan_ids: HashMap<String, PlanTier>,
    /// Shared HMAC secret, from the environment
    #[serde(skip)]
    pub webhook_secret: Option<String>,
}

/// Static bearer-token identities for development deployments
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Bearer token -> owner id
    pub tokens: HashMap<String, String>,
}

/// Plan directory cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanCacheConfig {
    pub capacity: u64,
    pub ttl_secs: u64,
}

impl Default for PlanCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            ttl_secs: 300,
        }
    }
}

/// Complete service configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    pub generator: GeneratorConfig,
    pub renderer: RendererConfig,
    pub storage: StorageConfig,
    pub publisher: PublisherConfig,
    pub quota: QuotaPolicy,
    pub billing: BillingConfig,
    pub identity: IdentityConfig,
    pub plans: PlanCacheConfig,
}

impl MotionConfig {
    /// Create default config
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML without touching the environment
    ///
    /// # Errors
    /// Returns `Parse` on malformed TOML
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read a TOML file and apply environment secrets
    ///
    /// # Errors
    /// Returns `Read` or `Parse` on failure
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?.with_env();
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Fill secrets from the process environment
    #[must_use]
    pub fn with_env(self) -> Self {
        self.with_env_from(|name| std::env::var(name).ok())
    }

    /// Fill secrets from `lookup`; values already set are kept
    #[must_use]
    pub fn with_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if self.generator.api_key.is_none() {
            self.generator.api_key = lookup(ENV_API_KEY).filter(|v| !v.is_empty());
        }
        if self.billing.webhook_secret.is_none() {
            self.billing.webhook_secret = lookup(ENV_WEBHOOK_SECRET).filter(|v| !v.is_empty());
        }
        self
    }

    #[must_use]
    pub fn with_generator(mut self, generator: GeneratorConfig) -> Self {
        self.generator = generator;
        self
    }

    #[must_use]
    pub fn with_renderer(mut self, renderer: RendererConfig) -> Self {
        self.renderer = renderer;
        self
    }

    #[must_use]
    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }

    #[must_use]
    pub fn with_quota(mut self, quota: QuotaPolicy) -> Self {
        self.quota = quota;
        self
    }

    #[must_use]
    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.billing.webhook_secret = Some(secret.into());
        self
    }

    #[must_use]
    pub fn with_plan_id(mut self, plan_id: impl Into<String>, tier: PlanTier) -> Self {
        self.billing.plan_ids.insert(plan_id.into(), tier);
        self
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, owner_id: impl Into<String>) -> Self {
        self.identity.tokens.insert(token.into(), owner_id.into());
        self
    }

    /// Check values that would only fail later at runtime
    ///
    /// # Errors
    /// Returns `Invalid` naming the first offending field
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.renderer.program.trim().is_empty() {
            return invalid("renderer.program must not be empty");
        }
        if self.renderer.timeout_secs == 0 {
            return invalid("renderer.timeout_secs must be positive");
        }
        if self.renderer.max_output_bytes < 2 {
            return invalid("renderer.max_output_bytes must be at least 2");
        }
        if self.renderer.media_extension.trim().is_empty() {
            return invalid("renderer.media_extension must not be empty");
        }
        if self.generator.request_timeout_secs == 0 {
            return invalid("generator.request_timeout_secs must be positive");
        }
        if !(0.0..=2.0).contains(&self.generator.temperature) {
            return invalid("generator.temperature must be within 0.0..=2.0");
        }
        check_url("generator.base_url", &self.generator.base_url)?;
        match &self.storage {
            StorageConfig::Local {
                public_base_url, ..
            } => check_url("storage.public_base_url", public_base_url)?,
            StorageConfig::Http {
                upload_endpoint,
                public_base_url,
                timeout_secs,
                ..
            } => {
                check_url("storage.upload_endpoint", upload_endpoint)?;
                check_url("storage.public_base_url", public_base_url)?;
                if *timeout_secs == 0 {
                    return invalid("storage.timeout_secs must be positive");
                }
            }
        }
        if self.quota.free == 0 {
            return invalid("quota.free must be positive");
        }
        if self.plans.capacity == 0 || self.plans.ttl_secs == 0 {
            return invalid("plans.capacity and plans.ttl_secs must be positive");
        }
        Ok(())
    }
}

fn check_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let rest = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"));
    match rest {
        Some(host) if !host.is_empty() && !host.starts_with('/') && !host.contains(char::is_whitespace) => Ok(()),
        _ => Err(ConfigError::Invalid(format!(
            "{field} must be an http(s) URL, got {value:?}"
        ))),
    }
}
