//! Aggregate usage statistics
//!
//! Monotonic per-owner totals, fed only by completed jobs.

use crate::clock::{Clock, SystemClock};
use crate::error::LedgerError;
use crate::ids::OwnerId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Per-owner render totals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateUsageStats {
    pub total_jobs: u64,
    /// Seconds
    pub total_render_time: f64,
    /// Seconds; `total_render_time / total_jobs`
    pub average_render_time: f64,
    pub last_updated: Option<DateTime<Utc>>,
}

impl AggregateUsageStats {
    fn record(&mut self, render_duration: f64, now: DateTime<Utc>) {
        self.total_jobs += 1;
        self.total_render_time += render_duration.max(0.0);
        #[allow(clippy::cast_precision_loss)]
        let jobs = self.total_jobs as f64;
        self.average_render_time = self.total_render_time / jobs;
        self.last_updated = Some(now);
    }
}

/// Aggregate statistics store
#[async_trait]
pub trait StatsLedger: Send + Sync {
    /// Fold one completed render into the owner's totals
    async fn record_completion(
        &self,
        owner_id: &OwnerId,
        render_duration: f64,
    ) -> Result<AggregateUsageStats, LedgerError>;

    /// Current totals (zeroed for unknown owners)
    async fn get(&self, owner_id: &OwnerId) -> Result<AggregateUsageStats, LedgerError>;
}

/// Stats ledger backed by a concurrent map
#[derive(Debug)]
pub struct InMemoryStatsLedger {
    stats: DashMap<OwnerId, AggregateUsageStats>,
    clock: Arc<dyn Clock>,
}

impl InMemoryStatsLedger {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    #[inline]
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            stats: DashMap::new(),
            clock,
        }
    }
}

impl Default for InMemoryStatsLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatsLedger for InMemoryStatsLedger {
    async fn record_completion(
        &self,
        owner_id: &OwnerId,
        render_duration: f64,
    ) -> Result<AggregateUsageStats, LedgerError> {
        if !render_duration.is_finite() {
            return Err(LedgerError::InvalidInput(format!(
                "render duration must be finite, got {render_duration}"
            )));
        }
        let now = self.clock.now();
        let mut entry = self.stats.entry(owner_id.clone()).or_default();
        entry.record(render_duration, now);
        Ok(entry.clone())
    }

    async fn get(&self, owner_id: &OwnerId) -> Result<AggregateUsageStats, LedgerError> {
        Ok(self
            .stats
            .get(owner_id)
            .map(|s| s.value().clone())
            .unwrap_or_default())
    }
}
