//! Quota Ledger
//!
//! Counts generations per `(owner, calendar day)` against a limit derived
//! from the owner's plan tier at check time. Consumption happens at
//! admission, independent of how the job ends.
//!
//! The test-and-increment runs under the map entry's write lock, so two
//! concurrent admissions for the same owner-day are serialized.

use crate::clock::{Clock, SystemClock};
use crate::error::LedgerError;
use crate::ids::OwnerId;
use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Subscription level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    #[default]
    Free,
    Plus,
    Pro,
}

impl PlanTier {
    /// Parse a tier name, falling back to `Free` for anything unknown
    #[must_use]
    pub fn from_name_lenient(name: &str) -> Self {
        name.parse().unwrap_or_else(|_| {
            tracing::debug!("Unknown plan tier {:?}, using free", name);
            Self::Free
        })
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Plus => "plus",
            Self::Pro => "pro",
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanTier {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "plus" => Ok(Self::Plus),
            "pro" => Ok(Self::Pro),
            other => Err(LedgerError::InvalidInput(format!("unknown plan tier: {other}"))),
        }
    }
}

/// Daily limit per tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaPolicy {
    pub free: u32,
    pub plus: u32,
    pub pro: u32,
}

impl QuotaPolicy {
    /// Daily limit for `tier`
    #[inline]
    #[must_use]
    pub fn limit_for(&self, tier: PlanTier) -> u32 {
        match tier {
            PlanTier::Free => self.free,
            PlanTier::Plus => self.plus,
            PlanTier::Pro => self.pro,
        }
    }
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            free: 5,
            plus: 25,
            pro: 60,
        }
    }
}

/// Admission decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "lowercase")]
pub enum Admission {
    /// Slot consumed; `used` includes this request
    Allowed { used: u32, limit: u32 },
    /// Nothing consumed
    Denied { used: u32, limit: u32 },
}

impl Admission {
    #[inline]
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    #[inline]
    #[must_use]
    pub fn used(&self) -> u32 {
        match self {
            Self::Allowed { used, .. } | Self::Denied { used, .. } => *used,
        }
    }

    #[inline]
    #[must_use]
    pub fn limit(&self) -> u32 {
        match self {
            Self::Allowed { limit, .. } | Self::Denied { limit, .. } => *limit,
        }
    }
}

/// Consumption for one owner on one day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub owner_id: OwnerId,
    pub day: NaiveDate,
    pub count: u32,
}

/// Per-owner daily admission counter
#[async_trait]
pub trait QuotaLedger: Send + Sync {
    /// Atomically test today's count against the tier limit and consume a slot
    async fn check_and_consume(&self, owner_id: &OwnerId, tier: PlanTier) -> Result<Admission, LedgerError>;

    /// Today's record without consuming anything
    async fn today(&self, owner_id: &OwnerId) -> Result<UsageRecord, LedgerError>;

    /// Limit applied to `tier`
    fn limit_for(&self, tier: PlanTier) -> u32;
}

/// Quota ledger backed by a concurrent map keyed by `(owner, day)`
#[derive(Debug)]
pub struct InMemoryQuotaLedger {
    policy: QuotaPolicy,
    clock: Arc<dyn Clock>,
    counts: DashMap<(OwnerId, NaiveDate), u32>,
    /// Day of the last prune; earlier days are dropped when it changes
    current_day: Mutex<Option<NaiveDate>>,
}

impl InMemoryQuotaLedger {
    /// Create ledger on the wall clock
    #[inline]
    #[must_use]
    pub fn new(policy: QuotaPolicy) -> Self {
        Self::with_clock(policy, Arc::new(SystemClock))
    }

    #[inline]
    #[must_use]
    pub fn with_clock(policy: QuotaPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            clock,
            counts: DashMap::new(),
            current_day: Mutex::new(None),
        }
    }

    /// Number of `(owner, day)` counters held
    #[inline]
    #[must_use]
    pub fn tracked_entries(&self) -> usize {
        self.counts.len()
    }

    /// Drop counters of past days, once per day change
    fn prune_before(&self, today: NaiveDate) {
        {
            let mut current = self.current_day.lock();
            if *current == Some(today) {
                return;
            }
            *current = Some(today);
        }
        let before = self.counts.len();
        self.counts.retain(|(_, day), _| *day >= today);
        let removed = before.saturating_sub(self.counts.len());
        if removed > 0 {
            tracing::debug!("Pruned {} quota counters before {}", removed, today);
        }
    }

    /// Applied policy
    #[inline]
    #[must_use]
    pub fn policy(&self) -> &QuotaPolicy {
        &self.policy
    }
}

#[async_trait]
impl QuotaLedger for InMemoryQuotaLedger {
    async fn check_and_consume(&self, owner_id: &OwnerId, tier: PlanTier) -> Result<Admission, LedgerError> {
        let limit = self.policy.limit_for(tier);
        let day = self.clock.today();
        self.prune_before(day);

        // entry() holds the shard write lock until `count` drops
        let mut count = self.counts.entry((owner_id.clone(), day)).or_insert(0);
        let admission = if *count >= limit {
            Admission::Denied { used: *count, limit }
        } else {
            *count += 1;
            Admission::Allowed { used: *count, limit }
        };
        drop(count);

        tracing::debug!(
            "Admission for {} on {} ({}): {:?}",
            owner_id,
            day,
            tier,
            admission
        );
        Ok(admission)
    }

    async fn today(&self, owner_id: &OwnerId) -> Result<UsageRecord, LedgerError> {
        let day = self.clock.today();
        let count = self
            .counts
            .get(&(owner_id.clone(), day))
            .map(|c| *c)
            .unwrap_or(0);
        Ok(UsageRecord {
            owner_id: owner_id.clone(),
            day,
            count,
        })
    }

    fn limit_for(&self, tier: PlanTier) -> u32 {
        self.policy.limit_for(tier)
    }
}
