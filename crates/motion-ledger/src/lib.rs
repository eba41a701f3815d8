//! Ledgers for the generation pipeline
//!
//! Durable bookkeeping shared by every request:
//! - Job Ledger: per-job state, scoped to the owning user
//! - Quota Ledger: per-owner, per-day admission counter
//! - Stats Ledger: aggregate render statistics, updated on completion only
//!
//! All mutation goes through the narrow traits defined here. The in-memory
//! implementations are the reference behaviour; a database-backed store must
//! honour the same atomicity guarantees.

#![warn(unreachable_pub)]

pub mod clock;
pub mod error;
pub mod ids;
pub mod job;
pub mod jobs;
pub mod quota;
pub mod stats;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::LedgerError;
pub use ids::{IdError, JobId, OwnerId};
pub use job::{derive_title, validate_transition, Job, JobStatus, MAX_TITLE_CHARS};
pub use jobs::{InMemoryJobLedger, JobLedger, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};
pub use quota::{Admission, InMemoryQuotaLedger, PlanTier, QuotaLedger, QuotaPolicy, UsageRecord};
pub use stats::{AggregateUsageStats, InMemoryStatsLedger, StatsLedger};
