//! Plan directory
//!
//! Owner -> plan tier lookups, served from a bounded TTL cache in front of
//! the plan store. Plan changes write through the store and then cache the
//! new tier, so the next admission check sees the new limit. A change bumps
//! the directory epoch; a load that straddles a change never leaves its
//! result in the cache.

use async_trait::async_trait;
use dashmap::DashMap;
use moka::future::Cache;
use motion_ledger::{LedgerError, OwnerId, PlanTier};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Durable owner -> tier mapping
#[async_trait]
pub trait PlanStore: Send + Sync {
    /// Current tier, `Free` for owners never seen
    async fn tier(&self, owner_id: &OwnerId) -> Result<PlanTier, LedgerError>;

    async fn set_tier(&self, owner_id: &OwnerId, tier: PlanTier) -> Result<(), LedgerError>;
}

/// Plan store backed by a concurrent map
#[derive(Debug, Default)]
pub struct InMemoryPlanStore {
    tiers: DashMap<OwnerId, PlanTier>,
}

impl InMemoryPlanStore {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlanStore for InMemoryPlanStore {
    async fn tier(&self, owner_id: &OwnerId) -> Result<PlanTier, LedgerError> {
        Ok(self.tiers.get(owner_id).map(|t| *t).unwrap_or_default())
    }

    async fn set_tier(&self, owner_id: &OwnerId, tier: PlanTier) -> Result<(), LedgerError> {
        self.tiers.insert(owner_id.clone(), tier);
        Ok(())
    }
}

/// Cached plan lookups
#[derive(Clone)]
pub struct PlanDirectory {
    store: Arc<dyn PlanStore>,
    cache: Cache<OwnerId, PlanTier>,
    epoch: Arc<AtomicU64>,
}

impl std::fmt::Debug for PlanDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanDirectory")
            .field("cached", &self.cache.entry_count())
            .finish_non_exhaustive()
    }
}

impl PlanDirectory {
    /// Create directory with cache capacity and time-to-live
    #[must_use]
    pub fn new(store: Arc<dyn PlanStore>, capacity: u64, ttl: Duration) -> Self {
        Self {
            store,
            cache: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Tier of `owner_id`
    ///
    /// # Errors
    /// Returns the store error on a cache miss that fails to load
    pub async fn tier_of(&self, owner_id: &OwnerId) -> Result<PlanTier, LedgerError> {
        if let Some(tier) = self.cache.get(owner_id).await {
            return Ok(tier);
        }
        let started = self.epoch.load(Ordering::Acquire);
        let tier = self.store.tier(owner_id).await?;
        if self.epoch.load(Ordering::Acquire) != started {
            // a plan changed mid-load; the value read may predate it
            return self.store.tier(owner_id).await;
        }
        self.cache.insert(owner_id.clone(), tier).await;
        if self.epoch.load(Ordering::Acquire) != started {
            self.cache.invalidate(owner_id).await;
        }
        Ok(tier)
    }

    /// Persist a plan change and cache the new tier
    ///
    /// # Errors
    /// Returns the store error; the cache entry is dropped in that case
    pub async fn set_tier(&self, owner_id: &OwnerId, tier: PlanTier) -> Result<(), LedgerError> {
        let result = self.store.set_tier(owner_id, tier).await;
        self.epoch.fetch_add(1, Ordering::AcqRel);
        match result {
            Ok(()) => {
                self.cache.insert(owner_id.clone(), tier).await;
                tracing::info!("Plan for {} set to {}", owner_id, tier);
                Ok(())
            }
            Err(e) => {
                self.cache.invalidate(owner_id).await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    #[derive(Default)]
    struct CountingStore {
        inner: InMemoryPlanStore,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl PlanStore for CountingStore {
        async fn tier(&self, owner_id: &OwnerId) -> Result<PlanTier, LedgerError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.tier(owner_id).await
        }

        async fn set_tier(&self, owner_id: &OwnerId, tier: PlanTier) -> Result<(), LedgerError> {
            self.inner.set_tier(owner_id, tier).await
        }
    }

    #[tokio::test]
    async fn unknown_owner_is_free() {
        let directory = PlanDirectory::new(Arc::new(InMemoryPlanStore::new()), 10, Duration::from_secs(60));
        let tier = directory.tier_of(&OwnerId::parse("new").unwrap()).await.unwrap();
        assert_eq!(tier, PlanTier::Free);
    }

    #[tokio::test]
    async fn lookups_are_cached_until_plan_change() {
        let store = Arc::new(CountingStore::default());
        let directory = PlanDirectory::new(store.clone(), 10, Duration::from_secs(60));
        let alice = OwnerId::parse("alice").unwrap();

        directory.tier_of(&alice).await.unwrap();
        directory.tier_of(&alice).await.unwrap();
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);

        directory.set_tier(&alice, PlanTier::Pro).await.unwrap();
        assert_eq!(directory.tier_of(&alice).await.unwrap(), PlanTier::Pro);
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);
    }

    /// Store whose first read returns, then stalls before handing back the value
    #[derive(Default)]
    struct StallingStore {
        inner: InMemoryPlanStore,
        stalled: AtomicBool,
    }

    #[async_trait]
    impl PlanStore for StallingStore {
        async fn tier(&self, owner_id: &OwnerId) -> Result<PlanTier, LedgerError> {
            let tier = self.inner.tier(owner_id).await?;
            if !self.stalled.swap(true, Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            Ok(tier)
        }

        async fn set_tier(&self, owner_id: &OwnerId, tier: PlanTier) -> Result<(), LedgerError> {
            self.inner.set_tier(owner_id, tier).await
        }
    }

    #[tokio::test]
    async fn upgrade_during_slow_lookup_is_not_overwritten() {
        let directory = PlanDirectory::new(Arc::new(StallingStore::default()), 10, Duration::from_secs(60));
        let alice = OwnerId::parse("alice").unwrap();

        let lookup = tokio::spawn({
            let directory = directory.clone();
            let alice = alice.clone();
            async move { directory.tier_of(&alice).await.unwrap() }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        directory.set_tier(&alice, PlanTier::Pro).await.unwrap();

        assert_eq!(lookup.await.unwrap(), PlanTier::Pro);
        assert_eq!(directory.tier_of(&alice).await.unwrap(), PlanTier::Pro);
    }
}
