//! Campaign registry cache
//!
//! ```text
//! list(viewer)
//!   pass 1: campaigns()                          (ids)
//!   pass 2: campaign_raised(id)        for each   (concurrent)
//!   pass 3: user_points(id, viewer)    for each   (concurrent, viewer only)
//! ```
//!
//! Results are cached per viewer for `stale_time`. Writes invalidate
//! explicitly; a fetch that was in flight across an invalidation is
//! returned to its caller but not cached.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use cfund_types::{Address, Campaign, CampaignId};
use dashmap::DashMap;
use futures::future::try_join_all;
use log::debug;

use crate::error::FundraisingError;
use crate::ledger::Ledger;

struct CachedList {
    campaigns: Vec<Campaign>,
    fetched_at: Instant,
}

pub struct CampaignRegistryCache {
    ledger: Arc<dyn Ledger>,
    stale_time: Duration,
    lists: DashMap<Option<Address>, CachedList>,
    /// Bumped by every invalidation
    generation: AtomicU64,
}

impl CampaignRegistryCache {
    pub fn new(ledger: Arc<dyn Ledger>, stale_time: Duration) -> Self {
        Self {
            ledger,
            stale_time,
            lists: DashMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    /// Campaigns with their handles, most recent first.
    ///
    /// Points handles are only fetched when a viewer is given.
    pub async fn list(&self, viewer: Option<Address>) -> Result<Vec<Campaign>, FundraisingError> {
        if let Some(cached) = self.lists.get(&viewer) {
            if cached.fetched_at.elapsed() < self.stale_time {
                return Ok(cached.campaigns.clone());
            }
        }

        let generation = self.generation.load(Ordering::Acquire);
        let campaigns = self.fetch(viewer).await?;

        if self.generation.load(Ordering::Acquire) == generation {
            self.lists.insert(
                viewer,
                CachedList {
                    campaigns: campaigns.clone(),
                    fetched_at: Instant::now(),
                },
            );
        } else {
            debug!("Registry invalidated during fetch, result not cached");
        }
        Ok(campaigns)
    }

    /// A single campaign as seen by `viewer`
    pub async fn get(
        &self,
        viewer: Option<Address>,
        id: CampaignId,
    ) -> Result<Campaign, FundraisingError> {
        self.list(viewer)
            .await?
            .into_iter()
            .find(|c| c.id == id)
            .ok_or(FundraisingError::CampaignNotFound(id))
    }

    async fn fetch(&self, viewer: Option<Address>) -> Result<Vec<Campaign>, FundraisingError> {
        let records = self.ledger.campaigns().await?;

        let mut seen = HashSet::with_capacity(records.len());
        if let Some(dup) = records.iter().find(|r| !seen.insert(r.id)) {
            return Err(FundraisingError::MalformedLedgerResponse(format!(
                "campaign id {} listed twice",
                dup.id
            )));
        }

        let raised = try_join_all(records.iter().map(|r| self.ledger.campaign_raised(r.id))).await?;

        let points = match viewer {
            Some(user) => Some(
                try_join_all(records.iter().map(|r| self.ledger.user_points(r.id, user))).await?,
            ),
            None => None,
        };

        let mut campaigns: Vec<Campaign> = records
            .into_iter()
            .zip(raised)
            .enumerate()
            .map(|(i, (record, raised_handle))| {
                let points_handle = points.as_ref().map(|p| p[i]);
                Campaign::from_record(record, raised_handle, points_handle)
            })
            .collect();

        sort_for_display(&mut campaigns);
        debug!("Fetched {} campaign(s)", campaigns.len());
        Ok(campaigns)
    }

    /// Drops the cached list of one viewer
    pub fn invalidate(&self, viewer: Option<Address>) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.lists.remove(&viewer);
    }

    /// Drops every cached list
    pub fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.lists.clear();
    }

    pub fn is_cached(&self, viewer: Option<Address>) -> bool {
        self.lists
            .get(&viewer)
            .map(|cached| cached.fetched_at.elapsed() < self.stale_time)
            .unwrap_or(false)
    }
}

/// Descending id, most recent first
pub fn sort_for_display(campaigns: &mut [Campaign]) {
    campaigns.sort_by(|a, b| b.id.cmp(&a.id));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LedgerError, TxReceipt};
    use async_trait::async_trait;
    use cfund_types::{CampaignRecord, CiphertextHandle, EncryptedInput, ZERO_HANDLE};
    use std::sync::atomic::AtomicUsize;

    /// Serves a fixed campaign list in scrambled order and counts reads.
    struct FixedLedger {
        records: Vec<CampaignRecord>,
        list_calls: AtomicUsize,
        points_calls: AtomicUsize,
    }

    impl FixedLedger {
        fn with_ids(ids: &[CampaignId]) -> Self {
            Self {
                records: ids
                    .iter()
                    .map(|&id| CampaignRecord {
                        id,
                        title: format!("campaign {id}"),
                        description: String::new(),
                        goal: 1,
                        creator: Address([1u8; 32]),
                        active: true,
                    })
                    .collect(),
                list_calls: AtomicUsize::new(0),
                points_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Ledger for FixedLedger {
        async fn campaigns(&self) -> Result<Vec<CampaignRecord>, LedgerError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.records.clone())
        }
        async fn campaign_raised(&self, id: CampaignId) -> Result<CiphertextHandle, LedgerError> {
            Ok(CiphertextHandle([id as u8 + 1; 32]))
        }
        async fn user_points(
            &self,
            id: CampaignId,
            _user: Address,
        ) -> Result<CiphertextHandle, LedgerError> {
            self.points_calls.fetch_add(1, Ordering::SeqCst);
            Ok(if id % 2 == 0 { ZERO_HANDLE } else { CiphertextHandle([0x50; 32]) })
        }
        async fn confidential_balance(&self, _: Address) -> Result<CiphertextHandle, LedgerError> {
            Ok(ZERO_HANDLE)
        }
        async fn create_campaign(
            &self,
            _: Address,
            _: &str,
            _: &str,
            _: u64,
        ) -> Result<TxReceipt, LedgerError> {
            unimplemented!()
        }
        async fn set_campaign_active(
            &self,
            _: Address,
            _: CampaignId,
            _: bool,
        ) -> Result<TxReceipt, LedgerError> {
            unimplemented!()
        }
        async fn confidential_transfer_and_call(
            &self,
            _: Address,
            _: Address,
            _: EncryptedInput,
            _: Vec<u8>,
        ) -> Result<TxReceipt, LedgerError> {
            unimplemented!()
        }
        async fn faucet(&self, _: Address) -> Result<TxReceipt, LedgerError> {
            unimplemented!()
        }
    }

    fn registry(ledger: Arc<FixedLedger>) -> CampaignRegistryCache {
        CampaignRegistryCache::new(ledger, Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_list_sorted_descending() {
        let registry = registry(Arc::new(FixedLedger::with_ids(&[2, 7, 0, 5, 3])));
        let ids: Vec<CampaignId> = registry
            .list(None)
            .await
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![7, 5, 3, 2, 0]);
    }

    #[tokio::test]
    async fn test_handles_follow_their_campaign() {
        let registry = registry(Arc::new(FixedLedger::with_ids(&[1, 0])));
        let campaigns = registry.list(Some(Address([9u8; 32]))).await.unwrap();

        assert_eq!(campaigns[0].id, 1);
        assert_eq!(campaigns[0].raised_handle, CiphertextHandle([2u8; 32]));
        assert_eq!(campaigns[0].user_points_handle, Some(CiphertextHandle([0x50; 32])));
        assert_eq!(campaigns[1].user_points_handle, Some(ZERO_HANDLE));
    }

    #[tokio::test]
    async fn test_points_pass_skipped_without_viewer() {
        let ledger = Arc::new(FixedLedger::with_ids(&[0, 1, 2]));
        let registry = registry(ledger.clone());
        let campaigns = registry.list(None).await.unwrap();

        assert!(campaigns.iter().all(|c| c.user_points_handle.is_none()));
        assert_eq!(ledger.points_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cache_and_invalidate() {
        let ledger = Arc::new(FixedLedger::with_ids(&[0]));
        let registry = registry(ledger.clone());
        let viewer = Some(Address([9u8; 32]));

        registry.list(viewer).await.unwrap();
        registry.list(viewer).await.unwrap();
        assert_eq!(ledger.list_calls.load(Ordering::SeqCst), 1);
        assert!(registry.is_cached(viewer));
        assert!(!registry.is_cached(None));

        registry.invalidate(viewer);
        assert!(!registry.is_cached(viewer));
        registry.list(viewer).await.unwrap();
        assert_eq!(ledger.list_calls.load(Ordering::SeqCst), 2);

        registry.invalidate_all();
        registry.list(viewer).await.unwrap();
        assert_eq!(ledger.list_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_stale_entries_refetch() {
        let ledger = Arc::new(FixedLedger::with_ids(&[0]));
        let registry = CampaignRegistryCache::new(ledger.clone(), Duration::ZERO);

        registry.list(None).await.unwrap();
        registry.list(None).await.unwrap();
        assert_eq!(ledger.list_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_duplicate_ids_rejected() {
        let registry = registry(Arc::new(FixedLedger::with_ids(&[1, 1])));
        assert!(matches!(
            registry.list(None).await,
            Err(FundraisingError::MalformedLedgerResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_get_unknown_campaign() {
        let registry = registry(Arc::new(FixedLedger::with_ids(&[0])));
        assert_eq!(
            registry.get(None, 4).await,
            Err(FundraisingError::CampaignNotFound(4))
        );
    }
}
