//! Fundraising session
//!
//! Composes the registry, the orchestrator and the workflows for one
//! connected wallet. Every operation clears the [`StatusBoard`] first; a
//! failure is logged and stored as the single user-visible error. Nothing
//! is retried.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use cfund_config::{CfundConfig, ContractAddresses};
use cfund_keypair::WalletSigner;
use cfund_relayer::{Coprocessor, DEFAULT_DURATION_DAYS, EncryptionService, LocalEncryptionService};
use cfund_types::{Address, Campaign, CampaignId};
use log::error;
use tokio::sync::watch;

use crate::decryption::{DecryptKey, DecryptionOrchestrator};
use crate::donation::{DEFAULT_MAX_AMOUNT, DonationEncryptionPipeline, DonationReceipt};
use crate::error::FundraisingError;
use crate::ledger::{InMemoryLedger, Ledger, TxReceipt};
use crate::registry::CampaignRegistryCache;
use crate::workflows::{CampaignCreationWorkflow, CampaignForm, FaucetWorkflow};

pub const STATUS_CREATING: &str = "Creating campaign... waiting for confirmation";
pub const STATUS_CREATED: &str = "Campaign created successfully";
pub const STATUS_FAUCET: &str = "1 cETH credited to your wallet";
pub const STATUS_DONATED: &str = "Donation confirmed";

/// One status line and one error line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusBoard {
    pub status: Option<String>,
    pub error: Option<String>,
}

/// Tunables of a session
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub contracts: ContractAddresses,
    pub stale_time: Duration,
    pub duration_days: u64,
    pub max_amount: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            contracts: ContractAddresses::default(),
            stale_time: Duration::from_secs(10),
            duration_days: DEFAULT_DURATION_DAYS,
            max_amount: DEFAULT_MAX_AMOUNT,
        }
    }
}

impl SessionSettings {
    pub fn from_config(config: &CfundConfig) -> anyhow::Result<Self> {
        Ok(Self {
            contracts: config.contract_addresses()?,
            stale_time: config.stale_time(),
            duration_days: config.decryption.duration_days,
            max_amount: config.donation.max_amount,
        })
    }
}

pub struct FundraisingSession {
    signer: Arc<dyn WalletSigner>,
    registry: Arc<CampaignRegistryCache>,
    decryptions: Arc<DecryptionOrchestrator>,
    donations: DonationEncryptionPipeline,
    creation: CampaignCreationWorkflow,
    faucet: FaucetWorkflow,
    board: watch::Sender<StatusBoard>,
}

impl FundraisingSession {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        service: Arc<dyn EncryptionService>,
        signer: Arc<dyn WalletSigner>,
        settings: SessionSettings,
    ) -> Self {
        let registry = Arc::new(CampaignRegistryCache::new(
            ledger.clone(),
            settings.stale_time,
        ));
        let decryptions = Arc::new(DecryptionOrchestrator::new(
            service.clone(),
            signer.clone(),
            settings.contracts.fundraising,
            settings.duration_days,
        ));
        let donations = DonationEncryptionPipeline::new(
            ledger.clone(),
            service,
            signer.clone(),
            settings.contracts,
            registry.clone(),
            decryptions.clone(),
        )
        .with_max_amount(settings.max_amount);
        let creation = CampaignCreationWorkflow::new(ledger.clone(), signer.clone(), registry.clone());
        let faucet = FaucetWorkflow::new(ledger, signer.clone(), registry.clone());
        let (board, _) = watch::channel(StatusBoard::default());

        Self {
            signer,
            registry,
            decryptions,
            donations,
            creation,
            faucet,
            board,
        }
    }

    /// A session over the in-memory ledger and local encryption service.
    pub fn dev(signer: Arc<dyn WalletSigner>, settings: SessionSettings) -> (Self, Arc<InMemoryLedger>) {
        let coprocessor = Arc::new(Coprocessor::new());
        let ledger = Arc::new(InMemoryLedger::new(
            settings.contracts.fundraising,
            settings.contracts.token,
            coprocessor.clone(),
        ));
        let service = Arc::new(LocalEncryptionService::new(coprocessor));
        (Self::new(ledger.clone(), service, signer, settings), ledger)
    }

    pub fn viewer(&self) -> Option<Address> {
        self.signer.address()
    }

    pub fn registry(&self) -> &Arc<CampaignRegistryCache> {
        &self.registry
    }

    pub fn decryptions(&self) -> &Arc<DecryptionOrchestrator> {
        &self.decryptions
    }

    pub fn status(&self) -> StatusBoard {
        self.board.borrow().clone()
    }

    /// Notified on every status board change
    pub fn watch_status(&self) -> watch::Receiver<StatusBoard> {
        self.board.subscribe()
    }

    fn set_status(&self, status: &str) {
        self.board.send_modify(|b| b.status = Some(status.to_string()));
    }

    /// Clears the board, runs `op`, and reports its error at the boundary
    async fn run<T, F>(&self, operation: &str, op: F) -> Result<T, FundraisingError>
    where
        F: Future<Output = Result<T, FundraisingError>>,
    {
        self.board.send_replace(StatusBoard::default());
        let result = op.await;
        if let Err(e) = &result {
            error!("{} failed: {}", operation, e);
            self.board.send_modify(|b| {
                b.status = None;
                b.error = Some(e.to_string());
            });
        }
        result
    }

    pub async fn campaigns(&self) -> Result<Vec<Campaign>, FundraisingError> {
        self.run("Loading campaigns", self.registry.list(self.viewer()))
            .await
    }

    /// Drops cached campaign data and reloads it
    pub async fn refresh(&self) -> Result<Vec<Campaign>, FundraisingError> {
        self.registry.invalidate_all();
        self.campaigns().await
    }

    pub async fn create_campaign(
        &self,
        form: &mut CampaignForm,
    ) -> Result<TxReceipt, FundraisingError> {
        self.run("Creating campaign", async {
            self.set_status(STATUS_CREATING);
            let receipt = self.creation.submit(form).await?;
            self.set_status(STATUS_CREATED);
            Ok(receipt)
        })
        .await
    }

    pub async fn set_campaign_active(
        &self,
        id: CampaignId,
        active: bool,
    ) -> Result<TxReceipt, FundraisingError> {
        self.run("Updating campaign", self.creation.set_active(id, active))
            .await
    }

    pub async fn claim_faucet(&self) -> Result<TxReceipt, FundraisingError> {
        self.run("Claiming faucet", async {
            let receipt = self.faucet.claim().await?;
            self.set_status(STATUS_FAUCET);
            Ok(receipt)
        })
        .await
    }

    pub async fn donate(
        &self,
        campaign_id: CampaignId,
        amount: &str,
    ) -> Result<DonationReceipt, FundraisingError> {
        self.run("Donation", async {
            let campaign = self.registry.get(self.viewer(), campaign_id).await?;
            let receipt = self.donations.donate(&campaign, amount).await?;
            self.set_status(STATUS_DONATED);
            Ok(receipt)
        })
        .await
    }

    /// Decrypts a campaign's total raised. `Ok(None)` if already in flight.
    pub async fn decrypt_raised(
        &self,
        campaign_id: CampaignId,
    ) -> Result<Option<u64>, FundraisingError> {
        self.run("Decrypting total raised", async {
            let campaign = self.registry.get(self.viewer(), campaign_id).await?;
            self.decryptions
                .decrypt(DecryptKey::raised(campaign_id), campaign.raised_handle)
                .await
        })
        .await
    }

    /// Decrypts the viewer's points in a campaign. `Ok(None)` if already in flight.
    pub async fn decrypt_points(
        &self,
        campaign_id: CampaignId,
    ) -> Result<Option<u64>, FundraisingError> {
        self.run("Decrypting points", async {
            let viewer = self.viewer().ok_or(FundraisingError::WalletUnavailable)?;
            let campaign = self.registry.get(Some(viewer), campaign_id).await?;
            self.decryptions
                .decrypt(
                    DecryptKey::points(campaign_id),
                    campaign.handle_for(cfund_types::ValueKind::Points),
                )
                .await
        })
        .await
    }

    /// The wallet identity changed: nothing decrypted for the previous one
    /// may be shown.
    pub fn viewer_changed(&self) {
        self.decryptions.reset();
        self.registry.invalidate_all();
        self.board.send_replace(StatusBoard::default());
    }
}
