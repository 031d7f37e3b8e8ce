//! Campaign creation and faucet workflows

use std::sync::Arc;

use cfund_keypair::WalletSigner;
use cfund_types::CampaignId;
use log::info;

use crate::error::FundraisingError;
use crate::ledger::{FAUCET_GRANT, Ledger, TxReceipt, commit};
use crate::registry::CampaignRegistryCache;

/// Local form state for a new campaign. Cleared after a successful submit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CampaignForm {
    pub title: String,
    pub description: String,
    /// Decimal token amount, e.g. "1" or "2.5"
    pub goal: String,
}

impl CampaignForm {
    pub fn new(title: impl Into<String>, description: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            goal: goal.into(),
        }
    }

    /// Checked fields: (title, description, goal in base units)
    fn validate(&self) -> Result<(&str, &str, u64), FundraisingError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(FundraisingError::MissingField("Title"));
        }
        let description = self.description.trim();
        if description.is_empty() {
            return Err(FundraisingError::MissingField("Description"));
        }
        let goal = cfund_amount::parse(&self.goal)?;
        if goal == 0 {
            return Err(FundraisingError::ZeroAmount);
        }
        Ok((title, description, goal))
    }
}

pub struct CampaignCreationWorkflow {
    ledger: Arc<dyn Ledger>,
    signer: Arc<dyn WalletSigner>,
    registry: Arc<CampaignRegistryCache>,
}

impl CampaignCreationWorkflow {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        signer: Arc<dyn WalletSigner>,
        registry: Arc<CampaignRegistryCache>,
    ) -> Self {
        Self {
            ledger,
            signer,
            registry,
        }
    }

    pub async fn submit(&self, form: &mut CampaignForm) -> Result<TxReceipt, FundraisingError> {
        let (title, description, goal) = form.validate()?;
        let (title, description) = (title.to_owned(), description.to_owned());
        let creator = self.signer.address().ok_or(FundraisingError::WalletUnavailable)?;

        let ledger = self.ledger.clone();
        let registry = self.registry.clone();
        let receipt = commit(
            {
                let title = title.clone();
                async move {
                    ledger
                        .create_campaign(creator, &title, &description, goal)
                        .await
                }
            },
            move || registry.invalidate_all(),
        )
        .await?;

        info!("Campaign \"{}\" created in block {}", title, receipt.block_number);
        *form = CampaignForm::default();
        Ok(receipt)
    }

    /// Creator-only toggle of the `active` flag.
    pub async fn set_active(
        &self,
        id: CampaignId,
        active: bool,
    ) -> Result<TxReceipt, FundraisingError> {
        let caller = self.signer.address().ok_or(FundraisingError::WalletUnavailable)?;
        let ledger = self.ledger.clone();
        let registry = self.registry.clone();
        let receipt = commit(
            async move { ledger.set_campaign_active(caller, id, active).await },
            move || registry.invalidate_all(),
        )
        .await?;

        info!("Campaign {} active = {}", id, active);
        Ok(receipt)
    }
}

pub struct FaucetWorkflow {
    ledger: Arc<dyn Ledger>,
    signer: Arc<dyn WalletSigner>,
    registry: Arc<CampaignRegistryCache>,
}

impl FaucetWorkflow {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        signer: Arc<dyn WalletSigner>,
        registry: Arc<CampaignRegistryCache>,
    ) -> Self {
        Self {
            ledger,
            signer,
            registry,
        }
    }

    /// Credits [`FAUCET_GRANT`] to the connected wallet.
    pub async fn claim(&self) -> Result<TxReceipt, FundraisingError> {
        let to = self.signer.address().ok_or(FundraisingError::WalletUnavailable)?;
        let ledger = self.ledger.clone();
        let registry = self.registry.clone();
        let receipt = commit(
            async move { ledger.faucet(to).await },
            move || registry.invalidate_all(),
        )
        .await?;

        info!(
            "Faucet credited {} cETH to {}",
            cfund_amount::format(FAUCET_GRANT),
            to
        );
        Ok(receipt)
    }
}
