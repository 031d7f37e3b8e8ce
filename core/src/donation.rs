//! Donation encryption pipeline
//!
//! ```text
//! 1. campaign active?                 local
//! 2. parse amount, > 0, <= max        local, before any encryption
//! 3. encrypt_input(token, sender)     encryption service
//! 4. payload = campaign id            32-byte big-endian word
//! 5. transfer_and_call(fundraising)   ledger, waits for finality
//! 6. invalidate decrypt + registry    only after 5 succeeded, even if
//!                                     the caller stopped waiting
//! ```

use std::sync::Arc;

use cfund_config::ContractAddresses;
use cfund_keypair::WalletSigner;
use cfund_relayer::{EncryptionService, ServiceStatus};
use cfund_types::{Campaign, CampaignId, encode_campaign_payload};
use log::info;

use crate::decryption::DecryptionOrchestrator;
use crate::error::FundraisingError;
use crate::ledger::{Ledger, LedgerError, RevertReason, TxReceipt, commit};
use crate::registry::CampaignRegistryCache;

/// Widest integer that survives the numeric path into an encrypted input
pub const DEFAULT_MAX_AMOUNT: u64 = (1 << 53) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DonationReceipt {
    pub campaign_id: CampaignId,
    /// Base units submitted
    pub amount: u64,
    pub receipt: TxReceipt,
}

pub struct DonationEncryptionPipeline {
    ledger: Arc<dyn Ledger>,
    service: Arc<dyn EncryptionService>,
    signer: Arc<dyn WalletSigner>,
    contracts: ContractAddresses,
    max_amount: u64,
    registry: Arc<CampaignRegistryCache>,
    decryptions: Arc<DecryptionOrchestrator>,
}

impl DonationEncryptionPipeline {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        service: Arc<dyn EncryptionService>,
        signer: Arc<dyn WalletSigner>,
        contracts: ContractAddresses,
        registry: Arc<CampaignRegistryCache>,
        decryptions: Arc<DecryptionOrchestrator>,
    ) -> Self {
        Self {
            ledger,
            service,
            signer,
            contracts,
            max_amount: DEFAULT_MAX_AMOUNT,
            registry,
            decryptions,
        }
    }

    pub fn with_max_amount(mut self, max_amount: u64) -> Self {
        self.max_amount = max_amount;
        self
    }

    /// Validates `amount` without touching the network.
    pub fn validate(&self, campaign: &Campaign, amount: &str) -> Result<u64, FundraisingError> {
        if !campaign.active {
            return Err(FundraisingError::CampaignInactive(campaign.id));
        }
        let units = cfund_amount::parse(amount)?;
        if units == 0 {
            return Err(FundraisingError::ZeroAmount);
        }
        if units > self.max_amount {
            return Err(FundraisingError::AmountTooLarge);
        }
        Ok(units)
    }

    /// Encrypts and submits a donation, returning once it is final.
    pub async fn donate(
        &self,
        campaign: &Campaign,
        amount: &str,
    ) -> Result<DonationReceipt, FundraisingError> {
        let units = self.validate(campaign, amount)?;

        let sender = self.signer.address().ok_or(FundraisingError::WalletUnavailable)?;
        if self.service.status() != ServiceStatus::Ready {
            return Err(FundraisingError::EncryptionServiceUnavailable(
                "encryption service is still initializing".into(),
            ));
        }

        let input = self
            .service
            .encrypt_input(self.contracts.token, sender, units)
            .await
            .map_err(|e| FundraisingError::EncryptionServiceUnavailable(e.to_string()))?;

        let payload = encode_campaign_payload(campaign.id);
        let ledger = self.ledger.clone();
        let fundraising = self.contracts.fundraising;
        let decryptions = self.decryptions.clone();
        let registry = self.registry.clone();
        let campaign_id = campaign.id;
        let receipt = commit(
            async move {
                ledger
                    .confidential_transfer_and_call(sender, fundraising, input, payload)
                    .await
            },
            // Final on the ledger; cached views of this campaign are now wrong
            move || {
                decryptions.invalidate(campaign_id);
                registry.invalidate_all();
            },
        )
        .await
        .map_err(|e| match e {
            LedgerError::Reverted(RevertReason::Unauthorized(caller)) => {
                FundraisingError::Unauthorized(caller)
            }
            other => FundraisingError::TransactionFailure(other.to_string()),
        })?;

        info!(
            "Donated {} to campaign {} in block {}",
            cfund_amount::format(units),
            campaign.id,
            receipt.block_number
        );
        Ok(DonationReceipt {
            campaign_id: campaign.id,
            amount: units,
            receipt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;
    use cfund_keypair::Keypair;
    use cfund_relayer::{Coprocessor, LocalEncryptionService};
    use cfund_types::{Address, ZERO_HANDLE};
    use std::time::Duration;

    fn campaign(active: bool) -> Campaign {
        Campaign {
            id: 0,
            title: "t".into(),
            description: "d".into(),
            goal: 1,
            creator: Address([1u8; 32]),
            active,
            raised_handle: ZERO_HANDLE,
            user_points_handle: None,
        }
    }

    fn pipeline() -> DonationEncryptionPipeline {
        let contracts = ContractAddresses::default();
        let copro = Arc::new(Coprocessor::new());
        let ledger: Arc<dyn Ledger> = Arc::new(InMemoryLedger::new(
            contracts.fundraising,
            contracts.token,
            copro.clone(),
        ));
        let service: Arc<dyn EncryptionService> = Arc::new(LocalEncryptionService::new(copro));
        let signer: Arc<dyn WalletSigner> = Arc::new(Keypair::new_random());
        let registry = Arc::new(CampaignRegistryCache::new(
            ledger.clone(),
            Duration::from_secs(10),
        ));
        let decryptions = Arc::new(DecryptionOrchestrator::new(
            service.clone(),
            signer.clone(),
            contracts.fundraising,
            10,
        ));
        DonationEncryptionPipeline::new(ledger, service, signer, contracts, registry, decryptions)
    }

    #[test]
    fn test_validate() {
        let p = pipeline();
        assert_eq!(p.validate(&campaign(true), "2.5"), Ok(2_500_000));
        assert_eq!(p.validate(&campaign(true), "0"), Err(FundraisingError::ZeroAmount));
        assert_eq!(p.validate(&campaign(true), ""), Err(FundraisingError::ZeroAmount));
        assert_eq!(
            p.validate(&campaign(true), "1.2345678"),
            Err(FundraisingError::InvalidFormat)
        );
        assert_eq!(
            p.validate(&campaign(false), "1"),
            Err(FundraisingError::CampaignInactive(0))
        );
    }

    #[test]
    fn test_max_amount_boundary() {
        let p = pipeline();
        // 2^53 - 1 base units
        assert_eq!(
            p.validate(&campaign(true), "9007199254.740991"),
            Ok(DEFAULT_MAX_AMOUNT)
        );
        assert_eq!(
            p.validate(&campaign(true), "9007199254.740992"),
            Err(FundraisingError::AmountTooLarge)
        );

        let tight = pipeline().with_max_amount(100);
        assert_eq!(
            tight.validate(&campaign(true), "0.000101"),
            Err(FundraisingError::AmountTooLarge)
        );
    }
}
