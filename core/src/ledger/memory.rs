//! In-memory development ledger
//!
//! Reproduces the fundraising and confidential token contracts on top of a
//! [`Coprocessor`]. Every write is final on return; an optional block time
//! delays that return to simulate confirmation latency.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cfund_relayer::{Coprocessor, RelayerError};
use cfund_types::{
    Address, CampaignId, CampaignRecord, CiphertextHandle, EncryptedInput, ZERO_HANDLE,
    decode_campaign_payload,
};
use log::debug;
use rand::RngCore;
use tokio::sync::Mutex;

use super::{FAUCET_GRANT, Ledger, LedgerError, POINTS_DIVISOR, RevertReason, TxReceipt};

#[derive(Default)]
struct LedgerState {
    campaigns: Vec<CampaignRecord>,
    raised: HashMap<CampaignId, CiphertextHandle>,
    points: HashMap<(CampaignId, Address), CiphertextHandle>,
    balances: HashMap<Address, CiphertextHandle>,
    block_number: u64,
}

impl LedgerState {
    fn campaign(&self, id: CampaignId) -> Result<&CampaignRecord, LedgerError> {
        usize::try_from(id)
            .ok()
            .and_then(|idx| self.campaigns.get(idx))
            .ok_or(LedgerError::Reverted(RevertReason::CampaignNotFound(id)))
    }

    fn seal_block(&mut self) -> TxReceipt {
        self.block_number += 1;
        let mut tx_hash = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut tx_hash);
        TxReceipt {
            tx_hash,
            block_number: self.block_number,
        }
    }
}

fn coprocessor_revert(e: RelayerError) -> LedgerError {
    LedgerError::Reverted(RevertReason::Other(e.to_string()))
}

/// Fundraising + confidential token contracts, in process.
pub struct InMemoryLedger {
    fundraising: Address,
    token: Address,
    coprocessor: Arc<Coprocessor>,
    state: Mutex<LedgerState>,
    block_time: Option<Duration>,
}

impl InMemoryLedger {
    pub fn new(fundraising: Address, token: Address, coprocessor: Arc<Coprocessor>) -> Self {
        Self {
            fundraising,
            token,
            coprocessor,
            state: Mutex::new(LedgerState::default()),
            block_time: None,
        }
    }

    /// Delay before a write is reported final
    pub fn with_block_time(mut self, block_time: Duration) -> Self {
        self.block_time = Some(block_time);
        self
    }

    pub fn coprocessor(&self) -> &Arc<Coprocessor> {
        &self.coprocessor
    }

    async fn wait_finality(&self) {
        if let Some(block_time) = self.block_time {
            tokio::time::sleep(block_time).await;
        }
    }

    /// Receiver hook of the fundraising contract: credits `amount` to the
    /// campaign named by `data` and awards points to `donor`.
    fn on_confidential_transfer(
        &self,
        state: &mut LedgerState,
        donor: Address,
        id: CampaignId,
        amount: CiphertextHandle,
    ) -> Result<(), LedgerError> {
        let creator = state.campaign(id)?.creator;
        let copro = &self.coprocessor;

        let previous = state.raised.get(&id).copied().unwrap_or(ZERO_HANDLE);
        let raised = copro.add(&previous, &amount).map_err(coprocessor_revert)?;
        for who in [self.fundraising, creator, donor] {
            copro.allow(&raised, who);
        }
        state.raised.insert(id, raised);

        let earned = copro
            .div_scalar(&amount, POINTS_DIVISOR)
            .map_err(coprocessor_revert)?;
        let previous = state
            .points
            .get(&(id, donor))
            .copied()
            .unwrap_or(ZERO_HANDLE);
        let points = copro.add(&previous, &earned).map_err(coprocessor_revert)?;
        for who in [self.fundraising, donor] {
            copro.allow(&points, who);
        }
        state.points.insert((id, donor), points);
        Ok(())
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn campaigns(&self) -> Result<Vec<CampaignRecord>, LedgerError> {
        Ok(self.state.lock().await.campaigns.clone())
    }

    async fn campaign_raised(&self, id: CampaignId) -> Result<CiphertextHandle, LedgerError> {
        let state = self.state.lock().await;
        state.campaign(id)?;
        Ok(state.raised.get(&id).copied().unwrap_or(ZERO_HANDLE))
    }

    async fn user_points(
        &self,
        id: CampaignId,
        user: Address,
    ) -> Result<CiphertextHandle, LedgerError> {
        let state = self.state.lock().await;
        state.campaign(id)?;
        Ok(state.points.get(&(id, user)).copied().unwrap_or(ZERO_HANDLE))
    }

    async fn confidential_balance(&self, owner: Address) -> Result<CiphertextHandle, LedgerError> {
        let state = self.state.lock().await;
        Ok(state.balances.get(&owner).copied().unwrap_or(ZERO_HANDLE))
    }

    async fn create_campaign(
        &self,
        from: Address,
        title: &str,
        description: &str,
        goal: u64,
    ) -> Result<TxReceipt, LedgerError> {
        let receipt = {
            let mut state = self.state.lock().await;
            let id = state.campaigns.len() as CampaignId;
            state.campaigns.push(CampaignRecord {
                id,
                title: title.to_string(),
                description: description.to_string(),
                goal,
                creator: from,
                active: true,
            });
            state.raised.insert(id, ZERO_HANDLE);
            debug!("Campaign {} created by {}", id, from);
            state.seal_block()
        };
        self.wait_finality().await;
        Ok(receipt)
    }

    async fn set_campaign_active(
        &self,
        from: Address,
        id: CampaignId,
        active: bool,
    ) -> Result<TxReceipt, LedgerError> {
        let receipt = {
            let mut state = self.state.lock().await;
            if state.campaign(id)?.creator != from {
                return Err(LedgerError::Reverted(RevertReason::Unauthorized(from)));
            }
            if let Some(record) = state.campaigns.get_mut(id as usize) {
                record.active = active;
            }
            state.seal_block()
        };
        self.wait_finality().await;
        Ok(receipt)
    }

    async fn confidential_transfer_and_call(
        &self,
        from: Address,
        to: Address,
        input: EncryptedInput,
        data: Vec<u8>,
    ) -> Result<TxReceipt, LedgerError> {
        let receipt = {
            let mut state = self.state.lock().await;

            // Everything that can revert is checked before any state changes
            if to != self.fundraising {
                return Err(LedgerError::Reverted(RevertReason::Other(format!(
                    "{to} does not accept confidential transfers"
                ))));
            }
            let id = decode_campaign_payload(&data).ok_or_else(|| {
                LedgerError::Reverted(RevertReason::Other("malformed campaign payload".into()))
            })?;
            if !state.campaign(id)?.active {
                return Err(LedgerError::Reverted(RevertReason::CampaignInactive(id)));
            }
            let amount = self
                .coprocessor
                .verify_input(&input, self.token, from)
                .map_err(|_| LedgerError::Reverted(RevertReason::InvalidInputProof))?;

            // Short balances transfer zero instead of reverting
            let balance = state.balances.get(&from).copied().unwrap_or(ZERO_HANDLE);
            let (remaining, moved) = self
                .coprocessor
                .debit(&balance, &amount)
                .map_err(coprocessor_revert)?;
            for who in [self.token, from] {
                self.coprocessor.allow(&remaining, who);
            }
            state.balances.insert(from, remaining);

            self.on_confidential_transfer(&mut state, from, id, moved)?;
            debug!("Confidential donation from {} to campaign {}", from, id);
            state.seal_block()
        };
        self.wait_finality().await;
        Ok(receipt)
    }

    async fn faucet(&self, to: Address) -> Result<TxReceipt, LedgerError> {
        let receipt = {
            let mut state = self.state.lock().await;
            let grant = self.coprocessor.trivial_encrypt(FAUCET_GRANT);
            let balance = state.balances.get(&to).copied().unwrap_or(ZERO_HANDLE);
            let updated = self
                .coprocessor
                .add(&balance, &grant)
                .map_err(coprocessor_revert)?;
            for who in [self.token, to] {
                self.coprocessor.allow(&updated, who);
            }
            state.balances.insert(to, updated);
            state.seal_block()
        };
        self.wait_finality().await;
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfund_types::encode_campaign_payload;

    const FUNDRAISING: Address = Address([0xF0; 32]);
    const TOKEN: Address = Address([0x70; 32]);
    const ALICE: Address = Address([0xA1; 32]);
    const BOB: Address = Address([0xB0; 32]);

    fn ledger() -> InMemoryLedger {
        InMemoryLedger::new(FUNDRAISING, TOKEN, Arc::new(Coprocessor::new()))
    }

    #[tokio::test]
    async fn test_create_campaign_assigns_sequential_ids() {
        let ledger = ledger();
        ledger.create_campaign(ALICE, "A", "first", 10).await.unwrap();
        let receipt = ledger.create_campaign(BOB, "B", "second", 20).await.unwrap();
        assert_eq!(receipt.block_number, 2);

        let campaigns = ledger.campaigns().await.unwrap();
        assert_eq!(campaigns.len(), 2);
        assert_eq!(campaigns[1].id, 1);
        assert_eq!(campaigns[1].creator, BOB);
        assert!(campaigns[1].active);
        assert_eq!(ledger.campaign_raised(1).await.unwrap(), ZERO_HANDLE);
        assert_eq!(ledger.user_points(1, ALICE).await.unwrap(), ZERO_HANDLE);
    }

    #[tokio::test]
    async fn test_set_active_is_creator_only() {
        let ledger = ledger();
        ledger.create_campaign(ALICE, "A", "d", 10).await.unwrap();

        assert_eq!(
            ledger.set_campaign_active(BOB, 0, false).await,
            Err(LedgerError::Reverted(RevertReason::Unauthorized(BOB)))
        );
        ledger.set_campaign_active(ALICE, 0, false).await.unwrap();
        assert!(!ledger.campaigns().await.unwrap()[0].active);

        assert_eq!(
            ledger.set_campaign_active(ALICE, 9, true).await,
            Err(LedgerError::Reverted(RevertReason::CampaignNotFound(9)))
        );
    }

    #[tokio::test]
    async fn test_donation_updates_raised_and_points() {
        let ledger = ledger();
        let copro = ledger.coprocessor().clone();
        ledger.create_campaign(ALICE, "A", "d", 10).await.unwrap();
        ledger.faucet(BOB).await.unwrap();

        let input = copro.register_input(TOKEN, BOB, 250_000);
        ledger
            .confidential_transfer_and_call(BOB, FUNDRAISING, input, encode_campaign_payload(0))
            .await
            .unwrap();

        let raised = ledger.campaign_raised(0).await.unwrap();
        let points = ledger.user_points(0, BOB).await.unwrap();
        let balance = ledger.confidential_balance(BOB).await.unwrap();
        assert!(!raised.is_zero());
        for who in [FUNDRAISING, ALICE, BOB] {
            assert!(copro.is_allowed(&raised, &who));
        }
        assert!(copro.is_allowed(&points, &BOB));
        assert!(!copro.is_allowed(&points, &ALICE));
        assert!(copro.is_allowed(&balance, &BOB));

        assert_eq!(copro.value_of(&raised), Ok(250_000));
        assert_eq!(copro.value_of(&points), Ok(25));
        assert_eq!(copro.value_of(&balance), Ok(750_000));
    }

    #[tokio::test]
    async fn test_short_balance_transfers_zero() {
        let ledger = ledger();
        let copro = ledger.coprocessor().clone();
        ledger.create_campaign(ALICE, "A", "d", 10).await.unwrap();

        // BOB never claimed the faucet
        let input = copro.register_input(TOKEN, BOB, 5_000_000);
        ledger
            .confidential_transfer_and_call(BOB, FUNDRAISING, input, encode_campaign_payload(0))
            .await
            .unwrap();

        let raised = ledger.campaign_raised(0).await.unwrap();
        assert_eq!(copro.value_of(&raised), Ok(0));
        let points = ledger.user_points(0, BOB).await.unwrap();
        assert_eq!(copro.value_of(&points), Ok(0));
    }

    #[tokio::test]
    async fn test_donation_rejections() {
        let ledger = ledger();
        let copro = ledger.coprocessor().clone();
        ledger.create_campaign(ALICE, "A", "d", 10).await.unwrap();
        ledger.set_campaign_active(ALICE, 0, false).await.unwrap();

        let input = copro.register_input(TOKEN, BOB, 1);
        assert_eq!(
            ledger
                .confidential_transfer_and_call(BOB, FUNDRAISING, input.clone(), encode_campaign_payload(0))
                .await,
            Err(LedgerError::Reverted(RevertReason::CampaignInactive(0)))
        );
        assert_eq!(
            ledger
                .confidential_transfer_and_call(BOB, FUNDRAISING, input.clone(), encode_campaign_payload(5))
                .await,
            Err(LedgerError::Reverted(RevertReason::CampaignNotFound(5)))
        );

        ledger.set_campaign_active(ALICE, 0, true).await.unwrap();
        // Proof was issued for BOB
        assert_eq!(
            ledger
                .confidential_transfer_and_call(ALICE, FUNDRAISING, input, encode_campaign_payload(0))
                .await,
            Err(LedgerError::Reverted(RevertReason::InvalidInputProof))
        );
    }
}
