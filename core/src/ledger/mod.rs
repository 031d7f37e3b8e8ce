//! Ledger interface
//!
//! Typed read and write operations against the fundraising and token
//! contracts. Writes resolve only once the transaction is final, so callers
//! can invalidate caches as soon as a write returns `Ok`. Workflows submit
//! through [`commit`], which keeps that invalidation tied to finality even
//! if the caller goes away.
//!
//! ```text
//! reads:  campaigns, campaign_raised, user_points, confidential_balance
//! writes: create_campaign, set_campaign_active,
//!         confidential_transfer_and_call, faucet
//! ```

pub mod gateway;
pub mod memory;

use std::future::Future;

use async_trait::async_trait;
use cfund_types::{Address, CampaignId, CampaignRecord, CiphertextHandle, EncryptedInput};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use gateway::{LedgerGatewayClient, LedgerGatewayConfig};
pub use memory::InMemoryLedger;

/// Base units credited per faucet claim (1 cETH)
pub const FAUCET_GRANT: u64 = 1_000_000;

/// Points awarded per base unit donated: 100 points per 1 cETH
pub const POINTS_DIVISOR: u64 = 10_000;

/// Why a transaction reverted.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum RevertReason {
    #[error("Unauthorized({0})")]
    Unauthorized(Address),
    #[error("campaign {0} does not exist")]
    CampaignNotFound(CampaignId),
    #[error("campaign {0} is not active")]
    CampaignInactive(CampaignId),
    #[error("invalid input proof")]
    InvalidInputProof,
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("ledger unreachable: {0}")]
    Unavailable(String),

    #[error("transaction reverted: {0}")]
    Reverted(RevertReason),

    #[error("transaction did not finalize: {0}")]
    NotFinalized(String),

    #[error("malformed ledger response: {0}")]
    Malformed(String),
}

/// A finalized transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    #[serde(with = "hex::serde")]
    pub tx_hash: [u8; 32],
    pub block_number: u64,
}

/// The ledger as seen by the client engine.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// All campaigns, in ledger order
    async fn campaigns(&self) -> Result<Vec<CampaignRecord>, LedgerError>;

    async fn campaign_raised(&self, id: CampaignId) -> Result<CiphertextHandle, LedgerError>;

    /// `user`'s points handle in campaign `id`; the zero handle if none
    async fn user_points(
        &self,
        id: CampaignId,
        user: Address,
    ) -> Result<CiphertextHandle, LedgerError>;

    /// Confidential token balance of `owner`
    async fn confidential_balance(&self, owner: Address) -> Result<CiphertextHandle, LedgerError>;

    async fn create_campaign(
        &self,
        from: Address,
        title: &str,
        description: &str,
        goal: u64,
    ) -> Result<TxReceipt, LedgerError>;

    /// Creator-only; reverts with [`RevertReason::Unauthorized`] otherwise
    async fn set_campaign_active(
        &self,
        from: Address,
        id: CampaignId,
        active: bool,
    ) -> Result<TxReceipt, LedgerError>;

    /// Moves an encrypted amount to `to` and invokes its receiver hook with `data`
    async fn confidential_transfer_and_call(
        &self,
        from: Address,
        to: Address,
        input: EncryptedInput,
        data: Vec<u8>,
    ) -> Result<TxReceipt, LedgerError>;

    /// Credits [`FAUCET_GRANT`] to `to`
    async fn faucet(&self, to: Address) -> Result<TxReceipt, LedgerError>;
}

/// Drives `write` to finality on its own task and runs `on_final` after it
/// succeeds.
///
/// Dropping the returned future does not cancel either of them.
pub async fn commit<W, F>(write: W, on_final: F) -> Result<TxReceipt, LedgerError>
where
    W: Future<Output = Result<TxReceipt, LedgerError>> + Send + 'static,
    F: FnOnce() + Send + 'static,
{
    tokio::spawn(async move {
        let receipt = write.await?;
        on_final();
        Ok(receipt)
    })
    .await
    .map_err(|e| LedgerError::NotFinalized(format!("write task ended early: {e}")))?
}
