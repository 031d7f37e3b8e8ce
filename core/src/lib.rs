//! Confidential fundraising client engine
//!
//! ```text
//! FundraisingSession
//!   ├── CampaignRegistryCache ──────────────┐
//!   ├── CampaignCreationWorkflow / Faucet ──┤── Ledger (InMemoryLedger | LedgerGatewayClient)
//!   ├── DonationEncryptionPipeline ─────────┤
//!   └── DecryptionOrchestrator ─────────────┴── EncryptionService + WalletSigner
//! ```

pub mod decryption;
pub mod donation;
pub mod error;
pub mod ledger;
pub mod registry;
pub mod session;
pub mod workflows;

pub use decryption::{DecryptKey, DecryptState, DecryptionOrchestrator, StateChange};
pub use donation::{DonationEncryptionPipeline, DonationReceipt};
pub use error::FundraisingError;
pub use ledger::{InMemoryLedger, Ledger, LedgerError, LedgerGatewayClient, TxReceipt};
pub use registry::CampaignRegistryCache;
pub use session::{FundraisingSession, SessionSettings, StatusBoard};
pub use workflows::{CampaignCreationWorkflow, CampaignForm, FaucetWorkflow};

#[cfg(test)]
mod tests;
