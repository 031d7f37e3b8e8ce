use cfund_amount::AmountError;
use cfund_keypair::SignerError;
use cfund_types::{Address, CampaignId};
use thiserror::Error;

use crate::ledger::{LedgerError, RevertReason};

/// Everything a fundraising workflow can report to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FundraisingError {
    // Local validation, never reaches the network
    #[error("Enter a valid amount with up to 6 decimals")]
    InvalidFormat,
    #[error("Amount must be greater than zero")]
    ZeroAmount,
    #[error("Amount exceeds the maximum encryptable value")]
    AmountTooLarge,
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("Wallet not connected")]
    WalletUnavailable,
    #[error("Signature request rejected")]
    UserRejected,

    #[error("Encryption service unavailable: {0}")]
    EncryptionServiceUnavailable(String),
    #[error("Transaction failed: {0}")]
    TransactionFailure(String),
    #[error("Decryption failed: {0}")]
    DecryptionFailure(String),
    #[error("Unauthorized: {0} is not the campaign creator")]
    Unauthorized(Address),

    #[error("Campaign {0} not found")]
    CampaignNotFound(CampaignId),
    #[error("Campaign {0} is not active")]
    CampaignInactive(CampaignId),
    #[error("Malformed ledger response: {0}")]
    MalformedLedgerResponse(String),
}

impl From<AmountError> for FundraisingError {
    fn from(e: AmountError) -> Self {
        match e {
            AmountError::InvalidFormat => Self::InvalidFormat,
            // Wider than u64 is certainly wider than any encryptable amount
            AmountError::Overflow => Self::AmountTooLarge,
        }
    }
}

impl From<SignerError> for FundraisingError {
    fn from(e: SignerError) -> Self {
        match e {
            SignerError::Unavailable => Self::WalletUnavailable,
            SignerError::Rejected => Self::UserRejected,
        }
    }
}

impl From<LedgerError> for FundraisingError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Reverted(RevertReason::Unauthorized(caller)) => Self::Unauthorized(caller),
            LedgerError::Malformed(msg) => Self::MalformedLedgerResponse(msg),
            other => Self::TransactionFailure(other.to_string()),
        }
    }
}
