use cfund_types::{Address, CiphertextHandle};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayerError {
    #[error("Encryption service unavailable: {0}")]
    Unavailable(String),

    #[error("Encryption service not initialized yet")]
    NotInitialized,

    #[error("invalid authorization signature")]
    InvalidSignature,

    #[error("signer {signer} does not match requested identity {user}")]
    IdentityMismatch { signer: Address, user: Address },

    #[error("public key does not match the signed authorization")]
    PublicKeyMismatch,

    #[error("authorization window is not active")]
    WindowInactive,

    #[error("invalid authorization duration: {0} days")]
    InvalidDuration(u64),

    #[error("contract {0} is not covered by the authorization")]
    ContractNotAuthorized(Address),

    #[error("{0} is not allowed to decrypt {1}")]
    NotAllowed(Address, CiphertextHandle),

    #[error("unknown ciphertext handle {0}")]
    UnknownHandle(CiphertextHandle),

    #[error("invalid input proof")]
    InvalidInputProof,

    #[error("crypto failure: {0}")]
    Crypto(&'static str),

    #[error("malformed relayer response: {0}")]
    InvalidResponse(String),

    #[error("relayer error ({code}): {message}")]
    Remote { code: String, message: String },
}

impl RelayerError {
    /// True when the service could not be reached or is not ready, as
    /// opposed to having refused or failed a specific request.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::NotInitialized)
    }
}
