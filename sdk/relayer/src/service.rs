use std::collections::HashMap;

use async_trait::async_trait;
use cfund_keypair::WalletSignature;
use cfund_types::{Address, CiphertextHandle, EncryptedInput};
use serde::{Deserialize, Serialize};

use crate::authorization::AuthorizationRequest;
use crate::error::RelayerError;
use crate::keys::EphemeralKeyPair;

/// Readiness of an encryption service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Initializing,
    Ready,
    Unavailable,
}

/// A ciphertext handle and the contract it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleContractPair {
    pub handle: CiphertextHandle,
    pub contract_address: Address,
}

/// Everything needed for one authorized decryption.
///
/// Owns the ephemeral keypair and the signature; both are gone once the
/// request has been handed to [`EncryptionService::user_decrypt`].
#[derive(Debug)]
pub struct UserDecryptRequest {
    pub handles: Vec<HandleContractPair>,
    pub keypair: EphemeralKeyPair,
    pub signature: WalletSignature,
    pub authorization: AuthorizationRequest,
    pub user: Address,
}

/// The part of a [`UserDecryptRequest`] that goes over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecryptWireRequest {
    pub handles: Vec<HandleContractPair>,
    #[serde(with = "hex::serde")]
    pub public_key: [u8; 32],
    pub signature: WalletSignature,
    pub contract_addresses: Vec<Address>,
    pub user: Address,
    pub start_timestamp: u64,
    pub duration_days: u64,
}

impl DecryptWireRequest {
    pub fn authorization(&self) -> AuthorizationRequest {
        AuthorizationRequest::new(
            self.public_key,
            self.contract_addresses.clone(),
            self.start_timestamp,
            self.duration_days,
        )
    }
}

impl UserDecryptRequest {
    /// Splits off the private key; the rest is safe to send.
    pub fn into_wire(self) -> Result<(DecryptWireRequest, EphemeralKeyPair), RelayerError> {
        if self.authorization.public_key != self.keypair.public_key() {
            return Err(RelayerError::PublicKeyMismatch);
        }
        let wire = DecryptWireRequest {
            handles: self.handles,
            public_key: self.keypair.public_key(),
            signature: self.signature,
            contract_addresses: self.authorization.contract_addresses,
            user: self.user,
            start_timestamp: self.authorization.start_timestamp,
            duration_days: self.authorization.duration_days,
        };
        Ok((wire, self.keypair))
    }
}

/// The external encryption/decryption service.
#[async_trait]
pub trait EncryptionService: Send + Sync {
    fn status(&self) -> ServiceStatus;

    /// Builds an encrypted input bound to (contract, sender).
    async fn encrypt_input(
        &self,
        contract: Address,
        sender: Address,
        value: u64,
    ) -> Result<EncryptedInput, RelayerError>;

    fn generate_keypair(&self) -> EphemeralKeyPair {
        EphemeralKeyPair::generate()
    }

    fn create_authorization(
        &self,
        public_key: [u8; 32],
        contract_addresses: Vec<Address>,
        start_timestamp: u64,
        duration_days: u64,
    ) -> AuthorizationRequest {
        AuthorizationRequest::new(public_key, contract_addresses, start_timestamp, duration_days)
    }

    /// Releases the plaintexts of the requested handles.
    async fn user_decrypt(
        &self,
        request: UserDecryptRequest,
    ) -> Result<HashMap<CiphertextHandle, u64>, RelayerError>;
}
