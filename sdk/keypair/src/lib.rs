use async_trait::async_trait;
use cfund_types::Address;
use chacha20poly1305::aead::OsRng;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignerError {
    #[error("Wallet signer unavailable")]
    Unavailable,
    #[error("User rejected the signature request")]
    Rejected,
}

/// A detached Ed25519 signature together with the key that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletSignature {
    #[serde(with = "hex::serde")]
    pub signer_pubkey: [u8; 32],
    #[serde(with = "hex::serde")]
    pub signature: Vec<u8>,
}

impl WalletSignature {
    /// Identity of the signer.
    pub fn signer(&self) -> Address {
        Address::from_signer_key(&self.signer_pubkey)
    }

    /// Checks the signature over `digest`.
    pub fn verify(&self, digest: &[u8; 32]) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(&self.signer_pubkey) else {
            return false;
        };
        let Ok(sig) = Signature::from_slice(&self.signature) else {
            return false;
        };
        key.verify(digest, &sig).is_ok()
    }
}

/// The wallet-signing capability.
///
/// Implementations may prompt a user; a declined prompt is
/// [`SignerError::Rejected`], a missing wallet [`SignerError::Unavailable`].
#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Connected identity, `None` when no wallet is connected.
    fn address(&self) -> Option<Address>;

    /// Signs a 32-byte structured-message digest.
    async fn sign_digest(&self, digest: &[u8; 32]) -> Result<WalletSignature, SignerError>;
}

/// A user's wallet containing the private signing key.
/// NEVER expose this struct's internals.
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generates a fresh random wallet.
    pub fn new_random() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Reconstructs a wallet from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Returns the Ed25519 public key (safe to share).
    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Returns the public identity (the "Address").
    pub fn identity(&self) -> Address {
        Address::from_signer_key(&self.public_key())
    }

    pub fn sign(&self, digest: &[u8; 32]) -> WalletSignature {
        WalletSignature {
            signer_pubkey: self.public_key(),
            signature: self.signing_key.sign(digest).to_bytes().to_vec(),
        }
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("identity", &self.identity())
            .finish_non_exhaustive() // Hides the signing key
    }
}

/// A local keypair approves every request.
#[async_trait]
impl WalletSigner for Keypair {
    fn address(&self) -> Option<Address> {
        Some(self.identity())
    }

    async fn sign_digest(&self, digest: &[u8; 32]) -> Result<WalletSignature, SignerError> {
        Ok(self.sign(digest))
    }
}
