//! Shared types for the confidential fundraising client.
//!
//! Identities and contract addresses are 32-byte [`Address`]es, encrypted
//! ledger values are referenced by opaque [`CiphertextHandle`]s.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod campaign;

pub use campaign::{
    Campaign, CampaignId, CampaignRecord, ValueKind, decode_campaign_payload,
    encode_campaign_payload,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseBytesError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),
    #[error("expected {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },
}

fn parse_bytes32(s: &str) -> Result<[u8; 32], ParseBytesError> {
    let trimmed = s.trim();
    let stripped = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = hex::decode(stripped).map_err(|e| ParseBytesError::InvalidHex(e.to_string()))?;
    let got = bytes.len();
    bytes
        .try_into()
        .map_err(|_| ParseBytesError::InvalidLength { expected: 32, got })
}

/// A participant identity or contract address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(#[serde(with = "hex::serde")] pub [u8; 32]);

impl Address {
    /// Derives the identity bound to an Ed25519 verifying key.
    /// Formula: SHA256( signer_pk_bytes )
    pub fn from_signer_key(signer_pk: &[u8; 32]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(signer_pk);
        Self(hasher.finalize().into())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps logs readable
        write!(f, "Address(0x{}..)", &self.to_hex()[..8])
    }
}

impl FromStr for Address {
    type Err = ParseBytesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_bytes32(s).map(Self)
    }
}

/// Opaque reference to an encrypted value held by the ledger.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CiphertextHandle(#[serde(with = "hex::serde")] pub [u8; 32]);

/// Sentinel meaning "no encrypted value recorded yet". Resolves to 0 locally.
pub const ZERO_HANDLE: CiphertextHandle = CiphertextHandle([0u8; 32]);

impl CiphertextHandle {
    pub fn is_zero(&self) -> bool {
        *self == ZERO_HANDLE
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Default for CiphertextHandle {
    fn default() -> Self {
        ZERO_HANDLE
    }
}

impl fmt::Display for CiphertextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl fmt::Debug for CiphertextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle(0x{}..)", &self.to_hex()[..8])
    }
}

impl FromStr for CiphertextHandle {
    type Err = ParseBytesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_bytes32(s).map(Self)
    }
}

/// Proof that an encrypted input was built for a given (contract, sender).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputProof(#[serde(with = "hex::serde")] pub Vec<u8>);

impl fmt::Debug for InputProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InputProof({} bytes)", self.0.len())
    }
}

/// Ciphertext + proof produced by the encryption service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedInput {
    pub handle: CiphertextHandle,
    pub proof: InputProof,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_handle() {
        assert!(ZERO_HANDLE.is_zero());
        assert!(CiphertextHandle::default().is_zero());
        assert!(!CiphertextHandle([1u8; 32]).is_zero());
    }

    #[test]
    fn test_address_parse_with_and_without_prefix() {
        let addr = Address([0xab; 32]);
        let plain: Address = addr.to_hex().parse().unwrap();
        let prefixed: Address = addr.to_string().parse().unwrap();
        assert_eq!(plain, addr);
        assert_eq!(prefixed, addr);
    }

    #[test]
    fn test_address_parse_rejects_bad_input() {
        assert!(matches!(
            "0x1234".parse::<Address>(),
            Err(ParseBytesError::InvalidLength { expected: 32, got: 2 })
        ));
        assert!(matches!(
            "zz".parse::<Address>(),
            Err(ParseBytesError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_identity_derivation_deterministic() {
        let a = Address::from_signer_key(&[7u8; 32]);
        let b = Address::from_signer_key(&[7u8; 32]);
        let c = Address::from_signer_key(&[8u8; 32]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_handle_serializes_as_hex() {
        let handle = CiphertextHandle([0x11; 32]);
        let json = serde_json::to_string(&handle).unwrap();
        assert_eq!(json, format!("\"{}\"", "11".repeat(32)));
        let back: CiphertextHandle = serde_json::from_str(&json).unwrap();
        assert_eq!(back, handle);
    }
}
