//! Time-bounded decryption authorization.

use std::time::{SystemTime, UNIX_EPOCH};

use cfund_types::Address;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::RelayerError;

/// Validity of a signed authorization when nothing else is configured.
pub const DEFAULT_DURATION_DAYS: u64 = 10;
/// Longest window a relayer accepts.
pub const MAX_DURATION_DAYS: u64 = 365;

const SECONDS_PER_DAY: u64 = 86_400;
const DOMAIN_TAG: &[u8] = b"cfund-user-decrypt-request-v1";

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// The structured message a wallet signs to release decrypted values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    /// Ephemeral X25519 public key the values get sealed to
    #[serde(with = "hex::serde")]
    pub public_key: [u8; 32],
    /// Contracts whose handles may be decrypted
    pub contract_addresses: Vec<Address>,
    /// Window start (unix seconds)
    pub start_timestamp: u64,
    pub duration_days: u64,
}

impl AuthorizationRequest {
    pub fn new(
        public_key: [u8; 32],
        contract_addresses: Vec<Address>,
        start_timestamp: u64,
        duration_days: u64,
    ) -> Self {
        Self {
            public_key,
            contract_addresses,
            start_timestamp,
            duration_days,
        }
    }

    /// Digest the wallet signs.
    /// H(tag || pk || n || contracts.. || start || days), integers big-endian
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(DOMAIN_TAG);
        hasher.update(self.public_key);
        hasher.update((self.contract_addresses.len() as u64).to_be_bytes());
        for address in &self.contract_addresses {
            hasher.update(address.as_bytes());
        }
        hasher.update(self.start_timestamp.to_be_bytes());
        hasher.update(self.duration_days.to_be_bytes());
        hasher.finalize().into()
    }

    /// First second after the window.
    pub fn expires_at(&self) -> u64 {
        self.start_timestamp
            .saturating_add(self.duration_days.saturating_mul(SECONDS_PER_DAY))
    }

    pub fn covers(&self, contract: &Address) -> bool {
        self.contract_addresses.contains(contract)
    }

    /// Checks duration bounds and that `now` falls inside the window.
    pub fn validate_at(&self, now: u64) -> Result<(), RelayerError> {
        if self.duration_days == 0 || self.duration_days > MAX_DURATION_DAYS {
            return Err(RelayerError::InvalidDuration(self.duration_days));
        }
        if now < self.start_timestamp || now >= self.expires_at() {
            return Err(RelayerError::WindowInactive);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(start: u64, days: u64) -> AuthorizationRequest {
        AuthorizationRequest::new([1u8; 32], vec![Address([2u8; 32])], start, days)
    }

    #[test]
    fn test_digest_binds_every_field() {
        let base = request(1_000, 10);
        let mut other_key = base.clone();
        other_key.public_key = [9u8; 32];
        let mut other_contracts = base.clone();
        other_contracts.contract_addresses.push(Address([3u8; 32]));
        let later = request(1_001, 10);
        let longer = request(1_000, 11);

        for changed in [other_key, other_contracts, later, longer] {
            assert_ne!(base.digest(), changed.digest());
        }
        assert_eq!(base.digest(), request(1_000, 10).digest());
    }

    #[test]
    fn test_window_bounds() {
        let auth = request(1_000, DEFAULT_DURATION_DAYS);
        assert_eq!(auth.expires_at(), 1_000 + 10 * 86_400);

        assert!(auth.validate_at(1_000).is_ok());
        assert!(auth.validate_at(auth.expires_at() - 1).is_ok());
        assert_eq!(auth.validate_at(999), Err(RelayerError::WindowInactive));
        assert_eq!(
            auth.validate_at(auth.expires_at()),
            Err(RelayerError::WindowInactive)
        );
    }

    #[test]
    fn test_duration_limits() {
        assert_eq!(
            request(0, 0).validate_at(0),
            Err(RelayerError::InvalidDuration(0))
        );
        assert_eq!(
            request(0, 366).validate_at(0),
            Err(RelayerError::InvalidDuration(366))
        );
    }

    #[test]
    fn test_covers() {
        let auth = request(0, 1);
        assert!(auth.covers(&Address([2u8; 32])));
        assert!(!auth.covers(&Address([4u8; 32])));
    }
}
