//! Ephemeral keys and sealed values
//!
//! ```text
//! Flow (user decryption):
//! 1. Client generates ephemeral keypair (epk, esk), signs an authorization over epk
//! 2. Relayer generates its own ephemeral keypair (rpk, rsk)
//! 3. Shared secret = ECDH(rsk, epk)
//! 4. Key = HKDF-SHA256(salt = H(epk || rpk), shared, "cfund-sealed-v1")
//! 5. Each value: ChaCha20-Poly1305(key, random nonce, value_le, aad = binding)
//! 6. Client opens with ECDH(esk, rpk), consuming esk
//! ```

use std::collections::HashMap;

use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit, Payload, rand_core::OsRng},
};
use hkdf::Hkdf;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::error::RelayerError;

const SEAL_INFO: &[u8] = b"cfund-sealed-v1";

/// A single-use keypair generated for one decryption attempt.
///
/// Opening a response consumes the secret, so the pair cannot be reused.
pub struct EphemeralKeyPair {
    sk: EphemeralSecret,
    pk: PublicKey,
}

impl EphemeralKeyPair {
    pub fn generate() -> Self {
        let sk = EphemeralSecret::random_from_rng(OsRng);
        let pk = PublicKey::from(&sk);
        Self { sk, pk }
    }

    pub fn public_key(&self) -> [u8; 32] {
        *self.pk.as_bytes()
    }

    /// Opens values sealed to this keypair's public key.
    pub fn open(self, sealed: &SealedValues) -> Result<HashMap<[u8; 32], u64>, RelayerError> {
        let recipient_pk = self.public_key();
        let shared = self
            .sk
            .diffie_hellman(&PublicKey::from(sealed.sender_pk))
            .to_bytes();
        sealed.open_with(shared, &recipient_pk)
    }
}

impl std::fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralKeyPair")
            .field("pk", &hex::encode(self.pk.as_bytes()))
            .finish_non_exhaustive() // Hides the secret
    }
}

/// Long-lived X25519 key a relayer publishes for encrypted inputs.
pub struct RelayerKey {
    sk: StaticSecret,
    pk: PublicKey,
}

impl RelayerKey {
    pub fn generate() -> Self {
        let sk = StaticSecret::random_from_rng(OsRng);
        let pk = PublicKey::from(&sk);
        Self { sk, pk }
    }

    pub fn public_key(&self) -> [u8; 32] {
        *self.pk.as_bytes()
    }

    pub fn open(&self, sealed: &SealedValues) -> Result<HashMap<[u8; 32], u64>, RelayerError> {
        let shared = self
            .sk
            .diffie_hellman(&PublicKey::from(sealed.sender_pk))
            .to_bytes();
        sealed.open_with(shared, &self.public_key())
    }
}

/// One sealed 64-bit value, authenticated against `binding`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedValue {
    /// Associated data (a ciphertext handle, or an input binding)
    #[serde(with = "hex::serde")]
    pub binding: [u8; 32],
    #[serde(with = "hex::serde")]
    pub nonce: [u8; 12],
    #[serde(with = "hex::serde")]
    pub ciphertext: Vec<u8>,
}

/// Values sealed to a recipient public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedValues {
    /// Sender's ephemeral public key for ECDH
    #[serde(with = "hex::serde")]
    pub sender_pk: [u8; 32],
    pub entries: Vec<SealedValue>,
}

/// Seals `(binding, value)` pairs to `recipient_pk` under a fresh sender key.
pub fn seal_values(
    recipient_pk: &[u8; 32],
    values: &[([u8; 32], u64)],
) -> Result<SealedValues, RelayerError> {
    let sender_sk = EphemeralSecret::random_from_rng(OsRng);
    let sender_pk = *PublicKey::from(&sender_sk).as_bytes();
    let shared = sender_sk
        .diffie_hellman(&PublicKey::from(*recipient_pk))
        .to_bytes();
    let cipher = derive_cipher(shared, recipient_pk, &sender_pk)?;

    let mut rng = rand::thread_rng();
    let mut entries = Vec::with_capacity(values.len());
    for (binding, value) in values {
        let mut nonce = [0u8; 12];
        rng.fill_bytes(&mut nonce);
        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &value.to_le_bytes(),
                    aad: binding,
                },
            )
            .map_err(|_| RelayerError::Crypto("seal"))?;
        entries.push(SealedValue {
            binding: *binding,
            nonce,
            ciphertext,
        });
    }

    Ok(SealedValues { sender_pk, entries })
}

impl SealedValues {
    fn open_with(
        &self,
        shared: [u8; 32],
        recipient_pk: &[u8; 32],
    ) -> Result<HashMap<[u8; 32], u64>, RelayerError> {
        let cipher = derive_cipher(shared, recipient_pk, &self.sender_pk)?;

        let mut out = HashMap::with_capacity(self.entries.len());
        for entry in &self.entries {
            let plaintext = cipher
                .decrypt(
                    Nonce::from_slice(&entry.nonce),
                    Payload {
                        msg: &entry.ciphertext,
                        aad: &entry.binding,
                    },
                )
                .map_err(|_| RelayerError::InvalidResponse("sealed value failed to open".into()))?;
            let bytes: [u8; 8] = plaintext
                .as_slice()
                .try_into()
                .map_err(|_| RelayerError::InvalidResponse("sealed value has bad width".into()))?;
            out.insert(entry.binding, u64::from_le_bytes(bytes));
        }
        Ok(out)
    }
}

/// salt = H(recipient_pk || sender_pk)
fn derive_cipher(
    shared: [u8; 32],
    recipient_pk: &[u8; 32],
    sender_pk: &[u8; 32],
) -> Result<ChaCha20Poly1305, RelayerError> {
    let mut hasher = Sha256::new();
    hasher.update(recipient_pk);
    hasher.update(sender_pk);
    let salt = hasher.finalize();

    let hk = Hkdf::<Sha256>::new(Some(&salt), &shared);
    let mut okm = [0u8; 32];
    hk.expand(SEAL_INFO, &mut okm)
        .map_err(|_| RelayerError::Crypto("hkdf expand"))?;

    Ok(ChaCha20Poly1305::new(Key::from_slice(&okm)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_with_ephemeral_key() {
        let keypair = EphemeralKeyPair::generate();
        let sealed = seal_values(&keypair.public_key(), &[([1u8; 32], 42), ([2u8; 32], 7)])
            .expect("seal failed");

        let opened = keypair.open(&sealed).expect("open failed");
        assert_eq!(opened.get(&[1u8; 32]), Some(&42));
        assert_eq!(opened.get(&[2u8; 32]), Some(&7));
    }

    #[test]
    fn test_seal_open_with_relayer_key() {
        let key = RelayerKey::generate();
        let sealed = seal_values(&key.public_key(), &[([9u8; 32], u64::MAX)]).unwrap();
        let opened = key.open(&sealed).unwrap();
        assert_eq!(opened[&[9u8; 32]], u64::MAX);
    }

    #[test]
    fn test_wrong_key_fails() {
        let intended = EphemeralKeyPair::generate();
        let other = EphemeralKeyPair::generate();
        let sealed = seal_values(&intended.public_key(), &[([1u8; 32], 5)]).unwrap();

        assert!(matches!(
            other.open(&sealed),
            Err(RelayerError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_rebinding_fails() {
        // Moving a sealed value to another handle must not authenticate
        let keypair = EphemeralKeyPair::generate();
        let mut sealed = seal_values(&keypair.public_key(), &[([1u8; 32], 5)]).unwrap();
        sealed.entries[0].binding = [2u8; 32];

        assert!(keypair.open(&sealed).is_err());
    }

    #[test]
    fn test_nonces_differ_per_entry() {
        let keypair = EphemeralKeyPair::generate();
        let sealed = seal_values(&keypair.public_key(), &[([1u8; 32], 5), ([2u8; 32], 5)]).unwrap();
        assert_ne!(sealed.entries[0].nonce, sealed.entries[1].nonce);
    }
}
