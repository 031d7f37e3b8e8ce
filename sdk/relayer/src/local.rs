//! In-process encryption service
//!
//! A development stand-in for the external network: the [`Coprocessor`]
//! keeps plaintexts behind opaque handles with a per-handle ACL, and
//! [`LocalEncryptionService`] performs the relayer-side authorization
//! checks before sealing values to the requester's ephemeral key.
//! Nothing here is confidential against the process itself.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use cfund_types::{Address, CiphertextHandle, EncryptedInput, InputProof, ZERO_HANDLE};
use dashmap::DashMap;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::authorization::unix_now;
use crate::error::RelayerError;
use crate::keys::{SealedValues, seal_values};
use crate::service::{DecryptWireRequest, EncryptionService, ServiceStatus, UserDecryptRequest};

const INPUT_PROOF_TAG: &[u8] = b"cfund-input-proof-v1";

/// Handle store with access control.
///
/// Every operation allocates a fresh handle; nothing is ever freed.
#[derive(Debug, Default)]
pub struct Coprocessor {
    values: DashMap<CiphertextHandle, u64>,
    acl: DashMap<CiphertextHandle, HashSet<Address>>,
    /// Issued but not yet consumed inputs: handle -> (contract, sender)
    pending_inputs: DashMap<CiphertextHandle, (Address, Address)>,
}

impl Coprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live ciphertexts.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn store(&self, value: u64) -> CiphertextHandle {
        let mut rng = rand::thread_rng();
        loop {
            let mut bytes = [0u8; 32];
            rng.fill_bytes(&mut bytes);
            let handle = CiphertextHandle(bytes);
            if handle.is_zero() || self.values.contains_key(&handle) {
                continue;
            }
            self.values.insert(handle, value);
            return handle;
        }
    }

    /// Plaintext behind a handle. The zero handle reads as 0.
    pub fn value_of(&self, handle: &CiphertextHandle) -> Result<u64, RelayerError> {
        if handle.is_zero() {
            return Ok(0);
        }
        self.values
            .get(handle)
            .map(|v| *v)
            .ok_or(RelayerError::UnknownHandle(*handle))
    }

    pub fn trivial_encrypt(&self, value: u64) -> CiphertextHandle {
        self.store(value)
    }

    /// Encrypted addition, wrapping like a 64-bit encrypted integer.
    pub fn add(
        &self,
        a: &CiphertextHandle,
        b: &CiphertextHandle,
    ) -> Result<CiphertextHandle, RelayerError> {
        let sum = self.value_of(a)?.wrapping_add(self.value_of(b)?);
        Ok(self.store(sum))
    }

    /// Encrypted division by a plaintext divisor.
    pub fn div_scalar(
        &self,
        a: &CiphertextHandle,
        divisor: u64,
    ) -> Result<CiphertextHandle, RelayerError> {
        let quotient = self
            .value_of(a)?
            .checked_div(divisor)
            .ok_or(RelayerError::Crypto("division by zero"))?;
        Ok(self.store(quotient))
    }

    /// Confidential transfer step: moves `amount` out of `balance` when the
    /// balance covers it, otherwise moves nothing.
    ///
    /// Returns `(new_balance, transferred)`.
    pub fn debit(
        &self,
        balance: &CiphertextHandle,
        amount: &CiphertextHandle,
    ) -> Result<(CiphertextHandle, CiphertextHandle), RelayerError> {
        let have = self.value_of(balance)?;
        let want = self.value_of(amount)?;
        let moved = if have >= want { want } else { 0 };
        Ok((self.store(have - moved), self.store(moved)))
    }

    pub fn allow(&self, handle: &CiphertextHandle, who: Address) {
        if handle.is_zero() {
            return;
        }
        self.acl.entry(*handle).or_default().insert(who);
    }

    pub fn is_allowed(&self, handle: &CiphertextHandle, who: &Address) -> bool {
        self.acl
            .get(handle)
            .map(|allowed| allowed.contains(who))
            .unwrap_or(false)
    }

    /// Encrypts a plaintext input for `contract`, submitted by `sender`.
    pub fn register_input(&self, contract: Address, sender: Address, value: u64) -> EncryptedInput {
        let handle = self.store(value);
        self.pending_inputs.insert(handle, (contract, sender));
        EncryptedInput {
            handle,
            proof: InputProof(input_proof(&handle, &contract, &sender).to_vec()),
        }
    }

    /// Accepts an input exactly once, for the (contract, sender) it was built for.
    /// On success `contract` is granted access to the handle.
    pub fn verify_input(
        &self,
        input: &EncryptedInput,
        contract: Address,
        sender: Address,
    ) -> Result<CiphertextHandle, RelayerError> {
        let expected = input_proof(&input.handle, &contract, &sender);
        if input.proof.0.as_slice() != expected.as_slice() {
            return Err(RelayerError::InvalidInputProof);
        }
        match self.pending_inputs.remove(&input.handle) {
            Some((_, binding)) if binding == (contract, sender) => {
                self.allow(&input.handle, contract);
                Ok(input.handle)
            }
            _ => Err(RelayerError::InvalidInputProof),
        }
    }

    /// Relayer-side checks for a user decryption, returning the plaintexts.
    pub fn authorize(
        &self,
        request: &DecryptWireRequest,
        now: u64,
    ) -> Result<Vec<(CiphertextHandle, u64)>, RelayerError> {
        let authorization = request.authorization();

        if !request.signature.verify(&authorization.digest()) {
            return Err(RelayerError::InvalidSignature);
        }
        let signer = request.signature.signer();
        if signer != request.user {
            return Err(RelayerError::IdentityMismatch {
                signer,
                user: request.user,
            });
        }
        authorization.validate_at(now)?;

        let mut values = Vec::with_capacity(request.handles.len());
        for pair in &request.handles {
            if !authorization.covers(&pair.contract_address) {
                return Err(RelayerError::ContractNotAuthorized(pair.contract_address));
            }
            if pair.handle == ZERO_HANDLE {
                values.push((pair.handle, 0));
                continue;
            }
            for who in [&request.user, &pair.contract_address] {
                if !self.is_allowed(&pair.handle, who) {
                    return Err(RelayerError::NotAllowed(*who, pair.handle));
                }
            }
            values.push((pair.handle, self.value_of(&pair.handle)?));
        }
        Ok(values)
    }
}

/// H(tag || handle || contract || sender)
fn input_proof(handle: &CiphertextHandle, contract: &Address, sender: &Address) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(INPUT_PROOF_TAG);
    hasher.update(handle.as_bytes());
    hasher.update(contract.as_bytes());
    hasher.update(sender.as_bytes());
    hasher.finalize().into()
}

/// Encryption service backed by an in-process [`Coprocessor`].
#[derive(Debug, Clone)]
pub struct LocalEncryptionService {
    coprocessor: Arc<Coprocessor>,
}

impl LocalEncryptionService {
    pub fn new(coprocessor: Arc<Coprocessor>) -> Self {
        Self { coprocessor }
    }

    pub fn coprocessor(&self) -> &Arc<Coprocessor> {
        &self.coprocessor
    }

    /// Checks a wire request and seals the values to its public key.
    pub fn reencrypt(
        &self,
        request: &DecryptWireRequest,
        now: u64,
    ) -> Result<SealedValues, RelayerError> {
        let values: Vec<([u8; 32], u64)> = self
            .coprocessor
            .authorize(request, now)?
            .into_iter()
            .map(|(handle, value)| (handle.0, value))
            .collect();
        seal_values(&request.public_key, &values)
    }
}

#[async_trait]
impl EncryptionService for LocalEncryptionService {
    fn status(&self) -> ServiceStatus {
        ServiceStatus::Ready
    }

    async fn encrypt_input(
        &self,
        contract: Address,
        sender: Address,
        value: u64,
    ) -> Result<EncryptedInput, RelayerError> {
        Ok(self.coprocessor.register_input(contract, sender, value))
    }

    async fn user_decrypt(
        &self,
        request: UserDecryptRequest,
    ) -> Result<HashMap<CiphertextHandle, u64>, RelayerError> {
        let (wire, keypair) = request.into_wire()?;
        let sealed = self.reencrypt(&wire, unix_now())?;
        let opened = keypair.open(&sealed)?;
        Ok(opened
            .into_iter()
            .map(|(binding, value)| (CiphertextHandle(binding), value))
            .collect())
    }
}
