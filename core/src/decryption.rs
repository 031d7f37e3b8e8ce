//! Decryption orchestrator
//!
//! One state machine per (campaign, kind):
//!
//! ```text
//!            zero handle
//!   Idle ────────────────────────────────────────────────► Resolved(0)
//!     │
//!     ▼
//!   Requesting ──► AwaitingSignature ──► AwaitingRelayer ──► Resolved(v)
//!     │                  │                     │
//!     └──────────────────┴─────────────────────┴──────────► Failed(err)
//! ```
//!
//! While a key is busy (any state between Idle and a terminal state) a new
//! request for it is a no-op. Different keys never wait on each other.
//! An attempt that is dropped before finishing releases its key.
//! Resolved values are bound to the wallet they were released to; another
//! identity sees Idle and has to decrypt for itself.
//! The ephemeral key pair and the wallet signature live only inside one
//! attempt and are gone once it reaches a terminal state.

use std::sync::Arc;

use cfund_keypair::WalletSigner;
use cfund_relayer::{
    EncryptionService, HandleContractPair, RelayerError, ServiceStatus, UserDecryptRequest,
    unix_now,
};
use cfund_types::{Address, CampaignId, CiphertextHandle, ValueKind};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::{debug, info};
use tokio::sync::broadcast;

use crate::error::FundraisingError;

const EVENT_CAPACITY: usize = 64;

/// Identifies one decryptable value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DecryptKey {
    pub campaign_id: CampaignId,
    pub kind: ValueKind,
}

impl DecryptKey {
    pub fn raised(campaign_id: CampaignId) -> Self {
        Self {
            campaign_id,
            kind: ValueKind::Raised,
        }
    }

    pub fn points(campaign_id: CampaignId) -> Self {
        Self {
            campaign_id,
            kind: ValueKind::Points,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecryptState {
    Idle,
    Requesting,
    AwaitingSignature,
    AwaitingRelayer,
    Resolved(u64),
    Failed(FundraisingError),
}

impl DecryptState {
    /// True while an attempt is in flight
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            Self::Requesting | Self::AwaitingSignature | Self::AwaitingRelayer
        )
    }

    pub fn value(&self) -> Option<u64> {
        match self {
            Self::Resolved(v) => Some(*v),
            _ => None,
        }
    }
}

/// A state transition, as published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub key: DecryptKey,
    pub state: DecryptState,
}

struct CacheEntry {
    state: DecryptState,
    /// Handle the state belongs to
    handle: CiphertextHandle,
    /// Identity the value was released to
    viewer: Option<Address>,
    /// Invalidated while busy: the result goes to the caller only
    stale: bool,
}

impl CacheEntry {
    fn requesting(handle: CiphertextHandle, viewer: Option<Address>) -> Self {
        Self {
            state: DecryptState::Requesting,
            handle,
            viewer,
            stale: false,
        }
    }

    fn resolved(handle: CiphertextHandle, viewer: Option<Address>, value: u64) -> Self {
        Self {
            state: DecryptState::Resolved(value),
            handle,
            viewer,
            stale: false,
        }
    }

    /// The state as `viewer` may see it. Values released to another
    /// identity read as Idle.
    fn state_for(&self, viewer: Option<Address>) -> DecryptState {
        match self.state {
            DecryptState::Resolved(_) if self.viewer != viewer => DecryptState::Idle,
            _ => self.state.clone(),
        }
    }
}

/// Held for the lifetime of one attempt. If the attempt is dropped before
/// reaching a terminal state, the key is released so it can be retried.
struct InFlight<'a> {
    orchestrator: &'a DecryptionOrchestrator,
    key: DecryptKey,
    done: bool,
}

impl<'a> InFlight<'a> {
    fn claim(orchestrator: &'a DecryptionOrchestrator, key: DecryptKey) -> Self {
        Self {
            orchestrator,
            key,
            done: false,
        }
    }

    fn finish(mut self, state: DecryptState) {
        self.done = true;
        self.orchestrator.finish(self.key, state);
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let released = self
            .orchestrator
            .entries
            .remove_if(&self.key, |_, entry| entry.state.is_busy())
            .is_some();
        if released {
            debug!("Decrypt {:?} abandoned, key released", self.key);
            self.orchestrator.publish(self.key, DecryptState::Idle);
        }
    }
}

pub struct DecryptionOrchestrator {
    service: Arc<dyn EncryptionService>,
    signer: Arc<dyn WalletSigner>,
    fundraising: Address,
    duration_days: u64,
    entries: DashMap<DecryptKey, CacheEntry>,
    events: broadcast::Sender<StateChange>,
}

impl DecryptionOrchestrator {
    pub fn new(
        service: Arc<dyn EncryptionService>,
        signer: Arc<dyn WalletSigner>,
        fundraising: Address,
        duration_days: u64,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            service,
            signer,
            fundraising,
            duration_days,
            entries: DashMap::new(),
            events,
        }
    }

    /// Receives every transition from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.events.subscribe()
    }

    /// State of `key` as seen by the connected wallet
    pub fn state(&self, key: DecryptKey) -> DecryptState {
        let viewer = self.signer.address();
        self.entries
            .get(&key)
            .map(|e| e.state_for(viewer))
            .unwrap_or(DecryptState::Idle)
    }

    /// Cached plaintext, if resolved for the connected wallet
    pub fn value(&self, key: DecryptKey) -> Option<u64> {
        self.state(key).value()
    }

    /// Decrypts the value behind `handle` for the connected wallet.
    ///
    /// Returns `Ok(None)` without side effects when an attempt for `key` is
    /// already in flight. A value already resolved for the same handle and
    /// the same wallet is returned from cache.
    pub async fn decrypt(
        &self,
        key: DecryptKey,
        handle: CiphertextHandle,
    ) -> Result<Option<u64>, FundraisingError> {
        let viewer = self.signer.address();
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.state.is_busy() {
                    debug!("Decrypt {:?} already in flight, ignoring", key);
                    return Ok(None);
                }
                if entry.handle == handle && entry.viewer == viewer {
                    if let DecryptState::Resolved(value) = entry.state {
                        return Ok(Some(value));
                    }
                }
                if handle.is_zero() {
                    *entry = CacheEntry::resolved(handle, viewer, 0);
                } else {
                    *entry = CacheEntry::requesting(handle, viewer);
                }
            }
            Entry::Vacant(vacant) => {
                if handle.is_zero() {
                    vacant.insert(CacheEntry::resolved(handle, viewer, 0));
                } else {
                    vacant.insert(CacheEntry::requesting(handle, viewer));
                }
            }
        }

        if handle.is_zero() {
            self.publish(key, DecryptState::Resolved(0));
            return Ok(Some(0));
        }
        let in_flight = InFlight::claim(self, key);
        self.publish(key, DecryptState::Requesting);

        let outcome = self.attempt(key, handle, viewer).await;
        let terminal = match &outcome {
            Ok(value) => DecryptState::Resolved(*value),
            Err(e) => DecryptState::Failed(e.clone()),
        };
        in_flight.finish(terminal);
        outcome.map(Some)
    }

    /// One full round trip. Every exit drops the key pair and signature.
    async fn attempt(
        &self,
        key: DecryptKey,
        handle: CiphertextHandle,
        viewer: Option<Address>,
    ) -> Result<u64, FundraisingError> {
        let user = viewer.ok_or(FundraisingError::WalletUnavailable)?;
        if self.service.status() != ServiceStatus::Ready {
            return Err(FundraisingError::EncryptionServiceUnavailable(
                "relayer is not ready".into(),
            ));
        }

        let keypair = self.service.generate_keypair();
        let authorization = self.service.create_authorization(
            keypair.public_key(),
            vec![self.fundraising],
            unix_now(),
            self.duration_days,
        );

        self.transition(key, DecryptState::AwaitingSignature);
        let signature = self.signer.sign_digest(&authorization.digest()).await?;

        self.transition(key, DecryptState::AwaitingRelayer);
        let request = UserDecryptRequest {
            handles: vec![HandleContractPair {
                handle,
                contract_address: self.fundraising,
            }],
            keypair,
            signature,
            authorization,
            user,
        };
        let values = self
            .service
            .user_decrypt(request)
            .await
            .map_err(relayer_failure)?;

        values.get(&handle).copied().ok_or_else(|| {
            FundraisingError::DecryptionFailure(format!("relayer returned no value for {handle}"))
        })
    }

    fn transition(&self, key: DecryptKey, state: DecryptState) {
        if let Some(mut entry) = self.entries.get_mut(&key) {
            entry.state = state.clone();
        }
        self.publish(key, state);
    }

    /// Records a terminal state, unless the key was invalidated meanwhile
    fn finish(&self, key: DecryptKey, state: DecryptState) {
        let stale = self
            .entries
            .remove_if(&key, |_, entry| entry.stale)
            .is_some();
        if stale {
            debug!("Decrypt {:?} finished after invalidation, not cached", key);
        } else if let Some(mut entry) = self.entries.get_mut(&key) {
            entry.state = state.clone();
        }
        if let DecryptState::Resolved(_) = state {
            info!("Decrypted {:?} for campaign {}", key.kind, key.campaign_id);
        }
        self.publish(key, state);
    }

    fn publish(&self, key: DecryptKey, state: DecryptState) {
        debug!("{:?} -> {:?}", key, state);
        // No subscribers is fine
        let _ = self.events.send(StateChange { key, state });
    }

    /// Forgets one key. An in-flight attempt keeps its busy guard until it
    /// completes but its result is not cached.
    pub fn invalidate_key(&self, key: DecryptKey) {
        let busy = match self.entries.get_mut(&key) {
            Some(mut entry) if entry.state.is_busy() => {
                entry.stale = true;
                true
            }
            _ => false,
        };
        if !busy {
            self.entries.remove(&key);
        }
    }

    /// Forgets both values of a campaign
    pub fn invalidate(&self, campaign_id: CampaignId) {
        self.invalidate_key(DecryptKey::raised(campaign_id));
        self.invalidate_key(DecryptKey::points(campaign_id));
    }

    /// Forgets everything, e.g. when the viewer identity changes
    pub fn reset(&self) {
        self.entries.retain(|_, entry| {
            if entry.state.is_busy() {
                entry.stale = true;
                true
            } else {
                false
            }
        });
    }
}

fn relayer_failure(e: RelayerError) -> FundraisingError {
    if e.is_unavailable() {
        FundraisingError::EncryptionServiceUnavailable(e.to_string())
    } else {
        FundraisingError::DecryptionFailure(e.to_string())
    }
}
