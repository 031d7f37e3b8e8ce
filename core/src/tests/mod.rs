//! End-to-end tests over the in-memory ledger and local encryption service.


use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cfund_keypair::Keypair;
use cfund_relayer::{
    Coprocessor, EncryptionService, LocalEncryptionService, RelayerError, ServiceStatus,
    UserDecryptRequest,
};
use cfund_types::{Address, CiphertextHandle, EncryptedInput};
use tokio::sync::{Semaphore, broadcast};

use crate::decryption::{DecryptKey, DecryptState, StateChange};
use crate::ledger::InMemoryLedger;
use crate::session::{FundraisingSession, SessionSettings};

/// Local service that counts calls, can pretend to be initializing, and can
/// hold relayer calls until the test releases them.
pub struct TestService {
    inner: LocalEncryptionService,
    pub encrypt_calls: AtomicUsize,
    pub decrypt_calls: AtomicUsize,
    ready: AtomicBool,
    gate: Option<Arc<Semaphore>>,
}

impl TestService {
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Lets `n` held relayer calls through
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }
}

#[async_trait]
impl EncryptionService for TestService {
    fn status(&self) -> ServiceStatus {
        if self.ready.load(Ordering::SeqCst) {
            self.inner.status()
        } else {
            ServiceStatus::Initializing
        }
    }

    async fn encrypt_input(
        &self,
        contract: Address,
        sender: Address,
        value: u64,
    ) -> Result<EncryptedInput, RelayerError> {
        self.encrypt_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.encrypt_input(contract, sender, value).await
    }

    async fn user_decrypt(
        &self,
        request: UserDecryptRequest,
    ) -> Result<HashMap<CiphertextHandle, u64>, RelayerError> {
        self.decrypt_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| RelayerError::Unavailable(e.to_string()))?;
            permit.forget();
        }
        self.inner.user_decrypt(request).await
    }
}

/// One ledger and one encryption service shared by any number of wallets.
pub struct Harness {
    pub ledger: Arc<InMemoryLedger>,
    pub service: Arc<TestService>,
    pub settings: SessionSettings,
}

impl Harness {
    fn build(gate: Option<Arc<Semaphore>>, block_time: Option<Duration>) -> Self {
        let settings = SessionSettings::default();
        let coprocessor = Arc::new(Coprocessor::new());
        let mut ledger = InMemoryLedger::new(
            settings.contracts.fundraising,
            settings.contracts.token,
            coprocessor.clone(),
        );
        if let Some(block_time) = block_time {
            ledger = ledger.with_block_time(block_time);
        }
        let ledger = Arc::new(ledger);
        let service = Arc::new(TestService {
            inner: LocalEncryptionService::new(coprocessor),
            encrypt_calls: AtomicUsize::new(0),
            decrypt_calls: AtomicUsize::new(0),
            ready: AtomicBool::new(true),
            gate,
        });
        Self {
            ledger,
            service,
            settings,
        }
    }

    pub fn new() -> Self {
        Self::build(None, None)
    }

    /// Relayer calls block until [`TestService::release`]
    pub fn gated() -> Self {
        Self::build(Some(Arc::new(Semaphore::new(0))), None)
    }

    /// Every write takes `block_time` to become final
    pub fn with_block_time(block_time: Duration) -> Self {
        Self::build(None, Some(block_time))
    }

    pub fn session(&self, wallet: Keypair) -> Arc<FundraisingSession> {
        Arc::new(FundraisingSession::new(
            self.ledger.clone(),
            self.service.clone(),
            Arc::new(wallet),
            self.settings,
        ))
    }
}

pub fn wallet(seed: u8) -> Keypair {
    Keypair::from_seed(&[seed; 32])
}

/// Waits (bounded) until `key` publishes `state`
pub async fn wait_for(
    rx: &mut broadcast::Receiver<StateChange>,
    key: DecryptKey,
    state: DecryptState,
) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let change = rx.recv().await.expect("event channel closed");
            if change.key == key && change.state == state {
                return;
            }
        }
    })
    .await
    .expect("timed out waiting for state change");
}

pub fn drain(rx: &mut broadcast::Receiver<StateChange>) -> Vec<DecryptState> {
    let mut states = Vec::new();
    while let Ok(change) = rx.try_recv() {
        states.push(change.state);
    }
    states
}
