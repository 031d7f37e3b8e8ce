//! Encryption service abstraction for confidential values.
//!
//! [`EncryptionService`] is the seam between the fundraising engine and the
//! network that holds ciphertexts: [`RelayerClient`] talks to a remote
//! relayer over HTTP, [`LocalEncryptionService`] runs everything in-process
//! for development and tests.

pub mod authorization;
pub mod client;
pub mod error;
pub mod keys;
pub mod local;
pub mod service;

pub use authorization::{AuthorizationRequest, DEFAULT_DURATION_DAYS, MAX_DURATION_DAYS, unix_now};
pub use client::{RelayerClient, RelayerConfig, RelayerInfo};
pub use error::RelayerError;
pub use keys::{EphemeralKeyPair, RelayerKey, SealedValues, seal_values};
pub use local::{Coprocessor, LocalEncryptionService};
pub use service::{
    DecryptWireRequest, EncryptionService, HandleContractPair, ServiceStatus, UserDecryptRequest,
};
