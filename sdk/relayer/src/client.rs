//! Relayer HTTP client
//!
//! ```text
//! GET  /v1/keyurl          -> RelayerInfo (input encryption key)
//! POST /v1/input-proof     -> EncryptedInput (handle + proof)
//! POST /v1/user-decrypt    -> SealedValues (sealed to the ephemeral key)
//! ```

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use cfund_types::{Address, CiphertextHandle, EncryptedInput};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::RelayerError;
use crate::keys::{SealedValues, seal_values};
use crate::service::{EncryptionService, ServiceStatus, UserDecryptRequest};

/// Configuration for the relayer client
#[derive(Debug, Clone)]
pub struct RelayerConfig {
    /// Base URL of the relayer (e.g., "http://127.0.0.1:7077")
    pub relayer_url: String,
    /// Per-request timeout (default: 30 seconds)
    pub request_timeout: Duration,
}

impl Default for RelayerConfig {
    fn default() -> Self {
        Self {
            relayer_url: "http://127.0.0.1:7077".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ApiResponse<T> {
    Success {
        data: T,
    },
    Error {
        message: String,
        code: Option<String>,
    },
}

/// Public parameters served by the relayer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayerInfo {
    pub version: String,
    /// X25519 key inputs are sealed to
    #[serde(with = "hex::serde")]
    pub encryption_key: [u8; 32],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputProofRequest {
    pub contract_address: Address,
    pub user: Address,
    pub sealed: SealedValues,
}

/// Binding a sealed input is authenticated against: H(contract || sender)
pub fn input_binding(contract: &Address, sender: &Address) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(contract.as_bytes());
    hasher.update(sender.as_bytes());
    hasher.finalize().into()
}

/// Client for a remote decryption relayer
pub struct RelayerClient {
    config: RelayerConfig,
    client: reqwest::Client,
    /// Set once by `connect`
    info: OnceLock<RelayerInfo>,
}

impl RelayerClient {
    pub fn new(config: RelayerConfig) -> Result<Self, RelayerError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| RelayerError::Unavailable(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            info: OnceLock::new(),
        })
    }

    /// Fetches the relayer's public parameters. Until this succeeds the
    /// client reports [`ServiceStatus::Initializing`].
    pub async fn connect(&self) -> Result<(), RelayerError> {
        if self.info.get().is_some() {
            return Ok(());
        }
        let url = format!("{}/v1/keyurl", self.config.relayer_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RelayerError::Unavailable(e.to_string()))?;
        let info: RelayerInfo = Self::unwrap_response(response).await?;

        info!("Connected to relayer {} (version {})", self.config.relayer_url, info.version);
        // A concurrent connect may have won; either value is the same relayer
        let _ = self.info.set(info);
        Ok(())
    }

    fn info(&self) -> Result<&RelayerInfo, RelayerError> {
        self.info.get().ok_or(RelayerError::NotInitialized)
    }

    async fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, RelayerError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", self.config.relayer_url, path);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                warn!("Relayer request to {} failed: {}", url, e);
                RelayerError::Unavailable(e.to_string())
            })?;

        Self::unwrap_response(response).await
    }

    async fn unwrap_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, RelayerError> {
        let status = response.status();
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayerError::Unavailable(format!("{status}: {body}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayerError::Remote {
                code: status.as_u16().to_string(),
                message: body,
            });
        }

        let api_response: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| RelayerError::InvalidResponse(e.to_string()))?;
        Self::into_result(api_response)
    }

    fn into_result<T>(api_response: ApiResponse<T>) -> Result<T, RelayerError> {
        match api_response {
            ApiResponse::Success { data } => Ok(data),
            ApiResponse::Error { message, code } => Err(RelayerError::Remote {
                code: code.unwrap_or_else(|| "unknown".to_string()),
                message,
            }),
        }
    }
}

#[async_trait]
impl EncryptionService for RelayerClient {
    fn status(&self) -> ServiceStatus {
        if self.info.get().is_some() {
            ServiceStatus::Ready
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
        let info = self.info()?;
        let sealed = seal_values(
            &info.encryption_key,
            &[(input_binding(&contract, &sender), value)],
        )?;
        let request = InputProofRequest {
            contract_address: contract,
            user: sender,
            sealed,
        };
        self.post("/v1/input-proof", &request).await
    }

    async fn user_decrypt(
        &self,
        request: UserDecryptRequest,
    ) -> Result<HashMap<CiphertextHandle, u64>, RelayerError> {
        self.info()?;
        let (wire, keypair) = request.into_wire()?;
        info!(
            "Requesting user decryption of {} handle(s) for {}",
            wire.handles.len(),
            wire.user
        );

        let sealed: SealedValues = self.post("/v1/user-decrypt", &wire).await?;
        let opened = keypair.open(&sealed)?;
        Ok(opened
            .into_iter()
            .map(|(binding, value)| (CiphertextHandle(binding), value))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorization::AuthorizationRequest;
    use crate::keys::EphemeralKeyPair;
    use crate::service::HandleContractPair;
    use cfund_keypair::Keypair;

    #[test]
    fn test_config_default() {
        let config = RelayerConfig::default();
        assert_eq!(config.relayer_url, "http://127.0.0.1:7077");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_not_ready_before_connect() {
        let client = RelayerClient::new(RelayerConfig::default()).unwrap();
        assert_eq!(client.status(), ServiceStatus::Initializing);

        let result = client
            .encrypt_input(Address([1u8; 32]), Address([2u8; 32]), 5)
            .await;
        assert_eq!(result, Err(RelayerError::NotInitialized));
    }

    #[test]
    fn test_api_response_parsing() {
        let ok: ApiResponse<RelayerInfo> = serde_json::from_str(&format!(
            r#"{{"status":"success","data":{{"version":"1.0","encryption_key":"{}"}}}}"#,
            "ab".repeat(32)
        ))
        .unwrap();
        let info = RelayerClient::into_result(ok).unwrap();
        assert_eq!(info.encryption_key, [0xab; 32]);

        let err: ApiResponse<RelayerInfo> =
            serde_json::from_str(r#"{"status":"error","message":"expired","code":"WINDOW"}"#)
                .unwrap();
        assert_eq!(
            RelayerClient::into_result(err).unwrap_err(),
            RelayerError::Remote {
                code: "WINDOW".into(),
                message: "expired".into()
            }
        );
    }

    #[test]
    fn test_wire_request_carries_no_secret() {
        let wallet = Keypair::new_random();
        let keypair = EphemeralKeyPair::generate();
        let public_key = keypair.public_key();
        let authorization =
            AuthorizationRequest::new(public_key, vec![Address([3u8; 32])], 100, 10);
        let request = UserDecryptRequest {
            handles: vec![HandleContractPair {
                handle: CiphertextHandle([4u8; 32]),
                contract_address: Address([3u8; 32]),
            }],
            keypair,
            signature: wallet.sign(&authorization.digest()),
            authorization,
            user: wallet.identity(),
        };

        let (wire, _keypair) = request.into_wire().unwrap();
        let json = serde_json::to_value(&wire).unwrap();
        let fields: Vec<&str> = json.as_object().unwrap().keys().map(|k| k.as_str()).collect();

        assert_eq!(json["public_key"], hex::encode(public_key));
        assert_eq!(json["duration_days"], 10);
        assert!(!fields.iter().any(|f| f.contains("private") || f.contains("secret")));
    }

    #[test]
    fn test_input_binding_depends_on_sender() {
        let contract = Address([1u8; 32]);
        assert_ne!(
            input_binding(&contract, &Address([2u8; 32])),
            input_binding(&contract, &Address([3u8; 32]))
        );
    }
}
