//! Ledger gateway client
//!
//! JSON over HTTP against a gateway node exposing the fundraising and token
//! contracts. Numbers travel as decimal strings and byte values as hex; both
//! are validated into typed values here, so a malformed response surfaces
//! as [`LedgerError::Malformed`].
//!
//! ```text
//! GET  /v1/campaigns                        -> [RawCampaign]
//! GET  /v1/campaigns/{id}/raised            -> RawHandle
//! GET  /v1/campaigns/{id}/points/{user}     -> RawHandle
//! GET  /v1/token/balances/{owner}           -> RawHandle
//! POST /v1/campaigns                        -> RawReceipt
//! POST /v1/campaigns/{id}/active            -> RawReceipt
//! POST /v1/token/transfer-and-call          -> RawReceipt
//! POST /v1/token/faucet                     -> RawReceipt
//! ```
//!
//! Write endpoints are called with `wait=finalized` and answer only once the
//! transaction is final or has reverted.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use cfund_relayer::client::ApiResponse;
use cfund_types::{Address, CampaignId, CampaignRecord, CiphertextHandle, EncryptedInput};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{Ledger, LedgerError, RevertReason, TxReceipt};

/// Configuration for the gateway client
#[derive(Debug, Clone)]
pub struct LedgerGatewayConfig {
    /// Base URL of the gateway (e.g., "http://127.0.0.1:8545")
    pub gateway_url: String,
    /// Per-request timeout; writes include the wait for finality
    pub request_timeout: Duration,
}

impl Default for LedgerGatewayConfig {
    fn default() -> Self {
        Self {
            gateway_url: "http://127.0.0.1:8545".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCampaign {
    pub id: String,
    pub title: String,
    pub description: String,
    pub goal: String,
    pub creator: String,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawHandle {
    pub handle: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Finalized,
    Reverted,
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawReceipt {
    pub tx_hash: String,
    pub block_number: String,
    pub status: TxStatus,
    #[serde(default)]
    pub revert: Option<RevertReason>,
}

#[derive(Debug, Serialize)]
struct CreateCampaignBody<'a> {
    from: Address,
    title: &'a str,
    description: &'a str,
    goal: String,
}

#[derive(Debug, Serialize)]
struct SetActiveBody {
    from: Address,
    active: bool,
}

#[derive(Debug, Serialize)]
struct TransferAndCallBody {
    from: Address,
    to: Address,
    input: EncryptedInput,
    #[serde(with = "hex::serde")]
    data: Vec<u8>,
}

#[derive(Debug, Serialize)]
struct FaucetBody {
    to: Address,
}

// ============================================================================
// Boundary Validation
// ============================================================================

fn parse_u64(field: &str, value: &str) -> Result<u64, LedgerError> {
    value
        .parse()
        .map_err(|_| LedgerError::Malformed(format!("{field}: expected unsigned integer, got {value:?}")))
}

pub fn parse_campaign(raw: RawCampaign) -> Result<CampaignRecord, LedgerError> {
    Ok(CampaignRecord {
        id: parse_u64("id", &raw.id)?,
        goal: parse_u64("goal", &raw.goal)?,
        creator: Address::from_str(&raw.creator)
            .map_err(|e| LedgerError::Malformed(format!("creator: {e}")))?,
        title: raw.title,
        description: raw.description,
        active: raw.active,
    })
}

pub fn parse_handle(raw: RawHandle) -> Result<CiphertextHandle, LedgerError> {
    CiphertextHandle::from_str(&raw.handle)
        .map_err(|e| LedgerError::Malformed(format!("handle: {e}")))
}

pub fn parse_receipt(raw: RawReceipt) -> Result<TxReceipt, LedgerError> {
    match raw.status {
        TxStatus::Finalized => {}
        TxStatus::Reverted => {
            let reason = raw
                .revert
                .unwrap_or_else(|| RevertReason::Other("no reason given".into()));
            return Err(LedgerError::Reverted(reason));
        }
        TxStatus::Pending => return Err(LedgerError::NotFinalized(raw.tx_hash)),
    }

    let hash_hex = raw.tx_hash.strip_prefix("0x").unwrap_or(&raw.tx_hash);
    let tx_hash: [u8; 32] = hex::decode(hash_hex)
        .ok()
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| LedgerError::Malformed(format!("tx_hash: {:?}", raw.tx_hash)))?;

    Ok(TxReceipt {
        tx_hash,
        block_number: parse_u64("block_number", &raw.block_number)?,
    })
}

// ============================================================================
// Client
// ============================================================================

/// Client for a remote ledger gateway
pub struct LedgerGatewayClient {
    config: LedgerGatewayConfig,
    client: reqwest::Client,
}

impl LedgerGatewayClient {
    pub fn new(config: LedgerGatewayConfig) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| LedgerError::Unavailable(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, LedgerError> {
        let url = format!("{}{}", self.config.gateway_url, path);
        debug!("GET {}", url);

        let response = self.client.get(&url).send().await.map_err(|e| {
            warn!("Ledger request to {} failed: {}", url, e);
            LedgerError::Unavailable(e.to_string())
        })?;
        Self::unwrap_response(response).await
    }

    async fn submit<B: Serialize>(&self, path: &str, body: &B) -> Result<TxReceipt, LedgerError> {
        let url = format!("{}{}", self.config.gateway_url, path);
        debug!("POST {} (waiting for finality)", url);

        let response = self
            .client
            .post(&url)
            .query(&[("wait", "finalized")])
            .json(body)
            .send()
            .await
            .map_err(|e| {
                warn!("Ledger submission to {} failed: {}", url, e);
                LedgerError::Unavailable(e.to_string())
            })?;

        let receipt = parse_receipt(Self::unwrap_response(response).await?)?;
        info!(
            "Transaction 0x{} finalized in block {}",
            hex::encode(receipt.tx_hash),
            receipt.block_number
        );
        Ok(receipt)
    }

    async fn unwrap_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, LedgerError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::Unavailable(format!("{status}: {body}")));
        }

        let api_response: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| LedgerError::Malformed(e.to_string()))?;

        match api_response {
            ApiResponse::Success { data } => Ok(data),
            ApiResponse::Error { message, code } => Err(LedgerError::Unavailable(format!(
                "{} ({})",
                message,
                code.unwrap_or_else(|| "unknown".to_string())
            ))),
        }
    }
}

#[async_trait]
impl Ledger for LedgerGatewayClient {
    async fn campaigns(&self) -> Result<Vec<CampaignRecord>, LedgerError> {
        let raw: Vec<RawCampaign> = self.get("/v1/campaigns").await?;
        raw.into_iter().map(parse_campaign).collect()
    }

    async fn campaign_raised(&self, id: CampaignId) -> Result<CiphertextHandle, LedgerError> {
        parse_handle(self.get(&format!("/v1/campaigns/{id}/raised")).await?)
    }

    async fn user_points(
        &self,
        id: CampaignId,
        user: Address,
    ) -> Result<CiphertextHandle, LedgerError> {
        parse_handle(self.get(&format!("/v1/campaigns/{id}/points/{user}")).await?)
    }

    async fn confidential_balance(&self, owner: Address) -> Result<CiphertextHandle, LedgerError> {
        parse_handle(self.get(&format!("/v1/token/balances/{owner}")).await?)
    }

    async fn create_campaign(
        &self,
        from: Address,
        title: &str,
        description: &str,
        goal: u64,
    ) -> Result<TxReceipt, LedgerError> {
        let body = CreateCampaignBody {
            from,
            title,
            description,
            goal: goal.to_string(),
        };
        self.submit("/v1/campaigns", &body).await
    }

    async fn set_campaign_active(
        &self,
        from: Address,
        id: CampaignId,
        active: bool,
    ) -> Result<TxReceipt, LedgerError> {
        self.submit(
            &format!("/v1/campaigns/{id}/active"),
            &SetActiveBody { from, active },
        )
        .await
    }

    async fn confidential_transfer_and_call(
        &self,
        from: Address,
        to: Address,
        input: EncryptedInput,
        data: Vec<u8>,
    ) -> Result<TxReceipt, LedgerError> {
        let body = TransferAndCallBody {
            from,
            to,
            input,
            data,
        };
        self.submit("/v1/token/transfer-and-call", &body).await
    }

    async fn faucet(&self, to: Address) -> Result<TxReceipt, LedgerError> {
        self.submit("/v1/token/faucet", &FaucetBody { to }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_campaign() -> RawCampaign {
        RawCampaign {
            id: "3".into(),
            title: "Save The Ocean".into(),
            description: "Funding coral reef restoration".into(),
            goal: "1000000".into(),
            creator: format!("0x{}", "ab".repeat(32)),
            active: true,
        }
    }

    #[test]
    fn test_parse_campaign() {
        let record = parse_campaign(raw_campaign()).unwrap();
        assert_eq!(record.id, 3);
        assert_eq!(record.goal, 1_000_000);
        assert_eq!(record.creator, Address([0xab; 32]));
    }

    #[test]
    fn test_parse_campaign_rejects_bad_fields() {
        let mut negative = raw_campaign();
        negative.goal = "-5".into();
        assert!(matches!(parse_campaign(negative), Err(LedgerError::Malformed(_))));

        let mut short_creator = raw_campaign();
        short_creator.creator = "0xabcd".into();
        assert!(matches!(
            parse_campaign(short_creator),
            Err(LedgerError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_handle() {
        let zero = RawHandle {
            handle: format!("0x{}", "00".repeat(32)),
        };
        assert!(parse_handle(zero).unwrap().is_zero());

        let garbage = RawHandle {
            handle: "not-hex".into(),
        };
        assert!(matches!(parse_handle(garbage), Err(LedgerError::Malformed(_))));
    }

    #[test]
    fn test_parse_receipt_statuses() {
        let finalized: RawReceipt = serde_json::from_str(&format!(
            r#"{{"tx_hash":"0x{}","block_number":"42","status":"finalized"}}"#,
            "11".repeat(32)
        ))
        .unwrap();
        let receipt = parse_receipt(finalized).unwrap();
        assert_eq!(receipt.block_number, 42);
        assert_eq!(receipt.tx_hash, [0x11; 32]);

        let reverted: RawReceipt = serde_json::from_str(&format!(
            r#"{{"tx_hash":"0x{}","block_number":"43","status":"reverted",
                "revert":{{"reason":"unauthorized","detail":"{}"}}}}"#,
            "22".repeat(32),
            "cd".repeat(32)
        ))
        .unwrap();
        assert_eq!(
            parse_receipt(reverted),
            Err(LedgerError::Reverted(RevertReason::Unauthorized(Address(
                [0xcd; 32]
            ))))
        );

        let pending = RawReceipt {
            tx_hash: "0x01".into(),
            block_number: "0".into(),
            status: TxStatus::Pending,
            revert: None,
        };
        assert!(matches!(parse_receipt(pending), Err(LedgerError::NotFinalized(_))));
    }

    #[test]
    fn test_transfer_body_encoding() {
        let body = TransferAndCallBody {
            from: Address([1u8; 32]),
            to: Address([2u8; 32]),
            input: EncryptedInput {
                handle: CiphertextHandle([3u8; 32]),
                proof: cfund_types::InputProof(vec![0xaa, 0xbb]),
            },
            data: cfund_types::encode_campaign_payload(7),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["input"]["proof"], "aabb");
        assert!(json["data"].as_str().unwrap().ends_with("07"));
    }
}
