use serde::{Deserialize, Serialize};

use crate::{Address, CiphertextHandle, ZERO_HANDLE};

/// Ledger-assigned campaign identifier.
pub type CampaignId = u64;

/// Which encrypted value of a campaign is being looked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    /// Total raised by the campaign
    Raised,
    /// The viewer's accumulated points in the campaign
    Points,
}

/// Campaign metadata as stored by the fundraising contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignRecord {
    pub id: CampaignId,
    pub title: String,
    pub description: String,
    /// Goal in base units
    pub goal: u64,
    pub creator: Address,
    pub active: bool,
}

/// A campaign together with its ciphertext handles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub title: String,
    pub description: String,
    pub goal: u64,
    pub creator: Address,
    pub active: bool,
    pub raised_handle: CiphertextHandle,
    /// Only present when the list was fetched for a viewer
    pub user_points_handle: Option<CiphertextHandle>,
}

impl Campaign {
    pub fn from_record(
        record: CampaignRecord,
        raised_handle: CiphertextHandle,
        user_points_handle: Option<CiphertextHandle>,
    ) -> Self {
        Self {
            id: record.id,
            title: record.title,
            description: record.description,
            goal: record.goal,
            creator: record.creator,
            active: record.active,
            raised_handle,
            user_points_handle,
        }
    }

    /// Handle backing the given value kind. A missing points handle reads as zero.
    pub fn handle_for(&self, kind: ValueKind) -> CiphertextHandle {
        match kind {
            ValueKind::Raised => self.raised_handle,
            ValueKind::Points => self.user_points_handle.unwrap_or(ZERO_HANDLE),
        }
    }
}

/// Encodes a campaign id as one 32-byte big-endian word.
pub fn encode_campaign_payload(id: CampaignId) -> Vec<u8> {
    let mut word = vec![0u8; 32];
    word[24..].copy_from_slice(&id.to_be_bytes());
    word
}

/// Inverse of [`encode_campaign_payload`]. Rejects ids wider than 64 bits.
pub fn decode_campaign_payload(data: &[u8]) -> Option<CampaignId> {
    if data.len() != 32 || data[..24].iter().any(|b| *b != 0) {
        return None;
    }
    let id_bytes: [u8; 8] = data[24..].try_into().ok()?;
    Some(u64::from_be_bytes(id_bytes))
}
