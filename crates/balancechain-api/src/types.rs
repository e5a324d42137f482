use serde::{Deserialize, Serialize};

/// Chain position summary returned by `balancechain_getChainStatus`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcChainStatus {
    pub head: String,
    pub len: u64,
    pub read_only: bool,
    pub read_only_reason: Option<String>,
}

/// JSON-serializable message view, mirroring `balancechain_core::MessageView`
/// with direction/kind rendered as plain strings for RPC consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcMessageView {
    pub id: String,
    pub seq: u64,
    pub ts: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub peer: String,
    pub direction: String,
    pub tag: Option<String>,
    pub text: String,
    pub author: String,
    pub decision: Option<String>,
    pub outcome: Option<String>,
    pub scores: Option<serde_json::Value>,
}

/// Quota availability returned by `balancechain_getCapsAvailability`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcCapsAvailability {
    pub daily_available: u32,
    pub monthly_available: u32,
    pub yearly_available: u32,
    pub unlocked_balance: i64,
}

/// JSON-serializable capsule summary returned by the capsule list methods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcCapsule {
    pub id: String,
    pub owner_hid: String,
    pub session_id: String,
    pub rich_score: f64,
    pub business_score: f64,
    pub ecf_score: f64,
    pub motivator: String,
    pub category: String,
    pub status: String,
    pub created_at: i64,
    pub rejection_reason: Option<String>,
    pub mint_seq: Option<u64>,
}

/// TVM balance returned by `balancechain_getTvmBalance`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcTvmBalance {
    pub hid_milli: i64,
    pub balance: f64,
}
