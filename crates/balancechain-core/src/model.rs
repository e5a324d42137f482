use crate::types::{Hid, Seq, TimestampMs};
use serde::{Deserialize, Serialize};

/// Per-identity rolling quota counters, one record per `hid`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapsRecord {
    pub hid: Hid,
    pub daily: u32,
    pub monthly: u32,
    pub yearly: u32,
    pub total: u64,
    pub daily_reset_at: TimestampMs,
    pub monthly_reset_at: TimestampMs,
    pub yearly_reset_at: TimestampMs,
}

impl CapsRecord {
    pub fn fresh(hid: Hid, daily_reset_at: TimestampMs, monthly_reset_at: TimestampMs, yearly_reset_at: TimestampMs) -> Self {
        CapsRecord {
            hid,
            daily: 0,
            monthly: 0,
            yearly: 0,
            total: 0,
            daily_reset_at,
            monthly_reset_at,
            yearly_reset_at,
        }
    }
}

/// A single nonce-log entry. Membership is checked before every append;
/// entries older than the purge age may be dropped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NonceLogEntry {
    pub nonce: String,
    pub timestamp: TimestampMs,
}

/// Lifecycle status of a capsule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapsuleStatus {
    Pending,
    Minted,
    Rejected,
}

/// Business-type category tag detected from session text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Wheat,
    Tomato,
}

/// A summary record minted from a qualifying conversation session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Capsule {
    pub id: String,
    pub owner_hid: Hid,
    pub session_id: String,
    pub rich_score: f64,
    pub business_score: f64,
    pub ecf_score: f64,
    pub motivator: String,
    pub category: Category,
    pub content_hash: String,
    pub status: CapsuleStatus,
    pub created_at: TimestampMs,
    pub rejection_reason: Option<String>,
    pub mint_seq: Option<Seq>,
}

/// Per-identity TVM balance, stored as a fixed-point integer of
/// milli-units (1 TVM = 1000 milli) to keep ledger arithmetic exact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TvmBalance {
    pub hid_milli: i64,
}

impl TvmBalance {
    pub fn zero() -> Self {
        TvmBalance { hid_milli: 0 }
    }

    pub fn as_f64(self) -> f64 {
        self.hid_milli as f64 / 1000.0
    }

    pub fn credit_milli(&mut self, milli: i64) {
        self.hid_milli += milli;
    }
}

/// Message direction relative to the owning identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

/// A derived per-chat view row, projected from message-carrying segments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageView {
    pub id: String,
    pub seq: Seq,
    pub ts: TimestampMs,
    #[serde(rename = "type")]
    pub kind: String,
    pub peer: String,
    pub direction: Direction,
    pub tag: Option<String>,
    pub text: String,
    pub author: Hid,
    pub decision: Option<String>,
    pub outcome: Option<String>,
    pub scores: Option<serde_json::Value>,
}

/// In-memory score projection maintained by the commit path.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreProjection {
    pub rich_score: f64,
    pub business_score: f64,
}

impl Default for ScoreProjection {
    fn default() -> Self {
        ScoreProjection {
            rich_score: 0.0,
            business_score: 0.0,
        }
    }
}

impl ScoreProjection {
    pub fn clip(value: f64) -> f64 {
        value.clamp(0.0, 100.0)
    }
}

/// Persistent read-only latch set by integrity scans on critical/major
/// severity, cleared only by explicit operator action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReadOnlyLatch {
    pub enabled: bool,
    pub reason: String,
    pub timestamp: TimestampMs,
}
