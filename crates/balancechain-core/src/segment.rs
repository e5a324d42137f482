use crate::types::{AuthorRecord, Hid, NonceHex, Seq, SegmentRef, TimestampMs};
use serde::{Deserialize, Serialize};

/// Closed set of segment type tags. Serializes to the exact wire strings
/// used throughout the spec (`chat.user`, `tvm.transfer`, ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentType {
    #[serde(rename = "chat.user")]
    ChatUser,
    #[serde(rename = "ai.advice")]
    AiAdvice,
    #[serde(rename = "biz.decision")]
    BizDecision,
    #[serde(rename = "biz.outcome")]
    BizOutcome,
    #[serde(rename = "capsule.mint")]
    CapsuleMint,
    #[serde(rename = "tvm.transfer")]
    TvmTransfer,
    #[serde(rename = "chat.append-legacy")]
    ChatAppendLegacy,
}

impl SegmentType {
    /// Cap-affecting types increment the caps accountant on a successful commit.
    pub fn is_cap_affecting(self) -> bool {
        matches!(
            self,
            SegmentType::ChatUser
                | SegmentType::AiAdvice
                | SegmentType::BizDecision
                | SegmentType::CapsuleMint
        )
    }

    /// Message-bearing types get a row in the `messages` projection.
    pub fn is_message_bearing(self) -> bool {
        matches!(
            self,
            SegmentType::ChatUser | SegmentType::AiAdvice | SegmentType::ChatAppendLegacy
        )
    }

    pub fn wire_str(self) -> &'static str {
        match self {
            SegmentType::ChatUser => "chat.user",
            SegmentType::AiAdvice => "ai.advice",
            SegmentType::BizDecision => "biz.decision",
            SegmentType::BizOutcome => "biz.outcome",
            SegmentType::CapsuleMint => "capsule.mint",
            SegmentType::TvmTransfer => "tvm.transfer",
            SegmentType::ChatAppendLegacy => "chat.append-legacy",
        }
    }
}

/// A bounded-freshness attestation that the author is a live human, consumed
/// by validator rule 4. Structural checks only live in this crate; actual
/// biometric-assertion verification is delegated to a pluggable verifier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LivenessProof {
    #[serde(rename = "type")]
    pub kind: LivenessKind,
    pub timestamp: TimestampMs,
    pub assertion: Option<LivenessAssertion>,
    pub nonce: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LivenessKind {
    Webauthn,
    Timestamp,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LivenessAssertion {
    pub credential_id: String,
    pub authenticator_data: String,
    pub signature: String,
}

/// Pluggable verification for a [`LivenessProof`]'s `assertion`, consumed by
/// validator rule 4. Defined here rather than in a biometrics-specific crate
/// so the validator can depend on the contract without depending on any
/// particular WebAuthn implementation.
pub trait LivenessVerifier: Send + Sync {
    fn verify(&self, proof: &LivenessProof) -> bool;
}

/// The chain's atomic record: a signed state-transition action.
///
/// Field order here is not consensus-significant by itself — the canonical
/// encoder (in `balancechain-crypto`) re-sorts keys at every depth before
/// anything is hashed or signed — but the set of fields is.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub version: u32,
    pub seq: Seq,
    pub timestamp: TimestampMs,
    pub nonce: NonceHex,
    #[serde(rename = "type")]
    pub kind: SegmentType,
    pub payload: serde_json::Value,
    pub prev_hash: String,
    pub unlocker_ref: Option<SegmentRef>,
    pub unlocked_ref: Option<SegmentRef>,
    pub previous_owner: Option<Hid>,
    pub current_owner: Hid,
    pub author: AuthorRecord,
    /// Absent on the unsigned segment produced by `build`; present after `sign`.
    pub signature: Option<String>,
}

impl Segment {
    /// The fields that participate in signing/hashing, with `signature`
    /// dropped. Mirrors `signable(segment)` from the spec.
    pub fn signable_view(&self) -> SignableSegment<'_> {
        SignableSegment {
            version: self.version,
            seq: self.seq,
            timestamp: self.timestamp,
            nonce: &self.nonce,
            kind: self.kind,
            payload: &self.payload,
            prev_hash: &self.prev_hash,
            unlocker_ref: self.unlocker_ref.as_ref(),
            unlocked_ref: self.unlocked_ref.as_ref(),
            previous_owner: self.previous_owner.as_ref(),
            current_owner: &self.current_owner,
            author: &self.author,
        }
    }

    /// Structural pre-validation, run before the nine-rule validator.
    pub fn structural_check(&self) -> Result<(), &'static str> {
        if self.version < 1 {
            return Err("invalid_structure:version");
        }
        if self.seq < 1 {
            return Err("invalid_structure:seq");
        }
        if self.timestamp < 0 {
            return Err("invalid_structure:timestamp");
        }
        if !self.nonce.is_well_formed() {
            return Err("invalid_structure:nonce");
        }
        if !self.payload.is_object() {
            return Err("invalid_structure:payload");
        }
        if !self.current_owner.is_well_formed() {
            return Err("invalid_structure:current_owner");
        }
        if self.author.pubkey.is_empty() {
            return Err("invalid_structure:author");
        }
        if self.signature.is_none() {
            return Err("invalid_structure:signature");
        }
        Ok(())
    }
}

/// Borrowed view of a segment's signable fields, serialized the same way
/// the owned `Segment` minus `signature` would be.
#[derive(Serialize)]
pub struct SignableSegment<'a> {
    pub version: u32,
    pub seq: Seq,
    pub timestamp: TimestampMs,
    pub nonce: &'a NonceHex,
    #[serde(rename = "type")]
    pub kind: SegmentType,
    pub payload: &'a serde_json::Value,
    pub prev_hash: &'a str,
    pub unlocker_ref: Option<&'a SegmentRef>,
    pub unlocked_ref: Option<&'a SegmentRef>,
    pub previous_owner: Option<&'a Hid>,
    pub current_owner: &'a Hid,
    pub author: &'a AuthorRecord,
}

/// Type-specific payload builders so callers don't hand-assemble
/// `serde_json::Value` objects with typo-prone field names.
pub mod payload {
    use serde_json::{json, Value};

    pub fn chat_user(chat_id: &str, text: &str) -> Value {
        json!({ "chatId": chat_id, "text": text, "role": "user" })
    }

    pub fn ai_advice(chat_id: &str, text: &str) -> Value {
        json!({ "chatId": chat_id, "text": text, "role": "assistant" })
    }

    pub fn biz_decision(chat_id: &str, decision: &str, decision_seq: u64) -> Value {
        json!({ "chatId": chat_id, "decision": decision, "decisionSeq": decision_seq })
    }

    pub fn biz_outcome(chat_id: &str, outcome: &str, decision_seq: u64) -> Value {
        json!({ "chatId": chat_id, "outcome": outcome, "decisionSeq": decision_seq })
    }

    pub fn capsule_mint(
        capsule_id: &str,
        session_id: &str,
        rich_score: f64,
        business_score: f64,
        capsule_hash: &str,
    ) -> Value {
        json!({
            "capsuleId": capsule_id,
            "sessionId": session_id,
            "richScore": rich_score,
            "businessScore": business_score,
            "capsuleHash": capsule_hash,
        })
    }
}
