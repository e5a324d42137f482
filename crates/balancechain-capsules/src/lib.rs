//! Capsule lifecycle: create a scored summary of a qualifying session,
//! decide eligibility, and mint it into a `capsule.mint` segment that
//! credits TVM. A thin service type that borrows the store and chain it
//! operates on rather than owning them.

use balancechain_chain::{Chain, CommitOptions};
use balancechain_core::constants::{
    CAPSULE_SIMILARITY_THRESHOLD, MIN_BUSINESS_SCORE, MIN_ECF_SCORE, MIN_RICH_SCORE,
    SESSION_MESSAGE_LIMIT, SIMILARITY_WEIGHT_BUSINESS, SIMILARITY_WEIGHT_CATEGORY,
    SIMILARITY_WEIGHT_ECF, SIMILARITY_WEIGHT_MOTIVATOR, SIMILARITY_WEIGHT_RICH,
    SIMILARITY_WEIGHT_TOTAL, TVM_PER_CAPSULE_MILLI,
};
use balancechain_core::segment::payload;
use balancechain_core::{Capsule, CapsuleStatus, Category, Hid, SegmentType, TimestampMs, TvmBalance};
use balancechain_crypto::{canonical_json, sha256_hex};
use balancechain_store::Store;
use serde_json::json;

/// Everything `create` needs about the originating session, handed in by
/// the caller rather than re-derived here — scoring is out of scope for
/// this crate, which only decides eligibility and persists the result.
pub struct SessionAnalysis {
    pub session_id: String,
    pub owner_hid: Hid,
    pub message_texts: Vec<String>,
    pub message_count: usize,
    pub motivator: String,
    pub category: Category,
    pub rich_score: f64,
    pub business_score: f64,
    pub ecf_score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MintError {
    NotPending,
    NoLongerEligible(String),
    Commit(String),
}

impl std::fmt::Display for MintError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MintError::NotPending => write!(f, "capsule is not in pending status"),
            MintError::NoLongerEligible(reason) => write!(f, "capsule is no longer eligible: {reason}"),
            MintError::Commit(reason) => write!(f, "commit failed: {reason}"),
        }
    }
}

impl std::error::Error for MintError {}

pub struct CapsuleService<'a> {
    store: &'a Store,
}

impl<'a> CapsuleService<'a> {
    pub fn new(store: &'a Store) -> Self {
        CapsuleService { store }
    }

    /// Check the minting eligibility predicate, returning the rejection
    /// reason when it fails.
    pub fn check_eligibility(analysis: &SessionAnalysis) -> Result<(), String> {
        if analysis.rich_score < MIN_RICH_SCORE {
            return Err(format!("rich_score {} below minimum {}", analysis.rich_score, MIN_RICH_SCORE));
        }
        if analysis.business_score < MIN_BUSINESS_SCORE {
            return Err(format!(
                "business_score {} below minimum {}",
                analysis.business_score, MIN_BUSINESS_SCORE
            ));
        }
        if analysis.ecf_score < MIN_ECF_SCORE {
            return Err(format!("ecf_score {} below minimum {}", analysis.ecf_score, MIN_ECF_SCORE));
        }
        if analysis.message_count < SESSION_MESSAGE_LIMIT {
            return Err(format!(
                "message_count {} below minimum {}",
                analysis.message_count, SESSION_MESSAGE_LIMIT
            ));
        }
        Ok(())
    }

    /// Compute the content hash, decide eligibility, and persist a new
    /// capsule in `pending` or `rejected` status.
    pub fn create(&self, analysis: SessionAnalysis, created_at: TimestampMs) -> Result<Capsule, balancechain_store::error::StoreError> {
        let content_hash = content_hash(&analysis);
        let (status, rejection_reason) = match Self::check_eligibility(&analysis) {
            Ok(()) => (CapsuleStatus::Pending, None),
            Err(reason) => (CapsuleStatus::Rejected, Some(reason)),
        };

        let capsule = Capsule {
            id: format!("capsule-{}", &content_hash[..16]),
            owner_hid: analysis.owner_hid,
            session_id: analysis.session_id,
            rich_score: analysis.rich_score,
            business_score: analysis.business_score,
            ecf_score: analysis.ecf_score,
            motivator: analysis.motivator,
            category: analysis.category,
            content_hash,
            status,
            created_at,
            rejection_reason,
            mint_seq: None,
        };

        self.store.put_capsule(&capsule)?;
        Ok(capsule)
    }

    /// Mint a pending, still-eligible capsule: commit a `capsule.mint`
    /// segment, mark the capsule minted, and credit one TVM to its owner.
    pub fn mint(&self, mut capsule: Capsule, chain: &Chain<'_>, now_ms: TimestampMs) -> Result<(Capsule, TvmBalance), MintError> {
        if capsule.status != CapsuleStatus::Pending {
            return Err(MintError::NotPending);
        }

        let analysis = SessionAnalysis {
            session_id: capsule.session_id.clone(),
            owner_hid: capsule.owner_hid.clone(),
            message_texts: Vec::new(),
            message_count: SESSION_MESSAGE_LIMIT,
            motivator: capsule.motivator.clone(),
            category: capsule.category,
            rich_score: capsule.rich_score,
            business_score: capsule.business_score,
            ecf_score: capsule.ecf_score,
        };
        if let Err(reason) = Self::check_eligibility(&analysis) {
            return Err(MintError::NoLongerEligible(reason));
        }

        let outcome = chain.commit(
            SegmentType::CapsuleMint,
            payload::capsule_mint(
                &capsule.id,
                &capsule.session_id,
                capsule.rich_score,
                capsule.business_score,
                &capsule.content_hash,
            ),
            now_ms,
            CommitOptions::default(),
        );

        if !outcome.ok {
            return Err(MintError::Commit(outcome.reason.unwrap_or_default()));
        }

        capsule.status = CapsuleStatus::Minted;
        capsule.mint_seq = outcome.seq;
        self.store
            .put_capsule(&capsule)
            .map_err(|e| MintError::Commit(e.to_string()))?;

        let balance = self
            .store
            .credit_tvm_balance(&capsule.owner_hid, TVM_PER_CAPSULE_MILLI)
            .map_err(|e| MintError::Commit(e.to_string()))?;

        Ok((capsule, balance))
    }
}

fn content_hash(analysis: &SessionAnalysis) -> String {
    let joined = analysis.message_texts.join("|");
    let canonical = canonical_json(&json!({
        "messageTexts": joined,
        "motivator": analysis.motivator,
        "category": analysis.category,
        "richScore": analysis.rich_score,
    }))
    .expect("capsule hash input is always serializable JSON");
    sha256_hex(canonical.as_bytes())
}

/// Weighted similarity between two capsules, normalized to `[0, 1]`.
pub fn similarity(a: &Capsule, b: &Capsule) -> f64 {
    let motivator_match = if a.motivator == b.motivator { 1.0 } else { 0.0 };
    let category_match = if a.category == b.category { 1.0 } else { 0.0 };
    let rich_proximity = 1.0 - (a.rich_score - b.rich_score).abs() / 100.0;
    let business_proximity = 1.0 - (a.business_score - b.business_score).abs() / 100.0;
    let ecf_proximity = (1.0 - (a.ecf_score - b.ecf_score).abs()).max(0.0);

    let weighted = SIMILARITY_WEIGHT_MOTIVATOR * motivator_match
        + SIMILARITY_WEIGHT_CATEGORY * category_match
        + SIMILARITY_WEIGHT_RICH * rich_proximity
        + SIMILARITY_WEIGHT_BUSINESS * business_proximity
        + SIMILARITY_WEIGHT_ECF * ecf_proximity;

    weighted / SIMILARITY_WEIGHT_TOTAL
}

/// Whether `candidate` should be marked recyclable against an already
/// minted `existing` capsule.
pub fn is_recyclable(existing: &Capsule, candidate: &Capsule) -> bool {
    existing.status == CapsuleStatus::Minted && similarity(existing, candidate) >= CAPSULE_SIMILARITY_THRESHOLD
}
