//! The commit pipeline: build, sign, validate, persist, project. Stages a
//! segment, runs it through the nine-rule validator, then commits the
//! segment, nonce, and score projection together in a single append.

use balancechain_caps::{CapsAccountant, CapsViewAdapter};
use balancechain_core::constants::PROTOCOL_VERSION;
use balancechain_core::{
    AuthorRecord, BalanceChainError, Direction, Hid, LivenessVerifier, MessageView, NonceHex,
    ReadOnlyLatch, ScoreProjection, Segment, SegmentRef, SegmentType, Seq, Signer, TimestampMs,
};
use balancechain_crypto::{canonical_json, sha256_hex};
use balancechain_store::{CommitRequest, Store};
use balancechain_validator::{ChainView, ValidatorOptions};
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Mutex;

/// Options for one `commit` call.
#[derive(Default)]
pub struct CommitOptions<'a> {
    pub previous_owner: Option<Hid>,
    pub unlocker_ref: Option<SegmentRef>,
    pub unlocked_ref: Option<SegmentRef>,
    pub skip_liveness: bool,
    pub liveness_verifier: Option<&'a dyn LivenessVerifier>,
}

/// The structured, never-unwinding result of a commit attempt: every rule
/// failure returns a structured result rather than unwinding.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitOutcome {
    pub ok: bool,
    pub reason: Option<String>,
    pub seq: Option<Seq>,
    pub head: Option<String>,
}

impl CommitOutcome {
    fn failure(reason: impl Into<String>) -> Self {
        CommitOutcome {
            ok: false,
            reason: Some(reason.into()),
            seq: None,
            head: None,
        }
    }

    fn success(seq: Seq, head: String) -> Self {
        CommitOutcome {
            ok: true,
            reason: None,
            seq: Some(seq),
            head: Some(head),
        }
    }
}

/// A commit event, emitted strictly after the transaction commits.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitEvent {
    pub kind: SegmentType,
    pub seq: Seq,
    pub head: String,
}

/// One open chain handle per identity, constructed once at startup.
/// The commit critical section is guarded by an explicit mutex as the
/// in-process line of defense; the store's transaction serialization is the
/// storage-level second line.
pub struct Chain<'a> {
    store: &'a Store,
    caps: CapsAccountant<'a>,
    signer: &'a dyn Signer,
    commit_lock: Mutex<()>,
    scores: Mutex<HashMap<Hid, ScoreProjection>>,
    events: Mutex<Vec<CommitEvent>>,
}

impl<'a> Chain<'a> {
    pub fn new(store: &'a Store, signer: &'a dyn Signer) -> Self {
        Chain {
            store,
            caps: CapsAccountant::new(store),
            signer,
            commit_lock: Mutex::new(()),
            scores: Mutex::new(HashMap::new()),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Drain commit events recorded since the last call.
    pub fn drain_events(&self) -> Vec<CommitEvent> {
        std::mem::take(&mut self.events.lock().unwrap())
    }

    pub fn score_projection(&self, hid: &Hid) -> (f64, f64) {
        let scores = self.scores.lock().unwrap();
        let p = scores.get(hid).copied().unwrap_or_default();
        (p.rich_score, p.business_score)
    }

    /// Build, sign, validate, and persist one segment. Returns a structured
    /// outcome in every case — read-only mode, rule failure, and success all
    /// flow through the same type, never a panic or an unwound error.
    pub fn commit(
        &self,
        kind: SegmentType,
        payload: serde_json::Value,
        now_ms: TimestampMs,
        options: CommitOptions<'_>,
    ) -> CommitOutcome {
        let _guard = self.commit_lock.lock().unwrap();

        match self.store.read_only() {
            Ok(Some(latch)) if latch.enabled => {
                return CommitOutcome::failure("read_only_mode");
            }
            Ok(_) => {}
            Err(e) => return CommitOutcome::failure(format!("store_error:{e}")),
        }

        let prev_hash = match self.store.chain_head() {
            Ok(h) => h,
            Err(e) => return CommitOutcome::failure(format!("store_error:{e}")),
        };
        let seq = match self.store.chain_len() {
            Ok(len) => len + 1,
            Err(e) => return CommitOutcome::failure(format!("store_error:{e}")),
        };

        let hid = self.signer.hid();
        let mut nonce_bytes = [0u8; balancechain_core::constants::NONCE_LEN_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = NonceHex(hex::encode(nonce_bytes));

        let mut segment = Segment {
            version: PROTOCOL_VERSION,
            seq,
            timestamp: now_ms,
            nonce,
            kind,
            payload,
            prev_hash: prev_hash.clone(),
            unlocker_ref: options.unlocker_ref.clone(),
            unlocked_ref: options.unlocked_ref.clone(),
            previous_owner: options.previous_owner.clone(),
            current_owner: options.previous_owner.clone().unwrap_or_else(|| hid.clone()),
            author: AuthorRecord {
                hid: hid.clone(),
                pubkey: self.signer.pubkey(),
                algorithm: "ecdsa-p256-sha256".to_string(),
            },
            signature: None,
        };

        let signable = match canonical_json(&segment.signable_view()) {
            Ok(s) => s,
            Err(e) => return CommitOutcome::failure(format!("codec_error:{e}")),
        };
        segment.signature = Some(self.signer.sign(signable.as_bytes()));

        if let Err(code) = segment.structural_check() {
            return CommitOutcome::failure(code);
        }

        let view = StoreChainView(self.store);
        let validator_opts = ValidatorOptions {
            skip_liveness: options.skip_liveness,
            liveness_verifier: options.liveness_verifier,
            now_ms,
        };
        let caps_view = CapsViewAdapter(&self.caps);
        if let Err(validation_err) = balancechain_validator::validate(&segment, &view, &caps_view, &validator_opts) {
            return CommitOutcome::failure(validation_err.reason_code());
        }

        let signature_b64 = segment.signature.clone().unwrap();
        let new_head = sha256_hex(format!("{}|{}", signable, signature_b64).as_bytes());

        let message_view = if segment.kind.is_message_bearing() {
            Some(build_message_view(&segment, &nonce_id(&segment)))
        } else {
            None
        };

        let cap_affecting = segment.kind.is_cap_affecting();
        let next_caps = if cap_affecting {
            match self.caps.compute_increment(&hid, 1, now_ms) {
                Ok(record) => Some(record),
                Err(e) => return CommitOutcome::failure(format!("caps_error:{e}")),
            }
        } else {
            None
        };

        let commit_result = self.store.commit_append(CommitRequest {
            expected_prev_hash: prev_hash,
            expected_seq: seq,
            segment: &segment,
            message_view,
            new_head: new_head.clone(),
            next_caps,
        });

        match commit_result {
            Ok(()) => {
                if cap_affecting {
                    self.caps.invalidate_cache();
                }
                self.apply_score_rules(&segment);
                self.events.lock().unwrap().push(CommitEvent {
                    kind: segment.kind,
                    seq,
                    head: new_head.clone(),
                });
                tracing::info!(seq, head = %new_head, kind = segment.kind.wire_str(), "segment committed");
                CommitOutcome::success(seq, new_head)
            }
            Err(balancechain_store::error::StoreError::Conflict) => {
                CommitOutcome::failure("commit_error")
            }
            Err(e) => CommitOutcome::failure(format!("store_error:{e}")),
        }
    }

    fn apply_score_rules(&self, segment: &Segment) {
        if let Some(explicit) = segment.payload.get("scores") {
            if let (Some(rich), Some(biz)) = (
                explicit.get("richScore").and_then(|v| v.as_f64()),
                explicit.get("businessScore").and_then(|v| v.as_f64()),
            ) {
                let mut scores = self.scores.lock().unwrap();
                let entry = scores.entry(segment.author.hid.clone()).or_default();
                entry.rich_score = ScoreProjection::clip(rich);
                entry.business_score = ScoreProjection::clip(biz);
                return;
            }
        }

        let mut scores = self.scores.lock().unwrap();
        let entry = scores.entry(segment.author.hid.clone()).or_default();

        match segment.kind {
            SegmentType::BizDecision => {
                if segment.payload.get("decision").and_then(|v| v.as_str()) == Some("ACCEPT") {
                    entry.rich_score = ScoreProjection::clip(entry.rich_score + 2.0);
                }
            }
            SegmentType::BizOutcome => {
                if segment.payload.get("outcome").and_then(|v| v.as_str()) == Some("SUCCESS") {
                    entry.rich_score = ScoreProjection::clip(entry.rich_score + 5.0);
                    entry.business_score = ScoreProjection::clip(entry.business_score + 3.0);
                }
            }
            _ => {}
        }
    }

    /// Replay every segment in order, regenerating score projections from
    /// scratch. Used on startup and after restore.
    pub fn rebuild_projections(&self) -> Result<(), BalanceChainError> {
        let segments = self.store.iter_all_segments()?;
        self.scores.lock().unwrap().clear();
        for segment in &segments {
            self.apply_score_rules(segment);
        }
        Ok(())
    }
}

fn nonce_id(segment: &Segment) -> String {
    format!("{}:{}", segment.seq, segment.nonce.0)
}

fn build_message_view(segment: &Segment, id: &str) -> MessageView {
    let peer = segment
        .payload
        .get("chatId")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();
    let text = segment
        .payload
        .get("text")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let direction = match segment.kind {
        SegmentType::AiAdvice => Direction::In,
        _ => Direction::Out,
    };

    MessageView {
        id: id.to_string(),
        seq: segment.seq,
        ts: segment.timestamp,
        kind: segment.kind.wire_str().to_string(),
        peer,
        direction,
        tag: None,
        text,
        author: segment.author.hid.clone(),
        decision: segment.payload.get("decision").and_then(|v| v.as_str()).map(String::from),
        outcome: segment.payload.get("outcome").and_then(|v| v.as_str()).map(String::from),
        scores: segment.payload.get("scores").cloned(),
    }
}

struct StoreChainView<'a>(&'a Store);

impl<'a> ChainView for StoreChainView<'a> {
    fn chain_head(&self) -> String {
        self.0.chain_head().unwrap_or_else(|_| "GENESIS".to_string())
    }

    fn chain_len(&self) -> u64 {
        self.0.chain_len().unwrap_or(0)
    }

    fn segment_by_ref(&self, seq: u64) -> Option<Segment> {
        self.0.get_segment(seq).ok().flatten()
    }

    fn previous_segment(&self) -> Option<Segment> {
        let len = self.0.chain_len().ok()?;
        if len == 0 {
            return None;
        }
        self.0.get_segment(len).ok().flatten()
    }

    fn contains_nonce(&self, nonce: &str) -> bool {
        self.0.contains_nonce(nonce).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use balancechain_core::segment::payload;
    use balancechain_crypto::KeyPair;

    struct TestSigner(KeyPair);
    impl Signer for TestSigner {
        fn sign(&self, signable: &[u8]) -> String {
            self.0.sign(signable)
        }
        fn hid(&self) -> Hid {
            self.0.hid()
        }
        fn pubkey(&self) -> String {
            self.0.public_key_b64.clone()
        }
    }

    fn temp_store() -> Store {
        let dir = tempfile::tempdir().unwrap();
        Store::open(dir.path()).unwrap()
    }

    #[test]
    fn first_commit_gets_seq_one_and_genesis_prev_hash() {
        let store = temp_store();
        let signer = TestSigner(KeyPair::generate());
        let chain = Chain::new(&store, &signer);

        let outcome = chain.commit(
            SegmentType::ChatUser,
            payload::chat_user("c1", "hello"),
            1_700_000_000_000,
            CommitOptions {
                skip_liveness: true,
                ..Default::default()
            },
        );

        assert!(outcome.ok);
        assert_eq!(outcome.seq, Some(1));
        assert_eq!(store.chain_len().unwrap(), 1);
    }

    #[test]
    fn rate_limited_second_commit_fails_without_side_effect() {
        let store = temp_store();
        let signer = TestSigner(KeyPair::generate());
        let chain = Chain::new(&store, &signer);

        chain.commit(
            SegmentType::ChatUser,
            payload::chat_user("c1", "first"),
            1_700_000_000_000,
            CommitOptions {
                skip_liveness: true,
                ..Default::default()
            },
        );

        let second = chain.commit(
            SegmentType::ChatUser,
            payload::chat_user("c1", "second"),
            1_700_000_000_500,
            CommitOptions {
                skip_liveness: true,
                ..Default::default()
            },
        );

        assert!(!second.ok);
        assert_eq!(second.reason.as_deref(), Some("rate_limit"));
        assert_eq!(store.chain_len().unwrap(), 1);
    }

    #[test]
    fn biz_outcome_success_raises_rich_and_business_scores() {
        let store = temp_store();
        let signer = TestSigner(KeyPair::generate());
        let chain = Chain::new(&store, &signer);

        chain.commit(
            SegmentType::BizOutcome,
            payload::biz_outcome("c1", "SUCCESS", 1),
            1_700_000_000_000,
            CommitOptions {
                skip_liveness: true,
                ..Default::default()
            },
        );

        let (rich, business) = chain.score_projection(&signer.hid());
        assert_eq!(rich, 5.0);
        assert_eq!(business, 3.0);
    }

    #[test]
    fn read_only_mode_blocks_commit() {
        let store = temp_store();
        store
            .set_read_only(&ReadOnlyLatch {
                enabled: true,
                reason: "integrity scan found a critical error".to_string(),
                timestamp: 1_700_000_000_000,
            })
            .unwrap();
        let signer = TestSigner(KeyPair::generate());
        let chain = Chain::new(&store, &signer);

        let outcome = chain.commit(
            SegmentType::ChatUser,
            payload::chat_user("c1", "hi"),
            1_700_000_000_000,
            CommitOptions {
                skip_liveness: true,
                ..Default::default()
            },
        );

        assert!(!outcome.ok);
        assert_eq!(outcome.reason.as_deref(), Some("read_only_mode"));
    }

    #[test]
    fn rebuild_projections_matches_incremental_scores() {
        let store = temp_store();
        let signer = TestSigner(KeyPair::generate());
        let chain = Chain::new(&store, &signer);

        chain.commit(
            SegmentType::BizOutcome,
            payload::biz_outcome("c1", "SUCCESS", 1),
            1_700_000_000_000,
            CommitOptions {
                skip_liveness: true,
                ..Default::default()
            },
        );
        let incremental = chain.score_projection(&signer.hid());

        chain.rebuild_projections().unwrap();
        let rebuilt = chain.score_projection(&signer.hid());

        assert_eq!(incremental, rebuilt);
    }
}
