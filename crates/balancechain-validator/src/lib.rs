//! The nine ordered validation rules. Each rule either passes or
//! short-circuits the whole pipeline with a [`ValidationError`]; the caller
//! never sees partial results from rules after the first failure, mirroring
//! `validate_vertex`'s early-return shape.

use balancechain_core::{Hid, LivenessVerifier, Segment, SegmentType, TimestampMs, ValidationError};
use balancechain_crypto::verify as crypto_verify;

/// What the validator needs to know about caps without owning their
/// reset/window logic, which lives in the caps crate.
pub trait CapsView {
    /// Returns the rule-2 failure this commit would trigger, if any, given
    /// the identity is about to record one more cap-affecting segment.
    fn would_exceed(&self, hid: &Hid, now_ms: TimestampMs) -> Option<ValidationError>;
}

/// What the validator needs to know about the store without depending on
/// `balancechain-store` directly — only the handful of lookups each rule
/// actually performs.
pub trait ChainView {
    fn chain_head(&self) -> String;
    fn chain_len(&self) -> u64;
    fn segment_by_ref(&self, seq: u64) -> Option<Segment>;
    fn previous_segment(&self) -> Option<Segment>;
    fn contains_nonce(&self, nonce: &str) -> bool;
}

pub struct ValidatorOptions<'a> {
    pub skip_liveness: bool,
    pub liveness_verifier: Option<&'a dyn LivenessVerifier>,
    pub now_ms: TimestampMs,
}

impl<'a> Default for ValidatorOptions<'a> {
    fn default() -> Self {
        ValidatorOptions {
            skip_liveness: false,
            liveness_verifier: None,
            now_ms: 0,
        }
    }
}

const MIN_BLOCK_INTERVAL_MS: i64 = balancechain_core::constants::MIN_BLOCK_INTERVAL_MS;
const UTC_TOLERANCE_MS: i64 = balancechain_core::constants::UTC_TOLERANCE_MS;

/// Run all nine rules against `segment` in order, short-circuiting on the
/// first failure. `chain` and `caps` are read-only snapshots; the caller is
/// responsible for re-checking `prev_hash`/`seq` inside its own commit
/// transaction, since this function may race a concurrent writer.
pub fn validate(
    segment: &Segment,
    chain: &dyn ChainView,
    caps: &dyn CapsView,
    options: &ValidatorOptions,
) -> Result<(), ValidationError> {
    rule_1_counter_relationship(segment, chain)?;
    rule_2_caps(segment, caps, options.now_ms)?;
    rule_3_rate_limit(segment, chain)?;
    rule_4_liveness(segment, options)?;
    rule_5_owner_transition(segment)?;
    rule_6_history_hash(segment, chain)?;
    rule_7_sequence(segment, chain)?;
    rule_8_signature(segment)?;
    rule_9_nonce(segment, chain)?;
    Ok(())
}

fn rule_1_counter_relationship(segment: &Segment, chain: &dyn ChainView) -> Result<(), ValidationError> {
    let (unlocker, unlocked) = match (&segment.unlocker_ref, &segment.unlocked_ref) {
        (Some(u), Some(l)) => (u, l),
        _ => return Ok(()),
    };

    let unlocker_seq = unlocker.seq().ok_or(ValidationError::CounterOrder("unlocker_ref malformed"))?;
    let unlocked_seq = unlocked.seq().ok_or(ValidationError::CounterOrder("unlocked_ref malformed"))?;

    if chain.segment_by_ref(unlocker_seq).is_none() || chain.segment_by_ref(unlocked_seq).is_none() {
        return Err(ValidationError::MissingRefs);
    }

    if !(unlocker_seq > unlocked_seq) {
        return Err(ValidationError::CounterOrder("unlocker.seq must exceed unlocked.seq"));
    }

    Ok(())
}

fn rule_2_caps(segment: &Segment, caps: &dyn CapsView, now_ms: TimestampMs) -> Result<(), ValidationError> {
    if !segment.kind.is_cap_affecting() {
        return Ok(());
    }
    if let Some(err) = caps.would_exceed(&segment.author.hid, now_ms) {
        return Err(err);
    }
    Ok(())
}

fn rule_3_rate_limit(segment: &Segment, chain: &dyn ChainView) -> Result<(), ValidationError> {
    let previous = match chain.previous_segment() {
        Some(p) => p,
        None => return Ok(()),
    };
    if previous.author.hid != segment.author.hid {
        return Ok(());
    }
    if segment.timestamp - previous.timestamp < MIN_BLOCK_INTERVAL_MS {
        return Err(ValidationError::RateLimit);
    }
    Ok(())
}

fn rule_4_liveness(segment: &Segment, options: &ValidatorOptions) -> Result<(), ValidationError> {
    if options.skip_liveness {
        return Ok(());
    }
    let proof = match segment.payload.get("liveness") {
        Some(v) => match serde_json::from_value::<balancechain_core::LivenessProof>(v.clone()) {
            Ok(p) => p,
            Err(_) => return Err(ValidationError::InvalidStructure("liveness")),
        },
        None => return Ok(()),
    };

    if (proof.timestamp - segment.timestamp).abs() > UTC_TOLERANCE_MS {
        return Err(ValidationError::TimestampDrift);
    }

    if proof.assertion.is_some() {
        if let Some(verifier) = options.liveness_verifier {
            if !verifier.verify(&proof) {
                return Err(ValidationError::LivenessFailed);
            }
        }
    }

    Ok(())
}

fn rule_5_owner_transition(segment: &Segment) -> Result<(), ValidationError> {
    if segment.kind != SegmentType::TvmTransfer {
        return Ok(());
    }
    match &segment.previous_owner {
        None => Err(ValidationError::MissingPreviousOwner),
        Some(prev) if *prev == segment.current_owner => Err(ValidationError::SameOwner),
        Some(_) => Ok(()),
    }
}

fn rule_6_history_hash(segment: &Segment, chain: &dyn ChainView) -> Result<(), ValidationError> {
    if segment.prev_hash != chain.chain_head() {
        return Err(ValidationError::BadPrevHash);
    }
    Ok(())
}

fn rule_7_sequence(segment: &Segment, chain: &dyn ChainView) -> Result<(), ValidationError> {
    if segment.seq != chain.chain_len() + 1 {
        return Err(ValidationError::BadSeq);
    }
    Ok(())
}

fn rule_8_signature(segment: &Segment) -> Result<(), ValidationError> {
    let signature = segment.signature.as_deref().ok_or(ValidationError::BadSignature)?;
    let signable = balancechain_crypto::canonical_json(&segment.signable_view())
        .map_err(|_| ValidationError::BadSignature)?;
    match crypto_verify(&segment.author.pubkey, signable.as_bytes(), signature) {
        Ok(true) => Ok(()),
        _ => Err(ValidationError::BadSignature),
    }
}

fn rule_9_nonce(segment: &Segment, chain: &dyn ChainView) -> Result<(), ValidationError> {
    if chain.contains_nonce(&segment.nonce.0) {
        return Err(ValidationError::ReplayNonce);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use balancechain_core::{AuthorRecord, Hid, NonceHex, SegmentType};
    use balancechain_crypto::{canonical_json, sha256_hex, KeyPair};
    use serde_json::json;
    use std::collections::HashSet;

    struct FixtureChain {
        head: String,
        len: u64,
        segments: Vec<Segment>,
        nonces: HashSet<String>,
    }

    impl ChainView for FixtureChain {
        fn chain_head(&self) -> String {
            self.head.clone()
        }
        fn chain_len(&self) -> u64 {
            self.len
        }
        fn segment_by_ref(&self, seq: u64) -> Option<Segment> {
            self.segments.iter().find(|s| s.seq == seq).cloned()
        }
        fn previous_segment(&self) -> Option<Segment> {
            self.segments.last().cloned()
        }
        fn contains_nonce(&self, nonce: &str) -> bool {
            self.nonces.contains(nonce)
        }
    }

    struct NeverExceedsCaps;
    impl CapsView for NeverExceedsCaps {
        fn would_exceed(&self, _hid: &Hid, _now_ms: TimestampMs) -> Option<ValidationError> {
            None
        }
    }

    struct AlwaysExceedsDaily;
    impl CapsView for AlwaysExceedsDaily {
        fn would_exceed(&self, _hid: &Hid, _now_ms: TimestampMs) -> Option<ValidationError> {
            Some(ValidationError::DailyCapExceeded)
        }
    }

    fn signed_segment(kp: &KeyPair, seq: u64, timestamp: i64, prev_hash: &str) -> Segment {
        let hid = kp.hid();
        let mut segment = Segment {
            version: 2,
            seq,
            timestamp,
            nonce: NonceHex(format!("{:032x}", seq)),
            kind: SegmentType::ChatUser,
            payload: json!({"chatId": "c1", "text": "hi", "role": "user"}),
            prev_hash: prev_hash.to_string(),
            unlocker_ref: None,
            unlocked_ref: None,
            previous_owner: None,
            current_owner: hid.clone(),
            author: AuthorRecord {
                hid,
                pubkey: kp.public_key_b64.clone(),
                algorithm: "ecdsa-p256-sha256".to_string(),
            },
            signature: None,
        };
        let signable = canonical_json(&segment.signable_view()).unwrap();
        segment.signature = Some(kp.sign(signable.as_bytes()));
        segment
    }

    fn empty_chain() -> FixtureChain {
        FixtureChain {
            head: "GENESIS".to_string(),
            len: 0,
            segments: Vec::new(),
            nonces: HashSet::new(),
        }
    }

    #[test]
    fn first_segment_passes_all_rules() {
        let kp = KeyPair::generate();
        let segment = signed_segment(&kp, 1, 1_700_000_000_000, "GENESIS");
        let chain = empty_chain();
        let opts = ValidatorOptions {
            skip_liveness: true,
            ..Default::default()
        };
        assert!(validate(&segment, &chain, &NeverExceedsCaps, &opts).is_ok());
    }

    #[test]
    fn bad_prev_hash_fails_rule_6() {
        let kp = KeyPair::generate();
        let segment = signed_segment(&kp, 1, 1_700_000_000_000, "WRONG");
        let chain = empty_chain();
        let opts = ValidatorOptions {
            skip_liveness: true,
            ..Default::default()
        };
        let err = validate(&segment, &chain, &NeverExceedsCaps, &opts).unwrap_err();
        assert_eq!(err, ValidationError::BadPrevHash);
    }

    #[test]
    fn bad_seq_fails_rule_7() {
        let kp = KeyPair::generate();
        let segment = signed_segment(&kp, 2, 1_700_000_000_000, "GENESIS");
        let chain = empty_chain();
        let opts = ValidatorOptions {
            skip_liveness: true,
            ..Default::default()
        };
        let err = validate(&segment, &chain, &NeverExceedsCaps, &opts).unwrap_err();
        assert_eq!(err, ValidationError::BadSeq);
    }

    #[test]
    fn tampered_signature_fails_rule_8() {
        let kp = KeyPair::generate();
        let mut segment = signed_segment(&kp, 1, 1_700_000_000_000, "GENESIS");
        segment.signature = Some("bm90YXJlYWxzaWduYXR1cmU=".to_string());
        let chain = empty_chain();
        let opts = ValidatorOptions {
            skip_liveness: true,
            ..Default::default()
        };
        let err = validate(&segment, &chain, &NeverExceedsCaps, &opts).unwrap_err();
        assert_eq!(err, ValidationError::BadSignature);
    }

    #[test]
    fn replayed_nonce_fails_rule_9() {
        let kp = KeyPair::generate();
        let segment = signed_segment(&kp, 1, 1_700_000_000_000, "GENESIS");
        let mut chain = empty_chain();
        chain.nonces.insert(segment.nonce.0.clone());
        let opts = ValidatorOptions {
            skip_liveness: true,
            ..Default::default()
        };
        let err = validate(&segment, &chain, &NeverExceedsCaps, &opts).unwrap_err();
        assert_eq!(err, ValidationError::ReplayNonce);
    }

    #[test]
    fn rate_limit_blocks_same_author_within_interval() {
        let kp = KeyPair::generate();
        let first = signed_segment(&kp, 1, 1_700_000_000_000, "GENESIS");
        let mut chain = empty_chain();
        let signable = canonical_json(&first.signable_view()).unwrap();
        let head = sha256_hex(format!("{}|{}", signable, first.signature.clone().unwrap()).as_bytes());
        chain.nonces.insert(first.nonce.0.clone());
        chain.segments.push(first);
        chain.head = head.clone();
        chain.len = 1;

        let second = signed_segment(&kp, 2, 1_700_000_000_500, &head);
        let opts = ValidatorOptions {
            skip_liveness: true,
            ..Default::default()
        };
        let err = validate(&second, &chain, &NeverExceedsCaps, &opts).unwrap_err();
        assert_eq!(err, ValidationError::RateLimit);
    }

    #[test]
    fn caps_exceeded_fails_rule_2_before_touching_store_state() {
        let kp = KeyPair::generate();
        let segment = signed_segment(&kp, 1, 1_700_000_000_000, "GENESIS");
        let chain = empty_chain();
        let opts = ValidatorOptions {
            skip_liveness: true,
            ..Default::default()
        };
        let err = validate(&segment, &chain, &AlwaysExceedsDaily, &opts).unwrap_err();
        assert_eq!(err, ValidationError::DailyCapExceeded);
    }
}
