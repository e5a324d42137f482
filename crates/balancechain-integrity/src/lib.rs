//! Chain-wide integrity verification, backup/restore safety, and clone
//! detection. A linear full-chain scan rather than a per-account recovery
//! vote: a thin service borrowing the store it inspects.

use balancechain_core::{IntegrityError, ReadOnlyLatch, Segment, Severity, TimestampMs};
use balancechain_crypto::{canonical_json, segment_hash, verify as crypto_verify};
use balancechain_store::error::StoreError;
use balancechain_store::{Store, GENESIS_HEAD};
use std::time::Instant;

/// One full-scan finding, carrying the position it was found at (when the
/// error is position-specific) alongside the underlying [`IntegrityError`].
#[derive(Debug, Clone)]
pub struct ScanError {
    pub seq: Option<u64>,
    pub code: &'static str,
    pub error: IntegrityError,
}

/// Result of a full chain scan.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub ok: bool,
    pub verified: bool,
    pub errors: Vec<ScanError>,
    pub warnings: Vec<String>,
    pub computed_head: String,
    pub stored_head: String,
    pub duration_ms: u64,
}

impl ScanReport {
    /// The worst severity across all findings, or `None` if the scan found
    /// nothing wrong.
    pub fn severity(&self) -> Option<Severity> {
        self.errors.iter().map(|e| e.error.severity()).max()
    }
}

fn seq_of(err: &IntegrityError) -> Option<u64> {
    match err {
        IntegrityError::MissingSegment(seq) => Some(*seq),
        IntegrityError::SeqMismatch { found, .. } => Some(*found),
        IntegrityError::HashChainBroken(seq) => Some(*seq),
        IntegrityError::InvalidSignature(seq) => Some(*seq),
        IntegrityError::SignatureError { seq, .. } => Some(*seq),
        IntegrityError::HashComputeError { seq, .. } => Some(*seq),
        IntegrityError::HeadMismatch => None,
    }
}

fn finding(err: IntegrityError) -> ScanError {
    ScanError {
        seq: seq_of(&err),
        code: err.code(),
        error: err,
    }
}

/// Walk the chain from `seq = 1`, checking presence, sequence, hash
/// chaining, and (when `verify_signatures`) full ECDSA verification of each
/// segment's signature against its declared author key. Timestamp
/// regression is recorded as a warning, never an error.
pub fn full_scan(store: &Store, verify_signatures: bool) -> Result<ScanReport, StoreError> {
    let started = Instant::now();
    let chain_len = store.chain_len()?;
    let stored_head = store.chain_head()?;

    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut expected_prev = GENESIS_HEAD.to_string();
    let mut last_timestamp: Option<TimestampMs> = None;
    let mut computed_head = GENESIS_HEAD.to_string();

    for seq in 1..=chain_len {
        let segment = match store.get_segment(seq)? {
            Some(s) => s,
            None => {
                errors.push(finding(IntegrityError::MissingSegment(seq)));
                continue;
            }
        };

        if segment.seq != seq {
            errors.push(finding(IntegrityError::SeqMismatch { expected: seq, found: segment.seq }));
        }

        if segment.prev_hash != expected_prev {
            errors.push(finding(IntegrityError::HashChainBroken(seq)));
        }

        if let Some(prev_ts) = last_timestamp {
            if segment.timestamp < prev_ts {
                warnings.push(format!("timestamp regression at seq={seq}: {} < {}", segment.timestamp, prev_ts));
            }
        }
        last_timestamp = Some(segment.timestamp);

        match segment_block_hash(&segment) {
            Ok(hash) => {
                if verify_signatures {
                    match verify_segment_signature(&segment) {
                        Ok(true) => {}
                        Ok(false) => errors.push(finding(IntegrityError::InvalidSignature(seq))),
                        Err(message) => errors.push(finding(IntegrityError::SignatureError { seq, message })),
                    }
                }
                expected_prev = hash.clone();
                computed_head = hash;
            }
            Err(message) => {
                errors.push(finding(IntegrityError::HashComputeError { seq, message }));
                // Cannot keep chaining past an unhashable segment; subsequent
                // entries will report as hash-chain-broken against a stale prev.
            }
        }
    }

    if chain_len > 0 && computed_head != stored_head {
        errors.push(finding(IntegrityError::HeadMismatch));
    }

    Ok(ScanReport {
        ok: errors.is_empty(),
        verified: verify_signatures,
        errors,
        warnings,
        computed_head,
        stored_head,
        duration_ms: started.elapsed().as_millis() as u64,
    })
}

fn segment_block_hash(segment: &Segment) -> Result<String, String> {
    let signable = canonical_json(&segment.signable_view()).map_err(|e| e.to_string())?;
    let signature = segment
        .signature
        .as_deref()
        .ok_or_else(|| "segment has no signature".to_string())?;
    Ok(segment_hash(&signable, signature))
}

fn verify_segment_signature(segment: &Segment) -> Result<bool, String> {
    let signable = canonical_json(&segment.signable_view()).map_err(|e| e.to_string())?;
    let signature = segment
        .signature
        .as_deref()
        .ok_or_else(|| "segment has no signature".to_string())?;
    crypto_verify(&segment.author.pubkey, signable.as_bytes(), signature).map_err(|e| e.to_string())
}

/// Latch the store's read-only mode when `report` carries a major or
/// critical finding, recording the most severe reason. No-op (and returns
/// `false`) when the scan found nothing at that severity.
pub fn latch_if_corrupt(store: &Store, report: &ScanReport, now_ms: TimestampMs) -> Result<bool, StoreError> {
    let severity = match report.severity() {
        Some(s) => s,
        None => return Ok(false),
    };
    let reason = report
        .errors
        .iter()
        .find(|e| e.error.severity() == severity)
        .map(|e| format!("{} ({})", e.code, e.error))
        .unwrap_or_else(|| "integrity scan failed".to_string());

    store.set_read_only(&ReadOnlyLatch {
        enabled: true,
        reason,
        timestamp: now_ms,
    })?;
    Ok(true)
}

/// Backup restore eligibility — "no restore without sync".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreEligibility {
    pub can_restore: bool,
    pub requires_sync: bool,
    pub reason: &'static str,
}

pub fn restore_eligibility(
    current_len: u64,
    current_head: &str,
    backup_len: u64,
    backup_head: &str,
) -> RestoreEligibility {
    if current_len == 0 {
        return RestoreEligibility { can_restore: true, requires_sync: false, reason: "fresh install" };
    }
    if backup_len < current_len {
        return RestoreEligibility { can_restore: false, requires_sync: true, reason: "backup older" };
    }
    if backup_head != current_head {
        if backup_len > current_len {
            return RestoreEligibility { can_restore: false, requires_sync: true, reason: "diverged, fork" };
        }
        return RestoreEligibility { can_restore: false, requires_sync: true, reason: "heads mismatch" };
    }
    RestoreEligibility { can_restore: true, requires_sync: false, reason: "match" }
}

/// Evidence that an incoming segment from another device is a clone of the
/// locally stored one at the same `seq`: same position, different nonce
/// or signature. Never silently overwritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneEvidence {
    pub seq: u64,
    pub local_nonce: String,
    pub incoming_nonce: String,
}

/// Check whether `incoming` collides with a locally stored segment at the
/// same `seq` but disagrees on nonce or signature — i.e. looks like it came
/// from a cloned device rather than the legitimate next append.
pub fn detect_clone(store: &Store, incoming: &Segment) -> Result<Option<CloneEvidence>, StoreError> {
    let local = match store.get_segment(incoming.seq)? {
        Some(s) => s,
        None => return Ok(None),
    };

    if local.nonce.0 != incoming.nonce.0 || local.signature != incoming.signature {
        return Ok(Some(CloneEvidence {
            seq: incoming.seq,
            local_nonce: local.nonce.0,
            incoming_nonce: incoming.nonce.0.clone(),
        }));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use balancechain_chain::{Chain, CommitOptions};
    use balancechain_core::segment::payload;
    use balancechain_core::{Hid, Signer};
    use balancechain_core::SegmentType;
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

    fn build_chain(store: &Store, signer: &TestSigner, n: u64) -> Chain<'_> {
        let chain = Chain::new(store, signer);
        for i in 0..n {
            let outcome = chain.commit(
                SegmentType::ChatUser,
                payload::chat_user("c1", "hi"),
                1_700_000_000_000 + (i as i64) * 1_500,
                CommitOptions { skip_liveness: true, ..Default::default() },
            );
            assert!(outcome.ok, "commit {i} failed: {:?}", outcome.reason);
        }
        chain
    }

    #[test]
    fn scan_of_untouched_chain_is_clean_and_idempotent() {
        let store = temp_store();
        let signer = TestSigner(KeyPair::generate());
        let _chain = build_chain(&store, &signer, 5);

        let first = full_scan(&store, true).unwrap();
        let second = full_scan(&store, true).unwrap();

        assert!(first.ok);
        assert!(first.errors.is_empty());
        assert_eq!(first.computed_head, first.stored_head);
        assert_eq!(first.ok, second.ok);
        assert_eq!(first.computed_head, second.computed_head);
        assert_eq!(first.errors.len(), second.errors.len());
    }

    #[test]
    fn tampering_a_segment_breaks_signature_and_hash_chain() {
        let store = temp_store();
        let signer = TestSigner(KeyPair::generate());
        let _chain = build_chain(&store, &signer, 5);

        let mut tampered = store.get_segment(3).unwrap().unwrap();
        tampered.payload = serde_json::json!({"chatId": "c1", "text": "TAMPERED", "role": "user"});
        // Directly overwrite via the store's raw commit path is not exposed;
        // simulate corruption the way an on-disk bit-flip would by writing
        // through a fresh transaction that bypasses the chain's validator.
        let segment_bytes = balancechain_crypto::canonical_json(&tampered).unwrap();
        store.debug_overwrite_segment(3, segment_bytes.as_bytes()).unwrap();

        let report = full_scan(&store, true).unwrap();
        assert!(!report.ok);
        let codes: Vec<&str> = report.errors.iter().map(|e| e.code).collect();
        assert!(codes.contains(&"INVALID_SIGNATURE"));
        assert!(codes.contains(&"HASH_CHAIN_BROKEN"));

        let latched = latch_if_corrupt(&store, &report, 1_700_000_100_000).unwrap();
        assert!(latched);
        assert!(store.read_only().unwrap().unwrap().enabled);
    }

    #[test]
    fn restore_fresh_install_is_always_allowed() {
        let elig = restore_eligibility(0, "GENESIS", 10, "X");
        assert!(elig.can_restore);
        assert!(!elig.requires_sync);
    }

    #[test]
    fn restore_matching_heads_allowed() {
        let elig = restore_eligibility(10, "X", 10, "X");
        assert!(elig.can_restore);
    }

    #[test]
    fn restore_older_backup_refused() {
        let elig = restore_eligibility(10, "X", 5, "Z");
        assert!(!elig.can_restore);
        assert!(elig.requires_sync);
        assert_eq!(elig.reason, "backup older");
    }

    #[test]
    fn restore_diverged_fork_refused() {
        let elig = restore_eligibility(10, "X", 12, "Y");
        assert_eq!(elig.reason, "diverged, fork");
    }

    #[test]
    fn restore_heads_mismatch_same_length_refused() {
        let elig = restore_eligibility(10, "X", 10, "Y");
        assert_eq!(elig.reason, "heads mismatch");
    }

    #[test]
    fn clone_with_different_nonce_at_same_seq_is_detected() {
        let store = temp_store();
        let signer = TestSigner(KeyPair::generate());
        let _chain = build_chain(&store, &signer, 2);

        let mut incoming = store.get_segment(2).unwrap().unwrap();
        incoming.nonce = balancechain_core::NonceHex("ff".repeat(16));

        let evidence = detect_clone(&store, &incoming).unwrap();
        assert!(evidence.is_some());
    }

    #[test]
    fn identical_segment_is_not_a_clone() {
        let store = temp_store();
        let signer = TestSigner(KeyPair::generate());
        let _chain = build_chain(&store, &signer, 2);

        let same = store.get_segment(2).unwrap().unwrap();
        assert!(detect_clone(&store, &same).unwrap().is_none());
    }
}
