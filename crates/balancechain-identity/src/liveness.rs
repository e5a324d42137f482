//! Pluggable liveness verification: the validator accepts any verifier
//! implementing [`LivenessVerifier`] and rejects when it returns false.
//! Real platform-authenticator (WebAuthn) verification is out of scope for
//! the core — these two stand-ins exist for tests and for hosts that have
//! not wired up a real verifier yet.

use balancechain_core::{LivenessProof, LivenessVerifier};

/// Always accepts. The default wired in when no real verifier is available,
/// for a proof that is structurally present but cannot be cryptographically
/// checked yet.
pub struct NullLivenessVerifier;

impl LivenessVerifier for NullLivenessVerifier {
    fn verify(&self, _proof: &LivenessProof) -> bool {
        true
    }
}

/// Always rejects. Used in drills to exercise the `liveness_failed` path
/// deliberately.
pub struct AlwaysRejectLivenessVerifier;

impl LivenessVerifier for AlwaysRejectLivenessVerifier {
    fn verify(&self, _proof: &LivenessProof) -> bool {
        false
    }
}
