//! P-256 ECDSA keypairs and signing, plus HID derivation from the public key.
//!
//! The private scalar is kept inside a `Zeroizing` buffer and never printed;
//! the chain only ever calls through `sign`, never reads the scalar back out.

use crate::error::CodecError;
use balancechain_core::Hid;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::Zeroizing;

/// A P-256 signing keypair. Not `Clone` — a keypair is held by exactly one
/// identity handle and signing is requested through `sign`, never by
/// exporting the scalar.
pub struct KeyPair {
    secret: Zeroizing<Vec<u8>>,
    signing_key: SigningKey,
    pub verifying_key: VerifyingKey,
    /// Base64 SEC1-encoded (uncompressed) public point — the portable form
    /// carried in `AuthorRecord::pubkey`.
    pub public_key_b64: String,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key_b64", &self.public_key_b64)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl KeyPair {
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut rand::rngs::OsRng);
        Self::from_signing_key(signing_key)
    }

    /// Reconstruct a keypair from a raw 32-byte scalar, e.g. when restoring
    /// from an encrypted backup.
    pub fn from_raw_scalar(bytes: &[u8]) -> Result<Self, CodecError> {
        let signing_key = SigningKey::from_slice(bytes)
            .map_err(|e| CodecError::KeyDecode(e.to_string()))?;
        Ok(Self::from_signing_key(signing_key))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let verifying_key = VerifyingKey::from(&signing_key);
        let encoded_point = verifying_key.to_encoded_point(false);
        let public_key_b64 = BASE64.encode(encoded_point.as_bytes());
        let secret = Zeroizing::new(signing_key.to_bytes().to_vec());
        KeyPair {
            secret,
            signing_key,
            verifying_key,
            public_key_b64,
        }
    }

    pub fn raw_scalar(&self) -> &[u8] {
        &self.secret
    }

    /// Sign `data` (already-canonicalized bytes), returning a base64 fixed-size
    /// `r ∥ s` signature.
    pub fn sign(&self, data: &[u8]) -> String {
        let signature: Signature = self.signing_key.sign(data);
        BASE64.encode(signature.to_bytes())
    }

    /// The HID this keypair derives to: `HID-` + first 8 hex chars of
    /// SHA-256 over the canonical (uncompressed SEC1) public key bytes.
    pub fn hid(&self) -> Hid {
        hid_from_encoded_pubkey(&self.public_key_b64)
    }
}

/// Derive a HID from a base64-encoded SEC1 public key, the form carried on
/// the wire in `AuthorRecord::pubkey`. Used both when minting a fresh
/// identity and when verifying an incoming segment's claimed HID.
pub fn hid_from_encoded_pubkey(public_key_b64: &str) -> Hid {
    let digest = Sha256::digest(public_key_b64.as_bytes());
    Hid::from_digest_hex(&hex::encode(digest))
}

/// Verify a base64 `r ∥ s` signature against a base64 SEC1 public key.
/// Pure function of (public key, canonical signable, signature).
pub fn verify(public_key_b64: &str, data: &[u8], signature_b64: &str) -> Result<bool, CodecError> {
    let point_bytes = BASE64
        .decode(public_key_b64)
        .map_err(|e| CodecError::KeyDecode(e.to_string()))?;
    let verifying_key = VerifyingKey::from_sec1_bytes(&point_bytes)
        .map_err(|e| CodecError::KeyDecode(e.to_string()))?;
    let sig_bytes = BASE64
        .decode(signature_b64)
        .map_err(|e| CodecError::KeyDecode(e.to_string()))?;
    let signature = match Signature::from_slice(&sig_bytes) {
        Ok(sig) => sig,
        Err(_) => return Ok(false),
    };
    Ok(verifying_key.verify(data, &signature).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_round_trip() {
        let kp = KeyPair::generate();
        let msg = b"canonical signable bytes";
        let sig = kp.sign(msg);
        assert!(verify(&kp.public_key_b64, msg, &sig).unwrap());
    }

    #[test]
    fn tampered_message_fails_verification() {
        let kp = KeyPair::generate();
        let sig = kp.sign(b"original");
        assert!(!verify(&kp.public_key_b64, b"tampered", &sig).unwrap());
    }

    #[test]
    fn tampered_signature_fails_verification() {
        let kp = KeyPair::generate();
        let mut sig = kp.sign(b"original");
        sig.replace_range(0..1, if sig.starts_with('A') { "B" } else { "A" });
        assert!(!verify(&kp.public_key_b64, b"original", &sig).unwrap());
    }

    #[test]
    fn hid_is_stable_and_well_formed() {
        let kp = KeyPair::generate();
        let hid1 = kp.hid();
        let hid2 = kp.hid();
        assert_eq!(hid1, hid2);
        assert!(hid1.is_well_formed());
    }

    #[test]
    fn debug_redacts_secret() {
        let kp = KeyPair::generate();
        let printed = format!("{:?}", kp);
        assert!(printed.contains("redacted"));
    }
}
