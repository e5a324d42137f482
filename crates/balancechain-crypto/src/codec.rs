//! Canonical serialization and hashing.
//!
//! Canonical encoding relies on `serde_json::Value`'s default object
//! representation, which is a `BTreeMap` (the `preserve_order` feature is
//! never enabled anywhere in this workspace) — so keys come out sorted
//! lexicographically at every depth for free, and arrays keep their order.
//! This is the only encoding ever fed to hashing or signing.

use crate::error::CodecError;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Serialize `value` to its canonical JSON string.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, CodecError> {
    let as_value: serde_json::Value = serde_json::to_value(value)?;
    Ok(serde_json::to_string(&as_value)?)
}

/// SHA-256 over UTF-8 bytes, returned as lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(digest)
}

/// Block hash of a signed segment: `SHA256(canonical(signable) ∥ "|" ∥ signature_b64)`.
pub fn segment_hash(signable_json: &str, signature_b64: &str) -> String {
    let mut buf = String::with_capacity(signable_json.len() + 1 + signature_b64.len());
    buf.push_str(signable_json);
    buf.push('|');
    buf.push_str(signature_b64);
    sha256_hex(buf.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_sorts_keys_at_every_depth() {
        let value = json!({"z": 1, "a": 2, "m": {"y": 1, "b": 2}});
        let out = canonical_json(&value).unwrap();
        assert_eq!(out, r#"{"a":2,"m":{"b":2,"y":1},"z":1}"#);
    }

    #[test]
    fn canonical_preserves_array_order() {
        let value = json!({"list": [3, 1, 2]});
        let out = canonical_json(&value).unwrap();
        assert_eq!(out, r#"{"list":[3,1,2]}"#);
    }

    #[test]
    fn canonical_distinguishes_null_literal_from_sentinel_strings() {
        let value = json!({"a": null, "b": "null", "c": "undefined"});
        let out = canonical_json(&value).unwrap();
        assert_eq!(out, r#"{"a":null,"b":"null","c":"undefined"}"#);
    }

    #[test]
    fn hash_is_stable_across_calls() {
        let a = sha256_hex(b"hello world");
        let b = sha256_hex(b"hello world");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
