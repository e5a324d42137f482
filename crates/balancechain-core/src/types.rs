use serde::{Deserialize, Serialize};
use std::fmt;

/// A stable per-identity public identifier: `HID-XXXXXXXX`, the first 8 hex
/// characters (uppercase) of SHA-256 over the canonical author public key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Hid(pub String);

impl Hid {
    pub const PREFIX: &'static str = "HID-";

    pub fn from_digest_hex(digest_hex: &str) -> Self {
        let short: String = digest_hex.chars().take(8).collect::<String>().to_uppercase();
        Hid(format!("{}{}", Self::PREFIX, short))
    }

    pub fn is_well_formed(&self) -> bool {
        self.0.starts_with(Self::PREFIX) && self.0.len() == Self::PREFIX.len() + 8
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Hid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Hid {
    fn from(s: String) -> Self {
        Hid(s)
    }
}

/// Milliseconds since the Unix epoch, UTC.
pub type TimestampMs = i64;

/// Monotonically increasing per-chain position, starting at 1.
pub type Seq = u64;

/// Portable author record: enough to verify a segment's signature without
/// a separate key lookup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorRecord {
    pub hid: Hid,
    /// Public key in a portable form (base64-encoded SEC1 point for P-256).
    pub pubkey: String,
    /// Tag for the signature algorithm, so a future PQ key can coexist.
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
}

fn default_algorithm() -> String {
    "ecdsa-p256-sha256".to_string()
}

/// A 16-byte nonce, always carried hex-encoded (32 hex characters).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NonceHex(pub String);

impl NonceHex {
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == 32 && self.0.chars().all(|c| c.is_ascii_hexdigit())
    }
}

impl fmt::Display for NonceHex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A `"{seq}:{nonce}"` reference to an earlier segment, used by the
/// unlocker/unlocked counter-relationship rule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentRef(pub String);

impl SegmentRef {
    pub fn new(seq: Seq, nonce: &NonceHex) -> Self {
        SegmentRef(format!("{}:{}", seq, nonce.0))
    }

    /// Parse the leading `seq` component, used by validator rule 1.
    pub fn seq(&self) -> Option<Seq> {
        self.0.split(':').next()?.parse().ok()
    }
}
