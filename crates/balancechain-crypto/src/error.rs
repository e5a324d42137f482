use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("failed to serialize value to canonical JSON: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("failed to decode key material: {0}")]
    KeyDecode(String),
    #[error("signature does not verify")]
    InvalidSignature,
    #[error("encrypted backup has an unsupported version byte: {0}")]
    BackupVersionMismatch(u8),
    #[error("encrypted backup is truncated or malformed")]
    BackupMalformed,
    #[error("encrypted backup failed authentication (wrong passphrase or tampered ciphertext)")]
    BackupAuthFailed,
}
