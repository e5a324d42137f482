//! Encrypted identity backup: `[version=1][16-byte salt][12-byte nonce][ciphertext]`,
//! base64-encoded as a whole. The AES-256 key is derived from the user's
//! passphrase via PBKDF2-SHA256 with 100,000 iterations.

use crate::error::CodecError;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use balancechain_core::constants::{
    BACKUP_FRAME_VERSION, BACKUP_NONCE_LEN, BACKUP_PBKDF2_ITERATIONS, BACKUP_SALT_LEN,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

/// The plaintext payload carried inside an encrypted backup.
#[derive(Serialize, Deserialize)]
pub struct BackupPayload {
    pub version: u8,
    pub hid: String,
    pub pubkey: String,
    pub private_key: String,
    pub created_at: i64,
    pub exported_at: i64,
}

fn derive_key(passphrase: &str, salt: &[u8; BACKUP_SALT_LEN]) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, BACKUP_PBKDF2_ITERATIONS, &mut key);
    key
}

/// Encrypt `payload` under `passphrase`, producing the base64-encoded
/// `[version][salt][nonce][ciphertext]` frame.
pub fn encrypt_backup(payload: &BackupPayload, passphrase: &str) -> Result<String, CodecError> {
    let plaintext = serde_json::to_vec(payload)?;

    let mut salt = [0u8; BACKUP_SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    let key = derive_key(passphrase, &salt);

    let mut nonce_bytes = [0u8; BACKUP_NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_slice())
        .expect("AES-GCM encryption with a fixed-size key/nonce cannot fail");

    let mut frame = Vec::with_capacity(1 + BACKUP_SALT_LEN + BACKUP_NONCE_LEN + ciphertext.len());
    frame.push(BACKUP_FRAME_VERSION);
    frame.extend_from_slice(&salt);
    frame.extend_from_slice(&nonce_bytes);
    frame.extend_from_slice(&ciphertext);

    Ok(BASE64.encode(frame))
}

/// Decrypt a frame produced by [`encrypt_backup`]. Fails on version
/// mismatch or authentication error, distinguishably.
pub fn decrypt_backup(frame_b64: &str, passphrase: &str) -> Result<BackupPayload, CodecError> {
    let frame = BASE64
        .decode(frame_b64)
        .map_err(|_| CodecError::BackupMalformed)?;

    let min_len = 1 + BACKUP_SALT_LEN + BACKUP_NONCE_LEN;
    if frame.len() < min_len {
        return Err(CodecError::BackupMalformed);
    }

    let version = frame[0];
    if version != BACKUP_FRAME_VERSION {
        return Err(CodecError::BackupVersionMismatch(version));
    }

    let salt: [u8; BACKUP_SALT_LEN] = frame[1..1 + BACKUP_SALT_LEN]
        .try_into()
        .map_err(|_| CodecError::BackupMalformed)?;
    let nonce_start = 1 + BACKUP_SALT_LEN;
    let nonce_end = nonce_start + BACKUP_NONCE_LEN;
    let nonce_bytes = &frame[nonce_start..nonce_end];
    let ciphertext = &frame[nonce_end..];

    let key = derive_key(passphrase, &salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| CodecError::BackupAuthFailed)?;

    Ok(serde_json::from_slice(&plaintext)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload() -> BackupPayload {
        BackupPayload {
            version: 1,
            hid: "HID-ABCD1234".to_string(),
            pubkey: "base64pubkey".to_string(),
            private_key: "base64privatekey".to_string(),
            created_at: 1_700_000_000_000,
            exported_at: 1_700_000_100_000,
        }
    }

    #[test]
    fn round_trip_succeeds_with_correct_passphrase() {
        let frame = encrypt_backup(&sample_payload(), "correct horse battery staple").unwrap();
        let decoded = decrypt_backup(&frame, "correct horse battery staple").unwrap();
        assert_eq!(decoded.hid, "HID-ABCD1234");
        assert_eq!(decoded.private_key, "base64privatekey");
    }

    #[test]
    fn wrong_passphrase_fails_authentication() {
        let frame = encrypt_backup(&sample_payload(), "right passphrase").unwrap();
        let err = decrypt_backup(&frame, "wrong passphrase").unwrap_err();
        assert!(matches!(err, CodecError::BackupAuthFailed));
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let mut frame_bytes = BASE64
            .decode(encrypt_backup(&sample_payload(), "pw").unwrap())
            .unwrap();
        let last = frame_bytes.len() - 1;
        frame_bytes[last] ^= 0xFF;
        let frame = BASE64.encode(frame_bytes);
        let err = decrypt_backup(&frame, "pw").unwrap_err();
        assert!(matches!(err, CodecError::BackupAuthFailed));
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let mut frame_bytes = BASE64
            .decode(encrypt_backup(&sample_payload(), "pw").unwrap())
            .unwrap();
        frame_bytes[0] = 99;
        let frame = BASE64.encode(frame_bytes);
        let err = decrypt_backup(&frame, "pw").unwrap_err();
        assert!(matches!(err, CodecError::BackupVersionMismatch(99)));
    }
}
