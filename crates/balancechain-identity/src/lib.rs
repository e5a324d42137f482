//! Long-lived per-identity keypair management. The private scalar is never
//! written to disk in the clear: persistence goes through the encrypted
//! backup framing in `balancechain-crypto::backup`, not a plaintext keyfile.

pub mod liveness;

use balancechain_core::{AuthorRecord, Hid, Signer, TimestampMs};
use balancechain_crypto::backup::{decrypt_backup, encrypt_backup, BackupPayload};
use balancechain_crypto::{CodecError, KeyPair};
use balancechain_store::error::StoreError;
use balancechain_store::Store;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::json;

pub use liveness::{AlwaysRejectLivenessVerifier, NullLivenessVerifier};

#[derive(thiserror::Error, Debug)]
pub enum IdentityError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The long-lived identity for one chain: a P-256 keypair, the HID it
/// derives to, and the moment it was created. Never mutated after creation
/// — `Identity::generate`/`Identity::from_backup` are the only constructors.
pub struct Identity {
    keypair: KeyPair,
    created_at: TimestampMs,
}

impl Identity {
    pub fn generate(now_ms: TimestampMs) -> Self {
        Identity {
            keypair: KeyPair::generate(),
            created_at: now_ms,
        }
    }

    pub fn hid(&self) -> Hid {
        self.keypair.hid()
    }

    pub fn created_at(&self) -> TimestampMs {
        self.created_at
    }

    pub fn author_record(&self) -> AuthorRecord {
        AuthorRecord {
            hid: self.hid(),
            pubkey: self.keypair.public_key_b64.clone(),
            algorithm: "ecdsa-p256-sha256".to_string(),
        }
    }

    /// Persist the public record (HID, pubkey, creation time) to the
    /// `identity` collection. The private scalar never touches the store —
    /// only `export_backup` externalizes it, and only encrypted.
    pub fn persist_public(&self, store: &Store) -> Result<(), StoreError> {
        store.put_identity_public_record(&json!({
            "hid": self.hid().as_str(),
            "pubkey": self.keypair.public_key_b64,
            "algorithm": "ecdsa-p256-sha256",
            "createdAt": self.created_at,
        }))
    }

    /// Restore the identity whose public record was previously persisted;
    /// returns `None` if the store has never seen an identity.
    pub fn load_public_record(store: &Store) -> Result<Option<(Hid, String, TimestampMs)>, StoreError> {
        let record = match store.get_identity_public_record()? {
            Some(r) => r,
            None => return Ok(None),
        };
        let hid = record
            .get("hid")
            .and_then(|v| v.as_str())
            .map(|s| Hid(s.to_string()));
        let pubkey = record.get("pubkey").and_then(|v| v.as_str()).map(String::from);
        let created_at = record.get("createdAt").and_then(|v| v.as_i64());
        Ok(match (hid, pubkey, created_at) {
            (Some(h), Some(p), Some(c)) => Some((h, p, c)),
            _ => None,
        })
    }

    /// Encrypt this identity's private scalar under `passphrase`, producing
    /// the `[version][salt][nonce][ciphertext]` frame.
    pub fn export_backup(&self, passphrase: &str, exported_at: TimestampMs) -> Result<String, CodecError> {
        let payload = BackupPayload {
            version: 1,
            hid: self.hid().0,
            pubkey: self.keypair.public_key_b64.clone(),
            private_key: BASE64.encode(self.keypair.raw_scalar()),
            created_at: self.created_at,
            exported_at,
        };
        encrypt_backup(&payload, passphrase)
    }

    /// Restore an identity from a frame produced by [`Self::export_backup`].
    /// Fails on version mismatch or wrong passphrase — both surface as
    /// `CodecError`, distinguishably.
    pub fn from_backup(frame_b64: &str, passphrase: &str) -> Result<Self, IdentityError> {
        let payload = decrypt_backup(frame_b64, passphrase)?;
        let scalar = BASE64
            .decode(&payload.private_key)
            .map_err(|e| CodecError::KeyDecode(e.to_string()))?;
        let keypair = KeyPair::from_raw_scalar(&scalar)?;
        Ok(Identity {
            keypair,
            created_at: payload.created_at,
        })
    }
}

impl Signer for Identity {
    fn sign(&self, signable: &[u8]) -> String {
        self.keypair.sign(signable)
    }

    fn hid(&self) -> Hid {
        self.keypair.hid()
    }

    fn pubkey(&self) -> String {
        self.keypair.public_key_b64.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> Store {
        let dir = tempfile::tempdir().unwrap();
        Store::open(dir.path()).unwrap()
    }

    #[test]
    fn generated_identity_derives_a_well_formed_hid() {
        let identity = Identity::generate(1_700_000_000_000);
        assert!(identity.hid().is_well_formed());
    }

    #[test]
    fn persist_and_reload_public_record_round_trips() {
        let store = temp_store();
        let identity = Identity::generate(1_700_000_000_000);
        identity.persist_public(&store).unwrap();

        let (hid, pubkey, created_at) = Identity::load_public_record(&store).unwrap().unwrap();
        assert_eq!(hid, identity.hid());
        assert_eq!(pubkey, identity.keypair.public_key_b64);
        assert_eq!(created_at, 1_700_000_000_000);
    }

    #[test]
    fn no_identity_yet_reads_as_none() {
        let store = temp_store();
        assert!(Identity::load_public_record(&store).unwrap().is_none());
    }

    #[test]
    fn backup_round_trip_restores_same_hid_and_signing_key() {
        let identity = Identity::generate(1_700_000_000_000);
        let frame = identity.export_backup("correct horse battery staple", 1_700_000_100_000).unwrap();

        let restored = Identity::from_backup(&frame, "correct horse battery staple").unwrap();
        assert_eq!(restored.hid(), identity.hid());

        let msg = b"some signable bytes";
        let sig = restored.sign(msg);
        assert!(balancechain_crypto::verify(&restored.pubkey(), msg, &sig).unwrap());
    }

    #[test]
    fn backup_with_wrong_passphrase_fails() {
        let identity = Identity::generate(1_700_000_000_000);
        let frame = identity.export_backup("right", 1_700_000_100_000).unwrap();
        let err = Identity::from_backup(&frame, "wrong").unwrap_err();
        assert!(matches!(err, IdentityError::Codec(CodecError::BackupAuthFailed)));
    }
}
