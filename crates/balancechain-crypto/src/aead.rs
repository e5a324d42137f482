//! ECDH key agreement and AES-GCM-256 symmetric encryption, exposed for P2P
//! use. The chain core does not call these itself; they exist at the
//! boundary with the out-of-scope transport layer.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use p256::ecdh::EphemeralSecret;
use p256::PublicKey;
use rand::RngCore;

/// Derive a 32-byte shared secret via ECDH between an ephemeral secret and
/// a peer's public key.
pub fn ecdh_shared_secret(own_secret: &EphemeralSecret, peer_public: &PublicKey) -> [u8; 32] {
    let shared = own_secret.diffie_hellman(peer_public);
    let mut out = [0u8; 32];
    out.copy_from_slice(shared.raw_secret_bytes().as_slice());
    out
}

/// Encrypt `plaintext` under `key` with a freshly generated 12-byte nonce.
/// Returns `(nonce, ciphertext)`.
pub fn aes_gcm_encrypt(key: &[u8; 32], plaintext: &[u8]) -> ([u8; 12], Vec<u8>) {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut nonce_bytes = [0u8; 12];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .expect("AES-GCM encryption with a fixed-size key/nonce cannot fail");
    (nonce_bytes, ciphertext)
}

/// Decrypt a ciphertext produced by [`aes_gcm_encrypt`]. Returns `None` on
/// authentication failure.
pub fn aes_gcm_decrypt(key: &[u8; 32], nonce: &[u8; 12], ciphertext: &[u8]) -> Option<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher.decrypt(Nonce::from_slice(nonce), ciphertext).ok()
}
