pub mod aead;
pub mod backup;
pub mod codec;
pub mod error;
pub mod keypair;

pub use codec::{canonical_json, segment_hash, sha256_hex};
pub use error::CodecError;
pub use keypair::{hid_from_encoded_pubkey, verify, KeyPair};
