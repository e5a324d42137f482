use crate::types::Hid;

/// The narrow interface the chain uses to reach an identity's private key.
/// `balancechain-identity` implements this over a keypair; the chain crate
/// never needs to depend on identity's storage/backup machinery to commit.
pub trait Signer: Send + Sync {
    fn sign(&self, signable: &[u8]) -> String;
    fn hid(&self) -> Hid;
    fn pubkey(&self) -> String;
}
