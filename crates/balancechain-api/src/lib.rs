//! balancechain-api
//!
//! Local, read-only JSON-RPC 2.0 surface for a running BalanceChain node.
//! Scoped to queries only: there is no `sendTransaction`-equivalent method,
//! because every append happens in-process through `Chain::commit` on the
//! node's own event loop, never over the wire.
//!
//! Namespace: "balancechain"
//! Methods:
//!   balancechain_getChainStatus        — head, length, read-only latch
//!   balancechain_getSegment             — one segment by seq
//!   balancechain_getMessages            — derived message views for a peer
//!   balancechain_getCapsAvailability    — quota counters for a hid
//!   balancechain_getCapsulesBySession   — capsules from one session
//!   balancechain_getCapsulesByStatus    — capsules in a lifecycle status
//!   balancechain_getTvmBalance          — TVM balance for a hid

pub mod api;
pub mod server;
pub mod types;

pub use api::BalanceChainApiServer;
pub use server::{RpcServer, RpcServerState};
pub use types::{
    RpcCapsAvailability, RpcCapsule, RpcChainStatus, RpcMessageView, RpcTvmBalance,
};

#[cfg(test)]
mod tests {
    use super::*;
    use balancechain_chain::{Chain, CommitOptions};
    use balancechain_core::segment::payload;
    use balancechain_core::{Hid, Signer, SegmentType};
    use balancechain_crypto::KeyPair;
    use balancechain_store::Store;
    use std::sync::Arc;

    struct TestSigner(KeyPair);
    impl Signer for TestSigner {
        fn sign(&self, signable: &[u8]) -> String {
            self.0.sign(signable)
        }
        fn hid(&self) -> Hid {
            self.0.hid()
        }
        fn pubkey(&self) -> String {
            self.0.public_key_b64.clone()
        }
    }

    fn temp_store() -> Store {
        let dir = tempfile::tempdir().unwrap();
        Store::open(dir.path()).unwrap()
    }

    #[tokio::test]
    async fn chain_status_reflects_committed_segments() {
        let store = temp_store();
        let signer = TestSigner(KeyPair::generate());
        {
            let chain = Chain::new(&store, &signer);
            let outcome = chain.commit(
                SegmentType::ChatUser,
                payload::chat_user("c1", "hi"),
                1_700_000_000_000,
                CommitOptions { skip_liveness: true, ..Default::default() },
            );
            assert!(outcome.ok);
        }

        let server = RpcServer::new(Arc::new(RpcServerState { store: Arc::new(store) }));
        let status = BalanceChainApiServer::get_chain_status(&server).await.unwrap();
        assert_eq!(status.len, 1);
        assert!(!status.read_only);
    }

    #[tokio::test]
    async fn tvm_balance_for_unknown_hid_is_zero() {
        let store = temp_store();
        let server = RpcServer::new(Arc::new(RpcServerState { store: Arc::new(store) }));
        let balance = BalanceChainApiServer::get_tvm_balance(&server, "HID-DEADBEEF".to_string())
            .await
            .unwrap();
        assert_eq!(balance.hid_milli, 0);
    }

    #[tokio::test]
    async fn unknown_capsule_status_is_rejected() {
        let store = temp_store();
        let server = RpcServer::new(Arc::new(RpcServerState { store: Arc::new(store) }));
        let err = BalanceChainApiServer::get_capsules_by_status(&server, "bogus".to_string())
            .await
            .unwrap_err();
        assert!(format!("{err:?}").contains("unknown capsule status"));
    }
}
