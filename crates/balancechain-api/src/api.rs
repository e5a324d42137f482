use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;

use crate::types::{
    RpcCapsAvailability, RpcCapsule, RpcChainStatus, RpcMessageView, RpcTvmBalance,
};

/// BalanceChain local JSON-RPC 2.0 read API.
///
/// All method names are prefixed with "balancechain_" via
/// `namespace = "balancechain"`. There is deliberately no transaction
/// submission method here — appends only ever happen through the in-process
/// `Chain::commit` call on the node's own event loop, never over the wire.
#[rpc(server, namespace = "balancechain")]
pub trait BalanceChainApi {
    /// Current chain head hash, length, and read-only latch state.
    #[method(name = "getChainStatus")]
    async fn get_chain_status(&self) -> RpcResult<RpcChainStatus>;

    /// A single segment, hex/base64-free and JSON-native, or null if `seq`
    /// is out of range.
    #[method(name = "getSegment")]
    async fn get_segment(&self, seq: u64) -> RpcResult<Option<serde_json::Value>>;

    /// Derived per-peer message views, newest last (insertion order).
    #[method(name = "getMessages")]
    async fn get_messages(&self, peer: String) -> RpcResult<Vec<RpcMessageView>>;

    /// Quota counters and unlocked balance for `hid`, evaluated as of now.
    #[method(name = "getCapsAvailability")]
    async fn get_caps_availability(&self, hid: String) -> RpcResult<RpcCapsAvailability>;

    /// Capsules created from a given session id.
    #[method(name = "getCapsulesBySession")]
    async fn get_capsules_by_session(&self, session_id: String) -> RpcResult<Vec<RpcCapsule>>;

    /// Capsules in a given lifecycle status ("pending", "minted", "rejected").
    #[method(name = "getCapsulesByStatus")]
    async fn get_capsules_by_status(&self, status: String) -> RpcResult<Vec<RpcCapsule>>;

    /// Current TVM balance for `hid`.
    #[method(name = "getTvmBalance")]
    async fn get_tvm_balance(&self, hid: String) -> RpcResult<RpcTvmBalance>;
}
