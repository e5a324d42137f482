use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObject;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use balancechain_caps::CapsAccountant;
use balancechain_core::{Capsule, CapsuleStatus, Direction, Hid, MessageView, TvmBalance};
use balancechain_store::Store;

use crate::api::BalanceChainApiServer;
use crate::types::{RpcCapsAvailability, RpcCapsule, RpcChainStatus, RpcMessageView, RpcTvmBalance};

fn rpc_err(code: i32, msg: impl Into<String>) -> ErrorObject<'static> {
    ErrorObject::owned(code, msg.into(), None::<()>)
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Shared state passed to the RPC server. Holds the store behind an `Arc`
/// so the node binary's background tasks (integrity scans, nonce purges)
/// can share the same handle — unlike `Chain`/`CapsAccountant`, which borrow
/// the store for the lifetime of a single in-process commit, the API server
/// holds it for as long as the process runs, so a plain borrowed reference
/// would not satisfy the `'static` bound `jsonrpsee` needs for its request
/// handlers.
pub struct RpcServerState {
    pub store: Arc<Store>,
}

/// The RPC server implementation.
pub struct RpcServer {
    state: Arc<RpcServerState>,
}

impl RpcServer {
    pub fn new(state: Arc<RpcServerState>) -> Self {
        Self { state }
    }

    /// Start the JSON-RPC server on `addr` with permissive CORS headers.
    /// Returns a handle to stop it.
    pub async fn start(self, addr: SocketAddr) -> anyhow::Result<ServerHandle> {
        let cors = CorsLayer::new()
            .allow_methods(Any)
            .allow_origin(Any)
            .allow_headers(Any);

        let server = Server::builder()
            .set_http_middleware(tower::ServiceBuilder::new().layer(cors))
            .build(addr)
            .await?;

        let module = self.into_rpc();
        let handle = server.start(module);
        info!(%addr, "read API server started");
        Ok(handle)
    }
}

fn direction_str(d: Direction) -> String {
    match d {
        Direction::In => "in".to_string(),
        Direction::Out => "out".to_string(),
    }
}

fn message_to_rpc(m: MessageView) -> RpcMessageView {
    RpcMessageView {
        id: m.id,
        seq: m.seq,
        ts: m.ts,
        kind: m.kind,
        peer: m.peer,
        direction: direction_str(m.direction),
        tag: m.tag,
        text: m.text,
        author: m.author.0,
        decision: m.decision,
        outcome: m.outcome,
        scores: m.scores,
    }
}

fn category_str(c: balancechain_core::Category) -> String {
    match c {
        balancechain_core::Category::Wheat => "wheat".to_string(),
        balancechain_core::Category::Tomato => "tomato".to_string(),
    }
}

fn status_str(s: CapsuleStatus) -> String {
    match s {
        CapsuleStatus::Pending => "pending".to_string(),
        CapsuleStatus::Minted => "minted".to_string(),
        CapsuleStatus::Rejected => "rejected".to_string(),
    }
}

fn parse_status(s: &str) -> Option<CapsuleStatus> {
    match s {
        "pending" => Some(CapsuleStatus::Pending),
        "minted" => Some(CapsuleStatus::Minted),
        "rejected" => Some(CapsuleStatus::Rejected),
        _ => None,
    }
}

fn capsule_to_rpc(c: Capsule) -> RpcCapsule {
    RpcCapsule {
        id: c.id,
        owner_hid: c.owner_hid.0,
        session_id: c.session_id,
        rich_score: c.rich_score,
        business_score: c.business_score,
        ecf_score: c.ecf_score,
        motivator: c.motivator,
        category: category_str(c.category),
        status: status_str(c.status),
        created_at: c.created_at,
        rejection_reason: c.rejection_reason,
        mint_seq: c.mint_seq,
    }
}

fn balance_to_rpc(b: TvmBalance) -> RpcTvmBalance {
    RpcTvmBalance {
        hid_milli: b.hid_milli,
        balance: b.as_f64(),
    }
}

#[async_trait]
impl BalanceChainApiServer for RpcServer {
    async fn get_chain_status(&self) -> RpcResult<RpcChainStatus> {
        let head = self.state.store.chain_head().map_err(|e| rpc_err(-32603, e.to_string()))?;
        let len = self.state.store.chain_len().map_err(|e| rpc_err(-32603, e.to_string()))?;
        let latch = self.state.store.read_only().map_err(|e| rpc_err(-32603, e.to_string()))?;

        Ok(RpcChainStatus {
            head,
            len,
            read_only: latch.as_ref().map(|l| l.enabled).unwrap_or(false),
            read_only_reason: latch.map(|l| l.reason),
        })
    }

    async fn get_segment(&self, seq: u64) -> RpcResult<Option<serde_json::Value>> {
        let segment = self
            .state
            .store
            .get_segment(seq)
            .map_err(|e| rpc_err(-32603, e.to_string()))?;
        segment
            .map(|s| serde_json::to_value(s).map_err(|e| rpc_err(-32603, e.to_string())))
            .transpose()
    }

    async fn get_messages(&self, peer: String) -> RpcResult<Vec<RpcMessageView>> {
        let views = self
            .state
            .store
            .messages_for_peer(&peer)
            .map_err(|e| rpc_err(-32603, e.to_string()))?;
        Ok(views.into_iter().map(message_to_rpc).collect())
    }

    async fn get_caps_availability(&self, hid: String) -> RpcResult<RpcCapsAvailability> {
        let hid = Hid(hid);
        let accountant = CapsAccountant::new(&self.state.store);
        let now = now_ms();

        let availability = accountant
            .available(&hid, now)
            .map_err(|e| rpc_err(-32603, e.to_string()))?;
        let unlocked_balance = accountant
            .unlocked_balance(&hid, now)
            .map_err(|e| rpc_err(-32603, e.to_string()))?;

        Ok(RpcCapsAvailability {
            daily_available: availability.daily_available,
            monthly_available: availability.monthly_available,
            yearly_available: availability.yearly_available,
            unlocked_balance,
        })
    }

    async fn get_capsules_by_session(&self, session_id: String) -> RpcResult<Vec<RpcCapsule>> {
        let capsules = self
            .state
            .store
            .list_capsules_by_session(&session_id)
            .map_err(|e| rpc_err(-32603, e.to_string()))?;
        Ok(capsules.into_iter().map(capsule_to_rpc).collect())
    }

    async fn get_capsules_by_status(&self, status: String) -> RpcResult<Vec<RpcCapsule>> {
        let status = parse_status(&status)
            .ok_or_else(|| rpc_err(-32602, format!("unknown capsule status: {status}")))?;
        let capsules = self
            .state
            .store
            .list_capsules_by_status(status)
            .map_err(|e| rpc_err(-32603, e.to_string()))?;
        Ok(capsules.into_iter().map(capsule_to_rpc).collect())
    }

    async fn get_tvm_balance(&self, hid: String) -> RpcResult<RpcTvmBalance> {
        let balance = self
            .state
            .store
            .get_tvm_balance(&Hid(hid))
            .map_err(|e| rpc_err(-32603, e.to_string()))?;
        Ok(balance_to_rpc(balance))
    }
}
