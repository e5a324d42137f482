//! balancechain-node — the BalanceChain node binary.
//!
//! Startup sequence:
//!   1. Open (or initialise) the state store
//!   2. Load the identity's public record, or generate one on first run
//!   3. Run a startup integrity scan, latching read-only mode if it fails
//!   4. Start the local read-only JSON-RPC API
//!   5. Run periodic maintenance (integrity scans, nonce-log purges) until
//!      shut down
//!
//! There is deliberately no P2P layer and no write endpoint here — both are
//! out of scope at this boundary. A segment is only ever appended by an
//! in-process caller holding the `Identity`'s private key (the UI/AI shells
//! this binary does not implement).

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use balancechain_api::{RpcServer, RpcServerState};
use balancechain_identity::Identity;
use balancechain_integrity::{full_scan, latch_if_corrupt};
use balancechain_store::Store;

#[derive(Parser, Debug)]
#[command(
    name = "balancechain-node",
    version,
    about = "BalanceChain node — local store, identity, and read-only API for one chain"
)]
struct Args {
    /// Directory for the persistent state store.
    #[arg(long, default_value = "~/.balancechain/data")]
    data_dir: PathBuf,

    /// Local read API listen address.
    #[arg(long, default_value = "127.0.0.1:8646")]
    rpc_addr: SocketAddr,

    /// Name of the environment variable holding the identity backup
    /// passphrase. Falls back to an insecure development default with a
    /// loud warning when unset — never use the fallback in production.
    #[arg(long, default_value = "BALANCECHAIN_PASSPHRASE")]
    passphrase_env: String,

    /// Seconds between background integrity scans.
    #[arg(long, default_value_t = 300)]
    integrity_scan_interval_secs: u64,

    /// Seconds between nonce-log purge sweeps.
    #[arg(long, default_value_t = 3600)]
    nonce_purge_interval_secs: u64,

    /// Nonce-log entries older than this are eligible for purging.
    #[arg(long, default_value_t = 30)]
    nonce_max_age_days: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,balancechain=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    info!("BalanceChain node starting");

    let data_dir = expand_tilde(&args.data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;

    let store = Arc::new(Store::open(&data_dir).context("opening state store")?);

    let passphrase = std::env::var(&args.passphrase_env).unwrap_or_else(|_| {
        warn!(
            var = %args.passphrase_env,
            "no passphrase environment variable set — using an insecure development default, DO NOT USE IN PRODUCTION"
        );
        "dev-only-insecure-passphrase".to_string()
    });

    let identity = load_or_create_identity(&store, &data_dir, &passphrase, now_ms())
        .context("loading or creating identity")?;
    info!(hid = %identity.hid(), "identity ready");

    // ── Startup integrity scan ──────────────────────────────────────────────
    match full_scan(&store, true) {
        Ok(report) if report.ok => {
            info!(head = %report.computed_head, duration_ms = report.duration_ms, "startup integrity scan clean");
        }
        Ok(report) => {
            error!(errors = report.errors.len(), "startup integrity scan found corruption");
            if let Err(e) = latch_if_corrupt(&store, &report, now_ms()) {
                error!(error = %e, "failed to latch read-only mode after failed integrity scan");
            }
        }
        Err(e) => error!(error = %e, "startup integrity scan could not run"),
    }

    if let Some(latch) = store.read_only().context("reading read-only latch")? {
        if latch.enabled {
            warn!(reason = %latch.reason, "node is starting in read-only mode");
        }
    }

    // ── Read API ─────────────────────────────────────────────────────────────
    let rpc_state = Arc::new(RpcServerState { store: Arc::clone(&store) });
    let _rpc_handle = RpcServer::new(rpc_state)
        .start(args.rpc_addr)
        .await
        .context("starting read API server")?;

    // ── Background maintenance ──────────────────────────────────────────────
    let maintenance_store = Arc::clone(&store);
    let integrity_interval = args.integrity_scan_interval_secs;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(integrity_interval));
        loop {
            ticker.tick().await;
            match full_scan(&maintenance_store, true) {
                Ok(report) if report.ok => info!("periodic integrity scan clean"),
                Ok(report) => {
                    error!(errors = report.errors.len(), "periodic integrity scan found corruption");
                    if let Err(e) = latch_if_corrupt(&maintenance_store, &report, now_ms()) {
                        error!(error = %e, "failed to latch read-only mode");
                    }
                }
                Err(e) => error!(error = %e, "periodic integrity scan could not run"),
            }
        }
    });

    let purge_store = Arc::clone(&store);
    let purge_interval = args.nonce_purge_interval_secs;
    let max_age_ms = args.nonce_max_age_days * 24 * 60 * 60 * 1000;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(purge_interval));
        loop {
            ticker.tick().await;
            match purge_store.purge_old_nonces(now_ms(), max_age_ms) {
                Ok(removed) if removed > 0 => info!(removed, "purged stale nonce-log entries"),
                Ok(_) => {}
                Err(e) => error!(error = %e, "nonce purge failed"),
            }
        }
    });

    info!(addr = %args.rpc_addr, "node ready");
    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("shutting down");
    Ok(())
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Restore the identity from its encrypted backup file next to the store,
/// or generate a fresh one on first run and write that backup out.
///
/// # Warning
/// Losing the backup file and its passphrase loses the chain's signing key
/// permanently — there is no recovery path for either.
fn load_or_create_identity(
    store: &Store,
    data_dir: &Path,
    passphrase: &str,
    now: i64,
) -> anyhow::Result<Identity> {
    let backup_path = data_dir.join("identity.backup");

    match Identity::load_public_record(store).context("reading identity public record")? {
        Some((hid, _pubkey, _created_at)) => {
            let frame = std::fs::read_to_string(&backup_path).with_context(|| {
                format!(
                    "identity record for {hid} exists but its backup file is missing at {}; \
                     restore from a saved backup or remove the data directory to start fresh",
                    backup_path.display()
                )
            })?;
            let identity = Identity::from_backup(&frame, passphrase)
                .context("decrypting identity backup — wrong passphrase?")?;
            if identity.hid() != hid {
                anyhow::bail!(
                    "identity backup hid {} does not match the store's public record hid {hid}",
                    identity.hid()
                );
            }
            Ok(identity)
        }
        None => {
            warn!("no identity found — generating a new one");
            let identity = Identity::generate(now);
            identity.persist_public(store).context("persisting identity public record")?;
            let frame = identity
                .export_backup(passphrase, now)
                .context("encrypting identity backup")?;
            std::fs::write(&backup_path, frame).with_context(|| {
                format!("writing identity backup to {}", backup_path.display())
            })?;
            warn!(path = %backup_path.display(), "back up this file and its passphrase — losing either loses the chain's signing key");
            Ok(identity)
        }
    }
}

/// Expand a leading `~` to the user's home directory (`HOME` or `USERPROFILE`).
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
