use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, put};
use axum::Router;
use constants::MAX_BODY_SIZE;
use strata_core::proof::ProofError;
use strata_core::{BlobHash, Endpoint};
use strata_ledger::LedgerError;
use strata_node::db::DbError;
use strata_node::{Node, NodeError};
use strata_protocol::ip::get_ip;
use strata_protocol::{HttpPeerClient, PeerClient, PeerError};
use strata_storage::local::LocalStorage;
use strata_storage::{Storage, StorageError};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub use hoster::{Hoster, HosterConfig};
pub use scheduler::MonitoringScheduler;

pub mod consensus;
mod constants;
pub mod hoster;
pub mod monitor;
pub mod payments;
pub mod repair;
pub mod replica;
mod routes;
pub mod scheduler;
#[cfg(test)]
mod test_utils;

#[derive(Debug, Error)]
pub enum HosterError {
    #[error("No deposit for file {0}")]
    NoDeposit(BlobHash),

    #[error("File {0} already exists")]
    AlreadyExists(BlobHash),

    #[error("File {0} not found")]
    NotFound(BlobHash),

    #[error("Invalid signature for file {0}")]
    InvalidSignature(BlobHash),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not enough space: {requested} bytes requested, {available} available")]
    InsufficientSpace { requested: u64, available: u64 },

    #[error("File {0} is still registered to this node")]
    StillRegistered(BlobHash),

    #[error("No peer accepted a copy of {0}")]
    NoReplacement(BlobHash),

    #[error("Proof error: {0}")]
    Proof(#[from] ProofError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Peer error: {0}")]
    Peer(#[from] PeerError),

    #[error("Node error: {0}")]
    Node(#[from] NodeError),
}

/// State shared by the request handlers
#[derive(Clone)]
pub struct HosterState {
    pub hoster: Arc<Hoster>,
    pub scheduler: Arc<MonitoringScheduler>,
}

pub fn router(state: HosterState) -> Router {
    Router::new()
        .route(
            "/files",
            get(routes::list_files).post(routes::create_metadata),
        )
        .route(
            "/files/{hash}",
            get(routes::get_body)
                .put(routes::upload_body)
                .delete(routes::delete_file),
        )
        .route("/files/{hash}/proof", get(routes::proof))
        .route("/files/{hash}/metadata", put(routes::final_metadata))
        .route("/files/{hash}/{peer}/status", get(routes::peer_status))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Register this node's endpoint with the ledger so renters can find it.
pub async fn announce(hoster: &Hoster) -> Result<Endpoint> {
    let endpoint = match &hoster.config.public_endpoint {
        Some(endpoint) => endpoint.clone(),
        None => {
            let ip = get_ip().await.context("Failed to discover the public IP")?;
            Endpoint::new(format!("{ip}:{}", hoster.config.api_port))
        }
    };
    hoster
        .ledger()
        .register_host(hoster.address(), &endpoint)
        .await
        .context("Failed to register as a host")?;
    info!("Announced {} at {endpoint}", hoster.address());
    Ok(endpoint)
}

/// Serve the hoster API and run the monitoring scheduler until the server
/// stops.
pub async fn run_hoster(config: HosterConfig, node: Arc<Node>) -> Result<()> {
    let storage: Arc<dyn Storage> = Arc::new(
        LocalStorage::new(&config.store_dir).context("Failed to open the blob store")?,
    );
    let client: Arc<dyn PeerClient> = Arc::new(
        HttpPeerClient::new(config.upload_timeout, config.proof_timeout)
            .context("Failed to build the peer client")?,
    );
    let port = config.api_port;
    let hoster = Arc::new(Hoster::new(config, node, storage, client));

    if let Err(e) = announce(&hoster).await {
        warn!("Could not announce this node: {e:#}");
    }

    let scheduler = MonitoringScheduler::new(hoster.clone());
    let scheduled = scheduler
        .start()
        .await
        .context("Failed to start the monitoring scheduler")?;
    info!("Monitoring {scheduled} held blob(s)");

    let app = router(HosterState {
        hoster: hoster.clone(),
        scheduler: scheduler.clone(),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Hoster HTTP server listening on {addr}");
    let served = axum::serve(
        TcpListener::bind(addr)
            .await
            .context("Failed to bind HTTP server")?,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("HTTP server failed");

    scheduler.stop();
    hoster.tasks.abort_all();
    served
}

async fn main(config: HosterConfig, node: Arc<Node>) -> Result<()> {
    std::panic::set_hook(Box::new(|info| {
        eprintln!("One of the threads panicked {}", info);
        std::process::abort();
    }));
    run_hoster(config, node).await
}

/// Runs the hoster on its own tokio runtime
pub fn run(config: HosterConfig, node: Arc<Node>) -> Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build the tokio runtime")?
        .block_on(main(config, node))
}
