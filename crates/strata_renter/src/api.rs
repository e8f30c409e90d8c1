//! Local control API of the renter. Only loopback clients are served.
//!
//! `GET /` upgrades to the control socket, see [`crate::socket`].

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::{Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use strata_core::Address;
use strata_node::secrets::SecretsError;
use strata_node::DiskQuota;
use strata_protocol::wire::ErrorBody;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::listing::{list_files, FileEntry, ListingError};
use crate::socket;
use crate::Renter;

type ApiError = (StatusCode, Json<ErrorBody>);

#[derive(Clone)]
pub struct ApiState {
    pub renter: Arc<Renter>,
    pub quota: DiskQuota,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Info {
    /// Account address, absent while locked.
    pub address: Option<Address>,
    pub node_address: Address,
    pub locked: bool,
    pub mock: bool,
    pub ledger_url: String,
    pub api_port: u16,
    pub hosters_per_file: usize,
    /// GiB offered for hosting.
    pub disk_space: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Balance {
    pub balance: u128,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnlockRequest {
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Unlocked {
    pub address: Address,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DiskSpace {
    pub disk_space: f64,
}

fn reject(status: StatusCode, message: impl Into<String>) -> ApiError {
    let message = message.into();
    if status.is_server_error() {
        error!("Request failed: {message}");
    }
    (status, Json(ErrorBody { message }))
}

fn secrets_status(error: &SecretsError) -> StatusCode {
    match error {
        SecretsError::Locked | SecretsError::InvalidPassword => StatusCode::FORBIDDEN,
        SecretsError::Missing(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject_secrets(error: SecretsError) -> ApiError {
    reject(secrets_status(&error), error.to_string())
}

pub fn is_local(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback(),
        IpAddr::V6(v6) => {
            v6.is_loopback() || v6.to_ipv4_mapped().is_some_and(|v4| v4.is_loopback())
        }
    }
}

async fn local_only(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if !is_local(addr.ip()) {
        warn!("Refused control request from {addr}");
        return Err(reject(
            StatusCode::BAD_REQUEST,
            "the control API only serves local clients",
        ));
    }
    Ok(next.run(req).await)
}

async fn ping() -> &'static str {
    "pong"
}

async fn files(State(state): State<ApiState>) -> Result<Json<Vec<FileEntry>>, ApiError> {
    list_files(&state.renter).await.map(Json).map_err(|e| match e {
        ListingError::Secrets(e) => reject_secrets(e),
        e => reject(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    })
}

async fn info(State(state): State<ApiState>) -> Json<Info> {
    let node = &state.renter.node;
    let config = &state.renter.config;
    let address = node.secrets.secrets().ok().map(|s| s.address());
    Json(Info {
        locked: address.is_none(),
        address,
        node_address: node.address().clone(),
        mock: node.config.mock,
        ledger_url: node.config.ledger_url.clone(),
        api_port: config.api_port,
        hosters_per_file: config.hosters_per_file,
        disk_space: state.quota.gib(),
    })
}

async fn balance(State(state): State<ApiState>) -> Result<Json<Balance>, ApiError> {
    let address = state
        .renter
        .node
        .secrets
        .secrets()
        .map_err(reject_secrets)?
        .address();
    let balance = state
        .renter
        .ledger()
        .get_balance(&address)
        .await
        .map_err(|e| reject(StatusCode::BAD_GATEWAY, e.to_string()))?;
    Ok(Json(Balance { balance }))
}

async fn unlock(
    State(state): State<ApiState>,
    payload: Result<Json<UnlockRequest>, JsonRejection>,
) -> Result<Json<Unlocked>, ApiError> {
    let Json(request) = payload.map_err(|e| reject(StatusCode::BAD_REQUEST, e.body_text()))?;
    let address = state
        .renter
        .node
        .secrets
        .unlock(&request.password)
        .map_err(reject_secrets)?;
    info!("Unlocked account {address}");
    Ok(Json(Unlocked { address }))
}

async fn disk_space(
    State(state): State<ApiState>,
    payload: Result<Json<DiskSpace>, JsonRejection>,
) -> Result<Json<DiskSpace>, ApiError> {
    let Json(request) = payload.map_err(|e| reject(StatusCode::BAD_REQUEST, e.body_text()))?;
    if !request.disk_space.is_finite() || request.disk_space < 0.0 {
        return Err(reject(
            StatusCode::BAD_REQUEST,
            format!("invalid disk space {}", request.disk_space),
        ));
    }
    state.quota.set_gib(request.disk_space);
    info!("Disk space for hosting set to {} GiB", request.disk_space);
    Ok(Json(DiskSpace {
        disk_space: state.quota.gib(),
    }))
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(socket::upgrade))
        .route("/ping", get(ping))
        .route("/files", get(files))
        .route("/info", get(info))
        .route("/user/balance", get(balance))
        .route("/unlock", post(unlock))
        .route("/disk_space", post(disk_space))
        .layer(middleware::from_fn(local_only))
        .with_state(state)
}

/// Serve the control API on the loopback interface until it fails.
pub async fn serve_api(state: ApiState, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("Renter API listening on {addr}");
    axum::serve(
        TcpListener::bind(addr)
            .await
            .context("Failed to bind the renter API")?,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Renter API failed")
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, Ipv6Addr};

    use strata_node::secrets::SecretStore;
    use strata_protocol::memory::Behaviour;

    use super::*;
    use crate::test_utils::{setup_logging, Fixture};

    async fn serve(fx: &Fixture, quota: DiskQuota) -> String {
        setup_logging();
        let state = ApiState {
            renter: fx.renter.clone(),
            quota,
        };
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(
                listener,
                router(state).into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn test_is_local() {
        assert!(is_local(IpAddr::V4(Ipv4Addr::LOCALHOST)));
        assert!(is_local(IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert!(is_local("::ffff:127.0.0.1".parse().unwrap()));
        assert!(!is_local("192.168.1.20".parse().unwrap()));
        assert!(!is_local("2001:db8::1".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_ping_and_files() {
        let fx = Fixture::new();
        fx.uploaded("a.txt", b"alpha", &[("a:1", Behaviour::Honest)])
            .await;
        let base = serve(&fx, DiskQuota::from_gib(1.0)).await;
        let client = reqwest::Client::new();

        let pong = client.get(format!("{base}/ping")).send().await.unwrap();
        assert_eq!(pong.text().await.unwrap(), "pong");

        let files: Vec<FileEntry> = client
            .get(format!("{base}/files"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "a.txt");
        assert_eq!(files[0].size, 5);
    }

    #[tokio::test]
    async fn test_balance_requires_unlock() {
        let fx = Fixture::new();
        fx.ledger.set_balance(&fx.owner(), 1234);
        let base = serve(&fx, DiskQuota::from_gib(1.0)).await;
        let client = reqwest::Client::new();

        let balance: Balance = client
            .get(format!("{base}/user/balance"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(balance.balance, 1234);

        fx.renter.node.secrets.lock();
        let locked = client
            .get(format!("{base}/user/balance"))
            .send()
            .await
            .unwrap();
        assert_eq!(locked.status(), StatusCode::FORBIDDEN);

        let info: Info = client
            .get(format!("{base}/info"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(info.locked);
        assert_eq!(info.address, None);
        assert_eq!(info.node_address, Address::new("me"));
    }

    #[tokio::test]
    async fn test_unlock() {
        let fx = Fixture::new();
        let created = SecretStore::new(&fx.renter.node.config.secrets_file)
            .create("hunter2")
            .unwrap();
        fx.renter.node.secrets.lock();
        let base = serve(&fx, DiskQuota::from_gib(1.0)).await;
        let client = reqwest::Client::new();

        let wrong = client
            .post(format!("{base}/unlock"))
            .json(&serde_json::json!({ "password": "wrong" }))
            .send()
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::FORBIDDEN);
        assert!(fx.renter.node.secrets.is_locked());

        let unlocked: Unlocked = client
            .post(format!("{base}/unlock"))
            .json(&serde_json::json!({ "password": "hunter2" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(unlocked.address, created);
        assert!(!fx.renter.node.secrets.is_locked());

        let malformed = client
            .post(format!("{base}/unlock"))
            .header("content-type", "application/json")
            .body("{")
            .send()
            .await
            .unwrap();
        assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_disk_space_is_shared() {
        let fx = Fixture::new();
        let quota = DiskQuota::from_gib(1.0);
        let base = serve(&fx, quota.clone()).await;
        let client = reqwest::Client::new();

        let updated: DiskSpace = client
            .post(format!("{base}/disk_space"))
            .json(&serde_json::json!({ "disk_space": 2.5 }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!((updated.disk_space - 2.5).abs() < 1e-9);
        assert!((quota.gib() - 2.5).abs() < 1e-9);

        let negative = client
            .post(format!("{base}/disk_space"))
            .json(&serde_json::json!({ "disk_space": -1.0 }))
            .send()
            .await
            .unwrap();
        assert_eq!(negative.status(), StatusCode::BAD_REQUEST);
        assert!((quota.gib() - 2.5).abs() < 1e-9);
    }
}
