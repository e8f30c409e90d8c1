use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use strata_core::{Address, BlobHash};
use strata_protocol::wire::{
    ErrorBody, FileAck, FileList, FinalMetadata, ProofQuery, ProofResponse, StatusResponse,
};
use strata_protocol::CreateMetadataRequest;
use strata_storage::StorageError;
use tracing::{error, info, warn};

use crate::{HosterError, HosterState};

type ApiError = (StatusCode, Json<ErrorBody>);

pub fn status_code(error: &HosterError) -> StatusCode {
    match error {
        HosterError::NoDeposit(_) => StatusCode::PAYMENT_REQUIRED,
        HosterError::AlreadyExists(_) => StatusCode::UNPROCESSABLE_ENTITY,
        HosterError::NotFound(_) | HosterError::Storage(StorageError::NotFound(_)) => {
            StatusCode::NOT_FOUND
        }
        HosterError::InvalidSignature(_) | HosterError::BadRequest(_) | HosterError::Proof(_) => {
            StatusCode::BAD_REQUEST
        }
        HosterError::InsufficientSpace { .. } => StatusCode::INSUFFICIENT_STORAGE,
        HosterError::StillRegistered(_) => StatusCode::CONFLICT,
        HosterError::Ledger(_) | HosterError::Peer(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(error: HosterError) -> ApiError {
    let status = status_code(&error);
    if status.is_server_error() {
        error!("Request failed: {error}");
    }
    (
        status,
        Json(ErrorBody {
            message: error.to_string(),
        }),
    )
}

fn parse_hash(raw: &str) -> Result<BlobHash, ApiError> {
    raw.parse()
        .map_err(|e| reject(HosterError::BadRequest(format!("invalid hash {raw}: {e}"))))
}

async fn reschedule(state: &HosterState) {
    if let Err(e) = state.scheduler.reload().await {
        warn!("Failed to update the monitoring schedule: {e}");
    }
}

/// List the hashes of every held blob
pub async fn list_files(State(state): State<HosterState>) -> Result<Json<FileList>, ApiError> {
    info!("File list");
    let files = state.hoster.replicas.hashes().await.map_err(reject)?;
    Ok(Json(FileList { files }))
}

/// Accept metadata for a blob about to be uploaded
pub async fn create_metadata(
    State(state): State<HosterState>,
    payload: Result<Json<CreateMetadataRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) =
        payload.map_err(|e| reject(HosterError::BadRequest(e.body_text())))?;
    let announced_hosts = request.hosts.is_some();

    let blob = state
        .hoster
        .replicas
        .create_metadata(request)
        .await
        .map_err(reject)?;
    if announced_hosts {
        reschedule(&state).await;
    }
    Ok((StatusCode::CREATED, Json(FileAck { hash: blob.hash })))
}

/// Receive the body of an announced blob
pub async fn upload_body(
    State(state): State<HosterState>,
    Path(hash): Path<String>,
    body: Bytes,
) -> Result<Json<FileAck>, ApiError> {
    let hash = parse_hash(&hash)?;
    let blob = state
        .hoster
        .replicas
        .load_body(&hash, &body)
        .await
        .map_err(reject)?;
    reschedule(&state).await;
    Ok(Json(FileAck { hash: blob.hash }))
}

/// Serve the body of a held blob while its deposit lasts
pub async fn get_body(
    State(state): State<HosterState>,
    Path(hash): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let hash = parse_hash(&hash)?;
    info!("File content of {hash}");
    let body = state.hoster.replicas.serve_body(&hash).await.map_err(reject)?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/octet-stream")],
        body,
    ))
}

/// Drop a blob this node was never registered for
pub async fn delete_file(
    State(state): State<HosterState>,
    Path(hash): Path<String>,
) -> Result<Json<FileAck>, ApiError> {
    let hash = parse_hash(&hash)?;
    state.hoster.replicas.release(&hash).await.map_err(reject)?;
    reschedule(&state).await;
    Ok(Json(FileAck { hash }))
}

/// Digest of a byte range of a held blob
pub async fn proof(
    State(state): State<HosterState>,
    Path(hash): Path<String>,
    Query(range): Query<ProofQuery>,
) -> Result<Json<ProofResponse>, ApiError> {
    let hash = parse_hash(&hash)?;
    let digest = state
        .hoster
        .replicas
        .proof(&hash, range.from, range.to)
        .await
        .map_err(reject)?;
    Ok(Json(ProofResponse { hash: digest }))
}

/// This node's view of another holder of a blob
pub async fn peer_status(
    State(state): State<HosterState>,
    Path((hash, peer)): Path<(String, String)>,
) -> Result<Json<StatusResponse>, ApiError> {
    let hash = parse_hash(&hash)?;
    let peer = Address::new(peer);
    info!("Status of {peer} for {hash}");
    let status = state
        .hoster
        .replicas
        .peer_status(&hash, &peer)
        .await
        .map_err(reject)?;
    Ok(Json(StatusResponse { status }))
}

/// Final holder list of a blob, sent by the renter after registration
pub async fn final_metadata(
    State(state): State<HosterState>,
    Path(hash): Path<String>,
    payload: Result<Json<FinalMetadata>, JsonRejection>,
) -> Result<Json<FileAck>, ApiError> {
    let hash = parse_hash(&hash)?;
    let Json(metadata) =
        payload.map_err(|e| reject(HosterError::BadRequest(e.body_text())))?;
    info!("Final metadata for {hash}: {} host(s)", metadata.hosts.len());

    state
        .hoster
        .replicas
        .add_holders(&hash, &metadata.hosts)
        .await
        .map_err(reject)?;
    reschedule(&state).await;
    Ok(Json(FileAck { hash }))
}
