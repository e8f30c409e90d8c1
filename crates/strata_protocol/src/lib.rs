//! Peer-to-peer protocol between renters and hosters.
//!
//! Hosters serve a small HTTP API. [`PeerClient`] is the calling side of it,
//! implemented over reqwest by [`client::HttpPeerClient`] and in memory by
//! [`memory::MemoryNetwork`].

use async_trait::async_trait;
use strata_core::models::LinkStatus;
use strata_core::{Address, BlobHash, Endpoint, ProofDigest};
use thiserror::Error;

pub mod client;
pub mod ip;
pub mod memory;
pub mod upload;
pub mod wire;

pub use client::HttpPeerClient;
pub use wire::CreateMetadataRequest;

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("Request to {endpoint} timed out")]
    Timeout { endpoint: Endpoint },

    #[error("Transport error talking to {endpoint}: {message}")]
    Transport { endpoint: Endpoint, message: String },

    #[error("{endpoint} rejected the request with status {status}: {message}")]
    Rejected {
        endpoint: Endpoint,
        status: u16,
        message: String,
    },

    #[error("Malformed response from {endpoint}: {message}")]
    Malformed { endpoint: Endpoint, message: String },

    #[error("Peer {0} has no known endpoint")]
    NoEndpoint(Address),
}

impl PeerError {
    /// Timeouts and connection failures, as opposed to explicit rejections.
    pub fn is_transient(&self) -> bool {
        matches!(self, PeerError::Timeout { .. } | PeerError::Transport { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            PeerError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Calls a hoster makes or receives on behalf of a blob.
#[async_trait]
pub trait PeerClient: Send + Sync {
    /// Announce a blob. Succeeds only on `201 Created`.
    async fn create_metadata(
        &self,
        endpoint: &Endpoint,
        request: &CreateMetadataRequest,
    ) -> Result<(), PeerError>;

    async fn upload_body(
        &self,
        endpoint: &Endpoint,
        hash: &BlobHash,
        body: &[u8],
    ) -> Result<(), PeerError>;

    async fn get_body(&self, endpoint: &Endpoint, hash: &BlobHash) -> Result<Vec<u8>, PeerError>;

    async fn delete_file(&self, endpoint: &Endpoint, hash: &BlobHash) -> Result<(), PeerError>;

    async fn get_proof(
        &self,
        endpoint: &Endpoint,
        hash: &BlobHash,
        from: u64,
        to: u64,
    ) -> Result<ProofDigest, PeerError>;

    /// The peer's cached view of `subject` as a holder of `hash`.
    async fn get_peer_status(
        &self,
        endpoint: &Endpoint,
        hash: &BlobHash,
        subject: &Address,
    ) -> Result<LinkStatus, PeerError>;

    async fn put_final_metadata(
        &self,
        endpoint: &Endpoint,
        hash: &BlobHash,
        hosts: &[Address],
    ) -> Result<(), PeerError>;
}
