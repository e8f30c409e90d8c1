//! reqwest implementation of [`PeerClient`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use strata_core::constants::{PROOF_TIMEOUT_SECS, UPLOAD_TIMEOUT_SECS};
use strata_core::models::LinkStatus;
use strata_core::{Address, BlobHash, Endpoint, ProofDigest};
use tracing::debug;

use crate::wire::{CreateMetadataRequest, ErrorBody, FinalMetadata, ProofResponse, StatusResponse};
use crate::{PeerClient, PeerError};

#[derive(Clone)]
pub struct HttpPeerClient {
    client: reqwest::Client,
    upload_timeout: Duration,
    query_timeout: Duration,
}

impl HttpPeerClient {
    pub fn new(upload_timeout: Duration, query_timeout: Duration) -> Result<Self, PeerError> {
        let client = reqwest::Client::builder().build().map_err(|e| PeerError::Transport {
            endpoint: Endpoint::new("-"),
            message: e.to_string(),
        })?;
        Ok(Self {
            client,
            upload_timeout,
            query_timeout,
        })
    }

    async fn send(
        &self,
        endpoint: &Endpoint,
        request: RequestBuilder,
        expected: StatusCode,
    ) -> Result<Response, PeerError> {
        let response = request.send().await.map_err(|e| transport(endpoint, e))?;
        let status = response.status();
        if status == expected {
            return Ok(response);
        }

        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.message,
            Err(_) => status.to_string(),
        };
        Err(PeerError::Rejected {
            endpoint: endpoint.clone(),
            status: status.as_u16(),
            message,
        })
    }

    async fn json<T: DeserializeOwned>(
        endpoint: &Endpoint,
        response: Response,
    ) -> Result<T, PeerError> {
        response.json().await.map_err(|e| PeerError::Malformed {
            endpoint: endpoint.clone(),
            message: e.to_string(),
        })
    }
}

impl Default for HttpPeerClient {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
            upload_timeout: Duration::from_secs(UPLOAD_TIMEOUT_SECS),
            query_timeout: Duration::from_secs(PROOF_TIMEOUT_SECS),
        }
    }
}

fn transport(endpoint: &Endpoint, error: reqwest::Error) -> PeerError {
    if error.is_timeout() {
        PeerError::Timeout {
            endpoint: endpoint.clone(),
        }
    } else {
        PeerError::Transport {
            endpoint: endpoint.clone(),
            message: error.to_string(),
        }
    }
}

#[async_trait]
impl PeerClient for HttpPeerClient {
    async fn create_metadata(
        &self,
        endpoint: &Endpoint,
        request: &CreateMetadataRequest,
    ) -> Result<(), PeerError> {
        debug!("Creating metadata for {} on {endpoint}", request.file_hash);
        let builder = self
            .client
            .post(endpoint.url("/files"))
            .timeout(self.upload_timeout)
            .json(request);
        self.send(endpoint, builder, StatusCode::CREATED).await?;
        Ok(())
    }

    async fn upload_body(
        &self,
        endpoint: &Endpoint,
        hash: &BlobHash,
        body: &[u8],
    ) -> Result<(), PeerError> {
        debug!("Uploading {} bytes of {hash} to {endpoint}", body.len());
        let builder = self
            .client
            .put(endpoint.url(&format!("/files/{hash}")))
            .timeout(self.upload_timeout)
            .body(body.to_vec());
        self.send(endpoint, builder, StatusCode::OK).await?;
        Ok(())
    }

    async fn get_body(&self, endpoint: &Endpoint, hash: &BlobHash) -> Result<Vec<u8>, PeerError> {
        let builder = self
            .client
            .get(endpoint.url(&format!("/files/{hash}")))
            .timeout(self.upload_timeout);
        let response = self.send(endpoint, builder, StatusCode::OK).await?;
        let bytes = response.bytes().await.map_err(|e| transport(endpoint, e))?;
        Ok(bytes.to_vec())
    }

    async fn delete_file(&self, endpoint: &Endpoint, hash: &BlobHash) -> Result<(), PeerError> {
        let builder = self
            .client
            .delete(endpoint.url(&format!("/files/{hash}")))
            .timeout(self.query_timeout);
        self.send(endpoint, builder, StatusCode::OK).await?;
        Ok(())
    }

    async fn get_proof(
        &self,
        endpoint: &Endpoint,
        hash: &BlobHash,
        from: u64,
        to: u64,
    ) -> Result<ProofDigest, PeerError> {
        let builder = self
            .client
            .get(endpoint.url(&format!("/files/{hash}/proof")))
            .query(&[("from", from), ("to", to)])
            .timeout(self.query_timeout);
        let response = self.send(endpoint, builder, StatusCode::OK).await?;
        let proof: ProofResponse = Self::json(endpoint, response).await?;
        Ok(proof.hash)
    }

    async fn get_peer_status(
        &self,
        endpoint: &Endpoint,
        hash: &BlobHash,
        subject: &Address,
    ) -> Result<LinkStatus, PeerError> {
        let builder = self
            .client
            .get(endpoint.url(&format!("/files/{hash}/{subject}/status")))
            .timeout(self.query_timeout);
        let response = self.send(endpoint, builder, StatusCode::OK).await?;
        let status: StatusResponse = Self::json(endpoint, response).await?;
        Ok(status.status)
    }

    async fn put_final_metadata(
        &self,
        endpoint: &Endpoint,
        hash: &BlobHash,
        hosts: &[Address],
    ) -> Result<(), PeerError> {
        let builder = self
            .client
            .put(endpoint.url(&format!("/files/{hash}/metadata")))
            .timeout(self.query_timeout)
            .json(&FinalMetadata {
                hosts: hosts.to_vec(),
            });
        self.send(endpoint, builder, StatusCode::OK).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    /// Accepts connections and never answers them.
    async fn silent_peer() -> Endpoint {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        Endpoint::new(addr.to_string())
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        let endpoint = silent_peer().await;
        let client =
            HttpPeerClient::new(Duration::from_secs(30), Duration::from_millis(100)).unwrap();

        let err = client
            .get_proof(&endpoint, &BlobHash::new([3; 32]), 0, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, PeerError::Timeout { .. }), "got {err:?}");
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_closed_port_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client =
            HttpPeerClient::new(Duration::from_secs(30), Duration::from_secs(5)).unwrap();
        let err = client
            .delete_file(&Endpoint::new(addr.to_string()), &BlobHash::new([3; 32]))
            .await
            .unwrap_err();
        assert!(matches!(err, PeerError::Transport { .. }), "got {err:?}");
    }
}
