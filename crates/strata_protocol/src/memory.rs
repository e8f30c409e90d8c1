//! In-memory peer network, mostly for testing purposes
//!
//! Each endpoint is backed by a fake hoster with a scripted [`Behaviour`].
//! Every call is recorded so tests can assert on who was contacted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use strata_core::models::LinkStatus;
use strata_core::proof::challenge;
use strata_core::{Address, BlobHash, Endpoint, ProofDigest};

use crate::wire::CreateMetadataRequest;
use crate::{PeerClient, PeerError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Behaviour {
    Honest,
    /// Every call times out.
    Unreachable,
    /// Metadata is refused with the given status.
    RejectMetadata(u16),
    /// Metadata is accepted but the body upload fails.
    RejectBody,
    /// Bodies come back with flipped bytes.
    CorruptBody,
    /// Proofs are computed over the wrong data.
    WrongProof,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    CreateMetadata(BlobHash),
    UploadBody(BlobHash),
    GetBody(BlobHash),
    Delete(BlobHash),
    GetProof(BlobHash),
    GetStatus(BlobHash, Address),
    PutFinalMetadata(BlobHash, Vec<Address>),
}

struct FakePeer {
    behaviour: Behaviour,
    metadata: HashMap<BlobHash, CreateMetadataRequest>,
    bodies: HashMap<BlobHash, Vec<u8>>,
    statuses: HashMap<(BlobHash, Address), LinkStatus>,
    final_hosts: HashMap<BlobHash, Vec<Address>>,
    calls: Vec<Call>,
}

impl FakePeer {
    fn new(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            metadata: HashMap::new(),
            bodies: HashMap::new(),
            statuses: HashMap::new(),
            final_hosts: HashMap::new(),
            calls: Vec::new(),
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryNetwork {
    peers: Arc<Mutex<HashMap<Endpoint, FakePeer>>>,
}

fn rejected(endpoint: &Endpoint, status: u16, message: &str) -> PeerError {
    PeerError::Rejected {
        endpoint: endpoint.clone(),
        status,
        message: message.to_string(),
    }
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    fn peers(&self) -> MutexGuard<'_, HashMap<Endpoint, FakePeer>> {
        self.peers.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_peer(&self, endpoint: &str, behaviour: Behaviour) -> Endpoint {
        let endpoint = Endpoint::new(endpoint);
        self.peers()
            .insert(endpoint.clone(), FakePeer::new(behaviour));
        endpoint
    }

    pub fn set_behaviour(&self, endpoint: &Endpoint, behaviour: Behaviour) {
        if let Some(peer) = self.peers().get_mut(endpoint) {
            peer.behaviour = behaviour;
        }
    }

    pub fn store_body(&self, endpoint: &Endpoint, hash: &BlobHash, body: &[u8]) {
        if let Some(peer) = self.peers().get_mut(endpoint) {
            peer.bodies.insert(*hash, body.to_vec());
        }
    }

    pub fn set_status(
        &self,
        endpoint: &Endpoint,
        hash: &BlobHash,
        subject: &Address,
        status: LinkStatus,
    ) {
        if let Some(peer) = self.peers().get_mut(endpoint) {
            peer.statuses.insert((*hash, subject.clone()), status);
        }
    }

    pub fn stored(&self, endpoint: &Endpoint, hash: &BlobHash) -> Option<Vec<u8>> {
        self.peers()
            .get(endpoint)
            .and_then(|p| p.bodies.get(hash).cloned())
    }

    pub fn metadata(&self, endpoint: &Endpoint, hash: &BlobHash) -> Option<CreateMetadataRequest> {
        self.peers()
            .get(endpoint)
            .and_then(|p| p.metadata.get(hash).cloned())
    }

    pub fn final_hosts(&self, endpoint: &Endpoint, hash: &BlobHash) -> Option<Vec<Address>> {
        self.peers()
            .get(endpoint)
            .and_then(|p| p.final_hosts.get(hash).cloned())
    }

    pub fn calls(&self, endpoint: &Endpoint) -> Vec<Call> {
        self.peers()
            .get(endpoint)
            .map(|p| p.calls.clone())
            .unwrap_or_default()
    }

    /// Endpoints that received at least one call.
    pub fn contacted(&self) -> Vec<Endpoint> {
        let mut contacted: Vec<Endpoint> = self
            .peers()
            .iter()
            .filter(|(_, p)| !p.calls.is_empty())
            .map(|(e, _)| e.clone())
            .collect();
        contacted.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        contacted
    }

    /// Record `call` against `endpoint` and run `f` on the peer unless it is
    /// unreachable.
    fn with_peer<T>(
        &self,
        endpoint: &Endpoint,
        call: Call,
        f: impl FnOnce(&mut FakePeer) -> Result<T, PeerError>,
    ) -> Result<T, PeerError> {
        let mut peers = self.peers();
        let Some(peer) = peers.get_mut(endpoint) else {
            return Err(PeerError::Transport {
                endpoint: endpoint.clone(),
                message: "connection refused".to_string(),
            });
        };
        peer.calls.push(call);
        if peer.behaviour == Behaviour::Unreachable {
            return Err(PeerError::Timeout {
                endpoint: endpoint.clone(),
            });
        }
        f(peer)
    }
}

#[async_trait]
impl PeerClient for MemoryNetwork {
    async fn create_metadata(
        &self,
        endpoint: &Endpoint,
        request: &CreateMetadataRequest,
    ) -> Result<(), PeerError> {
        self.with_peer(endpoint, Call::CreateMetadata(request.file_hash), |peer| {
            if let Behaviour::RejectMetadata(status) = peer.behaviour {
                return Err(rejected(endpoint, status, "metadata refused"));
            }
            if peer.metadata.contains_key(&request.file_hash) {
                return Err(rejected(endpoint, 422, "already exists"));
            }
            peer.metadata.insert(request.file_hash, request.clone());
            Ok(())
        })
    }

    async fn upload_body(
        &self,
        endpoint: &Endpoint,
        hash: &BlobHash,
        body: &[u8],
    ) -> Result<(), PeerError> {
        self.with_peer(endpoint, Call::UploadBody(*hash), |peer| {
            if peer.behaviour == Behaviour::RejectBody {
                return Err(rejected(endpoint, 500, "disk error"));
            }
            if !peer.metadata.contains_key(hash) {
                return Err(rejected(endpoint, 404, "not found"));
            }
            peer.bodies.insert(*hash, body.to_vec());
            Ok(())
        })
    }

    async fn get_body(&self, endpoint: &Endpoint, hash: &BlobHash) -> Result<Vec<u8>, PeerError> {
        self.with_peer(endpoint, Call::GetBody(*hash), |peer| {
            let mut body = peer
                .bodies
                .get(hash)
                .cloned()
                .ok_or_else(|| rejected(endpoint, 404, "not found"))?;
            if peer.behaviour == Behaviour::CorruptBody {
                body.iter_mut().for_each(|b| *b ^= 0xFF);
            }
            Ok(body)
        })
    }

    async fn delete_file(&self, endpoint: &Endpoint, hash: &BlobHash) -> Result<(), PeerError> {
        self.with_peer(endpoint, Call::Delete(*hash), |peer| {
            peer.metadata.remove(hash);
            peer.bodies.remove(hash);
            Ok(())
        })
    }

    async fn get_proof(
        &self,
        endpoint: &Endpoint,
        hash: &BlobHash,
        from: u64,
        to: u64,
    ) -> Result<ProofDigest, PeerError> {
        self.with_peer(endpoint, Call::GetProof(*hash), |peer| {
            let body = peer
                .bodies
                .get(hash)
                .ok_or_else(|| rejected(endpoint, 404, "not found"))?;
            if peer.behaviour == Behaviour::WrongProof {
                return Ok(ProofDigest::digest(b"not the body"));
            }
            challenge(body, from, to).map_err(|e| rejected(endpoint, 400, &e.to_string()))
        })
    }

    async fn get_peer_status(
        &self,
        endpoint: &Endpoint,
        hash: &BlobHash,
        subject: &Address,
    ) -> Result<LinkStatus, PeerError> {
        self.with_peer(endpoint, Call::GetStatus(*hash, subject.clone()), |peer| {
            peer.statuses
                .get(&(*hash, subject.clone()))
                .copied()
                .ok_or_else(|| rejected(endpoint, 404, "not found"))
        })
    }

    async fn put_final_metadata(
        &self,
        endpoint: &Endpoint,
        hash: &BlobHash,
        hosts: &[Address],
    ) -> Result<(), PeerError> {
        self.with_peer(
            endpoint,
            Call::PutFinalMetadata(*hash, hosts.to_vec()),
            |peer| {
                peer.final_hosts.insert(*hash, hosts.to_vec());
                Ok(())
            },
        )
    }
}
