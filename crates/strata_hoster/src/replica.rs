//! Blobs held on behalf of other nodes.
//!
//! [`ReplicaStore`] owns the hoster side of a blob's life: metadata announced
//! by a renter or repairing peer, the body that follows it, proofs served to
//! auditors and removal once the blob is no longer ours to keep.

use std::collections::HashSet;
use std::sync::Arc;

use strata_core::crypto::{self, is_well_formed_signature};
use strata_core::models::{HostedBlob, HostedStatus, LinkStatus};
use strata_core::proof::challenge;
use strata_core::{Address, BlobHash, ProofDigest};
use strata_node::db::DbError;
use strata_node::{DiskQuota, Node};
use strata_protocol::CreateMetadataRequest;
use strata_storage::{Storage, StorageError};
use tracing::{debug, info, warn};

use crate::HosterError;

#[derive(Clone)]
pub struct ReplicaStore {
    node: Arc<Node>,
    storage: Arc<dyn Storage>,
    quota: DiskQuota,
}

/// Place `me` in an announced holder list: in the slot of the holder being
/// replaced, or at the end. Returns the list and this node's index in it.
pub fn claim_slot(
    mut hosts: Vec<Address>,
    me: &Address,
    replacing: Option<&Address>,
) -> (Vec<Address>, u32) {
    if let Some(position) = hosts.iter().position(|h| h == me) {
        if let Some(old) = replacing {
            hosts.retain(|h| h != old);
        }
        let slot = hosts.iter().position(|h| h == me).unwrap_or(position);
        return (hosts, slot as u32);
    }

    let slot = match replacing.and_then(|old| hosts.iter().position(|h| h == old)) {
        Some(index) => {
            hosts[index] = me.clone();
            index
        }
        None => {
            hosts.push(me.clone());
            hosts.len() - 1
        }
    };
    (hosts, slot as u32)
}

impl ReplicaStore {
    pub fn new(node: Arc<Node>, storage: Arc<dyn Storage>, quota: DiskQuota) -> Self {
        Self {
            node,
            storage,
            quota,
        }
    }

    fn me(&self) -> &Address {
        self.node.address()
    }

    pub async fn hashes(&self) -> Result<Vec<BlobHash>, HosterError> {
        Ok(self
            .node
            .blobs
            .list()
            .await?
            .into_iter()
            .map(|b| b.hash)
            .collect())
    }

    pub async fn get(&self, hash: &BlobHash) -> Result<HostedBlob, HosterError> {
        self.node
            .blobs
            .get(hash)
            .await?
            .ok_or(HosterError::NotFound(*hash))
    }

    pub fn has_body(&self, hash: &BlobHash) -> bool {
        self.storage.contains(hash)
    }

    pub fn read_body(&self, hash: &BlobHash) -> Result<Vec<u8>, HosterError> {
        self.storage.read(hash).map_err(|e| match e {
            StorageError::NotFound(hash) => HosterError::NotFound(hash),
            e => e.into(),
        })
    }

    /// Bytes still free under the hosting quota.
    pub async fn available_space(&self) -> Result<u64, HosterError> {
        let used = self.node.blobs.total_size().await?;
        Ok(self.quota.bytes().saturating_sub(used))
    }

    /// Accept the announcement of a blob that is about to be uploaded here.
    pub async fn create_metadata(
        &self,
        request: CreateMetadataRequest,
    ) -> Result<HostedBlob, HosterError> {
        let hash = request.file_hash;
        info!(
            "Creating metadata for {hash} owned by {}",
            request.client_contract_address
        );

        let available = self.available_space().await?;
        if request.size > available {
            warn!("Not enough space for {hash}: {} > {available}", request.size);
            return Err(HosterError::InsufficientSpace {
                requested: request.size,
                available,
            });
        }

        let deposit = self
            .node
            .ledger
            .get_deposit(&request.client_contract_address, &hash)
            .await?;
        if deposit.is_none() {
            warn!(
                "No deposit for {hash} from {}",
                request.client_contract_address
            );
            return Err(HosterError::NoDeposit(hash));
        }

        if !is_well_formed_signature(&request.signature) {
            warn!("Malformed signature for {hash}");
            return Err(HosterError::InvalidSignature(hash));
        }
        if !matches!(hex::decode(&request.owner_key), Ok(key) if key.len() == 32) {
            return Err(HosterError::BadRequest(format!(
                "owner key of {hash} is not a 32 byte hex key"
            )));
        }

        let mut blob = HostedBlob {
            hash,
            owner_key: request.owner_key,
            signature: request.signature,
            owner_contract_address: request.client_contract_address,
            size: request.size,
            status: HostedStatus::Active,
            no_deposit_strikes: 0,
            my_monitoring_slot: None,
            pending_replacement_peer: None,
            report_after_body: false,
            body_received: false,
        };

        let mut holders = Vec::new();
        if let Some(hosts) = request.hosts {
            let (hosts, slot) = claim_slot(hosts, self.me(), request.replacing.as_ref());
            blob.my_monitoring_slot = Some(slot);
            blob.report_after_body = true;
            blob.pending_replacement_peer = request.replacing;
            holders = hosts.into_iter().filter(|h| h != self.me()).collect();
        }

        match self.node.blobs.insert(&blob, &holders).await {
            Ok(()) => {}
            Err(DbError::AlreadyExists(_)) => {
                warn!("Metadata for {hash} already exists");
                return Err(HosterError::AlreadyExists(hash));
            }
            Err(e) => return Err(e.into()),
        }
        for holder in &holders {
            self.node.peers.repository().upsert(holder, None).await?;
        }
        Ok(blob)
    }

    /// Store the body of an announced blob after checking the owner's
    /// signature over it. A blob announced with a holder list is reported to
    /// the ledger once its body is in place.
    pub async fn load_body(&self, hash: &BlobHash, body: &[u8]) -> Result<HostedBlob, HosterError> {
        info!("Loading body of {hash} ({} bytes)", body.len());
        let mut blob = self.get(hash).await?;

        if let Err(e) = crypto::verify(&blob.owner_key, body, &blob.signature) {
            warn!("Rejecting body of {hash}: {e}");
            return Err(HosterError::InvalidSignature(*hash));
        }
        if body.len() as u64 != blob.size {
            return Err(HosterError::BadRequest(format!(
                "body of {hash} is {} bytes, {} were announced",
                body.len(),
                blob.size
            )));
        }

        self.storage.write(hash, body)?;
        blob.body_received = true;
        self.node.blobs.update(&blob).await?;

        if blob.report_after_body {
            self.report_holding(&mut blob).await?;
        }
        Ok(blob)
    }

    async fn report_holding(&self, blob: &mut HostedBlob) -> Result<(), HosterError> {
        let me = self.me();
        match &blob.pending_replacement_peer {
            Some(old) => {
                info!("Taking over {} from {old}", blob.hash);
                self.node.ledger.replace_host(me, old, &blob.hash).await?;
            }
            None => {
                info!("Registering as a holder of {}", blob.hash);
                self.node.ledger.add_host_to_file(me, &blob.hash).await?;
            }
        }
        blob.report_after_body = false;
        blob.pending_replacement_peer = None;
        self.node.blobs.update(blob).await?;
        Ok(())
    }

    /// Body of a blob, served only while its deposit lasts.
    pub async fn serve_body(&self, hash: &BlobHash) -> Result<Vec<u8>, HosterError> {
        let blob = self.get(hash).await?;
        let deposit = self
            .node
            .ledger
            .get_deposit(&blob.owner_contract_address, hash)
            .await?;
        if deposit.is_none() {
            return Err(HosterError::NoDeposit(*hash));
        }
        self.read_body(hash)
    }

    pub async fn proof(&self, hash: &BlobHash, from: u64, to: u64) -> Result<ProofDigest, HosterError> {
        debug!("Proof of {hash} over {from}..{to}");
        self.get(hash).await?;
        let body = self.read_body(hash)?;
        Ok(challenge(&body, from, to)?)
    }

    /// This node's view of `peer` as a holder of `hash`.
    pub async fn peer_status(&self, hash: &BlobHash, peer: &Address) -> Result<LinkStatus, HosterError> {
        self.node
            .links
            .get(hash, peer)
            .await?
            .map(|link| link.status)
            .ok_or(HosterError::NotFound(*hash))
    }

    /// Record the final holder list of a blob. Returns the number of new links.
    pub async fn add_holders(&self, hash: &BlobHash, hosts: &[Address]) -> Result<usize, HosterError> {
        let mut blob = self.get(hash).await?;
        if let Some(slot) = hosts.iter().position(|h| h == self.me()) {
            blob.my_monitoring_slot = Some(slot as u32);
            self.node.blobs.update(&blob).await?;
        }

        let others: Vec<Address> = hosts.iter().filter(|h| *h != self.me()).cloned().collect();
        for holder in &others {
            self.node.peers.repository().upsert(holder, None).await?;
        }
        let added = self.node.links.add_holders(hash, &others).await?;
        info!("Recorded {added} new holder(s) of {hash}");
        Ok(added)
    }

    /// Align the links of a blob with the holder list the ledger reports.
    pub async fn sync_holders(&self, hash: &BlobHash, ledger_hosts: &[Address]) -> Result<(), HosterError> {
        let listed: HashSet<&Address> = ledger_hosts.iter().collect();
        for link in self.node.links.for_blob(hash).await? {
            if !listed.contains(&link.peer) {
                debug!("{} no longer holds {hash}", link.peer);
                self.node.links.remove(hash, &link.peer).await?;
            }
        }
        self.add_holders(hash, ledger_hosts).await?;
        Ok(())
    }

    /// Remove the record, links and body of a blob. Returns whether a record
    /// existed.
    pub async fn delete(&self, hash: &BlobHash) -> Result<bool, HosterError> {
        self.storage.remove(hash)?;
        let existed = self.node.blobs.delete(hash).await?;
        info!("Deleted {hash}");
        Ok(existed)
    }

    /// Delete on request of the uploader. Refused while the ledger still
    /// lists this node as a holder.
    pub async fn release(&self, hash: &BlobHash) -> Result<bool, HosterError> {
        let hosts = self.node.ledger.get_file_hosts(hash).await?;
        if hosts.contains(self.me()) {
            warn!("Refusing to drop {hash}, the ledger lists this node as a holder");
            return Err(HosterError::StillRegistered(*hash));
        }
        self.delete(hash).await
    }
}

#[cfg(test)]
mod tests {
    use strata_ledger::memory::LedgerOp;
    use strata_ledger::LedgerError;
    use strata_protocol::memory::Behaviour;

    use super::*;
    use crate::test_utils::Fixture;

    #[test]
    fn test_claim_slot_appends() {
        let me = Address::new("me");
        let (hosts, slot) = claim_slot(vec![Address::new("a"), Address::new("b")], &me, None);
        assert_eq!(hosts, vec![Address::new("a"), Address::new("b"), me]);
        assert_eq!(slot, 2);
    }

    #[test]
    fn test_claim_slot_takes_replaced_position() {
        let me = Address::new("me");
        let hosts = vec![Address::new("a"), Address::new("old"), Address::new("b")];
        let (hosts, slot) = claim_slot(hosts, &me, Some(&Address::new("old")));
        assert_eq!(hosts, vec![Address::new("a"), me, Address::new("b")]);
        assert_eq!(slot, 1);
    }

    #[test]
    fn test_claim_slot_already_listed() {
        let me = Address::new("me");
        let hosts = vec![Address::new("old"), Address::new("a"), me.clone()];
        let (hosts, slot) = claim_slot(hosts, &me, Some(&Address::new("old")));
        assert_eq!(hosts, vec![Address::new("a"), me]);
        assert_eq!(slot, 1);
    }

    #[tokio::test]
    async fn test_create_metadata_rejections() {
        let fx = Fixture::new();
        let body = b"encrypted bytes".to_vec();
        let request = fx.signed_request(&body, None, None);
        let replicas = &fx.hoster.replicas;

        let err = replicas.create_metadata(request.clone()).await.unwrap_err();
        assert!(matches!(err, HosterError::NoDeposit(_)));

        fx.fund(&request.file_hash);
        let mut bad = request.clone();
        bad.signature = "abc".to_string();
        let err = replicas.create_metadata(bad).await.unwrap_err();
        assert!(matches!(err, HosterError::InvalidSignature(_)));

        replicas.create_metadata(request.clone()).await.unwrap();
        let err = replicas.create_metadata(request).await.unwrap_err();
        assert!(matches!(err, HosterError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_create_metadata_respects_quota() {
        let fx = Fixture::new();
        fx.hoster.config.quota.set_gib(0.0);
        let request = fx.signed_request(b"body", None, None);
        fx.fund(&request.file_hash);

        let err = fx.hoster.replicas.create_metadata(request).await.unwrap_err();
        assert!(matches!(
            err,
            HosterError::InsufficientSpace {
                requested: 4,
                available: 0
            }
        ));
    }

    #[tokio::test]
    async fn test_body_requires_owner_signature() {
        let fx = Fixture::new();
        let body = b"sealed".to_vec();
        let request = fx.signed_request(&body, None, None);
        fx.fund(&request.file_hash);
        fx.hoster.replicas.create_metadata(request.clone()).await.unwrap();

        let err = fx
            .hoster
            .replicas
            .load_body(&request.file_hash, b"forged")
            .await
            .unwrap_err();
        assert!(matches!(err, HosterError::InvalidSignature(_)));
        assert!(!fx.hoster.replicas.has_body(&request.file_hash));

        let blob = fx
            .hoster
            .replicas
            .load_body(&request.file_hash, &body)
            .await
            .unwrap();
        assert!(blob.body_received);
        assert_eq!(fx.hoster.replicas.read_body(&blob.hash).unwrap(), body);
    }

    #[tokio::test]
    async fn test_replacement_reports_after_body() {
        let fx = Fixture::new();
        let body = b"replicated".to_vec();
        let hosts = vec![Address::new("a"), Address::new("old"), Address::new("b")];
        let request = fx.signed_request(&body, Some(hosts.clone()), Some(Address::new("old")));
        let hash = request.file_hash;
        fx.fund(&hash);
        fx.register_file(&hash, &hosts);

        let blob = fx.hoster.replicas.create_metadata(request).await.unwrap();
        assert_eq!(blob.my_monitoring_slot, Some(1));
        assert!(blob.report_after_body);

        let mut peers: Vec<String> = fx
            .hoster
            .node
            .links
            .for_blob(&hash)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.peer.to_string())
            .collect();
        peers.sort();
        assert_eq!(peers, vec!["a", "b"]);

        let blob = fx.hoster.replicas.load_body(&hash, &body).await.unwrap();
        assert!(!blob.report_after_body);
        assert_eq!(blob.pending_replacement_peer, None);
        let record = fx.ledger.file(&hash).unwrap();
        assert!(record.hosts.contains(&Address::new("me")));
        assert!(!record.hosts.contains(&Address::new("old")));
    }

    #[tokio::test]
    async fn test_failed_report_is_retried_on_next_body() {
        let fx = Fixture::new();
        let body = b"twice".to_vec();
        let request = fx.signed_request(&body, Some(vec![Address::new("a")]), None);
        let hash = request.file_hash;
        fx.fund(&hash);
        fx.register_file(&hash, &[Address::new("a")]);
        fx.hoster.replicas.create_metadata(request).await.unwrap();

        fx.ledger.set_failing(LedgerOp::AddHost, true);
        let err = fx.hoster.replicas.load_body(&hash, &body).await.unwrap_err();
        assert!(matches!(err, HosterError::Ledger(LedgerError::Rejected(_))));
        assert!(fx.hoster.replicas.get(&hash).await.unwrap().report_after_body);

        fx.ledger.set_failing(LedgerOp::AddHost, false);
        fx.hoster.replicas.load_body(&hash, &body).await.unwrap();
        assert!(fx.ledger.file(&hash).unwrap().hosts.contains(&Address::new("me")));
    }

    #[tokio::test]
    async fn test_serve_body_needs_deposit() {
        let fx = Fixture::new();
        let hash = fx.hold(b"held body", &[]).await;
        assert_eq!(fx.hoster.replicas.serve_body(&hash).await.unwrap(), b"held body");

        fx.unfund(&hash);
        assert!(matches!(
            fx.hoster.replicas.serve_body(&hash).await,
            Err(HosterError::NoDeposit(_))
        ));
    }

    #[tokio::test]
    async fn test_release_refused_while_registered() {
        let fx = Fixture::new();
        let hash = fx.hold(b"kept", &[]).await;

        assert!(matches!(
            fx.hoster.replicas.release(&hash).await,
            Err(HosterError::StillRegistered(_))
        ));

        fx.register_file(&hash, &[]);
        assert!(fx.hoster.replicas.release(&hash).await.unwrap());
        assert!(!fx.hoster.replicas.has_body(&hash));
        assert!(matches!(
            fx.hoster.replicas.get(&hash).await,
            Err(HosterError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_sync_holders_follows_ledger() {
        let fx = Fixture::new();
        let hash = fx
            .hold(b"synced", &[("a:1", Behaviour::Honest), ("b:1", Behaviour::Honest)])
            .await;

        let listed = vec![Address::new("me"), Address::new("b:1"), Address::new("c:1")];
        fx.hoster.replicas.sync_holders(&hash, &listed).await.unwrap();

        let mut peers: Vec<String> = fx
            .hoster
            .node
            .links
            .for_blob(&hash)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.peer.to_string())
            .collect();
        peers.sort();
        assert_eq!(peers, vec!["b:1", "c:1"]);
        assert_eq!(
            fx.hoster.replicas.get(&hash).await.unwrap().my_monitoring_slot,
            Some(0)
        );
    }

    #[tokio::test]
    async fn test_proof_matches_local_challenge() {
        let fx = Fixture::new();
        let hash = fx.hold(b"0123456789", &[]).await;
        let digest = fx.hoster.replicas.proof(&hash, 2, 7).await.unwrap();
        assert_eq!(digest, challenge(b"0123456789", 2, 7).unwrap());

        assert!(matches!(
            fx.hoster.replicas.proof(&hash, 2, 70).await,
            Err(HosterError::Proof(_))
        ));
    }
}
