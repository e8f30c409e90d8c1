//! Placing a file on a quorum of hosters.
//!
//! An upload prepares the encrypted body, makes sure a deposit backs it, then
//! fans out to `hosters_per_file` peers. Failed peers are backfilled from the
//! untried pool until the quorum is met or the pool runs dry. The holder list
//! is committed to the ledger last; if that fails every placed copy is
//! deleted again so the ledger and the hosters never disagree.

use std::collections::HashSet;
use std::path::Path;

use chrono::Utc;
use futures::future::join_all;
use strata_core::crypto::{self, content_hash, CryptoError};
use strata_core::models::{Peer, RenterBlob, RenterStatus};
use strata_core::{Address, BlobHash};
use strata_ledger::confirm::poll_until;
use strata_ledger::{FileRegistration, LedgerError};
use strata_node::db::DbError;
use strata_node::secrets::SecretsError;
use strata_node::NodeError;
use strata_protocol::upload::upload_to_peer;
use strata_protocol::{CreateMetadataRequest, PeerError};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::constants::{DEPOSIT_PER_BYTE_HOUR, SUGGESTED_DEPOSIT_HOURS};
use crate::control::{PromptRequest, Reporter};
use crate::Renter;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Secrets error: {0}")]
    Secrets(#[from] SecretsError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("File {0} is already uploaded")]
    AlreadyUploaded(BlobHash),

    #[error("No deposit amount given for {0}")]
    DepositDeclined(BlobHash),

    #[error("Deposit of {requested} exceeds the balance of {balance}")]
    InsufficientBalance { balance: u128, requested: u128 },

    #[error("Deposit for {0} never became visible on the ledger")]
    DepositNotConfirmed(BlobHash),

    #[error("No hoster accepted {0}")]
    NoPeers(BlobHash),
}

/// An encrypted, signed body ready to be placed.
struct Prepared {
    blob: RenterBlob,
    owner: Address,
    request: CreateMetadataRequest,
    body: Vec<u8>,
}

pub struct ReplicationOrchestrator<'a> {
    renter: &'a Renter,
}

impl<'a> ReplicationOrchestrator<'a> {
    pub fn new(renter: &'a Renter) -> Self {
        Self { renter }
    }

    /// Upload the file at `path` and return its record once the ledger lists
    /// its holders.
    pub async fn upload(&self, path: &Path, reporter: &Reporter) -> Result<RenterBlob, UploadError> {
        info!("Started uploading {}", path.display());
        reporter
            .progress(format!("Preparing {} for uploading", path.display()))
            .await;
        let prepared = self.prepare(path).await?;
        let hash = prepared.blob.hash;

        match self.place(&prepared, reporter).await {
            Ok(blob) => {
                info!("Finished uploading {} as {hash}", path.display());
                Ok(blob)
            }
            Err(e) => {
                warn!("Upload of {hash} failed: {e}");
                self.discard(&hash).await;
                Err(e)
            }
        }
    }

    async fn prepare(&self, path: &Path) -> Result<Prepared, UploadError> {
        let plain = tokio::fs::read(path).await?;
        let secrets = self.renter.node.secrets.secrets()?;
        let owner = secrets.address();

        let hash = content_hash(&plain, &owner);
        let body = crypto::encrypt(&secrets.encryption_key, &plain)?;
        let signature = crypto::sign(&secrets.signing_key, &body);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| hash.to_string());

        let blob = RenterBlob {
            hash,
            name,
            size: body.len() as u64,
            signature: signature.clone(),
            status: RenterStatus::Preparing,
            timestamp: Utc::now(),
        };
        let repo = &self.renter.node.renter_blobs;
        match repo.insert(&blob).await {
            Ok(()) => {}
            Err(DbError::AlreadyExists(_)) => {
                let uploaded = self.renter.ledger().list_owner_files(&owner).await?;
                if uploaded.contains(&hash) {
                    warn!("{} is already uploaded as {hash}", path.display());
                    return Err(UploadError::AlreadyUploaded(hash));
                }
                info!("Retrying the unfinished upload of {hash}");
                repo.set_status(&hash, RenterStatus::Preparing).await?;
            }
            Err(e) => return Err(e.into()),
        }

        let request = CreateMetadataRequest {
            file_hash: hash,
            owner_key: secrets.owner_key(),
            signature,
            client_contract_address: owner.clone(),
            size: blob.size,
            hosts: None,
            replacing: None,
        };
        Ok(Prepared {
            blob,
            owner,
            request,
            body,
        })
    }

    async fn place(&self, prepared: &Prepared, reporter: &Reporter) -> Result<RenterBlob, UploadError> {
        let hash = prepared.blob.hash;
        self.ensure_deposit(prepared, reporter).await?;
        self.renter
            .node
            .renter_blobs
            .set_status(&hash, RenterStatus::Uploading)
            .await?;

        reporter.progress(format!("Uploading {hash} to hosters")).await;
        let hosts = self.fan_out(prepared).await?;
        let addresses: Vec<Address> = hosts.iter().map(|p| p.address.clone()).collect();
        info!("Placed {hash} on {} hoster(s)", addresses.len());

        reporter
            .progress(format!("Registering {hash} on the ledger"))
            .await;
        let registration = FileRegistration {
            hash,
            name: prepared.blob.name.clone(),
            size: prepared.blob.size,
            signature: prepared.blob.signature.clone(),
            hosts: addresses.clone(),
        };
        if let Err(e) = self
            .renter
            .ledger()
            .register_file(&prepared.owner, registration)
            .await
        {
            error!("Registering {hash} failed, removing it from every hoster: {e}");
            self.roll_back(&hash, &hosts).await;
            return Err(e.into());
        }

        self.send_final_hosts(&hash, &hosts, &addresses).await;
        self.renter
            .node
            .renter_blobs
            .mark_uploaded(&hash, &addresses)
            .await?;
        reporter.progress(format!("Uploaded {hash}")).await;

        Ok(RenterBlob {
            status: RenterStatus::Uploaded,
            ..prepared.blob.clone()
        })
    }

    /// Make sure a deposit backs the file, asking the front-end for an amount
    /// when there is none.
    async fn ensure_deposit(&self, prepared: &Prepared, reporter: &Reporter) -> Result<(), UploadError> {
        let hash = prepared.blob.hash;
        let owner = &prepared.owner;
        let ledger = self.renter.ledger();
        if ledger.get_deposit(owner, &hash).await?.is_some() {
            return Ok(());
        }

        let balance = ledger.get_balance(owner).await?;
        let suggested = prepared.blob.size as u128
            * self.renter.config.hosters_per_file as u128
            * SUGGESTED_DEPOSIT_HOURS
            * DEPOSIT_PER_BYTE_HOUR;
        let amount = reporter
            .ask(PromptRequest::DepositAmount {
                hash,
                balance,
                suggested,
            })
            .await
            .ok_or(UploadError::DepositDeclined(hash))?;
        if amount > balance {
            return Err(UploadError::InsufficientBalance {
                balance,
                requested: amount,
            });
        }

        reporter
            .progress(format!("Creating a deposit of {amount} for {hash}"))
            .await;
        ledger.make_deposit(owner, &hash, amount).await?;
        let what = format!("deposit for {hash}");
        poll_until(&what, &self.renter.config.deposit_backoff, || async move {
            Ok(ledger.get_deposit(owner, &hash).await?.is_some())
        })
        .await
        .map_err(|e| match e {
            LedgerError::ConfirmationTimeout(_) => UploadError::DepositNotConfirmed(hash),
            e => e.into(),
        })?;
        reporter.progress("Deposit created").await;
        Ok(())
    }

    /// Upload to one round of peers concurrently. Returns the peers that
    /// accepted the copy and those that did not.
    async fn round(&self, prepared: &Prepared, peers: Vec<Peer>) -> (Vec<Peer>, Vec<Peer>) {
        let client = self.renter.client.as_ref();
        let uploads = peers.iter().map(|peer| async move {
            let endpoint = peer
                .endpoint
                .as_ref()
                .ok_or_else(|| PeerError::NoEndpoint(peer.address.clone()))?;
            upload_to_peer(client, endpoint, &prepared.request, &prepared.body).await
        });
        let results = join_all(uploads).await;

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        for (peer, result) in peers.into_iter().zip(results) {
            match result {
                Ok(()) => succeeded.push(peer),
                Err(e) => {
                    warn!("Uploading {} to {} failed: {e}", prepared.blob.hash, peer.address);
                    failed.push(peer);
                }
            }
        }
        (succeeded, failed)
    }

    /// Place the body on up to `hosters_per_file` peers, backfilling failures
    /// with peers not tried yet.
    async fn fan_out(&self, prepared: &Prepared) -> Result<Vec<Peer>, UploadError> {
        let hash = prepared.blob.hash;
        let quorum = self.renter.config.hosters_per_file;
        let peers = &self.renter.node.peers;

        let mut tried: HashSet<Address> = HashSet::from([prepared.owner.clone()]);
        let mut placed: Vec<Peer> = Vec::new();
        let mut candidates = peers.candidates(quorum, &tried).await?;
        if candidates.is_empty() {
            error!("No hosters available for {hash}");
            return Err(UploadError::NoPeers(hash));
        }

        loop {
            tried.extend(candidates.iter().map(|p| p.address.clone()));
            let (succeeded, failed) = self.round(prepared, candidates).await;
            placed.extend(succeeded);
            if placed.len() >= quorum {
                break;
            }
            if !failed.is_empty() {
                info!(
                    "{} hoster(s) failed for {hash}, looking for {} more",
                    failed.len(),
                    quorum - placed.len()
                );
            }

            candidates = peers.candidates(quorum - placed.len(), &tried).await?;
            if candidates.is_empty() {
                if placed.is_empty() {
                    error!("Every hoster failed for {hash}");
                    return Err(UploadError::NoPeers(hash));
                }
                warn!("Only {} of {quorum} hoster(s) hold {hash}", placed.len());
                break;
            }
        }
        Ok(placed)
    }

    async fn roll_back(&self, hash: &BlobHash, hosts: &[Peer]) {
        let client = self.renter.client.as_ref();
        let deletes = hosts.iter().filter_map(|peer| {
            let endpoint = peer.endpoint.as_ref()?;
            Some(async move {
                match client.delete_file(endpoint, hash).await {
                    Ok(()) => info!("Deleted {hash} from {}", peer.address),
                    Err(e) => warn!("Could not delete {hash} from {}: {e}", peer.address),
                }
            })
        });
        join_all(deletes).await;
    }

    /// Tell every holder who the others are. Failures are only logged.
    async fn send_final_hosts(&self, hash: &BlobHash, hosts: &[Peer], addresses: &[Address]) {
        let client = self.renter.client.as_ref();
        let sends = hosts.iter().filter_map(|peer| {
            let endpoint = peer.endpoint.as_ref()?;
            Some(async move {
                if let Err(e) = client.put_final_metadata(endpoint, hash, addresses).await {
                    warn!("Sending the holder list of {hash} to {} failed: {e}", peer.address);
                }
            })
        });
        join_all(sends).await;
    }

    async fn discard(&self, hash: &BlobHash) {
        if let Err(e) = self.renter.node.renter_blobs.delete(hash).await {
            error!("Could not remove the local record of {hash}: {e}");
        }
    }
}
