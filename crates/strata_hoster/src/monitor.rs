//! One monitoring cycle over one held blob.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use strata_core::models::{DepositVerdict, HostedBlob, ReplicaLink};
use strata_core::proof::{challenge, draw_range};
use strata_core::{Address, BlobHash, ProofDigest};
use strata_protocol::PeerError;
use tracing::{debug, info, warn};

use crate::consensus::{self, ConsensusOutcome};
use crate::hoster::Hoster;
use crate::repair;
use crate::HosterError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteReason {
    NoDeposit,
    BodyMissing,
    NotAHolder,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The blob was deleted locally.
    Deleted(DeleteReason),
    /// The deposit is missing. The blob is kept until the strike limit.
    AwaitingDeposit { strikes: u32 },
    /// Proofs were collected from every linked holder.
    Audited {
        matched: usize,
        missed: usize,
        consensus: Vec<(Address, ConsensusOutcome)>,
    },
    /// Nothing to do: unknown blob or a cycle already running.
    Skipped,
}

/// Run a cycle for `hash` unless one is already in flight.
pub async fn monitor(hoster: &Arc<Hoster>, hash: &BlobHash) -> Result<CycleOutcome, HosterError> {
    if !hoster.begin_cycle(hash) {
        debug!("Monitoring of {hash} is still running, skipping");
        return Ok(CycleOutcome::Skipped);
    }
    let outcome = run_cycle(hoster, hash).await;
    hoster.end_cycle(hash);
    outcome
}

/// Start a tracked cycle for `hash` in the background.
pub fn spawn_cycle(hoster: &Arc<Hoster>, hash: BlobHash) {
    let task_hoster = hoster.clone();
    hoster.tasks.spawn(format!("monitor {hash}"), async move {
        let outcome = monitor(&task_hoster, &hash).await?;
        debug!("Monitoring of {hash} finished: {outcome:?}");
        Ok::<(), HosterError>(())
    });
}

async fn run_cycle(hoster: &Arc<Hoster>, hash: &BlobHash) -> Result<CycleOutcome, HosterError> {
    let Some(mut blob) = hoster.node.blobs.get(hash).await? else {
        return Ok(CycleOutcome::Skipped);
    };
    info!("Started monitoring for {hash}");
    let replicas = &hoster.replicas;

    let deposit = hoster
        .ledger()
        .get_deposit(&blob.owner_contract_address, hash)
        .await?;
    if deposit.is_none() {
        let verdict = blob.record_deposit_absent(hoster.config.no_deposit_strike_limit);
        warn!(
            "No deposit for {hash}, strike {}",
            blob.no_deposit_strikes
        );
        if verdict == DepositVerdict::Delete {
            info!("Deleting {hash}: no deposit");
            replicas.delete(hash).await?;
            return Ok(CycleOutcome::Deleted(DeleteReason::NoDeposit));
        }
        hoster.node.blobs.update(&blob).await?;
        return Ok(CycleOutcome::AwaitingDeposit {
            strikes: blob.no_deposit_strikes,
        });
    }
    blob.record_deposit_present();
    hoster.node.blobs.update(&blob).await?;

    if !replicas.has_body(hash) {
        info!("Deleting {hash}: body does not exist");
        replicas.delete(hash).await?;
        return Ok(CycleOutcome::Deleted(DeleteReason::BodyMissing));
    }

    let holders = hoster.ledger().get_file_hosts(hash).await?;
    if !holders.contains(hoster.address()) {
        info!("Deleting {hash}: not in the ledger's holder list");
        replicas.delete(hash).await?;
        return Ok(CycleOutcome::Deleted(DeleteReason::NotAHolder));
    }
    replicas.sync_holders(hash, &holders).await?;

    if hoster.ledger().need_copy(hash).await? {
        info!("{hash} needs another copy");
        if let Err(e) = repair::replicate(hoster, &blob, None).await {
            warn!("Repair upload of {hash} failed: {e}");
        }
    }

    audit(hoster, &blob).await
}

async fn query_proof(
    hoster: &Hoster,
    link: &ReplicaLink,
    from: u64,
    to: u64,
) -> Result<ProofDigest, HosterError> {
    let endpoint = hoster
        .node
        .peers
        .endpoint(&link.peer)
        .await?
        .ok_or_else(|| PeerError::NoEndpoint(link.peer.clone()))?;
    Ok(hoster.client.get_proof(&endpoint, &link.blob, from, to).await?)
}

/// Challenge every linked holder over the same range and apply the answers.
async fn audit(hoster: &Arc<Hoster>, blob: &HostedBlob) -> Result<CycleOutcome, HosterError> {
    let hash = &blob.hash;
    let body = hoster.replicas.read_body(hash)?;
    let (from, to) = draw_range(&mut rand::thread_rng(), body.len() as u64);
    let expected = challenge(&body, from, to)?;
    drop(body);

    let mut links = hoster.node.links.for_blob(hash).await?;
    debug!("Requesting proofs of {hash} over {from}..{to} from {} holder(s)", links.len());
    let answers = join_all(links.iter().map(|link| query_proof(hoster, link, from, to))).await;

    let now = Utc::now();
    let limit = hoster.config.offline_strike_limit;
    let (mut matched, mut missed) = (0, 0);
    let mut suspects = Vec::new();
    for (link, answer) in links.iter_mut().zip(answers) {
        match answer {
            Ok(proof) if proof == expected => {
                link.record_proof(now);
                matched += 1;
                if let Err(e) = hoster.node.peers.repository().reward(&link.peer).await {
                    warn!("Could not reward {}: {e}", link.peer);
                }
            }
            answer => {
                match answer {
                    Ok(_) => warn!("{} returned a wrong proof of {hash}", link.peer),
                    Err(e) => warn!("Proof request to {} for {hash} failed: {e}", link.peer),
                }
                missed += 1;
                if link.record_miss(now, limit) {
                    warn!(
                        "{} is offline for {hash} after {} strikes",
                        link.peer, link.offline_strikes
                    );
                    suspects.push(link.peer.clone());
                }
            }
        }
    }
    hoster.node.links.save_all(&links).await?;

    let mut consensus = Vec::new();
    for suspect in suspects {
        match consensus::resolve(hoster, blob, &suspect).await {
            Ok(outcome) => consensus.push((suspect, outcome)),
            Err(e) => warn!("Offline vote on {suspect} for {hash} failed: {e}"),
        }
    }

    Ok(CycleOutcome::Audited {
        matched,
        missed,
        consensus,
    })
}
