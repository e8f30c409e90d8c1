//! Repair uploads from a holder to a peer that does not have the blob yet.

use std::collections::HashSet;
use std::sync::Arc;

use strata_core::models::HostedBlob;
use strata_core::Address;
use strata_protocol::upload::upload_to_peer;
use strata_protocol::CreateMetadataRequest;
use tracing::{info, warn};

use crate::constants::REPAIR_ATTEMPTS;
use crate::hoster::Hoster;
use crate::HosterError;

/// Copy `blob` to one new peer, optionally as the replacement of `replacing`.
///
/// The new peer is sent the full holder list so it can derive its monitoring
/// slot, and reports itself to the ledger once the body arrives. Returns the
/// new holder, or `None` if no candidate accepted the copy.
pub async fn replicate(
    hoster: &Hoster,
    blob: &HostedBlob,
    replacing: Option<&Address>,
) -> Result<Option<Address>, HosterError> {
    let hash = &blob.hash;
    let me = hoster.address();

    let mut hosts = vec![me.clone()];
    hosts.extend(
        hoster
            .node
            .links
            .for_blob(hash)
            .await?
            .into_iter()
            .map(|link| link.peer),
    );
    let mut exclude: HashSet<Address> = hosts.iter().cloned().collect();

    let request = CreateMetadataRequest {
        file_hash: *hash,
        owner_key: blob.owner_key.clone(),
        signature: blob.signature.clone(),
        client_contract_address: blob.owner_contract_address.clone(),
        size: blob.size,
        hosts: Some(hosts),
        replacing: replacing.cloned(),
    };
    let body = hoster.replicas.read_body(hash)?;

    for _ in 0..REPAIR_ATTEMPTS {
        let Some(peer) = hoster.node.peers.pick_one(&exclude).await? else {
            warn!("No peer left to copy {hash} to");
            return Ok(None);
        };
        exclude.insert(peer.address.clone());
        let Some(endpoint) = peer.endpoint else {
            continue;
        };

        info!("Uploading {hash} to new host {}", peer.address);
        match upload_to_peer(hoster.client.as_ref(), &endpoint, &request, &body).await {
            Ok(()) => {
                hoster
                    .node
                    .links
                    .add_holders(hash, std::slice::from_ref(&peer.address))
                    .await?;
                if let Some(old) = replacing {
                    hoster.node.links.remove(hash, old).await?;
                    info!("{} replaced {old} as a holder of {hash}", peer.address);
                }
                return Ok(Some(peer.address));
            }
            Err(e) => warn!("Copying {hash} to {} failed: {e}", peer.address),
        }
    }

    warn!("Gave up copying {hash} after {REPAIR_ATTEMPTS} attempts");
    Ok(None)
}

/// Replace `suspect` in the background. The suspect's link is kept if no
/// peer takes the copy.
pub fn spawn_replacement(hoster: &Arc<Hoster>, blob: HostedBlob, suspect: Address) {
    let task_hoster = hoster.clone();
    let name = format!("replace {suspect} for {}", blob.hash);
    hoster.tasks.spawn(name, async move {
        match replicate(&task_hoster, &blob, Some(&suspect)).await? {
            Some(_) => Ok(()),
            None => Err(HosterError::NoReplacement(blob.hash)),
        }
    });
}
