//! Offline quorum.
//!
//! A holder whose link went `OFFLINE` here is only reported to the ledger
//! once enough of the other holders agree. Each of them is asked for its own
//! cached status of the suspect; this node's verdict counts as the first vote.

use std::sync::Arc;

use futures::future::join_all;
use strata_core::models::{HostedBlob, LinkStatus};
use strata_core::Address;
use strata_protocol::PeerError;
use tracing::{info, warn};

use crate::hoster::Hoster;
use crate::{repair, HosterError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsensusOutcome {
    /// The ledger was told. `replacement` is set when a repair upload was
    /// spawned to take the suspect's place.
    Voted { tally: usize, replacement: bool },
    /// Not enough holders agreed.
    UnderQuorum { tally: usize },
}

/// A strict majority of the configured replication factor. The factor is
/// used even when fewer holders exist.
pub fn reaches_quorum(tally: usize, replication_factor: usize) -> bool {
    tally > replication_factor / 2
}

/// Count this node plus every other holder reporting `suspect` as offline.
pub async fn tally(hoster: &Hoster, blob: &HostedBlob, suspect: &Address) -> Result<usize, HosterError> {
    let hash = &blob.hash;
    let witnesses: Vec<Address> = hoster
        .node
        .links
        .for_blob(hash)
        .await?
        .into_iter()
        .map(|link| link.peer)
        .filter(|peer| peer != suspect)
        .collect();

    let answers = join_all(witnesses.iter().map(|witness| async move {
        let endpoint = hoster
            .node
            .peers
            .endpoint(witness)
            .await?
            .ok_or_else(|| PeerError::NoEndpoint(witness.clone()))?;
        let status = hoster
            .client
            .get_peer_status(&endpoint, hash, suspect)
            .await?;
        Ok::<LinkStatus, HosterError>(status)
    }))
    .await;

    let mut tally = 1;
    for (witness, answer) in witnesses.iter().zip(answers) {
        match answer {
            Ok(LinkStatus::Offline) => tally += 1,
            Ok(status) => info!("{witness} sees {suspect} as {status} for {hash}"),
            Err(e) => warn!("Status request to {witness} about {suspect} failed: {e}"),
        }
    }
    Ok(tally)
}

/// Run the offline vote for `suspect` and, if the ledger wants it replaced,
/// start a tracked repair upload to a new holder.
pub async fn resolve(
    hoster: &Arc<Hoster>,
    blob: &HostedBlob,
    suspect: &Address,
) -> Result<ConsensusOutcome, HosterError> {
    let hash = &blob.hash;
    let tally = tally(hoster, blob, suspect).await?;
    info!("{tally} holder(s) agree {suspect} is offline for {hash}");

    if !reaches_quorum(tally, hoster.config.replication_factor) {
        return Ok(ConsensusOutcome::UnderQuorum { tally });
    }

    info!("Voting {suspect} offline for {hash}");
    hoster
        .ledger()
        .vote_offline(hoster.address(), suspect, hash)
        .await?;

    let replacement = hoster.ledger().need_replace(suspect, hash).await?;
    if replacement {
        info!("{suspect} needs replacing for {hash}");
        repair::spawn_replacement(hoster, blob.clone(), suspect.clone());
    }
    Ok(ConsensusOutcome::Voted { tally, replacement })
}

#[cfg(test)]
mod tests {
    use strata_protocol::memory::Behaviour;

    use super::*;
    use crate::test_utils::{setup_logging, Fixture};

    const WITNESSES: [&str; 6] = ["w1:1", "w2:1", "w3:1", "w4:1", "w5:1", "w6:1"];

    async fn held_with_witnesses(fx: &Fixture) -> strata_core::BlobHash {
        let mut holders: Vec<(&str, Behaviour)> =
            WITNESSES.iter().map(|w| (*w, Behaviour::Honest)).collect();
        holders.push(("suspect:1", Behaviour::Unreachable));
        fx.hold(b"widely held body", &holders).await
    }

    #[test]
    fn test_quorum_threshold() {
        assert!(!reaches_quorum(5, 10));
        assert!(reaches_quorum(6, 10));
        assert!(reaches_quorum(2, 3));
        assert!(!reaches_quorum(1, 3));
    }

    #[tokio::test]
    async fn test_five_votes_do_not_vote() {
        setup_logging();
        let fx = Fixture::new();
        let hash = held_with_witnesses(&fx).await;
        let suspect = Address::new("suspect:1");
        for witness in &WITNESSES[..4] {
            fx.network
                .set_status(&fx.endpoint(witness), &hash, &suspect, LinkStatus::Offline);
        }
        fx.network
            .set_status(&fx.endpoint(WITNESSES[4]), &hash, &suspect, LinkStatus::Active);

        let blob = fx.hoster.replicas.get(&hash).await.unwrap();
        let outcome = resolve(&fx.hoster, &blob, &suspect).await.unwrap();
        assert_eq!(outcome, ConsensusOutcome::UnderQuorum { tally: 5 });
        assert!(fx.ledger.votes().is_empty());
    }

    #[tokio::test]
    async fn test_six_votes_vote() {
        let fx = Fixture::new();
        let hash = held_with_witnesses(&fx).await;
        let suspect = Address::new("suspect:1");
        for witness in &WITNESSES[..5] {
            fx.network
                .set_status(&fx.endpoint(witness), &hash, &suspect, LinkStatus::Offline);
        }

        let blob = fx.hoster.replicas.get(&hash).await.unwrap();
        let outcome = resolve(&fx.hoster, &blob, &suspect).await.unwrap();
        assert_eq!(
            outcome,
            ConsensusOutcome::Voted {
                tally: 6,
                replacement: false
            }
        );
        assert_eq!(
            fx.ledger.votes(),
            vec![(Address::new("me"), suspect, hash)]
        );
    }

    #[tokio::test]
    async fn test_silent_witnesses_do_not_count() {
        let fx = Fixture::new();
        let hash = held_with_witnesses(&fx).await;
        let suspect = Address::new("suspect:1");
        for witness in &WITNESSES {
            let endpoint = fx.endpoint(witness);
            fx.network
                .set_status(&endpoint, &hash, &suspect, LinkStatus::Offline);
            fx.network.set_behaviour(&endpoint, Behaviour::Unreachable);
        }

        let blob = fx.hoster.replicas.get(&hash).await.unwrap();
        assert_eq!(tally(&fx.hoster, &blob, &suspect).await.unwrap(), 1);
    }

    /// The quorum is computed against the configured factor, so a blob with
    /// fewer than six holders can never vote anyone offline.
    #[tokio::test]
    async fn test_quorum_unreachable_with_few_holders() {
        let fx = Fixture::new();
        let hash = fx
            .hold(
                b"thinly held",
                &[
                    ("w1:1", Behaviour::Honest),
                    ("w2:1", Behaviour::Honest),
                    ("suspect:1", Behaviour::Unreachable),
                ],
            )
            .await;
        let suspect = Address::new("suspect:1");
        for witness in ["w1:1", "w2:1"] {
            fx.network
                .set_status(&fx.endpoint(witness), &hash, &suspect, LinkStatus::Offline);
        }

        let blob = fx.hoster.replicas.get(&hash).await.unwrap();
        let outcome = resolve(&fx.hoster, &blob, &suspect).await.unwrap();
        assert_eq!(outcome, ConsensusOutcome::UnderQuorum { tally: 3 });
        assert!(!reaches_quorum(4, fx.hoster.config.replication_factor));
    }

    #[tokio::test]
    async fn test_vote_spawns_replacement() {
        setup_logging();
        let fx = Fixture::new();
        let hash = held_with_witnesses(&fx).await;
        let suspect = Address::new("suspect:1");
        for witness in &WITNESSES {
            fx.network
                .set_status(&fx.endpoint(witness), &hash, &suspect, LinkStatus::Offline);
        }
        fx.ledger.set_need_replace(&suspect, &hash);
        let spare = fx.spare_peer("spare:1", Behaviour::Honest);

        let blob = fx.hoster.replicas.get(&hash).await.unwrap();
        let outcome = resolve(&fx.hoster, &blob, &suspect).await.unwrap();
        assert_eq!(
            outcome,
            ConsensusOutcome::Voted {
                tally: 7,
                replacement: true
            }
        );

        let report = fx.hoster.tasks.wait().await;
        assert_eq!(report.succeeded, 1);
        let metadata = fx.network.metadata(&spare, &hash).unwrap();
        assert_eq!(metadata.replacing, Some(suspect.clone()));
        assert!(fx.hoster.node.links.get(&hash, &suspect).await.unwrap().is_none());
    }
}
