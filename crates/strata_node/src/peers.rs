//! Candidate selection over the cached peer set.

use std::collections::HashSet;
use std::sync::Arc;

use rand::seq::SliceRandom;
use strata_core::models::Peer;
use strata_core::{Address, Endpoint};
use strata_ledger::Ledger;
use tracing::{debug, info, warn};

use crate::db::PeerRepository;
use crate::node::NodeError;

/// Known hosters, refreshed from the ledger when the cache runs dry.
#[derive(Clone)]
pub struct PeerDirectory {
    repo: PeerRepository,
    ledger: Arc<dyn Ledger>,
    me: Address,
}

impl PeerDirectory {
    pub fn new(repo: PeerRepository, ledger: Arc<dyn Ledger>, me: Address) -> Self {
        Self { repo, ledger, me }
    }

    pub fn repository(&self) -> &PeerRepository {
        &self.repo
    }

    /// Pull the host list and endpoints from the ledger into the cache.
    pub async fn refresh(&self) -> Result<usize, NodeError> {
        let hosts = self.ledger.get_hosts().await?;
        let mut refreshed = 0;
        for host in hosts.iter().filter(|h| **h != self.me) {
            match self.ledger.get_host_endpoint(host).await {
                Ok(endpoint) => {
                    self.repo.upsert(host, endpoint.as_ref()).await?;
                    refreshed += 1;
                }
                Err(e) => warn!("Could not resolve endpoint of {host}: {e}"),
            }
        }
        info!("Refreshed {refreshed} peer(s) from the ledger");
        Ok(refreshed)
    }

    /// Endpoint of `peer`, asking the ledger if the cache has none.
    pub async fn endpoint(&self, peer: &Address) -> Result<Option<Endpoint>, NodeError> {
        if let Some(Peer {
            endpoint: Some(endpoint),
            ..
        }) = self.repo.get(peer).await?
        {
            return Ok(Some(endpoint));
        }

        let endpoint = self.ledger.get_host_endpoint(peer).await?;
        if let Some(endpoint) = &endpoint {
            self.repo.upsert(peer, Some(endpoint)).await?;
        }
        Ok(endpoint)
    }

    async fn cached_candidates(&self, exclude: &HashSet<Address>) -> Result<Vec<Peer>, NodeError> {
        let mut peers: Vec<Peer> = self
            .repo
            .list()
            .await?
            .into_iter()
            .filter(|p| p.address != self.me && !exclude.contains(&p.address))
            .filter(|p| p.endpoint.is_some())
            .collect();
        peers.shuffle(&mut rand::thread_rng());
        Ok(peers)
    }

    /// Up to `n` reachable peers, never this node and never one in `exclude`.
    /// The cache is refreshed from the ledger once if it cannot supply `n`.
    pub async fn candidates(
        &self,
        n: usize,
        exclude: &HashSet<Address>,
    ) -> Result<Vec<Peer>, NodeError> {
        let mut peers = self.cached_candidates(exclude).await?;
        if peers.len() < n {
            debug!("Only {} cached candidate(s), refreshing", peers.len());
            if let Err(e) = self.refresh().await {
                warn!("Peer refresh failed: {e}");
            }
            peers = self.cached_candidates(exclude).await?;
        }
        peers.truncate(n);
        Ok(peers)
    }

    pub async fn pick_one(&self, exclude: &HashSet<Address>) -> Result<Option<Peer>, NodeError> {
        Ok(self.candidates(1, exclude).await?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use strata_ledger::MemoryLedger;

    use super::*;
    use crate::db::Database;

    fn directory(ledger: &MemoryLedger) -> PeerDirectory {
        let repo = PeerRepository::new(Database::in_memory().unwrap());
        PeerDirectory::new(repo, Arc::new(ledger.clone()), Address::new("me"))
    }

    #[tokio::test]
    async fn test_candidates_refresh_and_exclude() {
        let ledger = MemoryLedger::new();
        ledger.add_host(&Address::new("me"), Some(Endpoint::new("me:1")));
        for name in ["a", "b", "c"] {
            ledger.add_host(&Address::new(name), Some(Endpoint::new(format!("{name}:1"))));
        }
        ledger.add_host(&Address::new("silent"), None);
        let peers = directory(&ledger);

        let exclude = HashSet::from([Address::new("b")]);
        let mut picked: Vec<String> = peers
            .candidates(10, &exclude)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.address.to_string())
            .collect();
        picked.sort();
        assert_eq!(picked, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_candidates_truncate() {
        let ledger = MemoryLedger::new();
        for i in 0..20 {
            ledger.add_host(&Address::new(format!("p{i}")), Some(Endpoint::new(format!("p{i}:1"))));
        }
        let peers = directory(&ledger);
        assert_eq!(peers.candidates(5, &HashSet::new()).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_endpoint_falls_back_to_ledger() {
        let ledger = MemoryLedger::new();
        let peers = directory(&ledger);
        let address = Address::new("late");
        assert_eq!(peers.endpoint(&address).await.unwrap(), None);

        ledger.add_host(&address, Some(Endpoint::new("late:1")));
        assert_eq!(
            peers.endpoint(&address).await.unwrap(),
            Some(Endpoint::new("late:1"))
        );
        assert!(peers.repository().get(&address).await.unwrap().is_some());
    }
}
