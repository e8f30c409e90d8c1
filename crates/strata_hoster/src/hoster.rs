use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use strata_core::constants::{
    MONITORING_WINDOW_MINUTES, NO_DEPOSIT_STRIKE_LIMIT, OFFLINE_STRIKE_LIMIT,
    PAYMENT_SWEEP_HOURS, PROOF_TIMEOUT_SECS, REPLICATION_FACTOR, SCHEDULE_REBUILD_HOURS,
    UPLOAD_TIMEOUT_SECS,
};
use strata_core::{Address, BlobHash, Endpoint};
use strata_ledger::Ledger;
use strata_node::tasks::TaskGroup;
use strata_node::{DiskQuota, Node};
use strata_protocol::PeerClient;
use strata_storage::Storage;

use crate::replica::ReplicaStore;

/// Hoster configuration
#[derive(Clone, Debug)]
pub struct HosterConfig {
    pub api_port: u16,
    /// Address announced to the ledger. Discovered from the public IP when unset.
    pub public_endpoint: Option<Endpoint>,
    pub store_dir: PathBuf,
    pub quota: DiskQuota,

    pub replication_factor: usize,
    pub offline_strike_limit: u32,
    pub no_deposit_strike_limit: u32,
    pub monitoring_window_minutes: u32,
    pub schedule_rebuild_hours: u64,
    pub payment_sweep_hours: u64,

    pub proof_timeout: Duration,
    pub upload_timeout: Duration,
}

impl Default for HosterConfig {
    fn default() -> Self {
        Self {
            api_port: 9379,
            public_endpoint: None,
            store_dir: PathBuf::from("boxes"),
            quota: DiskQuota::from_gib(10.0),
            replication_factor: REPLICATION_FACTOR,
            offline_strike_limit: OFFLINE_STRIKE_LIMIT,
            no_deposit_strike_limit: NO_DEPOSIT_STRIKE_LIMIT,
            monitoring_window_minutes: MONITORING_WINDOW_MINUTES,
            schedule_rebuild_hours: SCHEDULE_REBUILD_HOURS,
            payment_sweep_hours: PAYMENT_SWEEP_HOURS,
            proof_timeout: Duration::from_secs(PROOF_TIMEOUT_SECS),
            upload_timeout: Duration::from_secs(UPLOAD_TIMEOUT_SECS),
        }
    }
}

/// The hoster role of a node: held replicas, the peers it audits and the
/// background work spawned on their behalf.
pub struct Hoster {
    pub config: HosterConfig,
    pub node: Arc<Node>,
    pub replicas: ReplicaStore,
    pub client: Arc<dyn PeerClient>,
    pub tasks: TaskGroup,
    /// Blobs with a monitoring cycle currently running.
    in_flight: DashSet<BlobHash>,
}

impl Hoster {
    pub fn new(
        config: HosterConfig,
        node: Arc<Node>,
        storage: Arc<dyn Storage>,
        client: Arc<dyn PeerClient>,
    ) -> Self {
        let replicas = ReplicaStore::new(node.clone(), storage, config.quota.clone());
        Self {
            config,
            node,
            replicas,
            client,
            tasks: TaskGroup::new(),
            in_flight: DashSet::new(),
        }
    }

    pub fn address(&self) -> &Address {
        self.node.address()
    }

    pub fn ledger(&self) -> &dyn Ledger {
        self.node.ledger.as_ref()
    }

    /// Claim `hash` for a monitoring cycle. Returns false if one is running.
    pub(crate) fn begin_cycle(&self, hash: &BlobHash) -> bool {
        self.in_flight.insert(*hash)
    }

    pub(crate) fn end_cycle(&self, hash: &BlobHash) {
        self.in_flight.remove(hash);
    }

    pub fn is_monitoring(&self, hash: &BlobHash) -> bool {
        self.in_flight.contains(hash)
    }
}
