use std::sync::Arc;

use strata_core::Address;
use strata_ledger::{Ledger, LedgerError, MemoryLedger, RpcLedger};
use thiserror::Error;
use tracing::info;

use crate::config::NodeConfig;
use crate::db::{
    Database, DbError, HostedBlobRepository, PeerRepository, RenterBlobRepository,
    ReplicaLinkRepository,
};
use crate::peers::PeerDirectory;
use crate::secrets::{SecretStore, SecretsError};

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Secrets error: {0}")]
    Secrets(#[from] SecretsError),
}

/// Handles shared by the hoster and renter roles of one process.
pub struct Node {
    pub config: NodeConfig,
    pub db: Database,
    pub ledger: Arc<dyn Ledger>,
    pub secrets: Arc<SecretStore>,
    pub peers: PeerDirectory,
    pub blobs: HostedBlobRepository,
    pub links: ReplicaLinkRepository,
    pub renter_blobs: RenterBlobRepository,
}

impl Node {
    /// Open the node against the ledger its configuration selects.
    pub fn from_config(config: NodeConfig) -> Result<Self, NodeError> {
        let ledger: Arc<dyn Ledger> = if config.mock {
            info!("Mock mode, using the in-process ledger");
            Arc::new(MemoryLedger::new())
        } else {
            info!("Using the ledger gateway at {}", config.ledger_url);
            Arc::new(RpcLedger::new(config.ledger_url.clone())?)
        };
        Self::new(config, ledger)
    }

    pub fn new(config: NodeConfig, ledger: Arc<dyn Ledger>) -> Result<Self, NodeError> {
        let db = Database::open(&config.db_file)?;
        Ok(Self::with_database(config, db, ledger))
    }

    pub fn with_database(config: NodeConfig, db: Database, ledger: Arc<dyn Ledger>) -> Self {
        let secrets = Arc::new(SecretStore::new(&config.secrets_file));
        let peers = PeerDirectory::new(
            PeerRepository::new(db.clone()),
            ledger.clone(),
            config.address.clone(),
        );
        Self {
            blobs: HostedBlobRepository::new(db.clone()),
            links: ReplicaLinkRepository::new(db.clone()),
            renter_blobs: RenterBlobRepository::new(db.clone()),
            config,
            db,
            ledger,
            secrets,
            peers,
        }
    }

    pub fn address(&self) -> &Address {
        &self.config.address
    }
}
