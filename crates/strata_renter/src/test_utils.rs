use std::path::PathBuf;
use std::sync::{Arc, Once};
use std::time::Duration;

use chrono::Utc;
use ed25519_dalek::SigningKey;
use strata_core::crypto::{self, content_hash, EncryptionKey};
use strata_core::models::{RenterBlob, RenterStatus};
use strata_core::{Address, BlobHash, Endpoint};
use strata_ledger::confirm::Backoff;
use strata_ledger::{FileRecord, MemoryLedger};
use strata_node::config::NodeConfig;
use strata_node::db::Database;
use strata_node::secrets::Secrets;
use strata_node::Node;
use strata_protocol::memory::{Behaviour, MemoryNetwork};
use tempfile::TempDir;

use crate::{Renter, RenterConfig};

static INIT: Once = Once::new();

pub fn setup_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .init();
    });
}

/// An unlocked renter named `me` wired to an in-memory ledger and network.
pub struct Fixture {
    pub renter: Arc<Renter>,
    pub ledger: MemoryLedger,
    pub network: MemoryNetwork,
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let ledger = MemoryLedger::new();
        let network = MemoryNetwork::new();
        let dir = TempDir::new().unwrap();

        let node_config = NodeConfig {
            address: Address::new("me"),
            db_file: PathBuf::from(":memory:"),
            secrets_file: dir.path().join("secrets.json"),
            ledger_url: String::new(),
            mock: true,
        };
        let node = Node::with_database(
            node_config,
            Database::in_memory().unwrap(),
            Arc::new(ledger.clone()),
        );
        node.secrets.store(Secrets {
            signing_key: SigningKey::from_bytes(&[7; 32]),
            encryption_key: EncryptionKey::new([9; 32]),
        });

        let config = RenterConfig {
            download_dir: dir.path().join("downloads"),
            deposit_backoff: Backoff {
                attempts: 4,
                initial: Duration::from_millis(1),
                max: Duration::from_millis(2),
            },
            ..Default::default()
        };
        let renter = Renter::new(config, Arc::new(node), Arc::new(network.clone()));

        Self {
            renter: Arc::new(renter),
            ledger,
            network,
            dir,
        }
    }

    pub fn owner(&self) -> Address {
        self.renter.node.secrets.secrets().unwrap().address()
    }

    /// Register hosters both on the network and in the ledger.
    pub fn peers(&self, peers: &[(&str, Behaviour)]) {
        for (name, behaviour) in peers {
            let endpoint = self.network.add_peer(name, behaviour.clone());
            self.ledger.add_host(&Address::new(*name), Some(endpoint));
        }
    }

    /// Write an input file outside the directory downloads go to.
    pub fn write_file(&self, name: &str, contents: &[u8]) -> PathBuf {
        let inputs = self.dir.path().join("inputs");
        std::fs::create_dir_all(&inputs).unwrap();
        let path = inputs.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    /// Put a deposit in place for the file `plain` would become.
    pub fn fund_file(&self, plain: &[u8]) -> BlobHash {
        let hash = content_hash(plain, &self.owner());
        self.ledger.set_deposit(&self.owner(), &hash, Some(1_000));
        hash
    }

    /// A file already placed on `peers`, in that order, as a finished
    /// upload would leave it.
    pub async fn uploaded(&self, name: &str, plain: &[u8], peers: &[(&str, Behaviour)]) -> BlobHash {
        self.peers(peers);
        let secrets = self.renter.node.secrets.secrets().unwrap();
        let owner = secrets.address();
        let hash = content_hash(plain, &owner);
        let body = crypto::encrypt(&secrets.encryption_key, plain).unwrap();
        let signature = crypto::sign(&secrets.signing_key, &body);

        let hosts: Vec<Address> = peers.iter().map(|(name, _)| Address::new(*name)).collect();
        for (peer, _) in peers {
            self.network.store_body(&Endpoint::new(*peer), &hash, &body);
        }

        let repo = &self.renter.node.renter_blobs;
        repo.insert(&RenterBlob {
            hash,
            name: name.to_string(),
            size: plain.len() as u64,
            signature: signature.clone(),
            status: RenterStatus::Preparing,
            timestamp: Utc::now(),
        })
        .await
        .unwrap();
        repo.mark_uploaded(&hash, &hosts).await.unwrap();

        self.ledger.insert_file(FileRecord {
            hash,
            owner,
            name: name.to_string(),
            size: plain.len() as u64,
            signature,
            hosts,
        });
        hash
    }
}
