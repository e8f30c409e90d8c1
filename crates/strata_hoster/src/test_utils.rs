use std::path::PathBuf;
use std::sync::{Arc, Once};

use chrono::Utc;
use ed25519_dalek::SigningKey;
use strata_core::crypto::{public_key_hex, sign};
use strata_core::models::{HostedBlob, HostedStatus, ReplicaLink};
use strata_core::{Address, BlobHash, Endpoint};
use strata_ledger::{FileRecord, MemoryLedger};
use strata_node::config::NodeConfig;
use strata_node::db::Database;
use strata_node::{DiskQuota, Node};
use strata_protocol::memory::{Behaviour, MemoryNetwork};
use strata_protocol::CreateMetadataRequest;
use strata_storage::memory::MemoryStorage;
use strata_storage::Storage;

use crate::hoster::{Hoster, HosterConfig};

static INIT: Once = Once::new();

pub fn setup_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .init();
    });
}

/// A hoster named `me` wired to an in-memory ledger, network and store.
pub struct Fixture {
    pub hoster: Arc<Hoster>,
    pub ledger: MemoryLedger,
    pub network: MemoryNetwork,
    pub storage: MemoryStorage,
    pub owner: SigningKey,
}

impl Fixture {
    pub fn new() -> Self {
        let ledger = MemoryLedger::new();
        let network = MemoryNetwork::new();
        let storage = MemoryStorage::new();

        let node_config = NodeConfig {
            address: Address::new("me"),
            db_file: PathBuf::from(":memory:"),
            secrets_file: PathBuf::from("unused-secrets.json"),
            ledger_url: String::new(),
            mock: true,
        };
        let node = Node::with_database(
            node_config,
            Database::in_memory().unwrap(),
            Arc::new(ledger.clone()),
        );
        let config = HosterConfig {
            quota: DiskQuota::from_gib(1.0),
            ..Default::default()
        };
        let hoster = Hoster::new(
            config,
            Arc::new(node),
            Arc::new(storage.clone()),
            Arc::new(network.clone()),
        );

        Self {
            hoster: Arc::new(hoster),
            ledger,
            network,
            storage,
            owner: SigningKey::from_bytes(&[7; 32]),
        }
    }

    pub fn owner_address(&self) -> Address {
        Address::new(public_key_hex(&self.owner))
    }

    pub fn signed_request(
        &self,
        body: &[u8],
        hosts: Option<Vec<Address>>,
        replacing: Option<Address>,
    ) -> CreateMetadataRequest {
        CreateMetadataRequest {
            file_hash: BlobHash::digest(body),
            owner_key: public_key_hex(&self.owner),
            signature: sign(&self.owner, body),
            client_contract_address: self.owner_address(),
            size: body.len() as u64,
            hosts,
            replacing,
        }
    }

    pub fn fund(&self, hash: &BlobHash) {
        self.ledger
            .set_deposit(&self.owner_address(), hash, Some(1_000));
    }

    pub fn unfund(&self, hash: &BlobHash) {
        self.ledger.set_deposit(&self.owner_address(), hash, None);
    }

    /// Register `hash` on the ledger with exactly `hosts`.
    pub fn register_file(&self, hash: &BlobHash, hosts: &[Address]) {
        let size = self.ledger.file(hash).map(|f| f.size).unwrap_or_default();
        self.ledger.insert_file(FileRecord {
            hash: *hash,
            owner: self.owner_address(),
            name: "fixture.bin".to_string(),
            size,
            signature: String::new(),
            hosts: hosts.to_vec(),
        });
    }

    /// Hold `body` in slot 0 alongside `peers`, each of which is reachable
    /// on the network under its own name and stores the body too. The file
    /// is funded and registered with every holder.
    pub async fn hold(&self, body: &[u8], peers: &[(&str, Behaviour)]) -> BlobHash {
        let request = self.signed_request(body, None, None);
        let hash = request.file_hash;
        let me = Address::new("me");

        let mut holders = vec![me.clone()];
        for (name, behaviour) in peers {
            let address = Address::new(name);
            let endpoint = self.network.add_peer(name, behaviour.clone());
            self.network.store_body(&endpoint, &hash, body);
            self.ledger.add_host(&address, Some(endpoint.clone()));
            self.hoster
                .node
                .peers
                .repository()
                .upsert(&address, Some(&endpoint))
                .await
                .unwrap();
            holders.push(address);
        }

        let blob = HostedBlob {
            hash,
            owner_key: request.owner_key,
            signature: request.signature.clone(),
            owner_contract_address: request.client_contract_address,
            size: request.size,
            status: HostedStatus::Active,
            no_deposit_strikes: 0,
            my_monitoring_slot: Some(0),
            pending_replacement_peer: None,
            report_after_body: false,
            body_received: true,
        };
        self.hoster
            .node
            .blobs
            .insert(&blob, &holders[1..])
            .await
            .unwrap();
        self.storage.write(&hash, body).unwrap();

        self.ledger.insert_file(FileRecord {
            hash,
            owner: self.owner_address(),
            name: format!("held-{}", Utc::now().timestamp_micros()),
            size: request.size,
            signature: request.signature,
            hosts: holders,
        });
        self.fund(&hash);
        hash
    }

    pub fn drop_body(&self, hash: &BlobHash) {
        self.storage.remove(hash).unwrap();
    }

    pub async fn link(&self, hash: &BlobHash, peer: &str) -> ReplicaLink {
        self.hoster
            .node
            .links
            .get(hash, &Address::new(peer))
            .await
            .unwrap()
            .unwrap()
    }

    pub fn endpoint(&self, name: &str) -> Endpoint {
        Endpoint::new(name)
    }

    /// A peer that holds nothing yet but can be picked for new copies.
    pub fn spare_peer(&self, name: &str, behaviour: Behaviour) -> Endpoint {
        let endpoint = self.network.add_peer(name, behaviour);
        self.ledger
            .add_host(&Address::new(name), Some(endpoint.clone()));
        endpoint
    }
}
