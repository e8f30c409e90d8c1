//! Boundary to the external ledger that holds deposits, file registrations
//! and host lists.
//!
//! Every node talks to the ledger through the [`Ledger`] trait. The ledger is
//! authoritative: local state is only a cache of what it says.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strata_core::{Address, BlobHash, Endpoint};
use thiserror::Error;

pub mod confirm;
pub mod memory;
pub mod rpc;

pub use memory::MemoryLedger;
pub use rpc::RpcLedger;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger transport error: {0}")]
    Transport(String),

    #[error("Ledger transaction rejected: {0}")]
    Rejected(String),

    #[error("Ledger write not confirmed: {0}")]
    ConfirmationTimeout(String),

    #[error("Insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: u128, requested: u128 },

    #[error("Not found on ledger: {0}")]
    NotFound(String),
}

impl From<reqwest::Error> for LedgerError {
    fn from(value: reqwest::Error) -> Self {
        LedgerError::Transport(value.to_string())
    }
}

/// Metadata committed to the ledger when a renter finishes placing a file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRegistration {
    pub hash: BlobHash,
    pub name: String,
    pub size: u64,
    pub signature: String,
    pub hosts: Vec<Address>,
}

/// A file as the ledger records it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub hash: BlobHash,
    pub owner: Address,
    pub name: String,
    pub size: u64,
    pub signature: String,
    pub hosts: Vec<Address>,
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Deposit backing `hash` for `owner`, if any.
    async fn get_deposit(
        &self,
        owner: &Address,
        hash: &BlobHash,
    ) -> Result<Option<u128>, LedgerError>;

    async fn make_deposit(
        &self,
        owner: &Address,
        hash: &BlobHash,
        amount: u128,
    ) -> Result<(), LedgerError>;

    async fn get_balance(&self, address: &Address) -> Result<u128, LedgerError>;

    /// Whether the file is below its replication target.
    async fn need_copy(&self, hash: &BlobHash) -> Result<bool, LedgerError>;

    /// Whether `old_peer` should be replaced as a holder of `hash`.
    async fn need_replace(&self, old_peer: &Address, hash: &BlobHash)
        -> Result<bool, LedgerError>;

    async fn vote_offline(
        &self,
        voter: &Address,
        peer: &Address,
        hash: &BlobHash,
    ) -> Result<(), LedgerError>;

    async fn register_file(
        &self,
        owner: &Address,
        registration: FileRegistration,
    ) -> Result<(), LedgerError>;

    async fn get_file(&self, hash: &BlobHash) -> Result<Option<FileRecord>, LedgerError>;

    async fn get_file_hosts(&self, hash: &BlobHash) -> Result<Vec<Address>, LedgerError>;

    async fn add_host_to_file(&self, host: &Address, hash: &BlobHash) -> Result<(), LedgerError>;

    async fn replace_host(
        &self,
        new_host: &Address,
        old_host: &Address,
        hash: &BlobHash,
    ) -> Result<(), LedgerError>;

    async fn list_owner_files(&self, owner: &Address) -> Result<Vec<BlobHash>, LedgerError>;

    async fn get_hosts(&self) -> Result<Vec<Address>, LedgerError>;

    async fn get_host_endpoint(&self, peer: &Address) -> Result<Option<Endpoint>, LedgerError>;

    async fn register_host(&self, address: &Address, endpoint: &Endpoint)
        -> Result<(), LedgerError>;

    async fn time_to_pay(&self, host: &Address, hash: &BlobHash) -> Result<bool, LedgerError>;

    async fn request_payout(&self, host: &Address, hash: &BlobHash) -> Result<(), LedgerError>;
}
