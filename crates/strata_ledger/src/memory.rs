//! In-process ledger, used in mock mode and by tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use strata_core::constants::REPLICATION_FACTOR;
use strata_core::{Address, BlobHash, Endpoint};

use crate::{FileRecord, FileRegistration, Ledger, LedgerError};

/// Write operations that can be made to fail for testing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LedgerOp {
    MakeDeposit,
    RegisterFile,
    VoteOffline,
    AddHost,
    ReplaceHost,
    RequestPayout,
    ListOwnerFiles,
}

#[derive(Default)]
struct State {
    replication_factor: usize,
    balances: HashMap<Address, u128>,
    deposits: HashMap<(Address, BlobHash), u128>,
    /// Reads left before a fresh deposit becomes visible.
    deposit_lag: HashMap<(Address, BlobHash), u32>,
    visibility_lag: u32,
    files: HashMap<BlobHash, FileRecord>,
    hosts: BTreeMap<Address, Option<Endpoint>>,
    votes: Vec<(Address, Address, BlobHash)>,
    replace_decisions: HashSet<(Address, BlobHash)>,
    due_payments: HashSet<(Address, BlobHash)>,
    payouts: Vec<(Address, BlobHash)>,
    failing: HashSet<LedgerOp>,
}

/// Ledger kept entirely in memory. Clones share state.
#[derive(Clone)]
pub struct MemoryLedger {
    state: Arc<Mutex<State>>,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::with_replication_factor(REPLICATION_FACTOR)
    }

    pub fn with_replication_factor(replication_factor: usize) -> Self {
        let state = State {
            replication_factor,
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(&self, op: LedgerOp) -> Result<(), LedgerError> {
        if self.state().failing.contains(&op) {
            return Err(LedgerError::Rejected(format!("{op:?} failed")));
        }
        Ok(())
    }

    pub fn set_balance(&self, address: &Address, amount: u128) {
        self.state().balances.insert(address.clone(), amount);
    }

    pub fn set_deposit(&self, owner: &Address, hash: &BlobHash, amount: Option<u128>) {
        let mut state = self.state();
        let key = (owner.clone(), *hash);
        match amount {
            Some(amount) => state.deposits.insert(key, amount),
            None => state.deposits.remove(&key),
        };
    }

    /// Delay the visibility of new deposits by `reads` lookups.
    pub fn set_visibility_lag(&self, reads: u32) {
        self.state().visibility_lag = reads;
    }

    pub fn set_failing(&self, op: LedgerOp, failing: bool) {
        let mut state = self.state();
        if failing {
            state.failing.insert(op);
        } else {
            state.failing.remove(&op);
        }
    }

    pub fn add_host(&self, address: &Address, endpoint: Option<Endpoint>) {
        self.state().hosts.insert(address.clone(), endpoint);
    }

    /// Put a file record in place directly, bypassing registration.
    pub fn insert_file(&self, record: FileRecord) {
        self.state().files.insert(record.hash, record);
    }

    pub fn set_need_replace(&self, peer: &Address, hash: &BlobHash) {
        self.state().replace_decisions.insert((peer.clone(), *hash));
    }

    pub fn set_payment_due(&self, host: &Address, hash: &BlobHash) {
        self.state().due_payments.insert((host.clone(), *hash));
    }

    pub fn votes(&self) -> Vec<(Address, Address, BlobHash)> {
        self.state().votes.clone()
    }

    pub fn payouts(&self) -> Vec<(Address, BlobHash)> {
        self.state().payouts.clone()
    }

    pub fn file(&self, hash: &BlobHash) -> Option<FileRecord> {
        self.state().files.get(hash).cloned()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn get_deposit(
        &self,
        owner: &Address,
        hash: &BlobHash,
    ) -> Result<Option<u128>, LedgerError> {
        let mut state = self.state();
        let key = (owner.clone(), *hash);
        if let Some(lag) = state.deposit_lag.get_mut(&key) {
            if *lag > 0 {
                *lag -= 1;
                return Ok(None);
            }
        }
        Ok(state.deposits.get(&key).copied())
    }

    async fn make_deposit(
        &self,
        owner: &Address,
        hash: &BlobHash,
        amount: u128,
    ) -> Result<(), LedgerError> {
        self.check(LedgerOp::MakeDeposit)?;
        let mut state = self.state();
        let balance = state.balances.get(owner).copied().unwrap_or_default();
        if amount > balance {
            return Err(LedgerError::InsufficientFunds {
                balance,
                requested: amount,
            });
        }
        state.balances.insert(owner.clone(), balance - amount);

        let key = (owner.clone(), *hash);
        *state.deposits.entry(key.clone()).or_default() += amount;
        let lag = state.visibility_lag;
        state.deposit_lag.insert(key, lag);
        Ok(())
    }

    async fn get_balance(&self, address: &Address) -> Result<u128, LedgerError> {
        Ok(self.state().balances.get(address).copied().unwrap_or_default())
    }

    async fn need_copy(&self, hash: &BlobHash) -> Result<bool, LedgerError> {
        let state = self.state();
        Ok(state
            .files
            .get(hash)
            .is_some_and(|f| f.hosts.len() < state.replication_factor))
    }

    async fn need_replace(
        &self,
        old_peer: &Address,
        hash: &BlobHash,
    ) -> Result<bool, LedgerError> {
        Ok(self
            .state()
            .replace_decisions
            .contains(&(old_peer.clone(), *hash)))
    }

    async fn vote_offline(
        &self,
        voter: &Address,
        peer: &Address,
        hash: &BlobHash,
    ) -> Result<(), LedgerError> {
        self.check(LedgerOp::VoteOffline)?;
        self.state()
            .votes
            .push((voter.clone(), peer.clone(), *hash));
        Ok(())
    }

    async fn register_file(
        &self,
        owner: &Address,
        registration: FileRegistration,
    ) -> Result<(), LedgerError> {
        self.check(LedgerOp::RegisterFile)?;
        let record = FileRecord {
            hash: registration.hash,
            owner: owner.clone(),
            name: registration.name,
            size: registration.size,
            signature: registration.signature,
            hosts: registration.hosts,
        };
        self.state().files.insert(record.hash, record);
        Ok(())
    }

    async fn get_file(&self, hash: &BlobHash) -> Result<Option<FileRecord>, LedgerError> {
        Ok(self.state().files.get(hash).cloned())
    }

    async fn get_file_hosts(&self, hash: &BlobHash) -> Result<Vec<Address>, LedgerError> {
        Ok(self
            .state()
            .files
            .get(hash)
            .map(|f| f.hosts.clone())
            .unwrap_or_default())
    }

    async fn add_host_to_file(&self, host: &Address, hash: &BlobHash) -> Result<(), LedgerError> {
        self.check(LedgerOp::AddHost)?;
        let mut state = self.state();
        let file = state
            .files
            .get_mut(hash)
            .ok_or_else(|| LedgerError::NotFound(hash.to_string()))?;
        if !file.hosts.contains(host) {
            file.hosts.push(host.clone());
        }
        Ok(())
    }

    async fn replace_host(
        &self,
        new_host: &Address,
        old_host: &Address,
        hash: &BlobHash,
    ) -> Result<(), LedgerError> {
        self.check(LedgerOp::ReplaceHost)?;
        let mut state = self.state();
        let file = state
            .files
            .get_mut(hash)
            .ok_or_else(|| LedgerError::NotFound(hash.to_string()))?;
        file.hosts.retain(|h| h != old_host);
        if !file.hosts.contains(new_host) {
            file.hosts.push(new_host.clone());
        }
        state.replace_decisions.remove(&(old_host.clone(), *hash));
        Ok(())
    }

    async fn list_owner_files(&self, owner: &Address) -> Result<Vec<BlobHash>, LedgerError> {
        self.check(LedgerOp::ListOwnerFiles)?;
        let state = self.state();
        let mut hashes: Vec<BlobHash> = state
            .files
            .values()
            .filter(|f| &f.owner == owner)
            .map(|f| f.hash)
            .collect();
        hashes.sort();
        Ok(hashes)
    }

    async fn get_hosts(&self) -> Result<Vec<Address>, LedgerError> {
        Ok(self.state().hosts.keys().cloned().collect())
    }

    async fn get_host_endpoint(&self, peer: &Address) -> Result<Option<Endpoint>, LedgerError> {
        Ok(self.state().hosts.get(peer).cloned().flatten())
    }

    async fn register_host(
        &self,
        address: &Address,
        endpoint: &Endpoint,
    ) -> Result<(), LedgerError> {
        self.add_host(address, Some(endpoint.clone()));
        Ok(())
    }

    async fn time_to_pay(&self, host: &Address, hash: &BlobHash) -> Result<bool, LedgerError> {
        Ok(self.state().due_payments.contains(&(host.clone(), *hash)))
    }

    async fn request_payout(&self, host: &Address, hash: &BlobHash) -> Result<(), LedgerError> {
        self.check(LedgerOp::RequestPayout)?;
        let mut state = self.state();
        state.due_payments.remove(&(host.clone(), *hash));
        state.payouts.push((host.clone(), *hash));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash() -> BlobHash {
        BlobHash::new([3; 32])
    }

    #[tokio::test]
    async fn test_deposit_respects_balance() {
        let ledger = MemoryLedger::new();
        let owner = Address::new("owner");
        ledger.set_balance(&owner, 100);

        let err = ledger.make_deposit(&owner, &hash(), 101).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientFunds {
                balance: 100,
                requested: 101
            }
        ));

        ledger.make_deposit(&owner, &hash(), 60).await.unwrap();
        assert_eq!(ledger.get_balance(&owner).await.unwrap(), 40);
        assert_eq!(ledger.get_deposit(&owner, &hash()).await.unwrap(), Some(60));
    }

    #[tokio::test]
    async fn test_deposit_visibility_lag() {
        let ledger = MemoryLedger::new();
        let owner = Address::new("owner");
        ledger.set_balance(&owner, 10);
        ledger.set_visibility_lag(2);

        ledger.make_deposit(&owner, &hash(), 5).await.unwrap();
        assert_eq!(ledger.get_deposit(&owner, &hash()).await.unwrap(), None);
        assert_eq!(ledger.get_deposit(&owner, &hash()).await.unwrap(), None);
        assert_eq!(ledger.get_deposit(&owner, &hash()).await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn test_register_and_replace_hosts() {
        let ledger = MemoryLedger::with_replication_factor(3);
        let owner = Address::new("owner");
        let (a, b, c) = (Address::new("a"), Address::new("b"), Address::new("c"));

        ledger
            .register_file(
                &owner,
                FileRegistration {
                    hash: hash(),
                    name: "notes.txt".to_string(),
                    size: 12,
                    signature: "sig".to_string(),
                    hosts: vec![a.clone(), b.clone()],
                },
            )
            .await
            .unwrap();
        assert!(ledger.need_copy(&hash()).await.unwrap());

        ledger.add_host_to_file(&c, &hash()).await.unwrap();
        assert!(!ledger.need_copy(&hash()).await.unwrap());

        let d = Address::new("d");
        ledger.replace_host(&d, &a, &hash()).await.unwrap();
        assert_eq!(
            ledger.get_file_hosts(&hash()).await.unwrap(),
            vec![b, c, d]
        );
        assert_eq!(ledger.list_owner_files(&owner).await.unwrap(), vec![hash()]);
    }

    #[tokio::test]
    async fn test_failing_operation() {
        let ledger = MemoryLedger::new();
        ledger.set_failing(LedgerOp::VoteOffline, true);
        let result = ledger
            .vote_offline(&Address::new("me"), &Address::new("peer"), &hash())
            .await;
        assert!(matches!(result, Err(LedgerError::Rejected(_))));
        assert!(ledger.votes().is_empty());
    }
}
