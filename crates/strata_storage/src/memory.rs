//! In-memory storage, mostly for testing purposes

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use strata_core::hashes::BlobHash;

use crate::{Storage, StorageError};

/// In-memory storage implementation.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    data: Arc<RwLock<HashMap<BlobHash, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.read_guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_guard().is_empty()
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, HashMap<BlobHash, Vec<u8>>> {
        // A poisoned map still holds consistent bodies; keep serving them.
        self.data.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, HashMap<BlobHash, Vec<u8>>> {
        self.data.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Storage for MemoryStorage {
    fn read(&self, hash: &BlobHash) -> Result<Vec<u8>, StorageError> {
        self.read_guard()
            .get(hash)
            .cloned()
            .ok_or(StorageError::NotFound(*hash))
    }

    fn write(&self, hash: &BlobHash, data: &[u8]) -> Result<PathBuf, StorageError> {
        self.write_guard().insert(*hash, data.to_vec());
        Ok(PathBuf::from(format!("memory://{hash}")))
    }

    fn remove(&self, hash: &BlobHash) -> Result<(), StorageError> {
        self.write_guard().remove(hash);
        Ok(())
    }

    fn contains(&self, hash: &BlobHash) -> bool {
        self.read_guard().contains_key(hash)
    }
}
