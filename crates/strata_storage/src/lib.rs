use std::path::PathBuf;

use strata_core::hashes::BlobHash;
use thiserror::Error;

pub mod local;
pub mod memory;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Body not found: {0}")]
    NotFound(BlobHash),
}

/// Blob body storage interface.
pub trait Storage: Send + Sync {
    fn read(&self, hash: &BlobHash) -> Result<Vec<u8>, StorageError>;

    fn write(&self, hash: &BlobHash, data: &[u8]) -> Result<PathBuf, StorageError>;

    fn remove(&self, hash: &BlobHash) -> Result<(), StorageError>;

    fn contains(&self, hash: &BlobHash) -> bool;
}
