//! Bodies on the local filesystem, sharded by the first hash byte.

use std::fs;
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use strata_core::hashes::BlobHash;
use tracing::debug;

use crate::{Storage, StorageError};

pub struct LocalStorage {
    path: PathBuf,
}

impl LocalStorage {
    /// Open the body store at `store_dir`, creating the shard folders on first use.
    pub fn new<P: AsRef<Path>>(store_dir: P) -> Result<Self, StorageError> {
        let path = store_dir.as_ref().to_path_buf();

        let store = Self { path: path.clone() };
        if fs::exists(&path)? {
            return Ok(store);
        }

        fs::create_dir_all(&path)?;
        for i in 0..=0xFF {
            fs::create_dir(path.join(format!("{i:02x}")))?;
        }

        Ok(store)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn body_path(&self, hash: &BlobHash) -> PathBuf {
        let hash = hash.to_hex();
        self.path.join(&hash[0..2]).join(&hash[2..])
    }
}

impl Storage for LocalStorage {
    fn read(&self, hash: &BlobHash) -> Result<Vec<u8>, StorageError> {
        let mut f = match File::open(self.body_path(hash)) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(*hash))
            }
            Err(e) => return Err(e.into()),
        };

        let mut buffer = Vec::new();
        f.read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    fn write(&self, hash: &BlobHash, data: &[u8]) -> Result<PathBuf, StorageError> {
        debug!("Writing body {hash} to store");
        let path = self.body_path(hash);
        if let Some(folder) = path.parent() {
            if !fs::exists(folder)? {
                fs::create_dir_all(folder)?;
            }
        }

        // Write beside the target and rename so a crash never leaves a torn body.
        let partial = path.with_extension("partial");
        let mut file = File::create(&partial)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&partial, &path)?;

        Ok(path)
    }

    fn remove(&self, hash: &BlobHash) -> Result<(), StorageError> {
        match fs::remove_file(self.body_path(hash)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn contains(&self, hash: &BlobHash) -> bool {
        self.body_path(hash).is_file()
    }
}
