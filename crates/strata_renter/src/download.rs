//! Getting a file back from its holders.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use strata_core::crypto;
use strata_core::{Address, BlobHash};
use strata_ledger::LedgerError;
use strata_node::db::DbError;
use strata_node::secrets::SecretsError;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::control::Reporter;
use crate::Renter;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Secrets error: {0}")]
    Secrets(#[from] SecretsError),

    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Unknown file {0}")]
    UnknownFile(BlobHash),

    #[error("{0} already exists")]
    DestinationExists(PathBuf),

    #[error("Downloading {hash} failed from every holder: {}", list(.tried))]
    Exhausted { hash: BlobHash, tried: Vec<Address> },
}

fn list(addresses: &[Address]) -> String {
    addresses
        .iter()
        .map(Address::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

pub struct DownloadOrchestrator<'a> {
    renter: &'a Renter,
}

impl<'a> DownloadOrchestrator<'a> {
    pub fn new(renter: &'a Renter) -> Self {
        Self { renter }
    }

    /// Where a file named `name` lands for `destination`. An existing
    /// directory receives the file under its own name.
    fn target(destination: &Path, name: &str) -> PathBuf {
        if destination.is_dir() {
            destination.join(name)
        } else {
            destination.to_path_buf()
        }
    }

    /// Holders in the order they were recorded, asking the ledger when none
    /// are known locally.
    async fn holders(&self, hash: &BlobHash) -> Result<Vec<Address>, DownloadError> {
        let local = self.renter.node.renter_blobs.hosts(hash).await?;
        if !local.is_empty() {
            return Ok(local);
        }
        Ok(self.renter.ledger().get_file_hosts(hash).await?)
    }

    /// Fetch and decrypt `hash` from the first holder that serves it intact,
    /// then write it to `destination`. Returns the written path.
    pub async fn download(
        &self,
        hash: &BlobHash,
        destination: &Path,
        reporter: &Reporter,
    ) -> Result<PathBuf, DownloadError> {
        info!("Started downloading {hash}");
        let blob = self
            .renter
            .node
            .renter_blobs
            .get(hash)
            .await?
            .ok_or(DownloadError::UnknownFile(*hash))?;
        let target = Self::target(destination, &blob.name);
        if tokio::fs::try_exists(&target).await? {
            warn!("{} already exists", target.display());
            return Err(DownloadError::DestinationExists(target));
        }

        let secrets = self.renter.node.secrets.secrets()?;
        let holders = self.holders(hash).await?;
        let mut tried = Vec::with_capacity(holders.len());

        for holder in holders {
            reporter
                .progress(format!("Trying to download {hash} from {holder}"))
                .await;
            tried.push(holder.clone());

            let endpoint = match self.renter.node.peers.endpoint(&holder).await {
                Ok(Some(endpoint)) => endpoint,
                Ok(None) => {
                    warn!("No known endpoint for {holder}");
                    continue;
                }
                Err(e) => {
                    warn!("Looking up {holder} failed: {e}");
                    continue;
                }
            };
            let body = match self.renter.client.get_body(&endpoint, hash).await {
                Ok(body) => body,
                Err(e) => {
                    warn!("Downloading {hash} from {holder} failed: {e}");
                    continue;
                }
            };
            let plain = match crypto::decrypt(&secrets.encryption_key, &body) {
                Ok(plain) => plain,
                Err(e) => {
                    warn!("Body of {hash} from {holder} does not decrypt: {e}");
                    continue;
                }
            };

            write_new(&target, &plain).await?;
            info!("Downloaded {hash} from {holder} to {}", target.display());
            reporter
                .progress(format!("Downloaded {hash} to {}", target.display()))
                .await;
            return Ok(target);
        }

        warn!("Downloading {hash} failed from all {} holder(s)", tried.len());
        Err(DownloadError::Exhausted { hash: *hash, tried })
    }
}

async fn write_new(target: &Path, contents: &[u8]) -> Result<(), DownloadError> {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = match tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(target)
        .await
    {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Err(DownloadError::DestinationExists(target.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    file.write_all(contents).await?;
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use strata_core::Endpoint;
    use strata_protocol::memory::Behaviour;

    use super::*;
    use crate::test_utils::{setup_logging, Fixture};

    #[tokio::test]
    async fn test_first_intact_copy_wins() {
        setup_logging();
        let fx = Fixture::new();
        let hash = fx
            .uploaded(
                "song.flac",
                b"la la la",
                &[
                    ("a:1", Behaviour::CorruptBody),
                    ("b:1", Behaviour::Honest),
                    ("c:1", Behaviour::Honest),
                ],
            )
            .await;
        let dir = fx.dir.path().join("out");

        let written = fx
            .renter
            .downloader()
            .download(&hash, &dir, &Reporter::silent())
            .await
            .unwrap();
        assert_eq!(written, dir);
        assert_eq!(std::fs::read(&written).unwrap(), b"la la la");
        assert_eq!(
            fx.network.contacted(),
            vec![Endpoint::new("a:1"), Endpoint::new("b:1")]
        );
    }

    #[tokio::test]
    async fn test_directory_destination_uses_name() {
        let fx = Fixture::new();
        let hash = fx
            .uploaded("memo.txt", b"remember", &[("a:1", Behaviour::Honest)])
            .await;

        let written = fx
            .renter
            .downloader()
            .download(&hash, fx.dir.path(), &Reporter::silent())
            .await
            .unwrap();
        assert_eq!(written, fx.dir.path().join("memo.txt"));
    }

    #[tokio::test]
    async fn test_every_holder_failing() {
        let fx = Fixture::new();
        let hash = fx
            .uploaded(
                "lost.bin",
                b"gone",
                &[("a:1", Behaviour::Unreachable), ("b:1", Behaviour::CorruptBody)],
            )
            .await;

        let err = fx
            .renter
            .downloader()
            .download(&hash, &fx.dir.path().join("lost.bin"), &Reporter::silent())
            .await
            .unwrap_err();
        let DownloadError::Exhausted { hash: failed, tried } = &err else {
            panic!("unexpected error {err}");
        };
        assert_eq!(*failed, hash);
        assert_eq!(tried, &vec![Address::new("a:1"), Address::new("b:1")]);
        assert!(err.to_string().contains("a:1, b:1"));
        assert!(!fx.dir.path().join("lost.bin").exists());
    }

    #[tokio::test]
    async fn test_existing_destination() {
        let fx = Fixture::new();
        let hash = fx
            .uploaded("taken.txt", b"new", &[("a:1", Behaviour::Honest)])
            .await;
        let target = fx.dir.path().join("taken.txt");
        std::fs::write(&target, b"old").unwrap();

        let err = fx
            .renter
            .downloader()
            .download(&hash, &target, &Reporter::silent())
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::DestinationExists(_)));
        assert!(fx.network.contacted().is_empty());
        assert_eq!(std::fs::read(&target).unwrap(), b"old");
    }

    #[tokio::test]
    async fn test_unknown_file() {
        let fx = Fixture::new();
        let err = fx
            .renter
            .downloader()
            .download(&BlobHash::new([4; 32]), fx.dir.path(), &Reporter::silent())
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::UnknownFile(_)));
    }
}
