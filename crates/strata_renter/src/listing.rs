use chrono::Utc;
use serde::{Deserialize, Serialize};
use strata_core::models::{RenterBlob, RenterStatus};
use strata_core::BlobHash;
use strata_ledger::LedgerError;
use strata_node::db::DbError;
use strata_node::secrets::SecretsError;
use thiserror::Error;
use tracing::{info, warn};

use crate::Renter;

#[derive(Debug, Error)]
pub enum ListingError {
    #[error("Secrets error: {0}")]
    Secrets(#[from] SecretsError),

    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// A file as shown to the user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub hash: BlobHash,
    pub size: u64,
    pub status: RenterStatus,
}

impl From<RenterBlob> for FileEntry {
    fn from(blob: RenterBlob) -> Self {
        Self {
            name: blob.name,
            hash: blob.hash,
            size: blob.size,
            status: blob.status,
        }
    }
}

/// Pull files the ledger lists for this account but the local store does
/// not know, e.g. after a reinstall. Returns how many were added.
pub async fn refresh_from_ledger(renter: &Renter) -> Result<usize, ListingError> {
    let owner = renter.node.secrets.secrets()?.address();
    let repo = &renter.node.renter_blobs;
    let mut added = 0;

    for hash in renter.ledger().list_owner_files(&owner).await? {
        if repo.get(&hash).await?.is_some() {
            continue;
        }
        let Some(record) = renter.ledger().get_file(&hash).await? else {
            warn!("Ledger lists {hash} for {owner} but has no record of it");
            continue;
        };
        repo.insert(&RenterBlob {
            hash,
            name: record.name,
            size: record.size,
            signature: record.signature,
            status: RenterStatus::Uploaded,
            timestamp: Utc::now(),
        })
        .await?;
        repo.set_hosts(&hash, &record.hosts).await?;
        added += 1;
    }

    if added > 0 {
        info!("Restored {added} file(s) from the ledger");
    }
    Ok(added)
}

/// Every file of this account. The ledger is consulted first when the
/// account is unlocked.
pub async fn list_files(renter: &Renter) -> Result<Vec<FileEntry>, ListingError> {
    if renter.node.secrets.is_locked() {
        warn!("Account is locked, listing local files only");
    } else if let Err(e) = refresh_from_ledger(renter).await {
        warn!("Could not refresh files from the ledger: {e}");
    }

    let files = renter.node.renter_blobs.list().await?;
    Ok(files.into_iter().map(FileEntry::from).collect())
}

#[cfg(test)]
mod tests {
    use strata_ledger::memory::LedgerOp;
    use strata_ledger::{FileRecord, Ledger};
    use strata_protocol::memory::Behaviour;

    use super::*;
    use crate::test_utils::Fixture;

    #[tokio::test]
    async fn test_listing_restores_ledger_files() {
        let fx = Fixture::new();
        let local = fx
            .uploaded("local.txt", b"here", &[("a:1", Behaviour::Honest)])
            .await;
        let remote = BlobHash::new([8; 32]);
        fx.ledger.insert_file(FileRecord {
            hash: remote,
            owner: fx.owner(),
            name: "elsewhere.txt".to_string(),
            size: 42,
            signature: "sig".to_string(),
            hosts: vec!["b:1".into(), "c:1".into()],
        });

        let files = list_files(&fx.renter).await.unwrap();
        assert_eq!(files.len(), 2);
        let restored = files.iter().find(|f| f.hash == remote).unwrap();
        assert_eq!(restored.name, "elsewhere.txt");
        assert_eq!(restored.status, RenterStatus::Uploaded);
        assert!(files.iter().any(|f| f.hash == local));
        assert_eq!(
            fx.renter.node.renter_blobs.hosts(&remote).await.unwrap(),
            vec!["b:1".into(), "c:1".into()]
        );

        // A second listing adds nothing
        assert_eq!(refresh_from_ledger(&fx.renter).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_listing_ignores_other_owners() {
        let fx = Fixture::new();
        fx.ledger.insert_file(FileRecord {
            hash: BlobHash::new([9; 32]),
            owner: "someone else".into(),
            name: "theirs.txt".to_string(),
            size: 1,
            signature: String::new(),
            hosts: Vec::new(),
        });
        assert!(list_files(&fx.renter).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_locked_listing_is_local_only() {
        let fx = Fixture::new();
        fx.uploaded("mine.txt", b"mine", &[("a:1", Behaviour::Honest)])
            .await;
        fx.renter.node.secrets.lock();

        let files = list_files(&fx.renter).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "mine.txt");
    }

    #[tokio::test]
    async fn test_unreachable_ledger_still_lists() {
        let fx = Fixture::new();
        fx.uploaded("mine.txt", b"mine", &[("a:1", Behaviour::Honest)])
            .await;
        fx.ledger.set_failing(LedgerOp::ListOwnerFiles, true);

        let files = list_files(&fx.renter).await.unwrap();
        assert_eq!(files.len(), 1);
        assert!(fx.ledger.get_hosts().await.unwrap().contains(&"a:1".into()));
    }

    #[tokio::test]
    async fn test_refresh_reports_why_it_failed() {
        let fx = Fixture::new();
        fx.ledger.set_failing(LedgerOp::ListOwnerFiles, true);
        let err = refresh_from_ledger(&fx.renter).await.unwrap_err();
        assert!(matches!(err, ListingError::Ledger(_)), "got {err:?}");

        fx.renter.node.secrets.lock();
        let err = refresh_from_ledger(&fx.renter).await.unwrap_err();
        assert!(
            matches!(err, ListingError::Secrets(SecretsError::Locked)),
            "got {err:?}"
        );
    }
}
