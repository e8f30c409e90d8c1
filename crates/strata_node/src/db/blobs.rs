use rusqlite::{params, OptionalExtension, Row};
use strata_core::models::{HostedBlob, HostedStatus, LinkStatus};
use strata_core::{Address, BlobHash};

use super::{corrupt, is_unique_violation, Database, DbError};

const COLUMNS: &str = "hash, owner_key, signature, owner_contract_address, size, status,
    no_deposit_strikes, my_monitoring_slot, pending_replacement_peer, report_after_body,
    body_received";

#[derive(Clone, Debug)]
pub struct HostedBlobRepository {
    db: Database,
}

fn blob_from_row(row: &Row<'_>) -> rusqlite::Result<HostedBlob> {
    Ok(HostedBlob {
        hash: row
            .get::<_, String>(0)?
            .parse::<BlobHash>()
            .map_err(|e| corrupt(0, e))?,
        owner_key: row.get(1)?,
        signature: row.get(2)?,
        owner_contract_address: Address::new(row.get::<_, String>(3)?),
        size: row.get(4)?,
        status: row
            .get::<_, String>(5)?
            .parse::<HostedStatus>()
            .map_err(|e| corrupt(5, e))?,
        no_deposit_strikes: row.get(6)?,
        my_monitoring_slot: row.get(7)?,
        pending_replacement_peer: row.get::<_, Option<String>>(8)?.map(Address::new),
        report_after_body: row.get(9)?,
        body_received: row.get(10)?,
    })
}

impl HostedBlobRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Store a new blob together with the other holders it was announced with.
    /// Fails with `AlreadyExists` if the hash is known.
    pub async fn insert(&self, blob: &HostedBlob, holders: &[Address]) -> Result<(), DbError> {
        let mut conn = self.db.lock().await;
        let tx = conn.transaction()?;

        let inserted = tx.execute(
            &format!(
                "INSERT INTO hosted_blobs ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ),
            params![
                blob.hash.to_hex(),
                blob.owner_key,
                blob.signature,
                blob.owner_contract_address.as_str(),
                blob.size,
                blob.status.as_str(),
                blob.no_deposit_strikes,
                blob.my_monitoring_slot,
                blob.pending_replacement_peer.as_ref().map(|p| p.as_str()),
                blob.report_after_body,
                blob.body_received,
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(DbError::AlreadyExists(blob.hash.to_string()))
            }
            Err(e) => return Err(e.into()),
        }

        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO replica_links (blob_hash, peer_address, status)
                 VALUES (?1, ?2, ?3)",
            )?;
            for holder in holders {
                stmt.execute(params![
                    blob.hash.to_hex(),
                    holder.as_str(),
                    LinkStatus::Init.as_str()
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    pub async fn get(&self, hash: &BlobHash) -> Result<Option<HostedBlob>, DbError> {
        let conn = self.db.lock().await;
        let blob = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM hosted_blobs WHERE hash = ?1"),
                [hash.to_hex()],
                blob_from_row,
            )
            .optional()?;
        Ok(blob)
    }

    pub async fn list(&self) -> Result<Vec<HostedBlob>, DbError> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM hosted_blobs ORDER BY hash"))?;
        let blobs = stmt
            .query_map([], blob_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(blobs)
    }

    /// Persist every mutable field of `blob`.
    pub async fn update(&self, blob: &HostedBlob) -> Result<(), DbError> {
        let conn = self.db.lock().await;
        let updated = conn.execute(
            "UPDATE hosted_blobs SET status = ?2, no_deposit_strikes = ?3,
                my_monitoring_slot = ?4, pending_replacement_peer = ?5,
                report_after_body = ?6, body_received = ?7
             WHERE hash = ?1",
            params![
                blob.hash.to_hex(),
                blob.status.as_str(),
                blob.no_deposit_strikes,
                blob.my_monitoring_slot,
                blob.pending_replacement_peer.as_ref().map(|p| p.as_str()),
                blob.report_after_body,
                blob.body_received,
            ],
        )?;
        if updated == 0 {
            return Err(DbError::NotFound(blob.hash.to_string()));
        }
        Ok(())
    }

    /// Delete a blob and, through the cascade, all of its replica links.
    pub async fn delete(&self, hash: &BlobHash) -> Result<bool, DbError> {
        let conn = self.db.lock().await;
        let deleted = conn.execute("DELETE FROM hosted_blobs WHERE hash = ?1", [hash.to_hex()])?;
        Ok(deleted > 0)
    }

    /// Sum of the sizes of every held blob.
    pub async fn total_size(&self) -> Result<u64, DbError> {
        let conn = self.db.lock().await;
        let total: i64 =
            conn.query_row("SELECT COALESCE(SUM(size), 0) FROM hosted_blobs", [], |row| {
                row.get(0)
            })?;
        Ok(total.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ReplicaLinkRepository;

    pub(crate) fn sample_blob(byte: u8) -> HostedBlob {
        HostedBlob {
            hash: BlobHash::new([byte; 32]),
            owner_key: "owner-key".to_string(),
            signature: "sig".to_string(),
            owner_contract_address: Address::new("owner"),
            size: 1024,
            status: HostedStatus::Active,
            no_deposit_strikes: 0,
            my_monitoring_slot: Some(2),
            pending_replacement_peer: None,
            report_after_body: false,
            body_received: false,
        }
    }

    #[tokio::test]
    async fn test_insert_get_update() {
        let db = Database::in_memory().unwrap();
        let repo = HostedBlobRepository::new(db);
        let mut blob = sample_blob(1);

        repo.insert(&blob, &[]).await.unwrap();
        assert_eq!(repo.get(&blob.hash).await.unwrap(), Some(blob.clone()));

        blob.status = HostedStatus::WaitDel;
        blob.no_deposit_strikes = 3;
        blob.pending_replacement_peer = Some(Address::new("old"));
        repo.update(&blob).await.unwrap();
        assert_eq!(repo.get(&blob.hash).await.unwrap(), Some(blob));
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_rejected() {
        let repo = HostedBlobRepository::new(Database::in_memory().unwrap());
        let blob = sample_blob(1);
        repo.insert(&blob, &[]).await.unwrap();
        assert!(matches!(
            repo.insert(&blob, &[]).await,
            Err(DbError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_cascades_to_links() {
        let db = Database::in_memory().unwrap();
        let blobs = HostedBlobRepository::new(db.clone());
        let links = ReplicaLinkRepository::new(db);
        let blob = sample_blob(4);

        blobs
            .insert(&blob, &[Address::new("a"), Address::new("b")])
            .await
            .unwrap();
        assert_eq!(links.for_blob(&blob.hash).await.unwrap().len(), 2);

        assert!(blobs.delete(&blob.hash).await.unwrap());
        assert!(links.for_blob(&blob.hash).await.unwrap().is_empty());
        assert!(!blobs.delete(&blob.hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_total_size() {
        let repo = HostedBlobRepository::new(Database::in_memory().unwrap());
        assert_eq!(repo.total_size().await.unwrap(), 0);
        repo.insert(&sample_blob(1), &[]).await.unwrap();
        repo.insert(&sample_blob(2), &[]).await.unwrap();
        assert_eq!(repo.total_size().await.unwrap(), 2048);
    }
}
