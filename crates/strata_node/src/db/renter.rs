use rusqlite::{params, OptionalExtension, Row};
use strata_core::models::{RenterBlob, RenterStatus};
use strata_core::{Address, BlobHash};

use super::{corrupt, from_timestamp, is_unique_violation, to_timestamp, Database, DbError};

#[derive(Clone, Debug)]
pub struct RenterBlobRepository {
    db: Database,
}

fn renter_blob_from_row(row: &Row<'_>) -> rusqlite::Result<RenterBlob> {
    Ok(RenterBlob {
        hash: row
            .get::<_, String>(0)?
            .parse::<BlobHash>()
            .map_err(|e| corrupt(0, e))?,
        name: row.get(1)?,
        size: row.get(2)?,
        signature: row.get(3)?,
        status: row
            .get::<_, String>(4)?
            .parse::<RenterStatus>()
            .map_err(|e| corrupt(4, e))?,
        timestamp: from_timestamp(row.get(5)?).map_err(|e| corrupt(5, e))?,
    })
}

impl RenterBlobRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn insert(&self, blob: &RenterBlob) -> Result<(), DbError> {
        let conn = self.db.lock().await;
        let inserted = conn.execute(
            "INSERT INTO renter_blobs (hash, name, size, signature, status, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                blob.hash.to_hex(),
                blob.name,
                blob.size,
                blob.signature,
                blob.status.as_str(),
                to_timestamp(&blob.timestamp),
            ],
        );
        match inserted {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(DbError::AlreadyExists(blob.hash.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, hash: &BlobHash) -> Result<Option<RenterBlob>, DbError> {
        let conn = self.db.lock().await;
        let blob = conn
            .query_row(
                "SELECT hash, name, size, signature, status, timestamp
                 FROM renter_blobs WHERE hash = ?1",
                [hash.to_hex()],
                renter_blob_from_row,
            )
            .optional()?;
        Ok(blob)
    }

    pub async fn list(&self) -> Result<Vec<RenterBlob>, DbError> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare(
            "SELECT hash, name, size, signature, status, timestamp
             FROM renter_blobs ORDER BY timestamp, hash",
        )?;
        let blobs = stmt
            .query_map([], renter_blob_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(blobs)
    }

    pub async fn set_status(&self, hash: &BlobHash, status: RenterStatus) -> Result<(), DbError> {
        let conn = self.db.lock().await;
        let updated = conn.execute(
            "UPDATE renter_blobs SET status = ?2 WHERE hash = ?1",
            params![hash.to_hex(), status.as_str()],
        )?;
        if updated == 0 {
            return Err(DbError::NotFound(hash.to_string()));
        }
        Ok(())
    }

    /// Record the confirmed holders, in order, and mark the blob uploaded.
    pub async fn mark_uploaded(&self, hash: &BlobHash, hosts: &[Address]) -> Result<(), DbError> {
        let mut conn = self.db.lock().await;
        let tx = conn.transaction()?;
        let updated = tx.execute(
            "UPDATE renter_blobs SET status = ?2 WHERE hash = ?1",
            params![hash.to_hex(), RenterStatus::Uploaded.as_str()],
        )?;
        if updated == 0 {
            return Err(DbError::NotFound(hash.to_string()));
        }
        replace_links(&tx, hash, hosts)?;
        tx.commit()?;
        Ok(())
    }

    /// Replace the holder list with the one the ledger reports.
    pub async fn set_hosts(&self, hash: &BlobHash, hosts: &[Address]) -> Result<(), DbError> {
        let mut conn = self.db.lock().await;
        let tx = conn.transaction()?;
        replace_links(&tx, hash, hosts)?;
        tx.commit()?;
        Ok(())
    }

    /// Holders of `hash`, in the order they were recorded.
    pub async fn hosts(&self, hash: &BlobHash) -> Result<Vec<Address>, DbError> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare(
            "SELECT peer_address FROM renter_links WHERE blob_hash = ?1 ORDER BY position",
        )?;
        let hosts = stmt
            .query_map([hash.to_hex()], |row| row.get::<_, String>(0))?
            .map(|r| r.map(Address::new))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(hosts)
    }

    pub async fn delete(&self, hash: &BlobHash) -> Result<bool, DbError> {
        let conn = self.db.lock().await;
        let deleted = conn.execute("DELETE FROM renter_blobs WHERE hash = ?1", [hash.to_hex()])?;
        Ok(deleted > 0)
    }
}

fn replace_links(
    tx: &rusqlite::Transaction<'_>,
    hash: &BlobHash,
    hosts: &[Address],
) -> Result<(), DbError> {
    tx.execute("DELETE FROM renter_links WHERE blob_hash = ?1", [hash.to_hex()])?;
    let mut stmt = tx.prepare(
        "INSERT OR IGNORE INTO renter_links (blob_hash, peer_address, position) VALUES (?1, ?2, ?3)",
    )?;
    for (position, host) in hosts.iter().enumerate() {
        stmt.execute(params![hash.to_hex(), host.as_str(), position as i64])?;
    }
    Ok(())
}
