use rusqlite::{params, OptionalExtension, Row};
use strata_core::models::{LinkStatus, ReplicaLink};
use strata_core::{Address, BlobHash};

use super::{corrupt, from_timestamp, to_timestamp, Database, DbError};

#[derive(Clone, Debug)]
pub struct ReplicaLinkRepository {
    db: Database,
}

fn link_from_row(row: &Row<'_>) -> rusqlite::Result<ReplicaLink> {
    let last_proof_time = match row.get::<_, Option<i64>>(3)? {
        Some(millis) => Some(from_timestamp(millis).map_err(|e| corrupt(3, e))?),
        None => None,
    };
    Ok(ReplicaLink {
        blob: row
            .get::<_, String>(0)?
            .parse::<BlobHash>()
            .map_err(|e| corrupt(0, e))?,
        peer: Address::new(row.get::<_, String>(1)?),
        status: row
            .get::<_, String>(2)?
            .parse::<LinkStatus>()
            .map_err(|e| corrupt(2, e))?,
        last_proof_time,
        offline_strikes: row.get(4)?,
    })
}

impl ReplicaLinkRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn for_blob(&self, hash: &BlobHash) -> Result<Vec<ReplicaLink>, DbError> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare(
            "SELECT blob_hash, peer_address, status, last_proof_time, offline_strikes
             FROM replica_links WHERE blob_hash = ?1 ORDER BY peer_address",
        )?;
        let links = stmt
            .query_map([hash.to_hex()], link_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(links)
    }

    pub async fn get(&self, hash: &BlobHash, peer: &Address) -> Result<Option<ReplicaLink>, DbError> {
        let conn = self.db.lock().await;
        let link = conn
            .query_row(
                "SELECT blob_hash, peer_address, status, last_proof_time, offline_strikes
                 FROM replica_links WHERE blob_hash = ?1 AND peer_address = ?2",
                params![hash.to_hex(), peer.as_str()],
                link_from_row,
            )
            .optional()?;
        Ok(link)
    }

    /// Add holders that are not linked yet. Existing links keep their state.
    pub async fn add_holders(&self, hash: &BlobHash, holders: &[Address]) -> Result<usize, DbError> {
        let mut conn = self.db.lock().await;
        let tx = conn.transaction()?;
        let mut added = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO replica_links (blob_hash, peer_address, status)
                 VALUES (?1, ?2, ?3)",
            )?;
            for holder in holders {
                added += stmt.execute(params![
                    hash.to_hex(),
                    holder.as_str(),
                    LinkStatus::Init.as_str()
                ])?;
            }
        }
        tx.commit()?;
        Ok(added)
    }

    /// Write back the liveness state of several links as one unit.
    pub async fn save_all(&self, links: &[ReplicaLink]) -> Result<(), DbError> {
        let mut conn = self.db.lock().await;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO replica_links
                    (blob_hash, peer_address, status, last_proof_time, offline_strikes)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(blob_hash, peer_address) DO UPDATE SET
                    status = excluded.status,
                    last_proof_time = excluded.last_proof_time,
                    offline_strikes = excluded.offline_strikes",
            )?;
            for link in links {
                stmt.execute(params![
                    link.blob.to_hex(),
                    link.peer.as_str(),
                    link.status.as_str(),
                    link.last_proof_time.as_ref().map(to_timestamp),
                    link.offline_strikes,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub async fn remove(&self, hash: &BlobHash, peer: &Address) -> Result<bool, DbError> {
        let conn = self.db.lock().await;
        let removed = conn.execute(
            "DELETE FROM replica_links WHERE blob_hash = ?1 AND peer_address = ?2",
            params![hash.to_hex(), peer.as_str()],
        )?;
        Ok(removed > 0)
    }
}
