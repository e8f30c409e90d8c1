use rusqlite::{params, OptionalExtension, Row};
use strata_core::models::Peer;
use strata_core::{Address, Endpoint};

use super::{Database, DbError};

#[derive(Clone, Debug)]
pub struct PeerRepository {
    db: Database,
}

fn peer_from_row(row: &Row<'_>) -> rusqlite::Result<Peer> {
    Ok(Peer {
        address: Address::new(row.get::<_, String>(0)?),
        endpoint: row.get::<_, Option<String>>(1)?.map(Endpoint::new),
        reputation: row.get(2)?,
    })
}

impl PeerRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a peer or refresh its endpoint. Reputation is kept.
    pub async fn upsert(&self, address: &Address, endpoint: Option<&Endpoint>) -> Result<(), DbError> {
        let conn = self.db.lock().await;
        conn.execute(
            "INSERT INTO peers (address, endpoint) VALUES (?1, ?2)
             ON CONFLICT(address) DO UPDATE SET endpoint = COALESCE(?2, endpoint)",
            params![address.as_str(), endpoint.map(|e| e.as_str())],
        )?;
        Ok(())
    }

    pub async fn get(&self, address: &Address) -> Result<Option<Peer>, DbError> {
        let conn = self.db.lock().await;
        let peer = conn
            .query_row(
                "SELECT address, endpoint, reputation FROM peers WHERE address = ?1",
                [address.as_str()],
                peer_from_row,
            )
            .optional()?;
        Ok(peer)
    }

    pub async fn list(&self) -> Result<Vec<Peer>, DbError> {
        let conn = self.db.lock().await;
        let mut stmt =
            conn.prepare("SELECT address, endpoint, reputation FROM peers ORDER BY address")?;
        let peers = stmt
            .query_map([], peer_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(peers)
    }

    /// Reputation only grows.
    pub async fn reward(&self, address: &Address) -> Result<(), DbError> {
        let conn = self.db.lock().await;
        conn.execute(
            "UPDATE peers SET reputation = reputation + 1 WHERE address = ?1",
            [address.as_str()],
        )?;
        Ok(())
    }
}
