//! Local SQLite cache of peers, held blobs and replica links.
//!
//! Everything here can be rebuilt from the ledger. One repository per entity
//! shares a single connection; associations live in join tables keyed by
//! `(blob_hash, peer_address)`.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use thiserror::Error;
use tokio::sync::Mutex;

pub mod blobs;
pub mod links;
pub mod peers;
pub mod renter;

pub use blobs::HostedBlobRepository;
pub use links::ReplicaLinkRepository;
pub use peers::PeerRepository;
pub use renter::RenterBlobRepository;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Record already exists: {0}")]
    AlreadyExists(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS peers (
        address TEXT PRIMARY KEY,
        endpoint TEXT,
        reputation INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS hosted_blobs (
        hash TEXT PRIMARY KEY,
        owner_key TEXT NOT NULL,
        signature TEXT NOT NULL,
        owner_contract_address TEXT NOT NULL,
        size INTEGER NOT NULL,
        status TEXT NOT NULL,
        no_deposit_strikes INTEGER NOT NULL DEFAULT 0,
        my_monitoring_slot INTEGER,
        pending_replacement_peer TEXT,
        report_after_body INTEGER NOT NULL DEFAULT 0,
        body_received INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS replica_links (
        blob_hash TEXT NOT NULL REFERENCES hosted_blobs(hash) ON DELETE CASCADE,
        peer_address TEXT NOT NULL,
        status TEXT NOT NULL,
        last_proof_time INTEGER,
        offline_strikes INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (blob_hash, peer_address)
    );

    CREATE TABLE IF NOT EXISTS renter_blobs (
        hash TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        size INTEGER NOT NULL,
        signature TEXT NOT NULL,
        status TEXT NOT NULL,
        timestamp INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS renter_links (
        blob_hash TEXT NOT NULL REFERENCES renter_blobs(hash) ON DELETE CASCADE,
        peer_address TEXT NOT NULL,
        position INTEGER NOT NULL,
        PRIMARY KEY (blob_hash, peer_address)
    );
";

/// Shared handle to the local database.
#[derive(Clone, Debug)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, DbError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) async fn lock(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}

pub(crate) fn to_timestamp(time: &DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

pub(crate) fn from_timestamp(millis: i64) -> Result<DateTime<Utc>, DbError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| DbError::Corrupt(format!("timestamp {millis} out of range")))
}

/// Map a parse failure inside a row mapper to a rusqlite error.
pub(crate) fn corrupt<E: std::error::Error + Send + Sync + 'static>(
    column: usize,
    error: E,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(error))
}

pub(crate) fn is_unique_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
