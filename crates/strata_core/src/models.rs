//! Records shared by the hoster and renter roles.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::{Address, Endpoint};
use crate::hashes::BlobHash;

#[derive(Debug, Error)]
#[error("Unknown {kind} status: {value}")]
pub struct StatusParseError {
    kind: &'static str,
    value: String,
}

macro_rules! status_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = StatusParseError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(StatusParseError {
                        kind: $kind,
                        value: value.to_string(),
                    }),
                }
            }
        }
    };
}

status_enum!(
    /// Lifecycle of a blob held by a hoster.
    HostedStatus, "hosted blob", {
        Active => "ACTIVE",
        WaitDel => "WAIT_DEL",
    }
);

status_enum!(
    /// Lifecycle of a file uploaded by a renter.
    RenterStatus, "renter blob", {
        Preparing => "PREPARING",
        Uploading => "UPLOADING",
        Uploaded => "UPLOADED",
    }
);

status_enum!(
    /// Liveness of another holder of a blob, as seen by this hoster.
    LinkStatus, "replica link", {
        Init => "INIT",
        Active => "ACTIVE",
        Offline => "OFFLINE",
        Sync => "SYNC",
        Removed => "REMOVED",
    }
);

/// A network participant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub address: Address,
    pub endpoint: Option<Endpoint>,
    pub reputation: i64,
}

impl Peer {
    pub fn new(address: Address, endpoint: Option<Endpoint>) -> Self {
        Self {
            address,
            endpoint,
            reputation: 0,
        }
    }
}

/// Outcome of a deposit check for a held blob.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DepositVerdict {
    Keep,
    Delete,
}

/// A blob replica stored by this node on behalf of its owner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedBlob {
    pub hash: BlobHash,
    pub owner_key: String,
    pub signature: String,
    pub owner_contract_address: Address,
    pub size: u64,
    pub status: HostedStatus,
    pub no_deposit_strikes: u32,
    pub my_monitoring_slot: Option<u32>,
    pub pending_replacement_peer: Option<Address>,
    /// Report this node to the ledger as a holder once the body arrives.
    pub report_after_body: bool,
    pub body_received: bool,
}

impl HostedBlob {
    /// Deposit was found for this blob.
    pub fn record_deposit_present(&mut self) {
        self.no_deposit_strikes = 0;
        self.status = HostedStatus::Active;
    }

    /// Deposit was missing for this blob. Returns `Delete` once the strikes
    /// exceed `limit`.
    pub fn record_deposit_absent(&mut self, limit: u32) -> DepositVerdict {
        self.no_deposit_strikes = self.no_deposit_strikes.saturating_add(1);
        self.status = HostedStatus::WaitDel;
        if self.no_deposit_strikes > limit {
            DepositVerdict::Delete
        } else {
            DepositVerdict::Keep
        }
    }
}

/// Another holder of a blob this node stores.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaLink {
    pub blob: BlobHash,
    pub peer: Address,
    pub status: LinkStatus,
    pub last_proof_time: Option<DateTime<Utc>>,
    pub offline_strikes: u32,
}

impl ReplicaLink {
    pub fn new(blob: BlobHash, peer: Address) -> Self {
        Self {
            blob,
            peer,
            status: LinkStatus::Init,
            last_proof_time: None,
            offline_strikes: 0,
        }
    }

    /// The peer answered a challenge with the expected digest.
    pub fn record_proof(&mut self, at: DateTime<Utc>) {
        self.offline_strikes = 0;
        self.status = LinkStatus::Active;
        self.last_proof_time = Some(at);
    }

    /// The peer answered wrongly or not at all. Returns true when the strikes
    /// exceed `limit` and the link is now `OFFLINE`.
    pub fn record_miss(&mut self, at: DateTime<Utc>, limit: u32) -> bool {
        self.offline_strikes = self.offline_strikes.saturating_add(1);
        self.last_proof_time = Some(at);
        if self.offline_strikes > limit {
            self.status = LinkStatus::Offline;
            true
        } else {
            false
        }
    }
}

/// A file this node uploaded as a renter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenterBlob {
    pub hash: BlobHash,
    pub name: String,
    pub size: u64,
    pub signature: String,
    pub status: RenterStatus,
    pub timestamp: DateTime<Utc>,
}
