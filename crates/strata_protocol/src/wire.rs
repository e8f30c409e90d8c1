//! JSON bodies exchanged with a hoster.

use serde::{Deserialize, Serialize};
use strata_core::models::LinkStatus;
use strata_core::{Address, BlobHash, ProofDigest};

/// Body of `POST /files`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateMetadataRequest {
    pub file_hash: BlobHash,
    pub owner_key: String,
    pub signature: String,
    pub client_contract_address: Address,
    pub size: u64,
    /// Full holder list, sent by repair uploads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hosts: Option<Vec<Address>>,
    /// Holder the receiver is taking over from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacing: Option<Address>,
}

/// Body of `PUT /files/{hash}/metadata`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalMetadata {
    pub hosts: Vec<Address>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofQuery {
    pub from: u64,
    pub to: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofResponse {
    pub hash: ProofDigest,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: LinkStatus,
}

/// Reply to metadata and body writes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAck {
    pub hash: BlobHash,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileList {
    pub files: Vec<BlobHash>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}
