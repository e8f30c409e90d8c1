use std::path::PathBuf;

use strata_core::Address;

#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Ledger identity of this node.
    pub address: Address,

    /// SQLite file caching peers, blobs and replica links.
    pub db_file: PathBuf,
    /// Password-sealed key material.
    pub secrets_file: PathBuf,

    /// Ledger gateway, unused in mock mode.
    pub ledger_url: String,
    /// Run against an in-process ledger.
    pub mock: bool,
}
