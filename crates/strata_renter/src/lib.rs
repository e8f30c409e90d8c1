//! Renter role: placing encrypted files on hosters and getting them back.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use strata_core::constants::{HOSTERS_PER_FILE, UPLOAD_TIMEOUT_SECS};
use strata_ledger::confirm::Backoff;
use strata_ledger::Ledger;
use strata_node::Node;
use strata_protocol::PeerClient;

pub use api::{serve_api, ApiState};
pub use control::{
    spawn_control, ControlChannel, ControlEvent, ControlOutcome, ControlRequest, PromptHandle,
    PromptRequest, Reporter,
};
pub use download::{DownloadError, DownloadOrchestrator};
pub use listing::{list_files, FileEntry, ListingError};
pub use upload::{ReplicationOrchestrator, UploadError};

pub mod api;
mod constants;
pub mod control;
pub mod download;
pub mod listing;
pub mod socket;
pub mod upload;
#[cfg(test)]
mod test_utils;

/// Renter configuration
#[derive(Clone, Debug)]
pub struct RenterConfig {
    /// Port of the local control API. Bound on the loopback interface only.
    pub api_port: u16,
    pub hosters_per_file: usize,
    pub upload_timeout: Duration,
    /// Where downloads land when no destination is given.
    pub download_dir: PathBuf,
    /// Polling used while waiting for a fresh deposit to become visible.
    pub deposit_backoff: Backoff,
}

impl Default for RenterConfig {
    fn default() -> Self {
        Self {
            api_port: 9380,
            hosters_per_file: HOSTERS_PER_FILE,
            upload_timeout: Duration::from_secs(UPLOAD_TIMEOUT_SECS),
            download_dir: PathBuf::from("downloads"),
            deposit_backoff: Backoff::default(),
        }
    }
}

pub struct Renter {
    pub config: RenterConfig,
    pub node: Arc<Node>,
    pub client: Arc<dyn PeerClient>,
}

impl Renter {
    pub fn new(config: RenterConfig, node: Arc<Node>, client: Arc<dyn PeerClient>) -> Self {
        Self {
            config,
            node,
            client,
        }
    }

    pub fn ledger(&self) -> &dyn Ledger {
        self.node.ledger.as_ref()
    }

    pub fn uploader(&self) -> ReplicationOrchestrator<'_> {
        ReplicationOrchestrator::new(self)
    }

    pub fn downloader(&self) -> DownloadOrchestrator<'_> {
        DownloadOrchestrator::new(self)
    }
}
