//! Duplex channel between a front-end and the renter.
//!
//! The front-end sends [`ControlRequest`]s and reads [`ControlEvent`]s back.
//! When an operation needs a decision from the user it emits a
//! [`ControlEvent::Prompt`] and suspends until the attached [`PromptHandle`]
//! is answered or dropped.

use std::path::PathBuf;
use std::sync::Arc;

use strata_core::models::RenterBlob;
use serde::{Deserialize, Serialize};
use strata_core::BlobHash;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::constants::CONTROL_CHANNEL_SIZE;
use crate::Renter;

/// On the wire a request reads `{"command": "upload", "kwargs": {...}}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", content = "kwargs", rename_all = "snake_case")]
pub enum ControlRequest {
    Upload { path: PathBuf },
    Download { hash: BlobHash, destination: PathBuf },
}

/// A question the renter needs answered before it can continue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptRequest {
    /// Amount to deposit for a file that has no deposit yet.
    DepositAmount {
        hash: BlobHash,
        balance: u128,
        suggested: u128,
    },
}

/// Resumes the operation waiting on a prompt. Dropping it declines.
#[derive(Debug)]
pub struct PromptHandle(oneshot::Sender<Option<u128>>);

impl PromptHandle {
    pub fn respond(self, answer: Option<u128>) {
        if self.0.send(answer).is_err() {
            warn!("Prompt answered after the operation gave up");
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlOutcome {
    Uploaded(RenterBlob),
    Downloaded(PathBuf),
}

#[derive(Debug)]
pub enum ControlEvent {
    Progress(String),
    Prompt(PromptRequest, PromptHandle),
    Finished(Result<ControlOutcome, String>),
}

/// Where an operation sends its progress and prompts.
#[derive(Clone, Default)]
pub struct Reporter {
    events: Option<mpsc::Sender<ControlEvent>>,
}

impl Reporter {
    pub fn new(events: mpsc::Sender<ControlEvent>) -> Self {
        Self {
            events: Some(events),
        }
    }

    /// A reporter without a front-end. Every prompt is declined.
    pub fn silent() -> Self {
        Self::default()
    }

    pub async fn progress(&self, message: impl Into<String>) {
        let message = message.into();
        debug!("{message}");
        if let Some(events) = &self.events {
            // A front-end that went away only loses progress lines
            let _ = events.send(ControlEvent::Progress(message)).await;
        }
    }

    /// Ask the front-end and wait for the answer. `None` when declined or
    /// when nobody is listening.
    pub async fn ask(&self, request: PromptRequest) -> Option<u128> {
        let events = self.events.as_ref()?;
        let (tx, rx) = oneshot::channel();
        if events
            .send(ControlEvent::Prompt(request, PromptHandle(tx)))
            .await
            .is_err()
        {
            return None;
        }
        rx.await.ok().flatten()
    }

    async fn finish(&self, result: Result<ControlOutcome, String>) {
        if let Some(events) = &self.events {
            let _ = events.send(ControlEvent::Finished(result)).await;
        }
    }
}

/// Front-end side of the control channel.
pub struct ControlChannel {
    pub requests: mpsc::Sender<ControlRequest>,
    pub events: mpsc::Receiver<ControlEvent>,
}

async fn dispatch(renter: &Renter, request: ControlRequest, reporter: &Reporter) {
    let result = match request {
        ControlRequest::Upload { path } => {
            info!("Upload of {} requested", path.display());
            renter
                .uploader()
                .upload(&path, reporter)
                .await
                .map(ControlOutcome::Uploaded)
                .map_err(|e| e.to_string())
        }
        ControlRequest::Download { hash, destination } => {
            info!("Download of {hash} requested");
            renter
                .downloader()
                .download(&hash, &destination, reporter)
                .await
                .map(ControlOutcome::Downloaded)
                .map_err(|e| e.to_string())
        }
    };
    if let Err(e) = &result {
        warn!("Control request failed: {e}");
    }
    reporter.finish(result).await;
}

/// Serve control requests one at a time until the front-end hangs up.
pub fn spawn_control(renter: Arc<Renter>) -> (ControlChannel, JoinHandle<()>) {
    let (request_tx, mut request_rx) = mpsc::channel(CONTROL_CHANNEL_SIZE);
    let (event_tx, event_rx) = mpsc::channel(CONTROL_CHANNEL_SIZE);
    let reporter = Reporter::new(event_tx);

    let handle = tokio::spawn(async move {
        while let Some(request) = request_rx.recv().await {
            dispatch(&renter, request, &reporter).await;
        }
        debug!("Control channel closed");
    });

    (
        ControlChannel {
            requests: request_tx,
            events: event_rx,
        },
        handle,
    )
}
