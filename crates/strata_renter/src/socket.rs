//! WebSocket front-end of the control channel.
//!
//! Each text frame from the client is either a [`ControlRequest`] or, while a
//! prompt is open, a [`PromptReply`]. Progress, prompts and results go back
//! as [`SocketMessage`]s.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::ApiState;
use crate::control::{
    spawn_control, ControlEvent, ControlOutcome, ControlRequest, PromptHandle, PromptRequest,
};
use crate::listing::FileEntry;
use crate::Renter;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocketStatus {
    Success,
    ActionNeeded,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocketData {
    File(FileEntry),
    Path(PathBuf),
    Prompt(PromptRequest),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketMessage {
    pub status: SocketStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub details: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<SocketData>,
}

/// Answer to an `action_needed` message. A missing or null result declines.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptReply {
    #[serde(default)]
    pub result: Option<u128>,
}

impl SocketMessage {
    fn success(details: &str, message: String, data: Option<SocketData>) -> Self {
        Self {
            status: SocketStatus::Success,
            details: details.to_string(),
            message,
            data,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: SocketStatus::Error,
            details: String::new(),
            message: message.into(),
            data: None,
        }
    }

    fn prompt(request: PromptRequest) -> Self {
        let (details, message) = match &request {
            PromptRequest::DepositAmount {
                hash,
                balance,
                suggested,
            } => (
                "deposit_amount",
                format!("Choose the deposit for {hash} (balance {balance}, suggested {suggested})"),
            ),
        };
        Self {
            status: SocketStatus::ActionNeeded,
            details: details.to_string(),
            message,
            data: Some(SocketData::Prompt(request)),
        }
    }

    fn finished(result: Result<ControlOutcome, String>) -> Self {
        match result {
            Ok(ControlOutcome::Uploaded(blob)) => Self::success(
                "uploaded",
                format!("Finished uploading {}", blob.hash),
                Some(SocketData::File(blob.into())),
            ),
            Ok(ControlOutcome::Downloaded(path)) => Self::success(
                "downloaded",
                format!("Finished downloading to {}", path.display()),
                Some(SocketData::Path(path)),
            ),
            Err(message) => Self::error(message),
        }
    }
}

async fn send(socket: &mut WebSocket, message: &SocketMessage) -> bool {
    let text = match serde_json::to_string(message) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to encode a socket message: {e}");
            return false;
        }
    };
    socket.send(Message::Text(text.into())).await.is_ok()
}

/// Route a client frame. Returns the immediate reply, if any.
async fn incoming(
    text: &str,
    pending: &mut Option<PromptHandle>,
    requests: &tokio::sync::mpsc::Sender<ControlRequest>,
) -> Option<SocketMessage> {
    if let Some(handle) = pending.take() {
        return match serde_json::from_str::<PromptReply>(text) {
            Ok(reply) => {
                handle.respond(reply.result);
                None
            }
            Err(e) => {
                handle.respond(None);
                Some(SocketMessage::error(format!("invalid prompt reply: {e}")))
            }
        };
    }

    match serde_json::from_str::<ControlRequest>(text) {
        Ok(request) => {
            debug!("Socket request {request:?}");
            if requests.send(request).await.is_err() {
                return Some(SocketMessage::error("the control channel closed"));
            }
            None
        }
        Err(e) => Some(SocketMessage::error(format!("invalid command: {e}"))),
    }
}

async fn drive(mut socket: WebSocket, renter: Arc<Renter>) {
    let (mut channel, _task) = spawn_control(renter);
    let mut pending = None;
    info!("Control socket opened");

    loop {
        let reply = tokio::select! {
            frame = socket.recv() => match frame {
                Some(Ok(Message::Text(text))) => {
                    incoming(text.as_str(), &mut pending, &channel.requests).await
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => None,
                Some(Err(e)) => {
                    warn!("Control socket failed: {e}");
                    break;
                }
            },
            event = channel.events.recv() => match event {
                Some(ControlEvent::Progress(message)) => {
                    Some(SocketMessage::success("info", message, None))
                }
                Some(ControlEvent::Prompt(request, handle)) => {
                    pending = Some(handle);
                    Some(SocketMessage::prompt(request))
                }
                Some(ControlEvent::Finished(result)) => Some(SocketMessage::finished(result)),
                None => break,
            },
        };

        if let Some(reply) = reply {
            if !send(&mut socket, &reply).await {
                break;
            }
        }
    }

    // An operation still running finishes on its own; its prompts decline.
    info!("Control socket closed");
}

pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    ws.on_upgrade(move |socket| drive(socket, state.renter))
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use futures::{SinkExt, StreamExt};
    use strata_core::models::RenterStatus;
    use strata_ledger::Ledger;
    use strata_node::DiskQuota;
    use strata_protocol::memory::Behaviour;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite;

    use super::*;
    use crate::api::router;
    use crate::test_utils::{setup_logging, Fixture};

    type Client =
        tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

    async fn connect(fx: &Fixture) -> Client {
        setup_logging();
        let state = ApiState {
            renter: fx.renter.clone(),
            quota: DiskQuota::from_gib(1.0),
        };
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(
                listener,
                router(state).into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });
        let (client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/"))
            .await
            .unwrap();
        client
    }

    async fn send_json(client: &mut Client, value: serde_json::Value) {
        client
            .send(tungstenite::Message::text(value.to_string()))
            .await
            .unwrap();
    }

    async fn next_message(client: &mut Client) -> SocketMessage {
        loop {
            let frame = client.next().await.unwrap().unwrap();
            if frame.is_text() {
                return serde_json::from_str(frame.to_text().unwrap()).unwrap();
            }
        }
    }

    /// Skip progress lines up to the next prompt or result.
    async fn next_significant(client: &mut Client) -> SocketMessage {
        loop {
            let message = next_message(client).await;
            if message.details != "info" {
                return message;
            }
        }
    }

    #[tokio::test]
    async fn test_upload_with_deposit_prompt() {
        let fx = Fixture::new();
        fx.peers(&[("a:1", Behaviour::Honest), ("b:1", Behaviour::Honest)]);
        fx.ledger.set_balance(&fx.owner(), 1_000);
        let path = fx.write_file("report.pdf", b"socket upload");
        let mut client = connect(&fx).await;

        send_json(
            &mut client,
            serde_json::json!({ "command": "upload", "kwargs": { "path": path } }),
        )
        .await;

        let prompt = next_significant(&mut client).await;
        assert_eq!(prompt.status, SocketStatus::ActionNeeded);
        assert_eq!(prompt.details, "deposit_amount");
        let Some(SocketData::Prompt(PromptRequest::DepositAmount { balance, .. })) = &prompt.data
        else {
            panic!("expected a deposit prompt, got {prompt:?}");
        };
        assert_eq!(*balance, 1_000);
        send_json(&mut client, serde_json::json!({ "result": 250 })).await;

        let done = next_significant(&mut client).await;
        assert_eq!(done.status, SocketStatus::Success, "{done:?}");
        assert_eq!(done.details, "uploaded");
        let Some(SocketData::File(file)) = &done.data else {
            panic!("expected the uploaded file, got {done:?}");
        };
        assert_eq!(file.name, "report.pdf");
        assert_eq!(file.status, RenterStatus::Uploaded);
        assert_eq!(fx.ledger.get_balance(&fx.owner()).await.unwrap(), 750);
    }

    #[tokio::test]
    async fn test_declined_prompt_fails_upload() {
        let fx = Fixture::new();
        fx.peers(&[("a:1", Behaviour::Honest)]);
        fx.ledger.set_balance(&fx.owner(), 1_000);
        let path = fx.write_file("declined.txt", b"never placed");
        let mut client = connect(&fx).await;

        send_json(
            &mut client,
            serde_json::json!({ "command": "upload", "kwargs": { "path": path } }),
        )
        .await;
        let prompt = next_significant(&mut client).await;
        assert_eq!(prompt.status, SocketStatus::ActionNeeded);
        send_json(&mut client, serde_json::json!({ "result": null })).await;

        let done = next_significant(&mut client).await;
        assert_eq!(done.status, SocketStatus::Error);
        assert_eq!(fx.ledger.get_balance(&fx.owner()).await.unwrap(), 1_000);
    }

    #[tokio::test]
    async fn test_download_over_socket() {
        let fx = Fixture::new();
        let hash = fx
            .uploaded("memo.txt", b"remember", &[("a:1", Behaviour::Honest)])
            .await;
        let mut client = connect(&fx).await;

        send_json(
            &mut client,
            serde_json::json!({
                "command": "download",
                "kwargs": { "hash": hash.to_string(), "destination": fx.dir.path() }
            }),
        )
        .await;

        let done = next_significant(&mut client).await;
        assert_eq!(done.details, "downloaded", "{done:?}");
        let expected = fx.dir.path().join("memo.txt");
        assert_eq!(done.data, Some(SocketData::Path(expected.clone())));
        assert_eq!(std::fs::read(expected).unwrap(), b"remember");
    }

    #[tokio::test]
    async fn test_unknown_command_keeps_socket_open() {
        let fx = Fixture::new();
        let mut client = connect(&fx).await;

        send_json(&mut client, serde_json::json!({ "command": "format_disk" })).await;
        let reply = next_message(&mut client).await;
        assert_eq!(reply.status, SocketStatus::Error);
        assert!(reply.message.starts_with("invalid command"));

        let missing = strata_core::BlobHash::new([4; 32]);
        send_json(
            &mut client,
            serde_json::json!({
                "command": "download",
                "kwargs": { "hash": missing.to_string(), "destination": fx.dir.path() }
            }),
        )
        .await;
        let reply = next_significant(&mut client).await;
        assert_eq!(reply.status, SocketStatus::Error);
    }
}
