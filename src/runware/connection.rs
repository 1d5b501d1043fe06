use crate::{
    config::RunwareConfig,
    error::{ArtifyError, Result},
    models::GeneratedImage,
    runware::{
        pending::PendingRequests,
        protocol::{encode_frame, parse_server_frame, ClientTask, DataItem, ServerFrame},
    },
};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::{
    net::TcpStream,
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Unconnected,
    Connecting,
    Authenticating,
    Ready,
    Closed,
}

/// An authenticated socket with its read and write tasks.
pub struct Connection {
    write_tx: mpsc::UnboundedSender<Message>,
    pending: Arc<PendingRequests>,
    open: Arc<AtomicBool>,
    status: Arc<watch::Sender<ConnectionStatus>>,
    api_key: String,
    reader: JoinHandle<()>,
}

impl Connection {
    /// Connects, authenticates and spawns the socket tasks.
    ///
    /// The whole handshake is bounded by `config.connect_timeout`. On failure
    /// the status falls back to `Unconnected`.
    pub async fn open(
        config: &RunwareConfig,
        api_key: &str,
        status: Arc<watch::Sender<ConnectionStatus>>,
    ) -> Result<Self> {
        status.send_replace(ConnectionStatus::Connecting);
        log::info!("Connecting to {}", config.ws_url);

        let handshake = async {
            let (mut ws, _response) = tokio_tungstenite::connect_async(config.ws_url.as_str())
                .await
                .map_err(|e| {
                    ArtifyError::TransportError(format!(
                        "WebSocket connection to {} failed: {}",
                        config.ws_url, e
                    ))
                })?;
            log::info!("WebSocket connected");

            status.send_replace(ConnectionStatus::Authenticating);
            authenticate(&mut ws, api_key).await?;
            Ok::<_, ArtifyError>(ws)
        };

        let ws = match tokio::time::timeout(config.connect_timeout, handshake).await {
            Ok(Ok(ws)) => ws,
            Ok(Err(e)) => {
                status.send_replace(ConnectionStatus::Unconnected);
                return Err(e);
            }
            Err(_) => {
                status.send_replace(ConnectionStatus::Unconnected);
                return Err(ArtifyError::TransportError(format!(
                    "Handshake with {} did not complete within {}ms",
                    config.ws_url,
                    config.connect_timeout.as_millis()
                )));
            }
        };

        status.send_replace(ConnectionStatus::Ready);
        log::info!("Authenticated with {}", config.ws_url);

        let (ws_write, ws_read) = ws.split();
        let (write_tx, write_rx) = mpsc::unbounded_channel::<Message>();
        let pending = Arc::new(PendingRequests::new());
        let open = Arc::new(AtomicBool::new(true));

        tokio::spawn(run_write_loop(ws_write, write_rx));
        let reader = tokio::spawn(run_read_loop(
            ws_read,
            pending.clone(),
            open.clone(),
            status.clone(),
        ));

        Ok(Self {
            write_tx,
            pending,
            open,
            status,
            api_key: api_key.to_string(),
            reader,
        })
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.write_tx.is_closed()
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn pending(&self) -> &Arc<PendingRequests> {
        &self.pending
    }

    pub fn send(&self, frame: String) -> Result<()> {
        if !self.is_open() {
            return Err(ArtifyError::ConnectionClosed(
                "connection closed before the request was sent".into(),
            ));
        }
        self.write_tx
            .send(Message::Text(frame.into()))
            .map_err(|_| ArtifyError::TransportError("WebSocket writer has stopped".into()))
    }

    /// Closes the socket and rejects whatever is still pending.
    pub async fn close(&self, reason: &str) {
        self.status.send_replace(ConnectionStatus::Closed);
        self.open.store(false, Ordering::SeqCst);
        let _ = self.write_tx.send(Message::Close(None));

        let rejected = self
            .pending
            .reject_all(|| ArtifyError::ConnectionClosed(reason.to_string()))
            .await;
        if rejected > 0 {
            log::warn!("Rejected {} pending request(s): {}", rejected, reason);
        }
        self.reader.abort();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn authenticate(ws: &mut WsStream, api_key: &str) -> Result<()> {
    let frame = encode_frame(&ClientTask::Authentication {
        api_key: api_key.to_string(),
    })?;
    ws.send(Message::Text(frame.into())).await.map_err(|e| {
        ArtifyError::TransportError(format!("Failed to send authentication: {}", e))
    })?;

    while let Some(message) = ws.next().await {
        let message = message.map_err(|e| {
            ArtifyError::TransportError(format!("WebSocket error during authentication: {}", e))
        })?;

        match message {
            Message::Text(text) => match parse_server_frame(text.as_str()) {
                Ok(frame) if frame.is_authentication_ack() => return Ok(()),
                Ok(ServerFrame::Errors(failures)) => {
                    let message = failures
                        .into_iter()
                        .next()
                        .map(|f| f.message)
                        .unwrap_or_else(|| "Authentication failed".to_string());
                    log::error!("Authentication rejected: {}", message);
                    return Err(ArtifyError::RemoteError(message));
                }
                Ok(_) => log::debug!("Ignoring frame received before authentication"),
                Err(e) => log::warn!("Discarding malformed frame during authentication: {}", e),
            },
            Message::Close(_) => {
                return Err(ArtifyError::TransportError(
                    "Connection closed during authentication".into(),
                ))
            }
            _ => continue,
        }
    }

    Err(ArtifyError::TransportError(
        "Connection ended before authentication completed".into(),
    ))
}

async fn run_write_loop(
    mut ws_write: SplitSink<WsStream, Message>,
    mut write_rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(message) = write_rx.recv().await {
        let closing = matches!(message, Message::Close(_));
        if let Err(e) = ws_write.send(message).await {
            log::warn!("WebSocket write failed: {}", e);
            break;
        }
        if closing {
            break;
        }
    }
    let _ = ws_write.close().await;
}

async fn run_read_loop(
    mut ws_read: SplitStream<WsStream>,
    pending: Arc<PendingRequests>,
    open: Arc<AtomicBool>,
    status: Arc<watch::Sender<ConnectionStatus>>,
) {
    let reason = loop {
        match ws_read.next().await {
            Some(Ok(Message::Text(text))) => dispatch_frame(text.as_str(), &pending).await,
            Some(Ok(Message::Close(frame))) => {
                break match frame {
                    Some(frame) if !frame.reason.is_empty() => {
                        format!("closed by peer: {}", frame.reason)
                    }
                    _ => "closed by peer".to_string(),
                };
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => break format!("WebSocket error: {}", e),
            None => break "connection ended".to_string(),
        }
    };

    log::info!("WebSocket closed ({})", reason);
    // Status first: the service only replaces a connection once `open` is false.
    status.send_replace(ConnectionStatus::Closed);
    open.store(false, Ordering::SeqCst);

    let rejected = pending
        .reject_all(|| ArtifyError::ConnectionClosed(reason.clone()))
        .await;
    if rejected > 0 {
        log::warn!("Rejected {} pending request(s) after close", rejected);
    }
}

/// Routes one server frame to the pending requests it concerns.
pub(crate) async fn dispatch_frame(text: &str, pending: &PendingRequests) {
    let frame = match parse_server_frame(text) {
        Ok(frame) => frame,
        Err(e) => {
            log::warn!("Discarding malformed frame: {}", e);
            return;
        }
    };

    match frame {
        ServerFrame::Data(items) => {
            for item in items {
                dispatch_item(item, pending).await;
            }
        }
        ServerFrame::Errors(failures) => {
            for failure in failures {
                log::error!("API error: {}", failure.message);
                let error = ArtifyError::RemoteError(failure.message);
                let matched = match failure.task_uuid {
                    Some(task_uuid) => pending.reject(&task_uuid, error).await,
                    None => pending.reject_oldest(error).await.is_some(),
                };
                if !matched {
                    log::debug!("No pending request for error, dropping it");
                }
            }
        }
        ServerFrame::Unrecognised(value) => {
            log::debug!("Ignoring unrecognised frame: {}", value);
        }
    }
}

async fn dispatch_item(item: DataItem, pending: &PendingRequests) {
    match item {
        DataItem::Authenticated => log::debug!("Authentication acknowledged"),
        DataItem::TaskResult { task_uuid, payload } => {
            match serde_json::from_value::<GeneratedImage>(payload) {
                Ok(image) => {
                    if pending.deliver(&task_uuid, image).await {
                        log::info!("Image generation successful for task {}", task_uuid);
                    } else {
                        log::debug!("No pending request for task {}, discarding", task_uuid);
                    }
                }
                Err(e) => {
                    let error = ArtifyError::ResponseError(format!(
                        "Malformed result for task {}: {}",
                        task_uuid, e
                    ));
                    pending.reject(&task_uuid, error).await;
                }
            }
        }
        DataItem::TaskError { task_uuid, message } => {
            log::error!("Task {} failed: {}", task_uuid, message);
            pending
                .reject(&task_uuid, ArtifyError::RemoteError(message))
                .await;
        }
        DataItem::Untracked(value) => {
            log::debug!("Ignoring result without a task UUID: {}", value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[tokio::test]
    async fn result_frame_resolves_matching_request() {
        let pending = PendingRequests::new();
        let id = Uuid::new_v4();
        let rx = pending.register(id, 1).await.unwrap();

        let frame = json!({
            "data": [{
                "taskType": "imageInference",
                "taskUUID": id.to_string(),
                "imageURL": "https://x/y.webp",
                "seed": 42
            }]
        });
        dispatch_frame(&frame.to_string(), &pending).await;

        let images = rx.await.unwrap().unwrap();
        assert_eq!(images[0].image_url, "https://x/y.webp");
        assert_eq!(images[0].seed, Some(42));
        assert!(pending.is_empty().await);
    }

    #[tokio::test]
    async fn uncorrelated_error_rejects_oldest_request() {
        let pending = PendingRequests::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let rx_first = pending.register(first, 1).await.unwrap();
        let _rx_second = pending.register(second, 1).await.unwrap();

        dispatch_frame(r#"{"error":"boom"}"#, &pending).await;

        let err = rx_first.await.unwrap().unwrap_err();
        assert_eq!(err.remote_message(), Some("boom"));
        assert!(pending.contains(&second).await);
    }

    #[tokio::test]
    async fn correlated_error_rejects_named_request() {
        let pending = PendingRequests::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let _rx_first = pending.register(first, 1).await.unwrap();
        let rx_second = pending.register(second, 1).await.unwrap();

        let frame = json!({
            "errors": [{ "message": "invalid seed", "taskUUID": second.to_string() }]
        });
        dispatch_frame(&frame.to_string(), &pending).await;

        let err = rx_second.await.unwrap().unwrap_err();
        assert_eq!(err.remote_message(), Some("invalid seed"));
        assert!(pending.contains(&first).await);
    }

    #[tokio::test]
    async fn malformed_result_rejects_with_response_error() {
        let pending = PendingRequests::new();
        let id = Uuid::new_v4();
        let rx = pending.register(id, 1).await.unwrap();

        let frame = json!({ "data": [{ "taskUUID": id.to_string(), "seed": 1 }] });
        dispatch_frame(&frame.to_string(), &pending).await;

        assert!(matches!(
            rx.await.unwrap(),
            Err(ArtifyError::ResponseError(_))
        ));
    }

    #[tokio::test]
    async fn unknown_and_garbage_frames_are_dropped() {
        let pending = PendingRequests::new();
        let id = Uuid::new_v4();
        let _rx = pending.register(id, 1).await.unwrap();

        dispatch_frame("not json", &pending).await;
        let stranger = json!({
            "data": [{ "taskUUID": Uuid::new_v4().to_string(), "imageURL": "u" }]
        });
        dispatch_frame(&stranger.to_string(), &pending).await;
        dispatch_frame(r#"{"data":[{"taskType":"authentication"}]}"#, &pending).await;

        assert!(pending.contains(&id).await);
    }
}
