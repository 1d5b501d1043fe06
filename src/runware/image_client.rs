use crate::{
    config::{duration_millis, Config, RunwareConfig},
    error::{ArtifyError, Result},
    models::{Exchange, GenerateImageParams, GeneratedImage},
    runware::{
        connection::{Connection, ConnectionStatus},
        pending::{Completion, PendingGuard},
        protocol::{build_inference_task, encode_frame, ClientTask},
    },
    storage::{self, mask_secret, CredentialStore},
};
use std::sync::Arc;
use tokio::sync::{oneshot, watch, Mutex, RwLock};
use uuid::Uuid;

/// Text-to-image client over a single authenticated WebSocket.
///
/// The connection is opened lazily by the first generation call and reused by
/// every call after it. Concurrent calls share one connection and are told
/// apart by their task UUID.
pub struct ImageGenerationService {
    config: RunwareConfig,
    store: Arc<dyn CredentialStore>,
    credential: RwLock<Option<String>>,
    connection: Mutex<Option<Arc<Connection>>>,
    status: Arc<watch::Sender<ConnectionStatus>>,
    last_exchange: Mutex<Option<Exchange>>,
}

impl ImageGenerationService {
    /// Uses `config.api_key` when set, otherwise whatever the store holds.
    pub async fn new(config: RunwareConfig, store: Arc<dyn CredentialStore>) -> Self {
        let credential = match config.api_key.clone() {
            Some(key) => Some(key),
            None => match store.load().await {
                Ok(saved) => saved,
                Err(e) => {
                    log::warn!("Could not load saved API key from {}: {}", store.describe(), e);
                    None
                }
            },
        };

        if let Some(key) = &credential {
            log::debug!("Using API key {}", mask_secret(key));
        }

        let (status, _) = watch::channel(ConnectionStatus::Unconnected);

        Self {
            config,
            store,
            credential: RwLock::new(credential),
            connection: Mutex::new(None),
            status: Arc::new(status),
            last_exchange: Mutex::new(None),
        }
    }

    pub async fn from_config(config: &Config) -> Result<Self> {
        let store = storage::credential_store(&config.credentials)?;
        Ok(Self::new(config.runware.clone(), store).await)
    }

    /// Persists the key and uses it for later connections.
    ///
    /// Nothing changes if the store rejects the key. Otherwise a live
    /// connection authenticated with a different key is closed.
    pub async fn set_credential(&self, secret: impl Into<String>) -> Result<()> {
        let secret = secret.into().trim().to_string();
        if secret.is_empty() {
            return Err(ArtifyError::ValidationError(
                "API key must not be empty".into(),
            ));
        }

        self.store.save(&secret).await?;
        *self.credential.write().await = Some(secret.clone());
        self.drop_connection_unless(&secret).await;

        log::info!("API key set to {}", mask_secret(&secret));
        Ok(())
    }

    pub async fn clear_credential(&self) -> Result<()> {
        *self.credential.write().await = None;
        self.disconnect().await;
        self.store.clear().await
    }

    pub async fn has_credential(&self) -> bool {
        self.credential.read().await.is_some()
    }

    pub async fn credential_masked(&self) -> Option<String> {
        self.credential.read().await.as_deref().map(mask_secret)
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    pub async fn last_exchange(&self) -> Option<Exchange> {
        self.last_exchange.lock().await.clone()
    }

    pub async fn pending_requests(&self) -> usize {
        match self.connection.lock().await.as_ref() {
            Some(connection) => connection.pending().len().await,
            None => 0,
        }
    }

    /// Generates one image and resolves with the first result for the task.
    pub async fn generate(&self, params: &GenerateImageParams) -> Result<GeneratedImage> {
        self.run_task(params, false)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ArtifyError::ResponseError("No images generated".into()))
    }

    /// Like [`generate`](Self::generate), but waits for all `num_images` results.
    pub async fn generate_all(&self, params: &GenerateImageParams) -> Result<Vec<GeneratedImage>> {
        self.run_task(params, true).await
    }

    /// Closes the connection if one is open. Safe to call repeatedly.
    pub async fn disconnect(&self) {
        let connection = self.connection.lock().await.take();
        if let Some(connection) = connection {
            connection.close("disconnected by client").await;
            log::info!("WebSocket disconnected");
        }
    }

    async fn run_task(
        &self,
        params: &GenerateImageParams,
        collect_all: bool,
    ) -> Result<Vec<GeneratedImage>> {
        let api_key = self.credential.read().await.clone().ok_or_else(|| {
            ArtifyError::ConfigError("Please set your Runware API key first".into())
        })?;

        let task_uuid = Uuid::new_v4();
        let task = build_inference_task(params, task_uuid)?;
        let expected = if collect_all {
            task.number_results as usize
        } else {
            1
        };
        let request = ClientTask::ImageInference(task);
        let frame = encode_frame(&request)?;
        let request_json = serde_json::to_value(&request)?;

        let connection = self.ensure_connected(&api_key).await?;
        let receiver = connection.pending().register(task_uuid, expected).await?;
        let guard = PendingGuard::new(connection.pending().clone(), task_uuid);

        log::info!("Sending image generation request {}", task_uuid);
        log::debug!("Image generation payload: {}", frame);

        connection.send(frame)?;

        let outcome = self.wait_for(&connection, task_uuid, receiver).await;
        guard.disarm();
        self.record_exchange(task_uuid, request_json, &outcome).await;
        outcome
    }

    async fn wait_for(
        &self,
        connection: &Connection,
        task_uuid: Uuid,
        receiver: oneshot::Receiver<Completion>,
    ) -> Completion {
        let received = match self.config.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, receiver).await {
                Ok(received) => received,
                Err(_) => {
                    connection.pending().remove(&task_uuid).await;
                    let millis = duration_millis(limit);
                    log::warn!("Task {} timed out after {}ms", task_uuid, millis);
                    return Err(ArtifyError::Timeout(millis));
                }
            },
            None => receiver.await,
        };

        received.map_err(|_| {
            ArtifyError::ConnectionClosed(format!("task {} was dropped before completion", task_uuid))
        })?
    }

    /// Returns the open connection, connecting first if needed.
    ///
    /// The slot lock is held for the whole handshake, so concurrent callers
    /// wait on one attempt rather than opening sockets of their own.
    async fn ensure_connected(&self, api_key: &str) -> Result<Arc<Connection>> {
        let mut slot = self.connection.lock().await;

        if let Some(connection) = slot.as_ref() {
            if connection.is_open() && connection.api_key() == api_key {
                return Ok(connection.clone());
            }
        }

        if let Some(stale) = slot.take() {
            stale.close("replaced by a new connection").await;
        }

        let connection = Arc::new(Connection::open(&self.config, api_key, self.status.clone()).await?);
        *slot = Some(connection.clone());
        Ok(connection)
    }

    async fn drop_connection_unless(&self, api_key: &str) {
        let mut slot = self.connection.lock().await;
        let outdated = slot
            .as_ref()
            .map(|connection| connection.api_key() != api_key)
            .unwrap_or(false);

        if outdated {
            if let Some(connection) = slot.take() {
                connection.close("API key changed").await;
            }
        }
    }

    async fn record_exchange(&self, task_uuid: Uuid, request: serde_json::Value, outcome: &Completion) {
        let (response, error) = match outcome {
            Ok(images) => (serde_json::to_value(images).ok(), None),
            Err(e) => (None, Some(e.to_string())),
        };

        *self.last_exchange.lock().await = Some(Exchange {
            task_uuid: task_uuid.to_string(),
            request,
            response,
            error,
        });
    }
}
