use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArtifyError {
    /// Missing or unusable configuration, most commonly an unset API key.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The socket could not be opened, or failed before the handshake finished.
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Error payload returned by the remote peer. The message is kept verbatim.
    #[error("{0}")]
    RemoteError(String),

    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Response error: {0}")]
    ResponseError(String),

    #[error("Storage error: {0}")]
    StorageError(String),
}

impl ArtifyError {
    /// Whether the same request may succeed if simply issued again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ArtifyError::TransportError(_)
                | ArtifyError::ConnectionClosed(_)
                | ArtifyError::Timeout(_)
        )
    }

    pub fn remote_message(&self) -> Option<&str> {
        match self {
            ArtifyError::RemoteError(msg) => Some(msg),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ArtifyError {
    fn from(err: serde_json::Error) -> Self {
        ArtifyError::SerializationError(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ArtifyError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ArtifyError::TransportError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ArtifyError>;
