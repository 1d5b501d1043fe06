use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_WS_URL: &str = "wss://ws-api.runware.ai/v1";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct RunwareConfig {
    pub ws_url: String,
    pub api_key: Option<String>,
    pub connect_timeout: Duration,
    /// `None` waits for a reply indefinitely.
    pub request_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialBackend {
    File,
    Memory,
}

#[derive(Debug, Clone)]
pub struct CredentialConfig {
    pub backend: CredentialBackend,
    pub file_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub runware: RunwareConfig,
    pub credentials: CredentialConfig,
}

impl Default for RunwareConfig {
    fn default() -> Self {
        RunwareConfig {
            ws_url: DEFAULT_WS_URL.to_string(),
            api_key: None,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            request_timeout: None,
        }
    }
}

impl RunwareConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        let ws_url = env::var("RUNWARE_WS_URL").unwrap_or(defaults.ws_url);
        let api_key = env::var("RUNWARE_API_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());
        let connect_timeout = parse_timeout_secs(env::var("RUNWARE_CONNECT_TIMEOUT_SECS").ok())
            .unwrap_or(defaults.connect_timeout);
        let request_timeout = parse_timeout_secs(env::var("RUNWARE_REQUEST_TIMEOUT_SECS").ok());

        RunwareConfig {
            ws_url,
            api_key,
            connect_timeout,
            request_timeout,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

/// Whole seconds from an env value. Zero and garbage count as unset.
fn parse_timeout_secs(value: Option<String>) -> Option<Duration> {
    value
        .and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|&secs| secs > 0)
        .map(Duration::from_secs)
}

/// Milliseconds of `duration`, saturating at `u64::MAX`.
pub(crate) fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Default for CredentialConfig {
    fn default() -> Self {
        CredentialConfig {
            backend: CredentialBackend::File,
            file_path: None,
        }
    }
}

impl CredentialConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn memory() -> Self {
        CredentialConfig {
            backend: CredentialBackend::Memory,
            file_path: None,
        }
    }

    pub fn from_env() -> Self {
        let backend = match env::var("ARTIFY_CREDENTIAL_BACKEND").ok().as_deref() {
            Some("memory") => CredentialBackend::Memory,
            _ => CredentialBackend::File,
        };
        let file_path = env::var("ARTIFY_CREDENTIALS_FILE").ok().map(PathBuf::from);

        CredentialConfig { backend, file_path }
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.backend = CredentialBackend::File;
        self.file_path = Some(path.into());
        self
    }

    /// Explicit path, or `<config dir>/artify/credentials.json`.
    pub fn resolved_file_path(&self) -> Option<PathBuf> {
        self.file_path.clone().or_else(|| {
            dirs::config_dir().map(|dir| dir.join("artify").join("credentials.json"))
        })
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        Config {
            runware: RunwareConfig::from_env(),
            credentials: CredentialConfig::from_env(),
        }
    }

    pub fn with_runware(mut self, config: RunwareConfig) -> Self {
        self.runware = config;
        self
    }

    pub fn with_credentials(mut self, config: CredentialConfig) -> Self {
        self.credentials = config;
        self
    }
}
