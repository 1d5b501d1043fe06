use crate::{error::Result, storage::traits::CredentialStore};
use async_trait::async_trait;
use tokio::sync::RwLock;

/// Keeps the credential for the lifetime of the process only.
#[derive(Default)]
pub struct MemoryCredentialStore {
    secret: RwLock<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            secret: RwLock::new(Some(secret.into())),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<Option<String>> {
        Ok(self.secret.read().await.clone())
    }

    async fn save(&self, secret: &str) -> Result<()> {
        *self.secret.write().await = Some(secret.to_string());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.secret.write().await = None;
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
