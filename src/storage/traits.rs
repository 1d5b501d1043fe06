use crate::error::Result;
use async_trait::async_trait;

/// Key the API credential is stored under.
pub const CREDENTIAL_KEY: &str = "runware_api_key";

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> Result<Option<String>>;

    /// Overwrites any previously saved credential.
    async fn save(&self, secret: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;

    fn describe(&self) -> String;
}
