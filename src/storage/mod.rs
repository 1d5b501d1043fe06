pub mod file;
pub mod memory;
pub mod traits;

use crate::{
    config::{CredentialBackend, CredentialConfig},
    error::{ArtifyError, Result},
};
use std::sync::Arc;

pub use file::FileCredentialStore;
pub use memory::MemoryCredentialStore;
pub use traits::{CredentialStore, CREDENTIAL_KEY};

pub fn credential_store(config: &CredentialConfig) -> Result<Arc<dyn CredentialStore>> {
    let store: Arc<dyn CredentialStore> = match config.backend {
        CredentialBackend::File => {
            let path = config.resolved_file_path().ok_or_else(|| {
                ArtifyError::ConfigError(
                    "No credentials file configured and no config directory available".into(),
                )
            })?;
            Arc::new(FileCredentialStore::new(path))
        }
        CredentialBackend::Memory => Arc::new(MemoryCredentialStore::new()),
    };

    log::debug!("Using credential store {}", store.describe());
    Ok(store)
}

/// Shows the first 8 and last 4 characters, bullets in between.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 12 {
        return "•".repeat(chars.len());
    }

    let head: String = chars[..8].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}{}", head, "•".repeat(chars.len() - 12), tail)
}
