use crate::{
    error::{ArtifyError, Result},
    storage::traits::{CredentialStore, CREDENTIAL_KEY},
};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Credential persisted in a small JSON object file.
///
/// Other keys in the file are preserved across saves.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_contents(&self) -> Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(None),
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ArtifyError::StorageError(format!(
                "Failed to read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    async fn read_entries(&self) -> Result<Map<String, Value>> {
        match self.read_contents().await? {
            Some(contents) => self.parse_entries(&contents),
            None => Ok(Map::new()),
        }
    }

    /// Entries to rewrite on update, and whether the file failed to parse.
    /// A file that fails to parse is replaced, not kept.
    async fn entries_for_update(&self) -> Result<(Map<String, Value>, bool)> {
        let Some(contents) = self.read_contents().await? else {
            return Ok((Map::new(), false));
        };
        match self.parse_entries(&contents) {
            Ok(entries) => Ok((entries, false)),
            Err(e) => {
                log::warn!("{}; starting from an empty credentials file", e);
                Ok((Map::new(), true))
            }
        }
    }

    fn parse_entries(&self, contents: &str) -> Result<Map<String, Value>> {
        match serde_json::from_str::<Value>(contents) {
            Ok(Value::Object(entries)) => Ok(entries),
            Ok(_) => Err(ArtifyError::StorageError(format!(
                "{} does not contain a JSON object",
                self.path.display()
            ))),
            Err(e) => Err(ArtifyError::StorageError(format!(
                "Failed to parse {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    async fn write_entries(&self, entries: Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ArtifyError::StorageError(e.to_string()))?;
        }

        let contents = serde_json::to_string_pretty(&Value::Object(entries))?;
        tokio::fs::write(&self.path, contents).await.map_err(|e| {
            ArtifyError::StorageError(format!("Failed to write {}: {}", self.path.display(), e))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let owner_only = std::fs::Permissions::from_mode(0o600);
            if let Err(e) = tokio::fs::set_permissions(&self.path, owner_only).await {
                log::warn!("Could not restrict permissions on {}: {}", self.path.display(), e);
            }
        }

        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Option<String>> {
        let entries = self.read_entries().await?;
        Ok(entries
            .get(CREDENTIAL_KEY)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(String::from))
    }

    async fn save(&self, secret: &str) -> Result<()> {
        let (mut entries, _) = self.entries_for_update().await?;
        entries.insert(CREDENTIAL_KEY.to_string(), Value::String(secret.to_string()));
        self.write_entries(entries).await?;
        log::debug!("Saved API key to {}", self.path.display());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let (mut entries, corrupt) = self.entries_for_update().await?;
        if entries.remove(CREDENTIAL_KEY).is_some() || corrupt {
            self.write_entries(entries).await?;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}
