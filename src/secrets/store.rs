//! Secret store backends.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::fs;
use tracing::debug;

use crate::error::{RelayError, Result, SecretStoreError};
use crate::state::{S3Objects, write_private};

/// Trait for secret storage backends.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Reads a secret, returning `None` if it was never written.
    async fn get(&self, name: &str) -> Result<Option<String>>;

    /// Writes a secret.
    async fn put(&self, name: &str, value: &str) -> Result<()>;

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}

/// Rejects names that are unsafe as file names or object keys.
///
/// # Errors
///
/// Returns an error if the name is empty, starts with a dot, or contains
/// anything other than ASCII alphanumerics, `-`, `_` and `.`.
pub fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(RelayError::Secret(SecretStoreError::InvalidName {
            name: name.to_string(),
        }))
    }
}

/// Process-local store, mainly for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemorySecretStore {
    values: Mutex<HashMap<String, String>>,
}

impl InMemorySecretStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding one secret.
    #[must_use]
    pub fn with_secret(name: &str, value: &str) -> Self {
        let store = Self::new();
        if let Ok(mut values) = store.values.lock() {
            values.insert(name.to_string(), value.to_string());
        }
        store
    }

    fn poisoned() -> RelayError {
        RelayError::Secret(SecretStoreError::backend("in-memory store lock poisoned"))
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn get(&self, name: &str) -> Result<Option<String>> {
        let values = self.values.lock().map_err(|_| Self::poisoned())?;
        Ok(values.get(name).cloned())
    }

    async fn put(&self, name: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().map_err(|_| Self::poisoned())?;
        values.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}

/// One file per secret in a directory.
#[derive(Debug)]
pub struct LocalSecretStore {
    dir: PathBuf,
}

impl LocalSecretStore {
    /// Creates a store rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl SecretStore for LocalSecretStore {
    async fn get(&self, name: &str) -> Result<Option<String>> {
        validate_name(name)?;
        let path = self.dir.join(name);
        if !path.exists() {
            debug!("Secret '{name}' not found in {}", self.dir.display());
            return Ok(None);
        }

        let value = fs::read_to_string(&path)
            .await
            .map_err(|e| SecretStoreError::backend(format!("Failed to read secret '{name}': {e}")))?;
        Ok(Some(value.trim().to_string()))
    }

    async fn put(&self, name: &str, value: &str) -> Result<()> {
        validate_name(name)?;
        let path = self.dir.join(name);
        write_private(&path, value.as_bytes()).await
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}

/// Secrets stored as server-side encrypted S3 objects.
#[derive(Debug)]
pub struct S3SecretStore {
    objects: S3Objects,
}

impl S3SecretStore {
    /// Creates a store over an S3 bucket and prefix. Writes are encrypted.
    #[must_use]
    pub fn new(objects: S3Objects) -> Self {
        Self {
            objects: objects.encrypted(),
        }
    }
}

#[async_trait]
impl SecretStore for S3SecretStore {
    async fn get(&self, name: &str) -> Result<Option<String>> {
        validate_name(name)?;
        let key = self.objects.key(name);
        Ok(self
            .objects
            .get_string(&key)
            .await?
            .map(|v| v.trim().to_string()))
    }

    async fn put(&self, name: &str, value: &str) -> Result<()> {
        validate_name(name)?;
        let key = self.objects.key(name);
        self.objects.put_string(&key, value, "text/plain").await
    }

    fn backend_type(&self) -> &'static str {
        "s3"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("webhook-secret").is_ok());
        assert!(validate_name("atlantis_webhook.v2").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("../etc/passwd").is_err());
        assert!(validate_name(".hidden").is_err());
    }

    #[tokio::test]
    async fn test_local_store_round_trip() {
        let temp = TempDir::new().expect("temp dir");
        let store = LocalSecretStore::new(temp.path().join("secrets"));

        assert!(store.get("webhook-secret").await.expect("get").is_none());
        store.put("webhook-secret", "abc123").await.expect("put");
        assert_eq!(
            store.get("webhook-secret").await.expect("get").as_deref(),
            Some("abc123")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_local_store_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().expect("temp dir");
        let existing = temp.path().join("webhook-secret");
        std::fs::write(&existing, "old").expect("write");
        std::fs::set_permissions(&existing, std::fs::Permissions::from_mode(0o644)).expect("chmod");

        let store = LocalSecretStore::new(temp.path());
        store.put("webhook-secret", "abc123").await.expect("put");

        let mode = std::fs::metadata(temp.path().join("webhook-secret"))
            .expect("metadata")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = InMemorySecretStore::with_secret("a", "1");
        assert_eq!(store.get("a").await.expect("get").as_deref(), Some("1"));
        assert!(store.get("b").await.expect("get").is_none());
    }
}
