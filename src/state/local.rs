//! Local file-based state storage.
//!
//! This module provides the file-based target store plus the atomic write
//! helpers shared by the other local backends (baselines, secrets, ledger).

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{RelayError, Result, StateError};

use super::store::TargetStore;
use super::types::{ReconciliationTarget, TargetState};

/// Default state directory name.
pub const STATE_DIR: &str = ".planrelay";

/// Target state file name.
const TARGETS_FILE: &str = "targets.json";

/// Local file-based target store.
#[derive(Debug)]
pub struct LocalTargetStore {
    /// Path to the targets file.
    state_path: PathBuf,
}

impl LocalTargetStore {
    /// Creates a store keeping its file in `base_dir`.
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_path: base_dir.into().join(TARGETS_FILE),
        }
    }

    async fn load_state(&self) -> Result<TargetState> {
        Ok(read_json(&self.state_path).await?.unwrap_or_default())
    }
}

#[async_trait]
impl TargetStore for LocalTargetStore {
    async fn load(&self, name: &str) -> Result<Option<ReconciliationTarget>> {
        let mut state = self.load_state().await?;
        Ok(state.targets.remove(name))
    }

    async fn save(&self, target: &ReconciliationTarget) -> Result<()> {
        let mut state = self.load_state().await?;
        state.set_target(target.clone());
        info!("Saving target '{}' to: {}", target.name, self.state_path.display());
        write_json(&self.state_path, &state).await
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}

/// Reads and parses a JSON file, returning `None` if it does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        debug!("State file does not exist: {}", path.display());
        return Ok(None);
    }

    let content = fs::read_to_string(path).await.map_err(|e| {
        RelayError::State(StateError::Corrupted {
            message: format!("Failed to read {}: {e}", path.display()),
        })
    })?;

    let value = serde_json::from_str(&content).map_err(|e| {
        RelayError::State(StateError::Corrupted {
            message: format!("Failed to parse {}: {e}", path.display()),
        })
    })?;

    Ok(Some(value))
}

/// Serializes a value as pretty JSON and writes it atomically.
///
/// # Errors
///
/// Returns an error if serialization or any filesystem step fails.
pub async fn write_json<T: Serialize + Sync>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value).map_err(|e| {
        RelayError::State(StateError::serialization(format!(
            "Failed to serialize {}: {e}",
            path.display()
        )))
    })?;
    write_atomic(path, content.as_bytes()).await
}

/// Writes to a temporary sibling file, syncs it, then renames it into place.
///
/// # Errors
///
/// Returns an error if any filesystem step fails.
pub async fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    write_atomic_with(path, content, false).await
}

/// Like [`write_atomic`], but the temporary file is created owner-only
/// (`0600` on unix) so the content is never readable by others, not even
/// before the rename.
///
/// # Errors
///
/// Returns an error if any filesystem step fails.
pub async fn write_private(path: &Path, content: &[u8]) -> Result<()> {
    write_atomic_with(path, content, true).await
}

async fn write_atomic_with(path: &Path, content: &[u8], private: bool) -> Result<()> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
        && !dir.exists()
    {
        debug!("Creating state directory: {}", dir.display());
        fs::create_dir_all(dir).await.map_err(|e| {
            RelayError::State(StateError::filesystem(format!(
                "Failed to create state directory: {e}"
            )))
        })?;
    }

    let temp_path = path.with_extension("tmp");

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    if private {
        // A leftover temp file would keep its old mode.
        match fs::remove_file(&temp_path).await {
            Ok(()) => debug!("Removed stale {}", temp_path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(RelayError::State(StateError::filesystem(format!(
                    "Failed to remove {}: {e}",
                    temp_path.display()
                ))));
            }
        }
        #[cfg(unix)]
        options.mode(0o600);
    }

    let mut file = options.open(&temp_path).await.map_err(|e| {
        RelayError::State(StateError::filesystem(format!(
            "Failed to create {}: {e}",
            temp_path.display()
        )))
    })?;

    file.write_all(content).await.map_err(|e| {
        RelayError::State(StateError::filesystem(format!(
            "Failed to write {}: {e}",
            temp_path.display()
        )))
    })?;

    file.sync_all().await.map_err(|e| {
        RelayError::State(StateError::filesystem(format!(
            "Failed to sync {}: {e}",
            temp_path.display()
        )))
    })?;

    fs::rename(&temp_path, path).await.map_err(|e| {
        RelayError::State(StateError::filesystem(format!(
            "Failed to rename {}: {e}",
            path.display()
        )))
    })?;

    debug!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::TargetKind;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn create_test_store() -> (LocalTargetStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = LocalTargetStore::with_base_dir(temp_dir.path());
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (store, _temp) = create_test_store();

        let mut target = ReconciliationTarget::new("atlantis", TargetKind::Webhook, BTreeMap::new());
        target.record_converged("42");
        store.save(&target).await.expect("Failed to save target");

        let loaded = store
            .load("atlantis")
            .await
            .expect("Failed to load target")
            .expect("Target should exist");

        assert_eq!(loaded.external_id.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn test_load_nonexistent() {
        let (store, _temp) = create_test_store();

        let result = store.load("missing").await.expect("Load should not fail");
        assert!(result.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_write_private_never_widens_mode() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("nested").join("token");

        // A stale world-readable temp file must not leak its mode.
        std::fs::create_dir_all(temp.path().join("nested")).expect("mkdir");
        std::fs::write(path.with_extension("tmp"), "old").expect("write");
        std::fs::set_permissions(path.with_extension("tmp"), std::fs::Permissions::from_mode(0o644))
            .expect("chmod");

        write_private(&path, b"s3cr3t").await.expect("write");

        let mode = std::fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "s3cr3t");
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupted_file_is_reported() {
        let (store, temp) = create_test_store();
        std::fs::write(temp.path().join(TARGETS_FILE), "{oops").expect("write");

        let err = store.load("atlantis").await.expect_err("should fail");
        assert!(matches!(err, RelayError::State(StateError::Corrupted { .. })));
    }
}
