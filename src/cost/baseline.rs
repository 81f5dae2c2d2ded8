//! Baseline estimate storage.
//!
//! A baseline is the last recorded estimate for one logical target (usually
//! repository plus project). Keys are hashed so arbitrary target names map to
//! safe file and object names.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::error::{RelayError, Result, StateError};
use crate::state::{S3Objects, read_json, write_json};

use super::estimator::CostEstimate;

/// Trait for baseline storage backends.
#[async_trait]
pub trait BaselineStore: Send + Sync {
    /// Loads the baseline for a target, if one was recorded.
    async fn load(&self, target: &str) -> Result<Option<CostEstimate>>;

    /// Replaces the baseline for a target.
    async fn save(&self, target: &str, estimate: &CostEstimate) -> Result<()>;

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}

/// Maps a logical target to a storage-safe name.
#[must_use]
pub fn baseline_key(target: &str) -> String {
    let digest = hex::encode(Sha256::digest(target.as_bytes()));
    format!("{}.json", &digest[..16])
}

/// Baselines stored as JSON files in a directory.
#[derive(Debug)]
pub struct LocalBaselineStore {
    dir: PathBuf,
}

impl LocalBaselineStore {
    /// Creates a store rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl BaselineStore for LocalBaselineStore {
    async fn load(&self, target: &str) -> Result<Option<CostEstimate>> {
        let path = self.dir.join(baseline_key(target));
        debug!("Loading baseline for '{target}' from {}", path.display());
        read_json(&path).await
    }

    async fn save(&self, target: &str, estimate: &CostEstimate) -> Result<()> {
        let path = self.dir.join(baseline_key(target));
        info!("Recording baseline for '{target}' at {}", path.display());
        write_json(&path, estimate).await
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}

/// Baselines stored as S3 objects.
#[derive(Debug)]
pub struct S3BaselineStore {
    objects: S3Objects,
}

impl S3BaselineStore {
    /// Creates a store over an S3 bucket and prefix.
    #[must_use]
    pub const fn new(objects: S3Objects) -> Self {
        Self { objects }
    }
}

#[async_trait]
impl BaselineStore for S3BaselineStore {
    async fn load(&self, target: &str) -> Result<Option<CostEstimate>> {
        let key = self.objects.key(&baseline_key(target));
        let Some(content) = self.objects.get_string(&key).await? else {
            debug!("No baseline at s3://{}/{key}", self.objects.bucket());
            return Ok(None);
        };

        let estimate = serde_json::from_str(&content).map_err(|e| {
            RelayError::State(StateError::Corrupted {
                message: format!("Failed to parse baseline {key}: {e}"),
            })
        })?;
        Ok(Some(estimate))
    }

    async fn save(&self, target: &str, estimate: &CostEstimate) -> Result<()> {
        let key = self.objects.key(&baseline_key(target));
        info!("Recording baseline for '{target}' at s3://{}/{key}", self.objects.bucket());

        let content = serde_json::to_string_pretty(estimate).map_err(|e| {
            RelayError::State(StateError::serialization(format!(
                "Failed to serialize baseline: {e}"
            )))
        })?;
        self.objects.put_string(&key, &content, "application/json").await
    }

    fn backend_type(&self) -> &'static str {
        "s3"
    }
}
