//! Configuration types for planrelay.
//!
//! These structs map to `planrelay.yaml`. Every section has defaults so the
//! notify pipeline also works from environment variables alone.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cost::{BaselineStore, LocalBaselineStore, S3BaselineStore};
use crate::error::{ConfigError, RelayError, Result};
use crate::notify::DEFAULT_REFERENCE_TEMPLATE;
use crate::registry::{DEFAULT_CONTENT_TYPE, GITHUB_API_URL};
use crate::secrets::{LocalSecretStore, S3SecretStore, SecretStore};
use crate::state::{ReconciliationTarget, S3Objects, STATE_DIR, TargetKind};

/// The root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RelayConfig {
    /// Notification transport.
    #[serde(default)]
    pub notification: NotificationConfig,
    /// Cost estimation.
    #[serde(default)]
    pub estimator: EstimatorConfig,
    /// Delivery bookkeeping.
    #[serde(default)]
    pub delivery: DeliveryConfig,
    /// Webhook and secret reconciliation.
    #[serde(default)]
    pub reconcile: Option<ReconcileConfig>,
}

/// Notification transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationConfig {
    /// Endpoint receiving `{"text": ...}`. Usually supplied via environment.
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
    /// Link template with `{repo}`, `{pr}` and `{commit}` placeholders.
    #[serde(default = "default_reference_template")]
    pub reference_url_template: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: default_http_timeout(),
            reference_url_template: default_reference_template(),
        }
    }
}

/// Cost estimator configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EstimatorConfig {
    /// Estimation endpoint. Estimation is disabled when absent.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
    /// Where baselines are stored.
    #[serde(default)]
    pub baseline: Option<StorageConfig>,
    /// Replace the baseline with each new estimate.
    #[serde(default)]
    pub record_baseline: bool,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: default_http_timeout(),
            baseline: None,
            record_baseline: false,
        }
    }
}

/// Delivery bookkeeping configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliveryConfig {
    /// Path of the delivery ledger. No ledger when absent.
    #[serde(default)]
    pub ledger_path: Option<String>,
    /// Days a claimed delivery is remembered.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            ledger_path: None,
            retention_days: default_retention_days(),
        }
    }
}

/// Storage backend selection shared by baselines and secrets.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    /// Backend type.
    #[serde(default)]
    pub backend: StorageBackend,
    /// Local directory (for local backend).
    #[serde(default)]
    pub path: Option<String>,
    /// S3 bucket name (required for s3 backend).
    #[serde(default)]
    pub bucket: Option<String>,
    /// S3 key prefix.
    #[serde(default)]
    pub prefix: Option<String>,
    /// S3 region; AWS default when absent.
    #[serde(default)]
    pub region: Option<String>,
}

impl StorageConfig {
    /// Local directory, falling back to `default_dir` under the state directory.
    #[must_use]
    pub fn local_dir(&self, default_dir: &str) -> String {
        self.path
            .clone()
            .unwrap_or_else(|| format!("{STATE_DIR}/{default_dir}"))
    }

    async fn s3_objects(&self) -> Result<S3Objects> {
        let bucket = self.bucket.as_deref().ok_or_else(|| {
            RelayError::Config(ConfigError::validation("S3 bucket not configured", "bucket"))
        })?;
        Ok(S3Objects::new(bucket, self.prefix.as_deref(), self.region.as_deref()).await)
    }

    /// Builds the baseline store for this section.
    ///
    /// # Errors
    ///
    /// Returns an error if the S3 backend has no bucket.
    pub async fn baseline_store(&self) -> Result<Arc<dyn BaselineStore>> {
        Ok(match self.backend {
            StorageBackend::Local => Arc::new(LocalBaselineStore::new(self.local_dir("baselines"))),
            StorageBackend::S3 => Arc::new(S3BaselineStore::new(self.s3_objects().await?)),
        })
    }

    /// Builds the secret store for this section.
    ///
    /// # Errors
    ///
    /// Returns an error if the S3 backend has no bucket.
    pub async fn secret_store(&self) -> Result<Arc<dyn SecretStore>> {
        Ok(match self.backend {
            StorageBackend::Local => Arc::new(LocalSecretStore::new(self.local_dir("secrets"))),
            StorageBackend::S3 => Arc::new(S3SecretStore::new(self.s3_objects().await?)),
        })
    }
}

/// Storage backend types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Local files.
    #[default]
    Local,
    /// AWS S3 objects.
    S3,
}

/// Webhook and secret reconciliation configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// Registry API base URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Scope: `owner/repo` or `org:<name>`.
    pub owner: String,
    /// Desired webhook registration.
    pub webhook: WebhookConfig,
    /// Signing secret.
    #[serde(default)]
    pub secret: SecretConfig,
    /// Attempts for transient registry failures.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Directory for persisted targets.
    #[serde(default = "default_state_path")]
    pub state_path: String,
}

/// Desired webhook registration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebhookConfig {
    /// Logical target name.
    #[serde(default = "default_webhook_name")]
    pub name: String,
    /// Delivery URL.
    pub url: String,
    /// Whether deliveries are enabled.
    #[serde(default = "default_true")]
    pub active: bool,
    /// Subscribed events.
    #[serde(default = "default_events")]
    pub events: Vec<String>,
    /// Payload content type (`json` or `form`).
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

impl WebhookConfig {
    /// Builds the reconciliation target for this registration.
    #[must_use]
    pub fn to_target(&self) -> ReconciliationTarget {
        let mut desired = BTreeMap::new();
        desired.insert(String::from("url"), Value::from(self.url.clone()));
        desired.insert(String::from("active"), Value::from(self.active));
        desired.insert(String::from("events"), Value::from(self.events.clone()));
        desired.insert(String::from("content_type"), Value::from(self.content_type.clone()));
        ReconciliationTarget::new(self.name.clone(), TargetKind::Webhook, desired)
    }
}

/// Signing secret configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecretConfig {
    /// Secret name in the store.
    #[serde(default = "default_secret_name")]
    pub name: String,
    /// Store backend.
    #[serde(default)]
    pub store: StorageConfig,
    /// Read timeout in seconds.
    #[serde(default = "default_secret_timeout")]
    pub timeout_secs: u64,
}

impl Default for SecretConfig {
    fn default() -> Self {
        Self {
            name: default_secret_name(),
            store: StorageConfig::default(),
            timeout_secs: default_secret_timeout(),
        }
    }
}

// Default value functions

const fn default_http_timeout() -> u64 {
    30
}

const fn default_retention_days() -> u32 {
    crate::notify::DEFAULT_RETENTION_DAYS
}

const fn default_secret_timeout() -> u64 {
    10
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_true() -> bool {
    true
}

fn default_reference_template() -> String {
    String::from(DEFAULT_REFERENCE_TEMPLATE)
}

fn default_api_url() -> String {
    String::from(GITHUB_API_URL)
}

fn default_state_path() -> String {
    String::from(STATE_DIR)
}

fn default_webhook_name() -> String {
    String::from("atlantis")
}

fn default_events() -> Vec<String> {
    vec![
        String::from("issue_comment"),
        String::from("pull_request"),
        String::from("pull_request_review"),
        String::from("push"),
    ]
}

fn default_content_type() -> String {
    String::from(DEFAULT_CONTENT_TYPE)
}

fn default_secret_name() -> String {
    String::from("webhook-secret")
}
