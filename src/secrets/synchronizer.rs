//! Shared secret synchronization.
//!
//! The signing secret is read first and reused when present; a new value is
//! generated and written back only when the store has none. Regenerating an
//! existing secret would break signature checks on a receiver that is
//! already configured.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{RelayError, Result, SecretStoreError};

use super::store::{SecretStore, validate_name};

/// Number of random bytes in a generated secret.
pub const SECRET_BYTES: usize = 32;

/// Default timeout for secret store reads in seconds.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 10;

/// Where the current value came from.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SecretOrigin {
    /// An existing value was found and kept.
    Reused,
    /// No value existed; a new one was generated and stored.
    Generated,
}

impl fmt::Display for SecretOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reused => write!(f, "reused"),
            Self::Generated => write!(f, "generated"),
        }
    }
}

/// A synchronized secret.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretRecord {
    /// Secret name.
    pub name: String,
    /// Current value.
    pub current_value: String,
    /// When the value was last confirmed against the store.
    pub last_synced_at: DateTime<Utc>,
    /// Whether the value was reused or generated.
    pub origin: SecretOrigin,
}

impl SecretRecord {
    /// Short SHA-256 fingerprint of the value, safe to log.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let digest = hex::encode(Sha256::digest(self.current_value.as_bytes()));
        digest[..12].to_string()
    }
}

impl fmt::Debug for SecretRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretRecord")
            .field("name", &self.name)
            .field("current_value", &"<redacted>")
            .field("fingerprint", &self.fingerprint())
            .field("last_synced_at", &self.last_synced_at)
            .field("origin", &self.origin)
            .finish()
    }
}

/// Keeps one named secret consistent with its store.
pub struct SecretSynchronizer {
    store: Arc<dyn SecretStore>,
    read_timeout: Duration,
}

impl fmt::Debug for SecretSynchronizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretSynchronizer")
            .field("store", &self.store.backend_type())
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}

impl SecretSynchronizer {
    /// Creates a synchronizer over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self {
            store,
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
        }
    }

    /// Sets the read timeout.
    #[must_use]
    pub const fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Returns the current secret, generating and storing one if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the read times out or fails, or if a generated
    /// value cannot be written. A failed read never leads to generation.
    pub async fn ensure(&self, name: &str) -> Result<SecretRecord> {
        validate_name(name)?;

        let existing = tokio::time::timeout(self.read_timeout, self.store.get(name))
            .await
            .map_err(|_| {
                RelayError::Secret(SecretStoreError::Timeout {
                    name: name.to_string(),
                    timeout_secs: self.read_timeout.as_secs(),
                })
            })??;

        if let Some(value) = existing.filter(|v| !v.is_empty()) {
            let record = SecretRecord {
                name: name.to_string(),
                current_value: value,
                last_synced_at: Utc::now(),
                origin: SecretOrigin::Reused,
            };
            info!(
                secret = name,
                fingerprint = %record.fingerprint(),
                backend = self.store.backend_type(),
                "Reusing existing secret"
            );
            return Ok(record);
        }

        warn!(secret = name, "Secret absent; generating a new value");
        let value = generate_secret();
        self.store.put(name, &value).await?;

        let record = SecretRecord {
            name: name.to_string(),
            current_value: value,
            last_synced_at: Utc::now(),
            origin: SecretOrigin::Generated,
        };
        info!(
            secret = name,
            fingerprint = %record.fingerprint(),
            backend = self.store.backend_type(),
            "Stored generated secret"
        );
        Ok(record)
    }
}

/// Generates a hex-encoded secret of [`SECRET_BYTES`] random bytes.
#[must_use]
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
