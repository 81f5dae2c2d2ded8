//! Delivery ledger.
//!
//! Records which `(correlation id, plan fingerprint)` pairs were already
//! notified, so a re-invoked run does not post a second message. A key is
//! claimed before dispatch: a crash after claiming loses the notification
//! rather than duplicating it. Claims older than the retention window are
//! pruned on every write.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

use crate::error::Result;
use crate::state::{read_json, write_json};

/// Default number of days a claim is kept.
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

/// One claimed delivery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliveryRecord {
    /// When the key was claimed.
    pub claimed_at: DateTime<Utc>,
}

/// File-backed put-if-absent ledger.
#[derive(Debug)]
pub struct DeliveryLedger {
    path: PathBuf,
    retention: Duration,
}

impl DeliveryLedger {
    /// Creates a ledger stored at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            retention: Duration::days(i64::from(DEFAULT_RETENTION_DAYS)),
        }
    }

    /// Sets how long a claim is remembered.
    #[must_use]
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Builds the idempotency key for a run.
    #[must_use]
    pub fn key(correlation_id: &str, fingerprint: &str) -> String {
        format!("{correlation_id}:{fingerprint}")
    }

    /// Claims `key`. Returns false if it was already claimed.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be read or written.
    pub async fn claim(&self, key: &str) -> Result<bool> {
        let mut entries: BTreeMap<String, DeliveryRecord> =
            read_json(&self.path).await?.unwrap_or_default();

        if entries.contains_key(key) {
            debug!("Delivery key already claimed: {key}");
            return Ok(false);
        }

        let now = Utc::now();
        let cutoff = now - self.retention;
        let before = entries.len();
        entries.retain(|_, record| record.claimed_at >= cutoff);
        if entries.len() < before {
            debug!("Pruned {} expired delivery claims", before - entries.len());
        }

        entries.insert(
            key.to_string(),
            DeliveryRecord { claimed_at: now },
        );
        write_json(&self.path, &entries).await?;
        Ok(true)
    }
}
