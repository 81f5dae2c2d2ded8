//! Persisted reconciliation target types.
//!
//! The external registry is the system of record for what actually exists.
//! These records only remember the desired state we last converged and the
//! id the registry returned, so operators can see what planrelay manages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Current version of the target state format.
pub const STATE_VERSION: &str = "1.0";

/// Kind of external resource a target describes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// A webhook registration.
    Webhook,
    /// A shared secret.
    Secret,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Webhook => "webhook",
            Self::Secret => "secret",
        };
        write!(f, "{kind}")
    }
}

/// Desired external state plus the id it was last converged to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconciliationTarget {
    /// Logical name (unique per store).
    pub name: String,
    /// Kind of resource.
    pub kind: TargetKind,
    /// Desired state as a field map.
    pub desired_state: BTreeMap<String, Value>,
    /// Id returned by the registry; `None` until first creation.
    #[serde(default)]
    pub external_id: Option<String>,
    /// When the target last converged.
    #[serde(default)]
    pub last_converged_at: Option<DateTime<Utc>>,
}

impl ReconciliationTarget {
    /// Creates a target that has never been converged.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: TargetKind, desired_state: BTreeMap<String, Value>) -> Self {
        Self {
            name: name.into(),
            kind,
            desired_state,
            external_id: None,
            last_converged_at: None,
        }
    }

    /// Records the id the registry returned.
    pub fn record_converged(&mut self, external_id: impl Into<String>) {
        self.external_id = Some(external_id.into());
        self.last_converged_at = Some(Utc::now());
    }
}

/// All targets kept by one store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetState {
    /// State format version.
    pub version: String,
    /// Targets keyed by name.
    pub targets: BTreeMap<String, ReconciliationTarget>,
    /// When the state was last updated.
    pub last_updated: DateTime<Utc>,
}

impl Default for TargetState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            targets: BTreeMap::new(),
            last_updated: Utc::now(),
        }
    }
}

impl TargetState {
    /// Adds or replaces a target.
    pub fn set_target(&mut self, target: ReconciliationTarget) {
        self.targets.insert(target.name.clone(), target);
        self.last_updated = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_converged() {
        let mut target = ReconciliationTarget::new("atlantis", TargetKind::Webhook, BTreeMap::new());
        assert!(target.external_id.is_none());

        target.record_converged("12345");
        assert_eq!(target.external_id.as_deref(), Some("12345"));
        assert!(target.last_converged_at.is_some());
    }

    #[test]
    fn test_kind_serialization() {
        let json = serde_json::to_string(&TargetKind::Webhook).expect("serialize");
        assert_eq!(json, "\"webhook\"");
    }
}
