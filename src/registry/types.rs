//! Webhook registration types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::ReconcileError;

/// Default payload content type.
pub const DEFAULT_CONTENT_TYPE: &str = "json";

/// A registration as reported by the registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisteredHook {
    /// Registry-assigned id.
    pub id: String,
    /// Delivery URL.
    pub url: String,
    /// Whether deliveries are enabled.
    pub active: bool,
    /// Subscribed events.
    pub events: BTreeSet<String>,
    /// Payload content type.
    pub content_type: String,
    /// Whether a signing secret is configured. Registries never return the value.
    pub secret_configured: bool,
}

/// Desired registration.
#[derive(Clone, PartialEq, Eq)]
pub struct WebhookSpec {
    /// Delivery URL, the identity key.
    pub url: String,
    /// Whether deliveries are enabled.
    pub active: bool,
    /// Subscribed events.
    pub events: BTreeSet<String>,
    /// Payload content type.
    pub content_type: String,
    /// Signing secret.
    pub secret: Option<String>,
}

impl fmt::Debug for WebhookSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookSpec")
            .field("url", &self.url)
            .field("active", &self.active)
            .field("events", &self.events)
            .field("content_type", &self.content_type)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl WebhookSpec {
    /// Reads a spec from a desired-state map, attaching the signing secret.
    ///
    /// # Errors
    ///
    /// Returns an error if `url` is missing or a field has the wrong type.
    pub fn from_desired_state(
        desired: &BTreeMap<String, Value>,
        secret: Option<String>,
    ) -> Result<Self, ReconcileError> {
        let invalid = |reason: &str| ReconcileError::InvalidDesiredState {
            kind: String::from("webhook"),
            reason: reason.to_string(),
        };

        let url = desired
            .get("url")
            .and_then(Value::as_str)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| invalid("missing url"))?
            .to_string();

        let active = match desired.get("active") {
            None => true,
            Some(v) => v.as_bool().ok_or_else(|| invalid("active must be a boolean"))?,
        };

        let events = match desired.get("events") {
            None => BTreeSet::new(),
            Some(v) => v
                .as_array()
                .ok_or_else(|| invalid("events must be a list"))?
                .iter()
                .map(|e| e.as_str().map(ToString::to_string))
                .collect::<Option<BTreeSet<_>>>()
                .ok_or_else(|| invalid("events must be strings"))?,
        };
        if events.is_empty() {
            return Err(invalid("events must not be empty"));
        }

        let content_type = desired
            .get("content_type")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        Ok(Self {
            url,
            active,
            events,
            content_type,
            secret: secret.filter(|s| !s.is_empty()),
        })
    }

    /// The desired-state map for this spec. The secret is never included.
    #[must_use]
    pub fn to_desired_state(&self) -> BTreeMap<String, Value> {
        let mut map = BTreeMap::new();
        map.insert(String::from("url"), Value::from(self.url.clone()));
        map.insert(String::from("active"), Value::from(self.active));
        map.insert(
            String::from("events"),
            Value::from(self.events.iter().cloned().collect::<Vec<_>>()),
        );
        map.insert(String::from("content_type"), Value::from(self.content_type.clone()));
        map
    }

    /// Lists the mutable fields that differ from `actual`.
    #[must_use]
    pub fn drift(&self, actual: &RegisteredHook) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.active != actual.active {
            fields.push("active");
        }
        if self.events != actual.events {
            fields.push("events");
        }
        if self.content_type != actual.content_type {
            fields.push("content_type");
        }
        if self.secret.is_some() != actual.secret_configured {
            fields.push("secret");
        }
        fields
    }
}

/// Scope whose registrations are listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerScope {
    /// A single repository, written `owner/name`.
    Repository {
        /// Owner login.
        owner: String,
        /// Repository name.
        name: String,
    },
    /// An organization, written `org:<name>`.
    Organization(String),
}

impl OwnerScope {
    /// API path of the scope's hook collection.
    #[must_use]
    pub fn hooks_path(&self) -> String {
        match self {
            Self::Repository { owner, name } => format!("/repos/{owner}/{name}/hooks"),
            Self::Organization(org) => format!("/orgs/{org}/hooks"),
        }
    }
}

impl FromStr for OwnerScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = |part: &str| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        };

        if let Some(org) = s.strip_prefix("org:") {
            return if valid(org) {
                Ok(Self::Organization(org.to_string()))
            } else {
                Err(format!("invalid organization name '{org}'"))
            };
        }

        match s.split_once('/') {
            Some((owner, name)) if valid(owner) && valid(name) => Ok(Self::Repository {
                owner: owner.to_string(),
                name: name.to_string(),
            }),
            _ => Err(format!("'{s}' is neither 'owner/repo' nor 'org:<name>'")),
        }
    }
}

impl fmt::Display for OwnerScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Repository { owner, name } => write!(f, "{owner}/{name}"),
            Self::Organization(org) => write!(f, "org:{org}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn desired(value: Value) -> BTreeMap<String, Value> {
        serde_json::from_value(value).expect("map")
    }

    #[test]
    fn test_from_desired_state_defaults() {
        let spec = WebhookSpec::from_desired_state(
            &desired(json!({"url": "https://x/events", "events": ["B", "A", "A"]})),
            Some(String::from("s3cret")),
        )
        .expect("spec");

        assert!(spec.active);
        assert_eq!(spec.content_type, "json");
        assert_eq!(spec.events.len(), 2);
        assert!(!format!("{spec:?}").contains("s3cret"));
    }

    #[test]
    fn test_from_desired_state_rejects_bad_input() {
        assert!(WebhookSpec::from_desired_state(&desired(json!({"events": ["A"]})), None).is_err());
        assert!(
            WebhookSpec::from_desired_state(&desired(json!({"url": "https://x", "events": []})), None)
                .is_err()
        );
        assert!(
            WebhookSpec::from_desired_state(
                &desired(json!({"url": "https://x", "events": ["A"], "active": "yes"})),
                None
            )
            .is_err()
        );
    }

    #[test]
    fn test_drift_ignores_event_order() {
        let spec = WebhookSpec::from_desired_state(
            &desired(json!({"url": "https://x/events", "events": ["B", "A"]})),
            None,
        )
        .expect("spec");
        let mut hook = RegisteredHook {
            id: String::from("1"),
            url: String::from("https://x/events"),
            active: true,
            events: ["A", "B"].iter().map(ToString::to_string).collect(),
            content_type: String::from("json"),
            secret_configured: false,
        };
        assert!(spec.drift(&hook).is_empty());

        hook.active = false;
        hook.secret_configured = true;
        assert_eq!(spec.drift(&hook), vec!["active", "secret"]);
    }

    #[test]
    fn test_owner_scope_parsing() {
        let repo: OwnerScope = "acme/infra".parse().expect("repo");
        assert_eq!(repo.hooks_path(), "/repos/acme/infra/hooks");

        let org: OwnerScope = "org:acme".parse().expect("org");
        assert_eq!(org.hooks_path(), "/orgs/acme/hooks");
        assert_eq!(org.to_string(), "org:acme");

        assert!("acme".parse::<OwnerScope>().is_err());
        assert!("acme/in fra".parse::<OwnerScope>().is_err());
    }
}
