//! Webhook registry trait definition.

use async_trait::async_trait;

use super::types::{OwnerScope, RegisteredHook, WebhookSpec};
use crate::error::Result;

/// External system of record for webhook registrations.
#[async_trait]
pub trait WebhookRegistry: Send + Sync {
    /// Lists every registration in the scope.
    async fn list(&self, owner: &OwnerScope) -> Result<Vec<RegisteredHook>>;

    /// Creates a registration and returns its id.
    async fn create(&self, owner: &OwnerScope, spec: &WebhookSpec) -> Result<String>;

    /// Replaces every mutable field of a registration.
    async fn update(&self, owner: &OwnerScope, id: &str, spec: &WebhookSpec) -> Result<()>;
}
