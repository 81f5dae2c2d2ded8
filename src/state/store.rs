//! Target store trait definition.

use async_trait::async_trait;

use super::types::ReconciliationTarget;
use crate::error::Result;

/// Trait for reconciliation target storage backends.
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Loads a target by name.
    ///
    /// Returns `None` if the target was never saved.
    async fn load(&self, name: &str) -> Result<Option<ReconciliationTarget>>;

    /// Saves a target, replacing any previous record with the same name.
    async fn save(&self, target: &ReconciliationTarget) -> Result<()>;

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}
