//! Per-resource-type change breakdown.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::types::ResourceChangeRecord;

/// Changes for one resource type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypeBreakdown {
    /// Resource type.
    pub resource_type: String,
    /// Resources of this type to create.
    pub create: u32,
    /// Resources of this type to update.
    pub update: u32,
    /// Resources of this type to destroy.
    pub delete: u32,
}

impl TypeBreakdown {
    /// Total changes for this type.
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.create.saturating_add(self.update).saturating_add(self.delete)
    }
}

/// Returns the `limit` resource types with the most changes.
///
/// Types without changes are omitted. Ties are ordered by type name so the
/// result is deterministic.
#[must_use]
pub fn top_types(records: &[ResourceChangeRecord], limit: usize) -> Vec<TypeBreakdown> {
    let mut by_type: BTreeMap<&str, (u32, u32, u32)> = BTreeMap::new();
    for record in records {
        let (c, u, d) = record.action.contribution();
        let entry = by_type.entry(record.resource_type.as_str()).or_default();
        entry.0 = entry.0.saturating_add(c);
        entry.1 = entry.1.saturating_add(u);
        entry.2 = entry.2.saturating_add(d);
    }

    let mut rows: Vec<TypeBreakdown> = by_type
        .into_iter()
        .map(|(t, (create, update, delete))| TypeBreakdown {
            resource_type: t.to_string(),
            create,
            update,
            delete,
        })
        .filter(|row| row.total() > 0)
        .collect();

    rows.sort_by(|a, b| {
        b.total()
            .cmp(&a.total())
            .then_with(|| a.resource_type.cmp(&b.resource_type))
    });
    rows.truncate(limit);
    rows
}
