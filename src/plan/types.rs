//! Plan change types.
//!
//! These types describe what a plan proposes: one record per resource
//! change, and the aggregated counts the rest of the pipeline consumes.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::breakdown::TypeBreakdown;

/// Action a plan proposes for a single resource.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    /// Resource will be created.
    Create,
    /// Resource will be updated in place.
    Update,
    /// Resource will be destroyed.
    Delete,
    /// Resource will be destroyed and re-created (counts as one add and one destroy).
    Replace,
    /// Nothing happens to the resource.
    NoOp,
}

impl ChangeAction {
    /// Maps a producer action list (e.g. `["delete", "create"]`) to an action.
    ///
    /// Returns `None` for lists this version does not recognise.
    #[must_use]
    pub fn from_actions<S: AsRef<str>>(actions: &[S]) -> Option<Self> {
        let names: Vec<&str> = actions.iter().map(AsRef::as_ref).collect();
        match names.as_slice() {
            ["create"] => Some(Self::Create),
            ["update"] => Some(Self::Update),
            ["delete"] => Some(Self::Delete),
            ["delete", "create"] | ["create", "delete"] => Some(Self::Replace),
            ["no-op" | "read"] | [] => Some(Self::NoOp),
            _ => None,
        }
    }

    /// Returns the `(create, update, delete)` contribution of this action.
    #[must_use]
    pub const fn contribution(self) -> (u32, u32, u32) {
        match self {
            Self::Create => (1, 0, 0),
            Self::Update => (0, 1, 0),
            Self::Delete => (0, 0, 1),
            Self::Replace => (1, 0, 1),
            Self::NoOp => (0, 0, 0),
        }
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Replace => "replace",
            Self::NoOp => "no-op",
        };
        write!(f, "{s}")
    }
}

/// A single resource change proposed by a plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceChangeRecord {
    /// Resource address, unique within one plan.
    pub address: String,
    /// Resource type (e.g. `aws_s3_bucket`).
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Proposed action.
    pub action: ChangeAction,
}

/// Which extraction strategy produced a summary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DerivedVia {
    /// Canonical structured records grouped by action.
    StructuredChangeExtraction,
    /// Older structured shape: pre/post resource lists.
    StructuredChangeAlternateSchemaExtraction,
    /// Canonical "N to add, N to change, N to destroy" line.
    TextSummaryLineExtraction,
    /// Section headers such as "will be created".
    TextHeuristicExtraction,
    /// Every strategy was degenerate.
    Unknown,
}

impl fmt::Display for DerivedVia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::StructuredChangeExtraction => "structured",
            Self::StructuredChangeAlternateSchemaExtraction => "structured-alternate",
            Self::TextSummaryLineExtraction => "text-summary-line",
            Self::TextHeuristicExtraction => "text-heuristic",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Diagnostic attached when no strategy produced an acceptable result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractionDiagnostic {
    /// Human-readable explanation.
    pub message: String,
    /// Per-strategy outcome, in the order strategies were tried.
    pub attempts: Vec<String>,
}

/// Aggregated change counts for one plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeSummary {
    /// Resources to create.
    pub create_count: u32,
    /// Resources to update.
    pub update_count: u32,
    /// Resources to destroy.
    pub delete_count: u32,
    /// Strategy that produced the counts.
    pub derived_via: DerivedVia,
    /// Set when the counts are unavailable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<ExtractionDiagnostic>,
    /// Changes grouped by resource type, when records were available.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub by_type: Vec<TypeBreakdown>,
}

impl ChangeSummary {
    /// Creates a summary with the given counts.
    #[must_use]
    pub const fn new(create: u32, update: u32, delete: u32, derived_via: DerivedVia) -> Self {
        Self {
            create_count: create,
            update_count: update,
            delete_count: delete,
            derived_via,
            diagnostic: None,
            by_type: Vec::new(),
        }
    }

    /// Creates a summary from individual records.
    #[must_use]
    pub fn from_records(records: &[ResourceChangeRecord], derived_via: DerivedVia) -> Self {
        let (create, update, delete) = records.iter().fold((0u32, 0u32, 0u32), |acc, r| {
            let (c, u, d) = r.action.contribution();
            (
                acc.0.saturating_add(c),
                acc.1.saturating_add(u),
                acc.2.saturating_add(d),
            )
        });
        Self::new(create, update, delete, derived_via)
    }

    /// Creates the degenerate "counts unavailable" summary.
    #[must_use]
    pub const fn unknown(diagnostic: ExtractionDiagnostic) -> Self {
        Self {
            create_count: 0,
            update_count: 0,
            delete_count: 0,
            derived_via: DerivedVia::Unknown,
            diagnostic: Some(diagnostic),
            by_type: Vec::new(),
        }
    }

    /// Returns the total number of changes.
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.create_count
            .saturating_add(self.update_count)
            .saturating_add(self.delete_count)
    }

    /// Returns true if every count is zero.
    #[must_use]
    pub const fn is_all_zero(&self) -> bool {
        self.total() == 0
    }

    /// Returns true if the counts could not be determined.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.derived_via == DerivedVia::Unknown
    }

    /// Returns the three counts as a tuple.
    #[must_use]
    pub const fn counts(&self) -> (u32, u32, u32) {
        (self.create_count, self.update_count, self.delete_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_mapping() {
        assert_eq!(ChangeAction::from_actions(&["create"]), Some(ChangeAction::Create));
        assert_eq!(
            ChangeAction::from_actions(&["delete", "create"]),
            Some(ChangeAction::Replace)
        );
        assert_eq!(ChangeAction::from_actions(&["read"]), Some(ChangeAction::NoOp));
        assert_eq!(ChangeAction::from_actions(&["forget"]), None);
    }

    #[test]
    fn test_replace_counts_as_add_and_destroy() {
        let records = vec![
            ResourceChangeRecord {
                address: String::from("aws_instance.a"),
                resource_type: String::from("aws_instance"),
                action: ChangeAction::Replace,
            },
            ResourceChangeRecord {
                address: String::from("aws_instance.b"),
                resource_type: String::from("aws_instance"),
                action: ChangeAction::Update,
            },
        ];
        let summary = ChangeSummary::from_records(&records, DerivedVia::StructuredChangeExtraction);
        assert_eq!(summary.counts(), (1, 1, 1));
        assert!(!summary.is_degenerate());
    }
}
