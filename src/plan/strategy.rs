//! Change extraction strategies.
//!
//! Each strategy is a pure function from a [`PlanArtifact`] to a candidate
//! [`ChangeSummary`]. Producers have changed their structured schema across
//! versions, so no single strategy is trusted on its own; the extractor tries
//! them in priority order.

use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use super::artifact::PlanArtifact;
use super::breakdown::top_types;
use super::types::{ChangeAction, ChangeSummary, DerivedVia, ResourceChangeRecord};

/// Number of resource types kept in a summary breakdown.
pub const BREAKDOWN_LIMIT: usize = 10;

#[allow(clippy::expect_used)]
static SUMMARY_LINE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"Plan:\s*(?:(\d+) to import,\s*)?(\d+) to add,\s*(\d+) to change,\s*(\d+) to destroy",
    )
    .expect("static pattern")
});

#[allow(clippy::expect_used)]
static NO_CHANGES: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?m)^\s*No changes\.").expect("static pattern")
});

#[allow(clippy::expect_used)]
static SECTION_HEADER: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"(?m)^\s*#\s+(\S+)\s+(will be created|will be updated in-place|will be destroyed|must be replaced|will be replaced)",
    )
    .expect("static pattern")
});

/// Result of running one strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyOutcome {
    /// The artifact lacks the shape this strategy understands.
    NotApplicable(String),
    /// The shape matched but the data contradicts itself.
    Inconsistent(String),
    /// Counts were extracted.
    Extracted(ChangeSummary),
}

/// A single way of deriving change counts from a plan artifact.
pub trait ExtractionStrategy: Send + Sync {
    /// Identifies the strategy in summaries and logs.
    fn derived_via(&self) -> DerivedVia;

    /// Attempts to derive a summary.
    fn extract(&self, artifact: &PlanArtifact) -> StrategyOutcome;
}

/// Groups canonical `resource_changes` records by action.
#[derive(Debug, Default)]
pub struct StructuredChangeExtraction;

impl ExtractionStrategy for StructuredChangeExtraction {
    fn derived_via(&self) -> DerivedVia {
        DerivedVia::StructuredChangeExtraction
    }

    fn extract(&self, artifact: &PlanArtifact) -> StrategyOutcome {
        let Some(structured) = artifact.structured() else {
            return StrategyOutcome::NotApplicable(String::from("no structured form"));
        };

        let records = match canonical_records(structured) {
            Ok(records) => records,
            Err(reason) => return StrategyOutcome::NotApplicable(reason),
        };

        let mut seen = HashSet::new();
        for record in &records {
            if !seen.insert(record.address.as_str()) {
                return StrategyOutcome::Inconsistent(format!(
                    "address '{}' appears more than once",
                    record.address
                ));
            }
        }

        let mut summary = ChangeSummary::from_records(&records, self.derived_via());
        summary.by_type = top_types(&records, BREAKDOWN_LIMIT);
        StrategyOutcome::Extracted(summary)
    }
}

/// Reads canonical records: `resource_changes[].{address, type, change.actions}`.
///
/// # Errors
///
/// Returns a description of the first deviation from the canonical shape.
pub fn canonical_records(structured: &Value) -> Result<Vec<ResourceChangeRecord>, String> {
    let Some(changes) = structured.get("resource_changes") else {
        return Err(String::from("no resource_changes field"));
    };
    let Some(changes) = changes.as_array() else {
        return Err(String::from("resource_changes is not a list"));
    };

    changes
        .iter()
        .enumerate()
        .map(|(i, change)| {
            let address = change
                .get("address")
                .and_then(Value::as_str)
                .ok_or_else(|| format!("resource_changes[{i}] has no address"))?;
            let resource_type = change
                .get("type")
                .and_then(Value::as_str)
                .ok_or_else(|| format!("resource_changes[{i}] has no type"))?;
            let actions = change
                .get("change")
                .and_then(|c| c.get("actions"))
                .and_then(Value::as_array)
                .ok_or_else(|| format!("resource_changes[{i}] has no change.actions"))?;
            let names: Vec<&str> = actions.iter().filter_map(Value::as_str).collect();
            if names.len() != actions.len() {
                return Err(format!("resource_changes[{i}] has non-string actions"));
            }
            let action = ChangeAction::from_actions(&names)
                .ok_or_else(|| format!("resource_changes[{i}] has unrecognised actions {names:?}"))?;

            Ok(ResourceChangeRecord {
                address: address.to_string(),
                resource_type: resource_type.to_string(),
                action,
            })
        })
        .collect()
}

/// Infers actions from pre-change and post-change resource lists.
///
/// Older producers emitted `prior_state` and `planned_values` module trees
/// without per-resource action lists. A resource only in the post list is
/// created, one only in the pre list is destroyed, and one in both with
/// different values is updated.
#[derive(Debug, Default)]
pub struct StructuredChangeAlternateSchemaExtraction;

/// JSON pointers tried for the pre-change module tree.
const PRE_CHANGE_ROOTS: &[&str] = &["/prior_state/values/root_module", "/prior_values/root_module"];

/// JSON pointers tried for the post-change module tree.
const POST_CHANGE_ROOTS: &[&str] = &["/planned_values/root_module", "/proposed_values/root_module"];

impl ExtractionStrategy for StructuredChangeAlternateSchemaExtraction {
    fn derived_via(&self) -> DerivedVia {
        DerivedVia::StructuredChangeAlternateSchemaExtraction
    }

    fn extract(&self, artifact: &PlanArtifact) -> StrategyOutcome {
        let Some(structured) = artifact.structured() else {
            return StrategyOutcome::NotApplicable(String::from("no structured form"));
        };

        let Some(post_root) = POST_CHANGE_ROOTS.iter().find_map(|p| structured.pointer(p)) else {
            return StrategyOutcome::NotApplicable(String::from("no post-change resource list"));
        };
        let pre_root = PRE_CHANGE_ROOTS.iter().find_map(|p| structured.pointer(p));

        let mut post = BTreeMap::new();
        if let Err(reason) = collect_module_resources(post_root, &mut post) {
            return StrategyOutcome::Inconsistent(reason);
        }
        let mut pre = BTreeMap::new();
        if let Some(root) = pre_root
            && let Err(reason) = collect_module_resources(root, &mut pre)
        {
            return StrategyOutcome::Inconsistent(reason);
        }

        let mut records = Vec::new();
        for (address, (resource_type, after)) in &post {
            let action = match pre.get(address) {
                None => ChangeAction::Create,
                Some((_, before)) if before != after => ChangeAction::Update,
                Some(_) => ChangeAction::NoOp,
            };
            records.push(ResourceChangeRecord {
                address: address.clone(),
                resource_type: resource_type.clone(),
                action,
            });
        }
        for (address, (resource_type, _)) in &pre {
            if !post.contains_key(address) {
                records.push(ResourceChangeRecord {
                    address: address.clone(),
                    resource_type: resource_type.clone(),
                    action: ChangeAction::Delete,
                });
            }
        }

        let mut summary = ChangeSummary::from_records(&records, self.derived_via());
        summary.by_type = top_types(&records, BREAKDOWN_LIMIT);
        StrategyOutcome::Extracted(summary)
    }
}

/// Flattens a module tree into `address -> (type, values)`, skipping data sources.
fn collect_module_resources(
    module: &Value,
    out: &mut BTreeMap<String, (String, Value)>,
) -> Result<(), String> {
    if let Some(resources) = module.get("resources").and_then(Value::as_array) {
        for resource in resources {
            if resource.get("mode").and_then(Value::as_str) == Some("data") {
                continue;
            }
            let Some(address) = resource.get("address").and_then(Value::as_str) else {
                continue;
            };
            let resource_type = resource
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let values = resource.get("values").cloned().unwrap_or(Value::Null);
            if out.insert(address.to_string(), (resource_type, values)).is_some() {
                return Err(format!("address '{address}' appears more than once"));
            }
        }
    }

    if let Some(children) = module.get("child_modules").and_then(Value::as_array) {
        for child in children {
            collect_module_resources(child, out)?;
        }
    }

    Ok(())
}

/// Parses the canonical "N to add, N to change, N to destroy" line.
///
/// The producer keeps this line stable across versions even when the
/// structured format changes. A "No changes." banner counts as an explicit
/// all-zero summary.
#[derive(Debug, Default)]
pub struct TextSummaryLineExtraction;

impl ExtractionStrategy for TextSummaryLineExtraction {
    fn derived_via(&self) -> DerivedVia {
        DerivedVia::TextSummaryLineExtraction
    }

    fn extract(&self, artifact: &PlanArtifact) -> StrategyOutcome {
        let Some(text) = artifact.text() else {
            return StrategyOutcome::NotApplicable(String::from("no text form"));
        };

        let lines = match summary_lines(text) {
            Ok(lines) => lines,
            Err(reason) => return StrategyOutcome::Inconsistent(reason),
        };

        match lines.as_slice() {
            [] if NO_CHANGES.is_match(text) => {
                StrategyOutcome::Extracted(ChangeSummary::new(0, 0, 0, self.derived_via()))
            }
            [] => StrategyOutcome::NotApplicable(String::from("no summary line")),
            [first, rest @ ..] => {
                if rest.iter().any(|l| l != first) {
                    return StrategyOutcome::Inconsistent(format!(
                        "{} summary lines disagree",
                        lines.len()
                    ));
                }
                let (create, update, delete) = *first;
                StrategyOutcome::Extracted(ChangeSummary::new(
                    create,
                    update,
                    delete,
                    self.derived_via(),
                ))
            }
        }
    }
}

/// Returns every canonical summary line in the text as `(add, change, destroy)`.
///
/// # Errors
///
/// Returns an error if a matched count does not fit in a `u32`.
pub fn summary_lines(text: &str) -> Result<Vec<(u32, u32, u32)>, String> {
    SUMMARY_LINE
        .captures_iter(text)
        .map(|caps| {
            let parse = |idx: usize| -> Result<u32, String> {
                caps.get(idx)
                    .map_or("0", |m| m.as_str())
                    .parse::<u32>()
                    .map_err(|e| format!("unparseable count in '{}': {e}", &caps[0]))
            };
            Ok((parse(2)?, parse(3)?, parse(4)?))
        })
        .collect()
}

/// Returns true if the text carries the producer's "No changes." banner.
#[must_use]
pub fn has_no_changes_banner(text: &str) -> bool {
    NO_CHANGES.is_match(text)
}

/// Counts per-resource section headers such as "# aws_s3_bucket.logs will be created".
///
/// Last resort: headers are meant for humans and their wording drifts more
/// than the summary line does.
#[derive(Debug, Default)]
pub struct TextHeuristicExtraction;

impl ExtractionStrategy for TextHeuristicExtraction {
    fn derived_via(&self) -> DerivedVia {
        DerivedVia::TextHeuristicExtraction
    }

    fn extract(&self, artifact: &PlanArtifact) -> StrategyOutcome {
        let Some(text) = artifact.text() else {
            return StrategyOutcome::NotApplicable(String::from("no text form"));
        };

        let mut seen = HashSet::new();
        let mut records = Vec::new();
        for caps in SECTION_HEADER.captures_iter(text) {
            let address = caps[1].to_string();
            // The same header is repeated when the log contains both plan and apply output.
            if !seen.insert(address.clone()) {
                continue;
            }
            let action = match &caps[2] {
                "will be created" => ChangeAction::Create,
                "will be updated in-place" => ChangeAction::Update,
                "will be destroyed" => ChangeAction::Delete,
                _ => ChangeAction::Replace,
            };
            let resource_type = resource_type_of(&address);
            records.push(ResourceChangeRecord {
                address,
                resource_type,
                action,
            });
        }

        if records.is_empty() {
            return StrategyOutcome::NotApplicable(String::from("no change section headers"));
        }

        let mut summary = ChangeSummary::from_records(&records, self.derived_via());
        summary.by_type = top_types(&records, BREAKDOWN_LIMIT);
        StrategyOutcome::Extracted(summary)
    }
}

/// Derives the resource type from an address like `module.net.aws_vpc.main[0]`.
fn resource_type_of(address: &str) -> String {
    let parts: Vec<&str> = address.split('.').collect();
    let mut i = 0;
    while i < parts.len() {
        match parts[i] {
            "module" => i += 2,
            "data" => i += 1,
            part => return part.to_string(),
        }
    }
    String::from("unknown")
}

/// The default strategy order.
#[must_use]
pub fn default_strategies() -> Vec<Box<dyn ExtractionStrategy>> {
    vec![
        Box::new(StructuredChangeExtraction),
        Box::new(StructuredChangeAlternateSchemaExtraction),
        Box::new(TextSummaryLineExtraction),
        Box::new(TextHeuristicExtraction),
    ]
}
