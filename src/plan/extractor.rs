//! Change set extractor.
//!
//! Runs the ordered strategy cascade over one artifact and accepts the first
//! non-degenerate result. All-zero results are accepted only when the
//! artifact independently declares that there are no changes, because a
//! structured schema the strategies no longer understand also produces zeros.

use tracing::{debug, info, warn};

use super::artifact::PlanArtifact;
use super::strategy::{
    ExtractionStrategy, StrategyOutcome, canonical_records, default_strategies, has_no_changes_banner,
    summary_lines,
};
use super::types::{ChangeAction, ChangeSummary, ExtractionDiagnostic};

/// Extracts a [`ChangeSummary`] from a [`PlanArtifact`].
pub struct ChangeSetExtractor {
    /// Strategies in priority order.
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl Default for ChangeSetExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ChangeSetExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .strategies
            .iter()
            .map(|s| s.derived_via().to_string())
            .collect();
        f.debug_struct("ChangeSetExtractor")
            .field("strategies", &names)
            .finish()
    }
}

impl ChangeSetExtractor {
    /// Creates an extractor with the default strategy order.
    #[must_use]
    pub fn new() -> Self {
        Self {
            strategies: default_strategies(),
        }
    }

    /// Creates an extractor with a custom strategy order.
    #[must_use]
    pub fn with_strategies(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Appends a strategy after the existing ones.
    #[must_use]
    pub fn with_strategy(mut self, strategy: Box<dyn ExtractionStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Produces exactly one summary for the artifact.
    ///
    /// Never fails: when every strategy is degenerate the summary is marked
    /// `Unknown` and carries a diagnostic describing each attempt.
    #[must_use]
    pub fn extract(&self, artifact: &PlanArtifact) -> ChangeSummary {
        let declared_no_op = declares_no_op(artifact);
        let mut attempts = Vec::with_capacity(self.strategies.len());

        for strategy in &self.strategies {
            let name = strategy.derived_via();
            match strategy.extract(artifact) {
                StrategyOutcome::Extracted(summary) if !summary.is_all_zero() || declared_no_op => {
                    let (create, update, delete) = summary.counts();
                    info!(
                        strategy = %name,
                        create, update, delete,
                        rejected = attempts.len(),
                        "Change summary extracted"
                    );
                    return summary;
                }
                StrategyOutcome::Extracted(_) => {
                    debug!(strategy = %name, "All-zero result on an artifact that does not declare a no-op");
                    attempts.push(format!("{name}: all-zero without a declared no-op"));
                }
                StrategyOutcome::NotApplicable(reason) => {
                    debug!(strategy = %name, "Strategy not applicable: {reason}");
                    attempts.push(format!("{name}: not applicable ({reason})"));
                }
                StrategyOutcome::Inconsistent(reason) => {
                    warn!(strategy = %name, "Strategy produced an inconsistent result: {reason}");
                    attempts.push(format!("{name}: inconsistent ({reason})"));
                }
            }
        }

        warn!(
            attempts = ?attempts,
            "Every extraction strategy was degenerate; change counts unavailable"
        );
        ChangeSummary::unknown(ExtractionDiagnostic {
            message: String::from("no strategy produced a non-degenerate change summary"),
            attempts,
        })
    }
}

/// Returns true if the artifact explicitly says that nothing changes.
///
/// Evidence: the producer's "No changes." banner, a summary line with three
/// zero counts, or a non-empty canonical record list in which every record is
/// a no-op.
#[must_use]
pub fn declares_no_op(artifact: &PlanArtifact) -> bool {
    if let Some(text) = artifact.text() {
        if has_no_changes_banner(text) {
            return true;
        }
        if let Ok(lines) = summary_lines(text)
            && !lines.is_empty()
            && lines.iter().all(|&counts| counts == (0, 0, 0))
        {
            return true;
        }
    }

    artifact
        .structured()
        .and_then(|s| canonical_records(s).ok())
        .is_some_and(|records| {
            !records.is_empty() && records.iter().all(|r| r.action == ChangeAction::NoOp)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::types::DerivedVia;
    use serde_json::json;

    fn artifact(structured: Option<serde_json::Value>, text: Option<&str>) -> PlanArtifact {
        PlanArtifact::from_parts(structured.map(|v| v.to_string()), text.map(ToString::to_string))
    }

    #[test]
    fn test_text_summary_line_scenario() {
        let summary = ChangeSetExtractor::new().extract(&artifact(
            None,
            Some("Plan: 3 to add, 2 to change, 1 to destroy"),
        ));
        assert_eq!(summary.counts(), (3, 2, 1));
        assert_eq!(summary.derived_via, DerivedVia::TextSummaryLineExtraction);
    }

    #[test]
    fn test_zero_summary_line_is_not_unknown() {
        let summary = ChangeSetExtractor::new().extract(&artifact(
            None,
            Some("Plan: 0 to add, 0 to change, 0 to destroy"),
        ));
        assert_eq!(summary.counts(), (0, 0, 0));
        assert_eq!(summary.derived_via, DerivedVia::TextSummaryLineExtraction);
        assert!(summary.diagnostic.is_none());
    }

    #[test]
    fn test_drifted_schema_falls_through_to_text() {
        // A newer producer renamed the change list: the canonical strategy
        // sees nothing and must not win with zeros.
        let plan = json!({"format_version": "9.0", "resource_diffs": [{"addr": "a.b"}]});
        let summary = ChangeSetExtractor::new().extract(&artifact(
            Some(plan),
            Some("Plan: 1 to add, 0 to change, 0 to destroy."),
        ));
        assert_eq!(summary.counts(), (1, 0, 0));
        assert_eq!(summary.derived_via, DerivedVia::TextSummaryLineExtraction);
    }

    #[test]
    fn test_empty_canonical_list_is_not_trusted() {
        let plan = json!({"resource_changes": []});
        let summary = ChangeSetExtractor::new().extract(&artifact(Some(plan), None));
        assert!(summary.is_degenerate());
        let diagnostic = summary.diagnostic.expect("diagnostic");
        assert_eq!(diagnostic.attempts.len(), 4);
    }

    #[test]
    fn test_declared_no_op_accepts_structured_zeros() {
        let plan = json!({"resource_changes": [
            {"address": "aws_vpc.main", "type": "aws_vpc", "change": {"actions": ["no-op"]}}
        ]});
        let summary = ChangeSetExtractor::new().extract(&artifact(
            Some(plan),
            Some("No changes. Your infrastructure matches the configuration."),
        ));
        assert_eq!(summary.counts(), (0, 0, 0));
        assert_eq!(summary.derived_via, DerivedVia::StructuredChangeExtraction);
    }

    #[test]
    fn test_structured_and_text_agree() {
        let plan = json!({"resource_changes": [
            {"address": "aws_s3_bucket.a", "type": "aws_s3_bucket", "change": {"actions": ["create"]}},
            {"address": "aws_s3_bucket.b", "type": "aws_s3_bucket", "change": {"actions": ["create"]}},
            {"address": "aws_iam_role.r", "type": "aws_iam_role", "change": {"actions": ["update"]}},
            {"address": "aws_instance.i", "type": "aws_instance", "change": {"actions": ["create", "delete"]}},
            {"address": "aws_sqs_queue.q", "type": "aws_sqs_queue", "change": {"actions": ["delete"]}}
        ]});
        let text = "Plan: 3 to add, 1 to change, 2 to destroy.";
        let both = artifact(Some(plan), Some(text));

        let structured = ChangeSetExtractor::new().extract(&both);
        let text_only = ChangeSetExtractor::new().extract(&artifact(None, Some(text)));

        assert_eq!(structured.derived_via, DerivedVia::StructuredChangeExtraction);
        assert_eq!(structured.counts(), text_only.counts());
    }

    #[test]
    fn test_nothing_recognisable_is_unknown() {
        let summary = ChangeSetExtractor::new().extract(&artifact(None, Some("Error: provider crashed")));
        assert!(summary.is_degenerate());
        assert_eq!(summary.derived_via, DerivedVia::Unknown);
    }

    struct FixedStrategy(u32);

    impl ExtractionStrategy for FixedStrategy {
        fn derived_via(&self) -> DerivedVia {
            DerivedVia::TextHeuristicExtraction
        }

        fn extract(&self, _artifact: &PlanArtifact) -> StrategyOutcome {
            StrategyOutcome::Extracted(ChangeSummary::new(self.0, 0, 0, self.derived_via()))
        }
    }

    #[test]
    fn test_custom_strategies_are_tried_in_order() {
        let extractor = ChangeSetExtractor::with_strategies(vec![Box::new(FixedStrategy(0))])
            .with_strategy(Box::new(FixedStrategy(5)));
        let summary = extractor.extract(&artifact(None, Some("anything")));
        assert_eq!(summary.create_count, 5);
    }
}
