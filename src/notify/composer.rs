//! Notification composition.
//!
//! Composition is a pure function of its inputs: the same summary, cost,
//! risks and metadata always render the same message byte for byte.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::cost::CostDelta;
use crate::plan::{ChangeSummary, RiskReport};

/// Default template for the change request link.
pub const DEFAULT_REFERENCE_TEMPLATE: &str = "https://github.com/{repo}/pull/{pr}";

/// Maximum number of findings listed in a message.
pub const FINDINGS_LIMIT: usize = 5;

/// Maximum number of resource types listed in a message.
pub const TYPES_LIMIT: usize = 5;

/// Identity of the run. Used only for rendering, never for control flow.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunMetadata {
    /// Source repository, `owner/name`.
    pub source_identity: Option<String>,
    /// Change request number.
    pub change_request: Option<String>,
    /// Commit reference.
    pub commit: Option<String>,
    /// Project within the repository.
    pub project: Option<String>,
    /// Run correlation id.
    pub correlation_id: String,
}

impl RunMetadata {
    /// Logical cost target: repository plus project.
    #[must_use]
    pub fn cost_target(&self) -> String {
        let repo = self.source_identity.as_deref().unwrap_or("unknown");
        match &self.project {
            Some(project) => format!("{repo}:{project}"),
            None => repo.to_string(),
        }
    }
}

/// A rendered notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationMessage {
    /// Heading naming the repository and change request.
    pub title: String,
    /// Change count line.
    pub summary_line: String,
    /// Cost line, when an estimate is available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_line: Option<String>,
    /// Link to the change request.
    pub reference_link: String,
    /// Additional lines (breakdown, risks).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
    /// Run correlation id.
    pub correlation_id: String,
}

impl NotificationMessage {
    /// Renders the message as the transport's `text` field.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut text = format!("*{}*\n{}\n", self.title, self.summary_line);
        if let Some(cost) = &self.cost_line {
            let _ = writeln!(text, "{cost}");
        }
        for line in &self.details {
            let _ = writeln!(text, "{line}");
        }
        let _ = writeln!(text, "<{}|View change request>", self.reference_link);
        let _ = write!(text, "run {}", self.correlation_id);
        text
    }
}

/// Builds notification messages.
#[derive(Debug, Clone)]
pub struct NotificationComposer {
    reference_template: String,
}

impl Default for NotificationComposer {
    fn default() -> Self {
        Self::new(DEFAULT_REFERENCE_TEMPLATE)
    }
}

impl NotificationComposer {
    /// Creates a composer with a link template using `{repo}`, `{pr}` and `{commit}`.
    #[must_use]
    pub fn new(reference_template: impl Into<String>) -> Self {
        Self {
            reference_template: reference_template.into(),
        }
    }

    /// Composes one message.
    #[must_use]
    pub fn compose(
        &self,
        summary: &ChangeSummary,
        cost: Option<&CostDelta>,
        risks: &RiskReport,
        metadata: &RunMetadata,
    ) -> NotificationMessage {
        let mut details = Vec::new();

        if !summary.by_type.is_empty() {
            let types: Vec<String> = summary
                .by_type
                .iter()
                .take(TYPES_LIMIT)
                .map(|t| format!("{} {}", t.resource_type, t.total()))
                .collect();
            details.push(format!("By type: {}", types.join(", ")));
        }

        if !risks.is_empty() {
            details.push(format!(
                "Risks: HIGH {} / MEDIUM {} / INFO {}",
                risks.high, risks.medium, risks.info
            ));
            details.extend(
                risks
                    .findings
                    .iter()
                    .take(FINDINGS_LIMIT)
                    .map(|f| format!("  [{}] {} {}: {}", f.severity, f.code, f.resource, f.message)),
            );
            if risks.findings.len() > FINDINGS_LIMIT {
                details.push(format!("  ... and {} more", risks.findings.len() - FINDINGS_LIMIT));
            }
        }

        NotificationMessage {
            title: title(metadata),
            summary_line: summary_line(summary),
            cost_line: cost.map(cost_line),
            reference_link: self.reference_link(metadata),
            details,
            correlation_id: metadata.correlation_id.clone(),
        }
    }

    fn reference_link(&self, metadata: &RunMetadata) -> String {
        self.reference_template
            .replace("{repo}", metadata.source_identity.as_deref().unwrap_or("unknown"))
            .replace("{pr}", metadata.change_request.as_deref().unwrap_or("unknown"))
            .replace("{commit}", metadata.commit.as_deref().unwrap_or("unknown"))
    }
}

/// Renders the change count line.
///
/// The non-zero form matches the planning tool's own summary line verbatim.
#[must_use]
pub fn summary_line(summary: &ChangeSummary) -> String {
    if summary.is_degenerate() {
        return String::from("Plan: change counts unavailable");
    }
    if summary.total() == 0 {
        return String::from("No changes");
    }
    format!(
        "Plan: {} to add, {} to change, {} to destroy",
        summary.create_count, summary.update_count, summary.delete_count
    )
}

fn title(metadata: &RunMetadata) -> String {
    let mut title = String::from("Plan");
    if let Some(repo) = &metadata.source_identity {
        let _ = write!(title, " {repo}");
    }
    if let Some(pr) = &metadata.change_request {
        let _ = write!(title, " #{pr}");
    }
    if let Some(project) = &metadata.project {
        let _ = write!(title, " [{project}]");
    }
    if let Some(commit) = &metadata.commit {
        let short: String = commit.chars().take(7).collect();
        let _ = write!(title, " @ {short}");
    }
    title
}

fn cost_line(cost: &CostDelta) -> String {
    let mut line = format!("Monthly cost: {}", money(cost.current_monthly));
    match (cost.delta, cost.previous_monthly) {
        (Some(delta), Some(previous)) => {
            let sign = if delta < 0.0 { "-" } else { "+" };
            let _ = write!(
                line,
                " ({sign}{} vs baseline {})",
                money(delta.abs()),
                money(previous)
            );
        }
        _ => line.push_str(" (no baseline)"),
    }
    line
}

fn money(amount: f64) -> String {
    format!("${amount:.2}")
}
