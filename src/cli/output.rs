//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::ValidationResult;
use crate::cost::CostOutcome;
use crate::notify::{DispatchOutcome, summary_line};
use crate::pipeline::{PlanAnalysis, RunReport, RunStatus};
use crate::plan::{PolicyFinding, Severity, TypeBreakdown};
use crate::reconciler::{ReconcileAction, ReconciliationResult};
use crate::secrets::SecretRecord;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Resource type row for table display.
#[derive(Tabled)]
struct TypeRow {
    #[tabled(rename = "Type")]
    resource_type: String,
    #[tabled(rename = "Add")]
    create: u32,
    #[tabled(rename = "Change")]
    update: u32,
    #[tabled(rename = "Destroy")]
    delete: u32,
}

/// Risk finding row for table display.
#[derive(Tabled)]
struct FindingRow {
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Code")]
    code: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Message")]
    message: String,
}

impl From<&TypeBreakdown> for TypeRow {
    fn from(t: &TypeBreakdown) -> Self {
        Self {
            resource_type: t.resource_type.clone(),
            create: t.create,
            update: t.update,
            delete: t.delete,
        }
    }
}

impl From<&PolicyFinding> for FindingRow {
    fn from(f: &PolicyFinding) -> Self {
        Self {
            severity: OutputFormatter::format_severity(f.severity),
            code: f.code.clone(),
            resource: OutputFormatter::truncate(&f.resource, 40),
            message: OutputFormatter::truncate(&f.message, 60),
        }
    }
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    fn json<T: Serialize>(value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_default()
    }

    /// Formats an offline plan analysis.
    #[must_use]
    pub fn format_analysis(&self, analysis: &PlanAnalysis) -> String {
        match self.format {
            OutputFormat::Json => Self::json(analysis),
            OutputFormat::Text => Self::format_analysis_text(analysis),
        }
    }

    fn format_analysis_text(analysis: &PlanAnalysis) -> String {
        let summary = &analysis.summary;
        let mut output = String::new();

        let headline = summary_line(summary);
        let headline = if summary.is_degenerate() {
            headline.yellow().to_string()
        } else if summary.is_all_zero() {
            headline.green().to_string()
        } else {
            headline.bold().to_string()
        };
        let _ = writeln!(output, "\n{headline}");
        let _ = writeln!(output, "   Derived via: {}", summary.derived_via);
        let _ = writeln!(output, "   Fingerprint: {}", Self::truncate(&analysis.fingerprint, 16));

        if let Some(diagnostic) = &summary.diagnostic {
            let _ = write!(output, "\n{} {}\n", "!".yellow(), diagnostic.message);
            for attempt in &diagnostic.attempts {
                let _ = writeln!(output, "   - {attempt}");
            }
        }

        if !summary.by_type.is_empty() {
            output.push('\n');
            let rows: Vec<TypeRow> = summary.by_type.iter().map(TypeRow::from).collect();
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        let risks = &analysis.risks;
        if !risks.is_empty() {
            let _ = write!(
                output,
                "\nRisks: {} HIGH, {} MEDIUM, {} INFO\n",
                risks.high.to_string().red(),
                risks.medium.to_string().yellow(),
                risks.info
            );
            let rows: Vec<FindingRow> = risks.findings.iter().map(FindingRow::from).collect();
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        output
    }

    /// Formats the report of a notify run.
    #[must_use]
    pub fn format_run_report(&self, report: &RunReport) -> String {
        match self.format {
            OutputFormat::Json => Self::json(report),
            OutputFormat::Text => {
                let mut output = Self::format_analysis_text(&report.analysis);

                match &report.cost {
                    CostOutcome::Estimated(delta) => {
                        let change = delta.delta.map_or_else(
                            || String::from("no baseline"),
                            |d| format!("{d:+.2} vs baseline"),
                        );
                        let _ = write!(
                            output,
                            "\nMonthly cost: ${:.2} ({change})\n",
                            delta.current_monthly
                        );
                    }
                    CostOutcome::Unavailable { reason } => {
                        let _ = write!(output, "\nMonthly cost: {} ({reason})\n", "unavailable".dimmed());
                    }
                }

                let dispatch = match &report.dispatch {
                    DispatchOutcome::Delivered { status } => {
                        format!("{} delivered ({status})", "+".green())
                    }
                    DispatchOutcome::Warning { reason } => format!("{} {reason}", "!".yellow()),
                    DispatchOutcome::Skipped { reason } => {
                        format!("{} skipped: {reason}", "-".dimmed())
                    }
                };
                let _ = writeln!(output, "Notification: {dispatch}");

                let status = match report.status {
                    RunStatus::Success => "success".green().to_string(),
                    RunStatus::PartialSuccess => "partial success".yellow().to_string(),
                };
                let _ = write!(
                    output,
                    "\nRun {}: {status}\n",
                    report.message.correlation_id
                );

                if !report.warnings.is_empty() {
                    let _ = write!(output, "\n{} Warnings:\n", "!".yellow());
                    for warning in &report.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }

                output
            }
        }
    }

    /// Formats a reconciliation result.
    #[must_use]
    pub fn format_reconciliation(&self, result: &ReconciliationResult, secret: &SecretRecord) -> String {
        match self.format {
            OutputFormat::Json => Self::json(&ReconcileJson {
                result,
                secret: SecretJson::from(secret),
            }),
            OutputFormat::Text => {
                let action = match result.action {
                    ReconcileAction::Created => "created".green().to_string(),
                    ReconcileAction::Updated => "updated".yellow().to_string(),
                    ReconcileAction::Unchanged => "unchanged".dimmed().to_string(),
                };

                let mut output = format!("{} Webhook '{}' converged\n\n", "+".green(), result.target);
                let _ = writeln!(output, "   Registration: {}", result.external_id);
                let _ = writeln!(output, "   Action: {action}");
                if !result.drifted.is_empty() {
                    let _ = writeln!(output, "   Drifted: {}", result.drifted.join(", "));
                }
                if result.raced {
                    let _ = writeln!(output, "   Concurrent create detected and adopted");
                }
                let _ = writeln!(
                    output,
                    "   Secret: {} ({}, {})",
                    secret.name,
                    secret.origin,
                    secret.fingerprint()
                );

                output
            }
        }
    }

    /// Formats a synchronized secret without its value.
    #[must_use]
    pub fn format_secret(&self, secret: &SecretRecord) -> String {
        match self.format {
            OutputFormat::Json => Self::json(&SecretJson::from(secret)),
            OutputFormat::Text => format!(
                "{} {} {} (fingerprint {})\n",
                "+".green(),
                secret.name,
                secret.origin,
                secret.fingerprint()
            ),
        }
    }

    /// Formats a validation result.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => Self::json(&serde_json::json!({
                "valid": result.is_valid(),
                "errors": result.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "warnings": result.warnings,
            })),
            OutputFormat::Text => {
                let mut output = if result.is_valid() {
                    format!("{} Configuration is valid\n", "+".green())
                } else {
                    let mut out = format!("{} {} error(s):\n", "x".red(), result.error_count());
                    for error in &result.errors {
                        let _ = writeln!(out, "   - {error}");
                    }
                    out
                };

                if show_warnings && !result.warnings.is_empty() {
                    let _ = write!(output, "\n{} {} warning(s):\n", "!".yellow(), result.warning_count());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }

                output
            }
        }
    }

    /// Formats a severity with color.
    fn format_severity(severity: Severity) -> String {
        match severity {
            Severity::High => "HIGH".red().to_string(),
            Severity::Medium => "MEDIUM".yellow().to_string(),
            Severity::Info => "INFO".dimmed().to_string(),
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{head}...")
        }
    }
}

// JSON serialization helpers

#[derive(Serialize)]
struct SecretJson<'a> {
    name: &'a str,
    origin: String,
    fingerprint: String,
    last_synced_at: String,
}

impl<'a> From<&'a SecretRecord> for SecretJson<'a> {
    fn from(secret: &'a SecretRecord) -> Self {
        Self {
            name: &secret.name,
            origin: secret.origin.to_string(),
            fingerprint: secret.fingerprint(),
            last_synced_at: secret.last_synced_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
struct ReconcileJson<'a> {
    #[serde(flatten)]
    result: &'a ReconciliationResult,
    secret: SecretJson<'a>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{ChangeSetExtractor, PlanArtifact};
    use crate::secrets::SecretOrigin;
    use chrono::Utc;

    fn record() -> SecretRecord {
        SecretRecord {
            name: String::from("webhook-secret"),
            current_value: String::from("do-not-print"),
            last_synced_at: Utc::now(),
            origin: SecretOrigin::Generated,
        }
    }

    #[test]
    fn test_secret_output_never_contains_value() {
        for format in [OutputFormat::Text, OutputFormat::Json] {
            let out = OutputFormatter::new(format).format_secret(&record());
            assert!(!out.contains("do-not-print"));
            assert!(out.contains(&record().fingerprint()));
        }
    }

    #[test]
    fn test_analysis_text_lists_counts() {
        let artifact = PlanArtifact::from_parts(
            None,
            Some(String::from("Plan: 2 to add, 1 to change, 0 to destroy.")),
        );
        let analysis = PlanAnalysis::of(&ChangeSetExtractor::new(), &artifact);
        colored::control::set_override(false);
        let out = OutputFormatter::new(OutputFormat::Text).format_analysis(&analysis);
        assert!(out.contains("Plan: 2 to add, 1 to change, 0 to destroy"));
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(OutputFormatter::truncate("short", 10), "short");
        assert_eq!(OutputFormatter::truncate("aws_security_group.é_long", 10), "aws_sec...");
    }
}
