//! Risk findings derived from post-change resource values.
//!
//! These checks are intentionally shallow: they flag the handful of
//! configurations reviewers most often miss in a plan diff.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::artifact::PlanArtifact;

/// Severity of a finding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Likely exposure.
    High,
    /// Weakened protection.
    Medium,
    /// Informational.
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Info => "INFO",
        };
        write!(f, "{s}")
    }
}

/// A single risk finding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyFinding {
    /// Severity.
    pub severity: Severity,
    /// Stable code, e.g. `SG_OPEN_INGRESS`.
    pub code: String,
    /// Human-readable description.
    pub message: String,
    /// Resource address.
    pub resource: String,
}

/// All findings for one plan, ordered by severity.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RiskReport {
    /// Number of HIGH findings.
    pub high: usize,
    /// Number of MEDIUM findings.
    pub medium: usize,
    /// Number of INFO findings.
    pub info: usize,
    /// The findings.
    pub findings: Vec<PolicyFinding>,
}

impl RiskReport {
    /// Returns true if there are no findings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    fn from_findings(mut findings: Vec<PolicyFinding>) -> Self {
        findings.sort_by(|a, b| a.severity.cmp(&b.severity).then_with(|| a.resource.cmp(&b.resource)));
        let count = |s: Severity| findings.iter().filter(|f| f.severity == s).count();
        Self {
            high: count(Severity::High),
            medium: count(Severity::Medium),
            info: count(Severity::Info),
            findings,
        }
    }
}

/// Evaluates the structured form of a plan. Text-only plans yield no findings.
#[must_use]
pub fn evaluate(artifact: &PlanArtifact) -> RiskReport {
    let Some(changes) = artifact
        .structured()
        .and_then(|s| s.get("resource_changes"))
        .and_then(Value::as_array)
    else {
        return RiskReport::default();
    };

    let mut findings = Vec::new();
    for change in changes {
        let Some(resource_type) = change.get("type").and_then(Value::as_str) else {
            continue;
        };
        let address = change
            .get("address")
            .and_then(Value::as_str)
            .unwrap_or(resource_type)
            .to_string();
        let Some(after) = change.get("change").and_then(|c| c.get("after")).filter(|a| a.is_object())
        else {
            continue;
        };
        check_resource(resource_type, &address, after, &mut findings);
    }

    RiskReport::from_findings(findings)
}

fn check_resource(resource_type: &str, address: &str, after: &Value, findings: &mut Vec<PolicyFinding>) {
    let mut push = |severity, code: &str, message: String| {
        findings.push(PolicyFinding {
            severity,
            code: code.to_string(),
            message,
            resource: address.to_string(),
        });
    };

    match resource_type {
        "aws_security_group" | "aws_security_group_rule" => {
            let rules: Vec<&Value> = match after.get("ingress").and_then(Value::as_array) {
                Some(ingress) => ingress.iter().collect(),
                // A standalone rule carries its fields at the top level.
                None if after.get("type").and_then(Value::as_str) == Some("ingress") => vec![after],
                None => Vec::new(),
            };
            for rule in rules {
                if open_to_world(rule.get("cidr_blocks")) || open_to_world(rule.get("ipv6_cidr_blocks")) {
                    let from = rule.get("from_port").and_then(Value::as_i64);
                    let to = rule.get("to_port").and_then(Value::as_i64);
                    let proto = rule.get("protocol").and_then(Value::as_str).unwrap_or("any");
                    push(
                        Severity::High,
                        "SG_OPEN_INGRESS",
                        format!("Security group ingress open to world: {} proto={proto}", port_range(from, to)),
                    );
                }
            }
        }
        "aws_s3_bucket" | "aws_s3_bucket_acl" => {
            let acl = after.get("acl").and_then(Value::as_str).unwrap_or_default();
            if acl.eq_ignore_ascii_case("public-read") || acl.eq_ignore_ascii_case("public-read-write") {
                push(Severity::High, "S3_PUBLIC_ACL", format!("S3 bucket ACL is {acl}"));
            }
        }
        "aws_s3_bucket_public_access_block" => {
            let all_blocked = [
                "block_public_acls",
                "block_public_policy",
                "ignore_public_acls",
                "restrict_public_buckets",
            ]
            .iter()
            .all(|k| as_bool(after.get(*k)));
            if !all_blocked {
                push(
                    Severity::Medium,
                    "S3_PAB_DISABLED",
                    String::from("Public access block not fully enabled"),
                );
            }
        }
        "aws_db_instance" | "aws_rds_cluster_instance" => {
            if as_bool(after.get("publicly_accessible")) {
                push(
                    Severity::High,
                    "RDS_PUBLIC",
                    String::from("Database instance is publicly accessible"),
                );
            }
        }
        "aws_iam_policy" | "aws_iam_role_policy" | "aws_iam_user_policy" | "aws_iam_group_policy" => {
            if after.get("policy").and_then(Value::as_str).is_some_and(|p| p.contains('*')) {
                push(
                    Severity::Medium,
                    "IAM_WILDCARD",
                    String::from("IAM policy document contains wildcards"),
                );
            }
        }
        _ => {}
    }
}

fn open_to_world(cidrs: Option<&Value>) -> bool {
    cidrs
        .and_then(Value::as_array)
        .is_some_and(|list| list.iter().filter_map(Value::as_str).any(|c| c == "0.0.0.0/0" || c == "::/0"))
}

fn as_bool(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn port_range(from: Option<i64>, to: Option<i64>) -> String {
    match (from, to) {
        (None, None) => String::from("ALL"),
        (Some(f), Some(t)) if f == t => f.to_string(),
        (f, t) => format!(
            "{}-{}",
            f.map_or_else(|| String::from("*"), |v| v.to_string()),
            t.map_or_else(|| String::from("*"), |v| v.to_string())
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_findings() {
        let plan = json!({
            "resource_changes": [
                {"address": "aws_security_group.web", "type": "aws_security_group", "change": {"actions": ["create"], "after": {
                    "ingress": [{"cidr_blocks": ["0.0.0.0/0"], "from_port": 22, "to_port": 22, "protocol": "tcp"}]
                }}},
                {"address": "aws_s3_bucket_public_access_block.b", "type": "aws_s3_bucket_public_access_block", "change": {"actions": ["create"], "after": {
                    "block_public_acls": true, "block_public_policy": false, "ignore_public_acls": true, "restrict_public_buckets": true
                }}},
                {"address": "aws_db_instance.db", "type": "aws_db_instance", "change": {"actions": ["update"], "after": {"publicly_accessible": true}}},
                {"address": "aws_s3_bucket.gone", "type": "aws_s3_bucket", "change": {"actions": ["delete"], "after": null}}
            ]
        });
        let artifact = PlanArtifact::from_parts(Some(plan.to_string()), None);
        let report = evaluate(&artifact);

        assert_eq!((report.high, report.medium, report.info), (2, 1, 0));
        assert_eq!(report.findings[0].severity, Severity::High);
        assert!(report.findings.iter().any(|f| f.code == "SG_OPEN_INGRESS" && f.message.contains("22 proto=tcp")));
    }

    #[test]
    fn test_text_only_has_no_findings() {
        let artifact = PlanArtifact::from_parts(None, Some(String::from("Plan: 1 to add, 0 to change, 0 to destroy.")));
        assert!(evaluate(&artifact).is_empty());
    }

    #[test]
    fn test_port_range() {
        assert_eq!(port_range(None, None), "ALL");
        assert_eq!(port_range(Some(443), Some(443)), "443");
        assert_eq!(port_range(Some(0), Some(65535)), "0-65535");
    }
}
