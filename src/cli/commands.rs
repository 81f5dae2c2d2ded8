//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::notify::RunMetadata;
use crate::plan::PlanSource;

/// planrelay - plan change notifications and webhook reconciliation.
#[derive(Parser, Debug)]
#[command(name = "planrelay")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "PLANRELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze a plan, estimate its cost and post the notification.
    Notify {
        /// Plan files.
        #[command(flatten)]
        plan: PlanArgs,

        /// Run identity.
        #[command(flatten)]
        run: RunArgs,
    },

    /// Analyze a plan offline and print the summary.
    Summarize {
        /// Plan files.
        #[command(flatten)]
        plan: PlanArgs,
    },

    /// Synchronize the signing secret, then converge the webhook registration.
    Reconcile {
        /// Override the configured attempt budget.
        #[arg(long)]
        max_attempts: Option<u32>,
    },

    /// Ensure the signing secret exists and print its fingerprint.
    Secret,

    /// Validate the configuration.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },
}

/// Plan representation arguments.
#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    /// Structured (JSON) plan file.
    #[arg(long)]
    pub plan_json: Option<PathBuf>,

    /// Formatted text plan file.
    #[arg(long)]
    pub plan_text: Option<PathBuf>,
}

impl PlanArgs {
    /// Converts the arguments into a plan source.
    #[must_use]
    pub fn source(&self) -> PlanSource {
        PlanSource::new(self.plan_json.clone(), self.plan_text.clone())
    }
}

/// Run identity arguments, with the hosting workflow's environment as fallback.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Source repository as `owner/name`.
    #[arg(long)]
    pub repo: Option<String>,

    /// Change request number.
    #[arg(long, env = "PULL_NUM")]
    pub pr: Option<String>,

    /// Commit reference.
    #[arg(long, env = "HEAD_COMMIT")]
    pub commit: Option<String>,

    /// Project within the repository.
    #[arg(long, env = "PROJECT_NAME")]
    pub project: Option<String>,

    /// Correlation id; derived from the run identity when absent.
    #[arg(long)]
    pub correlation_id: Option<String>,
}

impl RunArgs {
    /// Builds run metadata, reading unset fields through `lookup`.
    #[must_use]
    pub fn metadata(&self, lookup: impl Fn(&str) -> Option<String>) -> RunMetadata {
        let read = |name: &str| lookup(name).filter(|v| !v.is_empty());
        let repo = self.repo.clone().or_else(|| {
            match (read("BASE_REPO_OWNER"), read("BASE_REPO_NAME")) {
                (Some(owner), Some(name)) => Some(format!("{owner}/{name}")),
                _ => None,
            }
        });

        let correlation_id = self
            .correlation_id
            .clone()
            .or_else(|| self.run_key(repo.as_deref()))
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        RunMetadata {
            source_identity: repo,
            change_request: self.pr.clone(),
            commit: self.commit.clone(),
            project: self.project.clone(),
            correlation_id,
        }
    }

    /// Stable key for a workflow re-run of the same change. Requires the
    /// repository, change request and commit; the project is appended when set.
    fn run_key(&self, repo: Option<&str>) -> Option<String> {
        let (Some(repo), Some(pr), Some(commit)) = (repo, self.pr.as_deref(), self.commit.as_deref())
        else {
            return None;
        };
        let mut key = format!("{repo}#{pr}@{commit}");
        if let Some(project) = self.project.as_deref().filter(|p| !p.is_empty()) {
            key.push('/');
            key.push_str(project);
        }
        Some(key)
    }
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// Log format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable log lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}
