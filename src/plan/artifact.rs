//! Plan artifact loading.
//!
//! A plan may be available as a structured serialization (`show -json`
//! output), as the formatted text log, or both. The loader accepts whichever
//! is readable and never requires both.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use crate::error::{ArtifactError, RelayError, Result};

#[allow(clippy::expect_used)]
static ANSI_ESCAPE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").expect("static pattern"));

/// Where to find the representations of one plan.
#[derive(Debug, Clone, Default)]
pub struct PlanSource {
    /// Path to the structured (JSON) plan.
    pub structured_path: Option<PathBuf>,
    /// Path to the formatted text plan.
    pub text_path: Option<PathBuf>,
}

impl PlanSource {
    /// Creates a source from optional paths.
    #[must_use]
    pub const fn new(structured_path: Option<PathBuf>, text_path: Option<PathBuf>) -> Self {
        Self {
            structured_path,
            text_path,
        }
    }
}

/// Immutable handle to one plan, valid for the duration of a run.
#[derive(Debug, Clone)]
pub struct PlanArtifact {
    structured: Option<Value>,
    raw_structured: Option<String>,
    text: Option<String>,
    fingerprint: String,
}

impl PlanArtifact {
    /// Builds an artifact from in-memory representations.
    ///
    /// A structured form that does not parse as JSON is dropped with a warning.
    #[must_use]
    pub fn from_parts(structured: Option<String>, text: Option<String>) -> Self {
        let parsed = structured.as_deref().and_then(|raw| {
            serde_json::from_str::<Value>(raw)
                .map_err(|e| warn!("Ignoring malformed structured plan: {e}"))
                .ok()
        });
        let fingerprint = fingerprint(structured.as_deref(), text.as_deref());
        let raw_structured = parsed.as_ref().and(structured);
        let text = text.map(|t| strip_ansi(&t));

        Self {
            structured: parsed,
            raw_structured,
            text,
            fingerprint,
        }
    }

    /// Returns the structured form, if available.
    #[must_use]
    pub const fn structured(&self) -> Option<&Value> {
        self.structured.as_ref()
    }

    /// Returns the raw structured serialization, if available.
    #[must_use]
    pub fn raw_structured(&self) -> Option<&str> {
        self.raw_structured.as_deref()
    }

    /// Returns the text form with terminal escapes removed, if available.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Returns true if neither representation is available.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.structured.is_none() && self.text.is_none()
    }

    /// SHA-256 of the representations, hex encoded.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// The input handed to the cost estimator: structured form preferred.
    #[must_use]
    pub fn estimator_input(&self) -> Option<&str> {
        self.raw_structured().or_else(|| self.text())
    }
}

/// Loads plan artifacts from disk.
#[derive(Debug, Default)]
pub struct PlanArtifactLoader;

impl PlanArtifactLoader {
    /// Creates a new loader.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Loads whichever representations of the plan are readable.
    ///
    /// # Errors
    ///
    /// Returns an error only if no representation could be read at all.
    pub async fn load(&self, source: &PlanSource) -> Result<PlanArtifact> {
        let structured = Self::read_optional(source.structured_path.as_deref()).await;
        let text = Self::read_optional(source.text_path.as_deref()).await;

        let structured_reason = reason(&structured, source.structured_path.as_deref());
        let text_reason = reason(&text, source.text_path.as_deref());

        let artifact = PlanArtifact::from_parts(structured.ok().flatten(), text.ok().flatten());

        if artifact.is_empty() {
            let structured_reason = if source.structured_path.is_some() && structured_reason == "ok" {
                String::from("not valid JSON")
            } else {
                structured_reason
            };
            return Err(RelayError::Artifact(ArtifactError::NoRepresentation {
                structured: structured_reason,
                text: text_reason,
            }));
        }

        info!(
            "Loaded plan artifact {} (structured: {}, text: {})",
            &artifact.fingerprint()[..12],
            artifact.structured().is_some(),
            artifact.text().is_some()
        );

        Ok(artifact)
    }

    async fn read_optional(path: Option<&Path>) -> Result<Option<String>> {
        let Some(path) = path else {
            return Ok(None);
        };

        debug!("Reading plan representation: {}", path.display());
        match tokio::fs::read_to_string(path).await {
            Ok(content) if content.trim().is_empty() => {
                warn!("Plan file is empty: {}", path.display());
                Ok(None)
            }
            Ok(content) => Ok(Some(content)),
            Err(e) => {
                warn!("Cannot read plan file {}: {e}", path.display());
                Err(RelayError::Artifact(ArtifactError::Unreadable {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                }))
            }
        }
    }
}

fn reason(result: &Result<Option<String>>, path: Option<&Path>) -> String {
    match (result, path) {
        (_, None) => String::from("not provided"),
        (Err(e), Some(_)) => e.to_string(),
        (Ok(None), Some(_)) => String::from("empty"),
        (Ok(Some(_)), Some(_)) => String::from("ok"),
    }
}

/// Removes ANSI colour and cursor escapes from producer output.
#[must_use]
pub fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").into_owned()
}

/// SHA-256 over the bytes exactly as read, structured first.
fn fingerprint(structured: Option<&str>, text: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    for raw in [structured, text].into_iter().flatten() {
        hasher.update(raw.as_bytes());
    }
    hex::encode(hasher.finalize())
}
