//! Error types for planrelay.
//!
//! This module provides the error hierarchy for both subsystems: the plan
//! analysis and notification pipeline, and the webhook/secret reconciler.
//! Stage-local recoverable failures (estimator, dispatch) are still modelled
//! as errors here so they can be logged with context before being degraded
//! into warnings by the caller.

use std::path::PathBuf;
use thiserror::Error;

/// Maximum number of characters of a raw response kept in an error.
pub const SNIPPET_LEN: usize = 200;

/// The main error type for planrelay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Plan artifact loading errors.
    #[error("Plan artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    /// Cost estimator errors.
    #[error("Cost estimator error: {0}")]
    Estimator(#[from] EstimatorError),

    /// Notification dispatch errors.
    #[error("Notification dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Webhook registry API errors.
    #[error("Webhook registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Secret store errors.
    #[error("Secret store error: {0}")]
    Secret(#[from] SecretStoreError),

    /// Reconciliation errors.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// Persistent state errors (baselines, targets, ledger).
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },
}

/// Plan artifact errors.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// Neither the structured nor the text representation could be read.
    #[error("No readable plan representation (structured: {structured}, text: {text})")]
    NoRepresentation {
        /// Why the structured form was unavailable.
        structured: String,
        /// Why the text form was unavailable.
        text: String,
    },

    /// A representation file could not be read.
    #[error("Failed to read plan file {path}: {message}")]
    Unreadable {
        /// Path of the file.
        path: PathBuf,
        /// Underlying cause.
        message: String,
    },
}

/// Cost estimator errors. All of them are non-fatal for the pipeline.
#[derive(Debug, Error)]
pub enum EstimatorError {
    /// The estimator could not be reached.
    #[error("Estimator unreachable: {message}")]
    Unreachable {
        /// Description of the network error.
        message: String,
    },

    /// The estimator did not answer in time.
    #[error("Estimator timed out after {timeout_secs}s")]
    Timeout {
        /// Configured timeout.
        timeout_secs: u64,
    },

    /// The estimator rejected the credential.
    #[error("Estimator rejected credentials (status {status})")]
    Unauthorized {
        /// HTTP status code.
        status: u16,
    },

    /// The estimator answered with a non-success status.
    #[error("Estimator returned {status}: {snippet}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Truncated response body.
        snippet: String,
    },

    /// The estimator response could not be understood.
    #[error("Malformed estimator response: {message} (body: {snippet})")]
    MalformedResponse {
        /// What was wrong.
        message: String,
        /// Truncated response body.
        snippet: String,
    },
}

/// Notification dispatch errors. All of them are non-fatal for the pipeline.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The transport did not answer within the timeout.
    #[error("Notification transport timed out after {timeout_secs}s")]
    Timeout {
        /// Configured timeout.
        timeout_secs: u64,
    },

    /// The transport could not be reached.
    #[error("Notification transport unreachable: {message}")]
    Unreachable {
        /// Description of the network error.
        message: String,
    },

    /// The transport answered with a non-2xx status.
    #[error("Notification transport rejected message with {status}: {snippet}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Truncated response body.
        snippet: String,
    },
}

/// Webhook registry API errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Authentication failed.
    #[error("Registry authentication failed ({status}): {message}")]
    AuthenticationFailed {
        /// HTTP status code.
        status: u16,
        /// Description of the auth failure.
        message: String,
    },

    /// Rate limited.
    #[error("Registry rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// A registration with the same delivery URL already exists.
    #[error("Registration already exists: {message}")]
    AlreadyExists {
        /// Message returned by the registry.
        message: String,
    },

    /// The registry failed on its side.
    #[error("Registry server error {status}: {snippet}")]
    ServerError {
        /// HTTP status code.
        status: u16,
        /// Truncated response body.
        snippet: String,
    },

    /// Request failed with a client error.
    #[error("Registry request failed: {status} - {snippet}")]
    RequestFailed {
        /// HTTP status code.
        status: u16,
        /// Truncated response body.
        snippet: String,
    },

    /// Network error.
    #[error("Network error communicating with registry: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from API.
    #[error("Invalid response from registry: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },
}

/// Secret store errors.
#[derive(Debug, Error)]
pub enum SecretStoreError {
    /// The store did not answer in time.
    #[error("Secret store read of '{name}' timed out after {timeout_secs}s")]
    Timeout {
        /// Secret name.
        name: String,
        /// Configured timeout.
        timeout_secs: u64,
    },

    /// The backend failed.
    #[error("Secret store backend error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },

    /// The secret name is not usable as a key.
    #[error("Invalid secret name: {name}")]
    InvalidName {
        /// The rejected name.
        name: String,
    },
}

/// Reconciliation errors. All of them abort the run.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The registry rejected our credentials.
    #[error("Authentication against the webhook registry failed: {reason}")]
    AuthenticationFailed {
        /// Operator-facing cause.
        reason: String,
    },

    /// Maximum retry attempts exceeded.
    #[error("Maximum retry attempts ({attempts}) exceeded while trying to {operation}: {last_error}")]
    MaxRetriesExceeded {
        /// Number of attempts made.
        attempts: u32,
        /// Operation that failed.
        operation: String,
        /// The last error observed.
        last_error: String,
    },

    /// The desired state is unusable.
    #[error("Invalid desired state for {kind}: {reason}")]
    InvalidDesiredState {
        /// Target kind.
        kind: String,
        /// Why it is invalid.
        reason: String,
    },

    /// The registry refused the request for a non-transient reason.
    #[error("Registry refused to {operation}: {reason}")]
    Refused {
        /// Operation that failed.
        operation: String,
        /// Reason reported.
        reason: String,
    },

    /// A create raced and the registration then vanished again.
    #[error("Registration for {url} reported as existing but not found on re-list")]
    LostRace {
        /// Delivery URL.
        url: String,
    },
}

/// Persistent state errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Local filesystem failure.
    #[error("Local state error: {message}")]
    Filesystem {
        /// Description of the failure.
        message: String,
    },

    /// S3 backend error.
    #[error("S3 state backend error: {message}")]
    S3Error {
        /// Description of the S3 error.
        message: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },
}

/// Result type alias for planrelay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

impl RelayError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Registry(
                RegistryError::RateLimited { .. }
                    | RegistryError::NetworkError { .. }
                    | RegistryError::ServerError { .. }
            )
        )
    }

    /// Returns true if this error is an authentication failure.
    #[must_use]
    pub const fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::Registry(RegistryError::AuthenticationFailed { .. })
                | Self::Reconcile(ReconcileError::AuthenticationFailed { .. })
        )
    }

    /// Returns the suggested retry delay in seconds, if applicable.
    #[must_use]
    pub const fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::Registry(RegistryError::RateLimited { retry_after_secs }) => {
                Some(*retry_after_secs)
            }
            Self::Registry(RegistryError::NetworkError { .. } | RegistryError::ServerError { .. }) => {
                Some(1)
            }
            _ => None,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl StateError {
    /// Creates an S3 error with the given message.
    #[must_use]
    pub fn s3(message: impl Into<String>) -> Self {
        Self::S3Error {
            message: message.into(),
        }
    }

    /// Creates a filesystem error with the given message.
    #[must_use]
    pub fn filesystem(message: impl Into<String>) -> Self {
        Self::Filesystem {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}

impl RegistryError {
    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }
}

impl SecretStoreError {
    /// Creates a backend error.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// Truncates a raw response body for inclusion in errors and logs.
#[must_use]
pub fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= SNIPPET_LEN {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(SNIPPET_LEN).collect();
    out.push_str("...");
    out
}
