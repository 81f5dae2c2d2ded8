//! Configuration validation.
//!
//! This module validates a loaded configuration, collecting every error and
//! warning before reporting, so operators can fix everything in one pass.

use crate::error::{ConfigError, RelayError, Result};
use crate::registry::OwnerScope;
use crate::secrets::validate_name;
use reqwest::Url;
use tracing::debug;

use super::spec::{
    DeliveryConfig, EstimatorConfig, NotificationConfig, ReconcileConfig, RelayConfig, StorageBackend,
    StorageConfig,
};

/// Longest timeout accepted without a warning.
const MAX_REASONABLE_TIMEOUT_SECS: u64 = 120;

/// Highest accepted attempt budget.
const MAX_ATTEMPTS: u32 = 10;

/// Accepted webhook payload content types.
const CONTENT_TYPES: &[&str] = &["json", "form"];

/// Validator for planrelay configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ValidationResult {
    fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Checks a configuration and collects every problem found.
    #[must_use]
    pub fn check(&self, config: &RelayConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_notification(&config.notification, &mut result);
        Self::validate_estimator(&config.estimator, &mut result);
        Self::validate_delivery(&config.delivery, &mut result);
        if let Some(reconcile) = &config.reconcile {
            Self::validate_reconcile(reconcile, &mut result);
        }

        result
    }

    /// Validates a configuration.
    ///
    /// # Errors
    ///
    /// Returns the first error found if validation fails.
    pub fn validate(&self, config: &RelayConfig) -> Result<ValidationResult> {
        let result = self.check(config);

        if let Some(first_error) = result.errors.first() {
            return Err(RelayError::Config(ConfigError::validation(
                first_error.message.clone(),
                first_error.field.clone(),
            )));
        }

        debug!("Configuration validation passed");
        Ok(result)
    }

    fn validate_notification(notification: &NotificationConfig, result: &mut ValidationResult) {
        if let Some(url) = &notification.webhook_url {
            validate_url("notification.webhook_url", url, result);
        }
        validate_timeout("notification.timeout_secs", notification.timeout_secs, result);

        let template = &notification.reference_url_template;
        if !template.contains("{repo}") && !template.contains("{pr}") {
            result.warnings.push(format!(
                "notification.reference_url_template: '{template}' has no {{repo}} or {{pr}} placeholder"
            ));
        }
    }

    fn validate_delivery(delivery: &DeliveryConfig, result: &mut ValidationResult) {
        if delivery.ledger_path.is_some() && delivery.retention_days == 0 {
            result.error(
                "delivery.retention_days",
                "Retention must be at least 1 day or every claim is forgotten at once",
            );
        }
    }

    fn validate_estimator(estimator: &EstimatorConfig, result: &mut ValidationResult) {
        if let Some(endpoint) = &estimator.endpoint {
            validate_url("estimator.endpoint", endpoint, result);
        }
        validate_timeout("estimator.timeout_secs", estimator.timeout_secs, result);

        if let Some(baseline) = &estimator.baseline {
            validate_storage("estimator.baseline", baseline, result);
        } else if estimator.record_baseline {
            result.warnings.push(String::from(
                "estimator.record_baseline: no baseline store configured; nothing will be recorded",
            ));
        }
    }

    fn validate_reconcile(reconcile: &ReconcileConfig, result: &mut ValidationResult) {
        validate_url("reconcile.api_url", &reconcile.api_url, result);

        if let Err(reason) = reconcile.owner.parse::<OwnerScope>() {
            result.error("reconcile.owner", reason);
        }

        let webhook = &reconcile.webhook;
        if webhook.name.is_empty() {
            result.error("reconcile.webhook.name", "Webhook target name cannot be empty");
        }
        validate_url("reconcile.webhook.url", &webhook.url, result);
        if webhook.url.starts_with("http://") {
            result.warnings.push(String::from(
                "reconcile.webhook.url: deliveries over plain HTTP expose signed payloads",
            ));
        }
        if webhook.events.is_empty() {
            result.error("reconcile.webhook.events", "At least one event is required");
        }
        if !CONTENT_TYPES.contains(&webhook.content_type.as_str()) {
            result.error(
                "reconcile.webhook.content_type",
                format!(
                    "Content type '{}' is not one of: {}",
                    webhook.content_type,
                    CONTENT_TYPES.join(", ")
                ),
            );
        }
        if !webhook.active {
            result
                .warnings
                .push(String::from("reconcile.webhook.active: webhook will be registered disabled"));
        }

        if validate_name(&reconcile.secret.name).is_err() {
            result.error(
                "reconcile.secret.name",
                format!("Secret name '{}' is not a valid key", reconcile.secret.name),
            );
        }
        validate_storage("reconcile.secret.store", &reconcile.secret.store, result);
        validate_timeout("reconcile.secret.timeout_secs", reconcile.secret.timeout_secs, result);

        if reconcile.max_attempts == 0 || reconcile.max_attempts > MAX_ATTEMPTS {
            result.error(
                "reconcile.max_attempts",
                format!("Attempts must be between 1 and {MAX_ATTEMPTS}"),
            );
        }
    }
}

fn validate_url(field: &str, value: &str, result: &mut ValidationResult) {
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => result.error(field, format!("Unsupported URL scheme '{}'", url.scheme())),
        Err(e) => result.error(field, format!("Invalid URL '{value}': {e}")),
    }
}

fn validate_timeout(field: &str, secs: u64, result: &mut ValidationResult) {
    if secs == 0 {
        result.error(field, "Timeout must be at least 1 second");
    } else if secs > MAX_REASONABLE_TIMEOUT_SECS {
        result
            .warnings
            .push(format!("{field}: {secs}s may stall the hosting workflow"));
    }
}

fn validate_storage(prefix: &str, storage: &StorageConfig, result: &mut ValidationResult) {
    match storage.backend {
        StorageBackend::S3 => {
            if storage.bucket.as_ref().is_none_or(String::is_empty) {
                result.error(
                    format!("{prefix}.bucket"),
                    "S3 bucket name is required when using S3 backend",
                );
            }
        }
        StorageBackend::Local => {
            if storage.bucket.is_some() {
                result
                    .warnings
                    .push(format!("{prefix}.bucket: ignored by the local backend"));
            }
        }
    }
}
