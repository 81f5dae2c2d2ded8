//! Configuration module for planrelay.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `planrelay.yaml`
//! - Environment overrides and credential lookup
//! - Validation of configuration values

mod parser;
mod spec;
mod validator;

pub use parser::{
    ConfigParser, DEFAULT_CONFIG_FILES, ESTIMATOR_ENDPOINT_ENV, LEDGER_PATH_ENV, NOTIFY_URL_ENV,
    REGISTRY_OWNER_ENV, apply_env_overrides, find_config_file,
};
pub use spec::{
    DeliveryConfig, EstimatorConfig, NotificationConfig, ReconcileConfig, RelayConfig,
    SecretConfig, StorageBackend, StorageConfig, WebhookConfig,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
