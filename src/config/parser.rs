//! Configuration parser for loading configuration files.
//!
//! This module handles loading configuration from YAML files and environment
//! variables, with proper precedence and error handling. Credentials are
//! only ever read from the environment.

use crate::error::{ConfigError, RelayError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::RelayConfig;

/// Environment variable overriding `notification.webhook_url`.
pub const NOTIFY_URL_ENV: &str = "PLANRELAY_NOTIFY_URL";

/// Environment variable overriding `estimator.endpoint`.
pub const ESTIMATOR_ENDPOINT_ENV: &str = "PLANRELAY_ESTIMATOR_ENDPOINT";

/// Environment variable overriding `reconcile.owner`.
pub const REGISTRY_OWNER_ENV: &str = "PLANRELAY_REGISTRY_OWNER";

/// Environment variable overriding `delivery.ledger_path`.
pub const LEDGER_PATH_ENV: &str = "PLANRELAY_LEDGER_PATH";

/// Configuration parser.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving the `.env` file.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<RelayConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(RelayError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            RelayError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<RelayConfig> {
        debug!("Parsing YAML configuration");

        // An empty file is a valid, all-defaults configuration.
        if content.trim().is_empty() {
            return Ok(RelayConfig::default());
        }

        serde_yaml::from_str(content).map_err(|e| {
            RelayError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location: source.map(|p| p.display().to_string()),
            })
        })
    }

    /// Loads the explicit file, or the first one found walking up from the
    /// base path, or the defaults. Environment overrides apply in every case.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit file is missing, or any file found
    /// cannot be parsed.
    pub fn load(&self, explicit: Option<&Path>) -> Result<RelayConfig> {
        let mut config = match explicit {
            Some(path) => self.load_file(path)?,
            None => {
                let start = self.base_path.clone().unwrap_or_else(|| PathBuf::from("."));
                match find_config_file(&start) {
                    Ok(path) => self.load_file(path)?,
                    Err(_) => {
                        debug!("No configuration file found; using defaults");
                        RelayConfig::default()
                    }
                }
            }
        };

        apply_env_overrides(&mut config, |name| std::env::var(name).ok());
        Ok(config)
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                RelayError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Gets the registry token from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is not set.
    pub fn github_token() -> Result<String> {
        required_env(crate::registry::TOKEN_ENV)
    }

    /// Gets the estimator credential from the environment (optional).
    #[must_use]
    pub fn estimator_api_key() -> Option<String> {
        std::env::var(crate::cost::ESTIMATOR_KEY_ENV)
            .ok()
            .filter(|k| !k.is_empty())
    }
}

fn required_env(name: &str) -> Result<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            RelayError::Config(ConfigError::MissingEnvVar {
                name: name.to_string(),
            })
        })
}

/// Applies `PLANRELAY_*` overrides using `lookup` to read variables.
pub fn apply_env_overrides(config: &mut RelayConfig, lookup: impl Fn(&str) -> Option<String>) {
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(url) = read(NOTIFY_URL_ENV) {
        debug!("Overriding notification.webhook_url from environment");
        config.notification.webhook_url = Some(url);
    }

    if let Some(endpoint) = read(ESTIMATOR_ENDPOINT_ENV) {
        debug!("Overriding estimator.endpoint from environment");
        config.estimator.endpoint = Some(endpoint);
    }

    if let Some(path) = read(LEDGER_PATH_ENV) {
        debug!("Overriding delivery.ledger_path from environment");
        config.delivery.ledger_path = Some(path);
    }

    if let Some(owner) = read(REGISTRY_OWNER_ENV) {
        if let Some(reconcile) = config.reconcile.as_mut() {
            debug!("Overriding reconcile.owner from environment");
            reconcile.owner = owner;
        } else {
            debug!("Ignoring {REGISTRY_OWNER_ENV}: no reconcile section configured");
        }
    }
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["planrelay.yaml", "planrelay.yml", ".planrelay.yaml"];

/// Finds the configuration file in the current directory or parent directories.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.canonicalize().unwrap_or_else(|_| start.to_path_buf());

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(RelayError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}
