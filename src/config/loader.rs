//! Configuration Loader
//!
//! Environment-aware loading: a base file, an environment override file and
//! `SUBMISSION_*` environment variables, merged in that order.

use super::error::{ConfigResult, ConfigurationError};
use super::SubmissionConfig;
use config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const BASE_FILE_STEM: &str = "submission";
const ENV_PREFIX: &str = "SUBMISSION";

pub struct ConfigManager {
    config: SubmissionConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment.
    /// Useful for tests that must not touch process environment variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            environment = environment,
            directory = %config_directory.display(),
            "Loading submission configuration"
        );

        let config = Self::load_and_merge_config(&config_directory, environment)?;
        config.validate()?;

        info!(
            environment = environment,
            allow_deferred = config.allow_deferred_submission,
            local_forward = config.local_submission_forward,
            local_include = config.local_submission_include,
            http_timeout_ms = config.http_timeout_ms,
            "Submission configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration, validating it first.
    pub fn from_config(config: SubmissionConfig, environment: &str) -> ConfigResult<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: PathBuf::from("config"),
        }))
    }

    pub fn config(&self) -> &SubmissionConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    fn load_and_merge_config(directory: &Path, environment: &str) -> ConfigResult<SubmissionConfig> {
        let base = directory.join(format!("{BASE_FILE_STEM}.toml"));
        let overlay = directory.join(format!("{BASE_FILE_STEM}.{environment}.toml"));

        let builder = Config::builder()
            .add_source(File::from(base).required(false))
            .add_source(File::from(overlay).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("forward_submission_headers"),
            );

        builder
            .build()
            .and_then(|merged| merged.try_deserialize::<SubmissionConfig>())
            .map_err(|source| ConfigurationError::LoadError {
                environment: environment.to_string(),
                source,
            })
    }

    pub(crate) fn detect_environment() -> String {
        env::var("SUBMISSION_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }
}
