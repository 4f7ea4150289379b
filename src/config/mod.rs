//! # Submission Configuration
//!
//! Runtime properties that steer strategy selection and transport behavior. Values are
//! layered by [`ConfigManager`]: `submission.toml`, then `submission.<environment>.toml`,
//! then `SUBMISSION_*` environment variables.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use submission_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let timeout = manager.config().http_timeout();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

use crate::constants::DEFAULT_SEPARATOR;

/// Properties read by the orchestrator and the strategies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionConfig {
    /// Allow the request-dispatcher strategy to forward replace="all" submissions
    pub local_submission_forward: bool,
    /// Allow the request-dispatcher strategy to include other replace modes
    pub local_submission_include: bool,
    /// Let the client load GET replace="all" submissions itself
    pub optimize_get_all: bool,
    /// Run replace="all" submissions through the two-pass protocol
    pub allow_deferred_submission: bool,
    /// Client runs without script support
    pub noscript: bool,
    /// Incoming request headers copied onto outgoing submissions
    pub forward_submission_headers: Vec<String>,
    pub default_separator: String,
    pub http_timeout_ms: u64,
    /// Base used to absolutize relative resources for network submissions
    pub base_url: Option<String>,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: usize,
    /// Applied when a cached submission does not declare `xxf:ttl`
    pub default_ttl_ms: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 256,
            default_ttl_ms: None,
        }
    }
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            local_submission_forward: true,
            local_submission_include: true,
            optimize_get_all: true,
            allow_deferred_submission: true,
            noscript: false,
            forward_submission_headers: Vec::new(),
            default_separator: DEFAULT_SEPARATOR.to_string(),
            http_timeout_ms: 30_000,
            base_url: None,
            cache: CacheConfig::default(),
        }
    }
}

impl SubmissionConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn default_cache_ttl(&self) -> Option<Duration> {
        self.cache.default_ttl_ms.map(Duration::from_millis)
    }

    /// Case-insensitive membership test against `forward_submission_headers`.
    pub fn forwards_header(&self, name: &str) -> bool {
        self.forward_submission_headers
            .iter()
            .any(|header| header.eq_ignore_ascii_case(name))
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.default_separator.is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "default_separator",
                "submission configuration",
            ));
        }

        if self.http_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "http_timeout_ms",
                "0",
                "timeout must be greater than 0",
            ));
        }

        if self.cache.max_entries == 0 {
            return Err(ConfigurationError::invalid_value(
                "cache.max_entries",
                "0",
                "cache capacity must be greater than 0",
            ));
        }

        if let Some(base) = &self.base_url {
            if let Err(e) = url::Url::parse(base) {
                return Err(ConfigurationError::invalid_value(
                    "base_url",
                    base.clone(),
                    format!("not an absolute URL: {e}"),
                ));
            }
        }

        Ok(())
    }
}
