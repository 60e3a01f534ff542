//! Application settings
//!
//! Defines the structure of the configuration file. Every section and field
//! is optional; missing values fall back to the built-in defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::client::{DEFAULT_PROBE_TIMEOUT, DEFAULT_UPLOAD_TIMEOUT, InferenceClient};
use crate::readiness::policy::{
    DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_INITIAL_DELAY, DEFAULT_MAX_ATTEMPTS,
};
use crate::readiness::{DEFAULT_NOTICE_DEBOUNCE, PolicyError, RetryPolicy};
use crate::scan::DEFAULT_RECORD_TIMEOUT;

/// Base URL used when neither the config nor the environment names one
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Longest probe timeout accepted; longer ones stall the readiness gate
pub const MAX_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that can occur during configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to create client: {0}")]
    Client(#[from] crate::client::ClientError),

    #[error("Invalid retry policy: {0}")]
    Policy(#[from] PolicyError),
}

/// Where the inference service lives and how long to wait for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL (e.g., "http://localhost:8000")
    pub base_url: String,

    /// Timeout for one liveness probe
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,

    /// Timeout for one image upload
    #[serde(with = "humantime_serde")]
    pub upload_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
        }
    }
}

impl ServiceConfig {
    /// Build a client for the configured service
    pub fn to_client(&self) -> Result<InferenceClient, ConfigError> {
        Ok(InferenceClient::new(&self.base_url)?
            .with_probe_timeout(self.probe_timeout)
            .with_upload_timeout(self.upload_timeout))
    }
}

/// Retry behaviour of the readiness monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Probes per chain, including the first
    pub max_attempts: u32,

    /// Wait before the second probe
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,

    /// Growth factor applied to each later wait
    pub backoff_multiplier: f64,

    /// How long a chain must stay unresolved before "starting" is shown
    #[serde(with = "humantime_serde")]
    pub notice_debounce: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            notice_debounce: DEFAULT_NOTICE_DEBOUNCE,
        }
    }
}

impl ReadinessConfig {
    pub fn to_retry_policy(&self) -> Result<RetryPolicy, ConfigError> {
        Ok(RetryPolicy::new(
            self.max_attempts,
            self.initial_delay,
            self.backoff_multiplier,
        )?)
    }
}

/// Submission and local history settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Identity recorded with each scan
    pub user_id: String,

    /// JSON-lines file holding recorded scans
    pub history_path: PathBuf,

    /// Bound on recording a completed scan
    #[serde(with = "humantime_serde")]
    pub record_timeout: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            user_id: "local".to_string(),
            history_path: PathBuf::from("freshscan-history.jsonl"),
            record_timeout: DEFAULT_RECORD_TIMEOUT,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub readiness: ReadinessConfig,
    pub scan: ScanConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Generate a default configuration
    pub fn default_config() -> Self {
        Self::default()
    }

    /// Serialize to YAML string
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Check every value that would otherwise fail later at runtime
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.service.to_client()?;
        self.readiness.to_retry_policy()?;

        if self.service.probe_timeout.is_zero() || self.service.probe_timeout > MAX_PROBE_TIMEOUT {
            return Err(ConfigError::Invalid(format!(
                "service.probe_timeout must be between 1ms and {}s",
                MAX_PROBE_TIMEOUT.as_secs()
            )));
        }
        if self.service.upload_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "service.upload_timeout must be non-zero".to_string(),
            ));
        }
        if self.scan.user_id.trim().is_empty() {
            return Err(ConfigError::Invalid("scan.user_id must not be empty".to_string()));
        }
        Ok(())
    }
}
