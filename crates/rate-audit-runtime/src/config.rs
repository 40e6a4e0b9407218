//! Runtime configuration.
//!
//! Loaded from YAML. Durations are written in human form (`"15s"`,
//! `"200ms"`). Every field has a default, so a partial file is fine.
//!
//! ```yaml
//! max_enrichment_iterations: 3
//! call_timeout: 15s
//! retry:
//!   max_retries: 3
//!   initial_backoff: 200ms
//!   max_backoff: 5s
//!   factor: 2.0
//! ```

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use rate_audit_core::DEFAULT_MAX_ENRICHMENT_ITERATIONS;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gateway::STANDARD_INITIAL_FIELDS;
use crate::resilience::RetryPolicy;

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_enrichment_iterations must be a positive integer")]
    ZeroIterationBound,

    #[error("call_timeout must be greater than zero")]
    ZeroTimeout,

    #[error("initial_fields must name at least one field")]
    NoInitialFields,

    #[error("invalid retry policy: {0}")]
    InvalidRetry(String),

    #[error("no data gateway configured")]
    MissingGateway,

    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

/// Gateway response cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum cached responses
    pub max_entries: u64,

    /// Entry lifetime
    #[serde(with = "duration_human")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl: Duration::from_secs(300),
        }
    }
}

/// Settings the orchestrator honors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Enrichment cycles allowed before a run ends as bound_exceeded
    pub max_enrichment_iterations: u32,

    /// Timeout applied to every gateway and agent call
    #[serde(with = "duration_human")]
    pub call_timeout: Duration,

    /// Retry policy for transient failures
    pub retry: RetryPolicy,

    /// Fields requested by the initial fetch
    pub initial_fields: BTreeSet<String>,

    /// Gateway cache settings
    pub cache: CacheConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_enrichment_iterations: DEFAULT_MAX_ENRICHMENT_ITERATIONS,
            call_timeout: Duration::from_secs(15),
            retry: RetryPolicy::default(),
            initial_fields: STANDARD_INITIAL_FIELDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            cache: CacheConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml(&yaml).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn with_max_enrichment_iterations(mut self, max: u32) -> Self {
        self.max_enrichment_iterations = max;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_initial_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.initial_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_enrichment_iterations == 0 {
            return Err(ConfigError::ZeroIterationBound);
        }
        if self.call_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.initial_fields.is_empty() {
            return Err(ConfigError::NoInitialFields);
        }
        self.retry.validate()
    }
}

/// Serde helper for durations written as `"15s"` or `"200ms"`.
pub(crate) mod duration_human {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}
