//! Runtime configuration types.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// How integers outside the safe double range cross to the foreign side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntegerPolicy {
    /// Send the exact decimal text as a foreign big integer
    #[default]
    DecimalString,
    /// Send the nearest double (lossy)
    Float,
}

/// Configuration for a bridge context.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Maximum nesting depth for list/array conversion
    pub max_depth: usize,
    /// Crossing rule for integers outside ±(2^53 - 1)
    pub integer_policy: IntegerPolicy,
    /// Settings for workers spawned with this configuration
    pub worker: WorkerConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_depth: 64,
            integer_policy: IntegerPolicy::DecimalString,
            worker: WorkerConfig::default(),
        }
    }
}

/// Configuration for worker execution contexts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Sleep between control block checks while suspended
    pub poll_interval_ms: u64,
    /// Body of the provisional message a worker sends once it is started
    pub ready_message: String,
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
            ready_message: "Worker is started.".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl BridgeConfig {
    /// Parse a configuration from TOML text. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}
