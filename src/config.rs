//! Process configuration.
//!
//! A small TOML file with one section per collaborator plus the pipeline
//! tunables. Every field has a default so an empty file (or no file at all)
//! yields a runnable configuration.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::pipeline::PipelineConfig;

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub transport: TransportConfig,
    pub store: StoreConfig,
    pub pipeline: PipelineSettings,
}

/// Endpoint handed to the transport client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub url: String,
    /// Queue the retrieval task polls.
    pub queue: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            url: "amqp://localhost:5672/".to_string(),
            queue: "metering.sample".to_string(),
        }
    }
}

/// Endpoint handed to the publish client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            url: "http://localhost:8080/".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub queue_depth: usize,
    pub poll_interval_ms: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        PipelineSettings {
            queue_depth: 128,
            poll_interval_ms: 500,
        }
    }
}

impl PipelineSettings {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            queue_depth: self.queue_depth,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// Load from the path in `METERFLOW_CONFIG`, or defaults when unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var("METERFLOW_CONFIG") {
            Ok(path) => Self::load(path),
            Err(_) => Ok(Self::default()),
        }
    }
}
