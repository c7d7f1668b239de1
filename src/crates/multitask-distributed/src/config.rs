//! Distributed Engine Configuration
//!
//! This module provides configuration for the worker-thread engine: how
//! workers are named, how large their stacks are, and what happens to
//! sibling workers once one element of a ParallelMap stage has failed.

use multitask_core::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Smallest worker stack the engine accepts
pub const MIN_WORKER_STACK_SIZE: usize = 64 * 1024;

/// What to do with in-flight sibling workers after an element fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationPolicy {
    /// Siblings run to completion; their replies are discarded
    #[default]
    None,
    /// Siblings that have not started their element yet skip it
    BestEffort,
}

impl fmt::Display for CancellationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancellationPolicy::None => write!(f, "none"),
            CancellationPolicy::BestEffort => write!(f, "best_effort"),
        }
    }
}

impl FromStr for CancellationPolicy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "none" => Ok(CancellationPolicy::None),
            "best_effort" => Ok(CancellationPolicy::BestEffort),
            other => Err(PipelineError::Configuration(format!(
                "Unknown cancellation policy '{}', expected 'none' or 'best_effort'",
                other
            ))),
        }
    }
}

/// Configuration for the distributed engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributedConfig {
    /// Prefix of worker thread names; the element position is appended
    #[serde(default = "default_worker_name_prefix")]
    pub worker_name_prefix: String,

    /// Worker thread stack size in bytes (platform default if None)
    #[serde(default)]
    pub worker_stack_size: Option<usize>,

    /// Sibling handling after a failed element
    #[serde(default)]
    pub cancellation: CancellationPolicy,
}

fn default_worker_name_prefix() -> String {
    "multitask-worker".to_string()
}

impl Default for DistributedConfig {
    fn default() -> Self {
        Self {
            worker_name_prefix: default_worker_name_prefix(),
            worker_stack_size: None,
            cancellation: CancellationPolicy::default(),
        }
    }
}

impl DistributedConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a YAML or TOML file
    ///
    /// The format follows the extension: `.toml` is parsed as TOML,
    /// anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Configuration(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);

        let config: Self = if is_toml {
            toml::from_str(&content).map_err(|e| {
                PipelineError::Configuration(format!("Failed to parse TOML config: {}", e))
            })?
        } else {
            serde_yaml::from_str(&content).map_err(|e| {
                PipelineError::Configuration(format!("Failed to parse YAML config: {}", e))
            })?
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file, then apply environment overrides
    pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Create configuration from environment variables only
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - MULTITASK_WORKER_PREFIX: Worker thread name prefix
    /// - MULTITASK_WORKER_STACK_SIZE: Worker stack size in bytes
    /// - MULTITASK_CANCELLATION: `none` or `best_effort`
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(prefix) = env::var("MULTITASK_WORKER_PREFIX") {
            self.worker_name_prefix = prefix;
        }

        if let Ok(size) = env::var("MULTITASK_WORKER_STACK_SIZE") {
            let value = size.trim().parse::<usize>().map_err(|e| {
                PipelineError::Configuration(format!(
                    "MULTITASK_WORKER_STACK_SIZE must be a byte count, got '{}': {}",
                    size, e
                ))
            })?;
            self.worker_stack_size = Some(value);
        }

        if let Ok(policy) = env::var("MULTITASK_CANCELLATION") {
            self.cancellation = policy.parse()?;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.worker_name_prefix.trim().is_empty() {
            return Err(PipelineError::Configuration(
                "worker_name_prefix cannot be empty".to_string(),
            ));
        }

        if self.worker_name_prefix.contains('\0') {
            return Err(PipelineError::Configuration(
                "worker_name_prefix cannot contain NUL bytes".to_string(),
            ));
        }

        if let Some(size) = self.worker_stack_size {
            if size < MIN_WORKER_STACK_SIZE {
                return Err(PipelineError::Configuration(format!(
                    "worker_stack_size must be at least {} bytes, got {}",
                    MIN_WORKER_STACK_SIZE, size
                )));
            }
        }

        Ok(())
    }

    /// Set worker thread name prefix
    pub fn with_worker_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.worker_name_prefix = prefix.into();
        self
    }

    /// Set worker stack size
    pub fn with_worker_stack_size(mut self, bytes: usize) -> Self {
        self.worker_stack_size = Some(bytes);
        self
    }

    /// Set cancellation policy
    pub fn with_cancellation(mut self, policy: CancellationPolicy) -> Self {
        self.cancellation = policy;
        self
    }
}
