// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration
//!
//! Loaded from a TOML file (usually `rc.toml`). Every section is optional;
//! missing values fall back to the defaults below. Capacity and strategy are
//! resolved per unit by the longest matching `[[constraint]]` prefix.

use rc_core::{ConstraintUnit, Strategy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub store: StoreConfig,
    pub admission: AdmissionConfig,
    pub defaults: ConstraintSpec,
    #[serde(rename = "constraint")]
    pub constraints: Vec<ConstraintRule>,
    pub maintenance: MaintenanceConfig,
    pub gate: GateConfig,
}

/// Where the durable store lives
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub dir: Option<PathBuf>,
    pub machine_id: Option<String>,
}

/// Retry budgets for store contention
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdmissionConfig {
    /// Registration attempts before `UnableToRegister`
    pub max_register_attempts: u32,
    /// Re-reads allowed while a promotion scan keeps conflicting
    pub max_promotion_attempts: u32,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_register_attempts: 5,
            max_promotion_attempts: 5,
        }
    }
}

impl AdmissionConfig {
    pub fn with_max_register_attempts(mut self, attempts: u32) -> Self {
        self.max_register_attempts = attempts;
        self
    }

    pub fn with_max_promotion_attempts(mut self, attempts: u32) -> Self {
        self.max_promotion_attempts = attempts;
        self
    }
}

/// Capacity and strategy of one unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConstraintSpec {
    pub capacity: u64,
    pub strategy: Strategy,
}

impl Default for ConstraintSpec {
    fn default() -> Self {
        Self {
            capacity: 1,
            strategy: Strategy::Fifo,
        }
    }
}

impl ConstraintSpec {
    pub fn new(capacity: u64, strategy: Strategy) -> Self {
        Self { capacity, strategy }
    }
}

/// Overrides the defaults for units starting with `prefix`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConstraintRule {
    pub prefix: String,
    pub capacity: u64,
    #[serde(default)]
    pub strategy: Strategy,
}

/// Background sweep settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MaintenanceConfig {
    /// How often to sweep
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// How long finished and rejected consumers are kept; `None` keeps them forever
    #[serde(with = "humantime_serde")]
    pub retain_terminal: Option<Duration>,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            retain_terminal: Some(Duration::from_secs(24 * 60 * 60)),
        }
    }
}

impl MaintenanceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_retain_terminal(mut self, retain: Option<Duration>) -> Self {
        self.retain_terminal = retain;
        self
    }
}

/// How a gated caller waits for promotion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GateConfig {
    /// Fallback re-check of the store while parked
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Cancel the registration after waiting this long
    #[serde(with = "humantime_serde")]
    pub wait_timeout: Option<Duration>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            wait_timeout: None,
        }
    }
}

impl GateConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_wait_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.wait_timeout = timeout;
        self
    }
}

impl Config {
    /// Parse and validate a TOML document
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn with_defaults(mut self, spec: ConstraintSpec) -> Self {
        self.defaults = spec;
        self
    }

    pub fn with_rule(mut self, prefix: impl Into<String>, spec: ConstraintSpec) -> Self {
        self.constraints.push(ConstraintRule {
            prefix: prefix.into(),
            capacity: spec.capacity,
            strategy: spec.strategy,
        });
        self
    }

    pub fn with_admission(mut self, admission: AdmissionConfig) -> Self {
        self.admission = admission;
        self
    }

    pub fn with_gate(mut self, gate: GateConfig) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_maintenance(mut self, maintenance: MaintenanceConfig) -> Self {
        self.maintenance = maintenance;
        self
    }

    /// Reject values that would make admission meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.defaults.capacity == 0 {
            return Err(ConfigError::Invalid(
                "defaults.capacity must be at least 1".to_string(),
            ));
        }
        if let Some(rule) = self.constraints.iter().find(|r| r.capacity == 0) {
            return Err(ConfigError::Invalid(format!(
                "constraint {:?}: capacity must be at least 1",
                rule.prefix
            )));
        }
        if self.admission.max_register_attempts == 0 {
            return Err(ConfigError::Invalid(
                "admission.max_register_attempts must be at least 1".to_string(),
            ));
        }
        if self.admission.max_promotion_attempts == 0 {
            return Err(ConfigError::Invalid(
                "admission.max_promotion_attempts must be at least 1".to_string(),
            ));
        }
        if self.maintenance.interval.is_zero() {
            return Err(ConfigError::Invalid(
                "maintenance.interval must be positive".to_string(),
            ));
        }
        if self.gate.poll_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "gate.poll_interval must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Capacity and strategy for a unit: longest matching prefix, else defaults
    pub fn spec_for(&self, unit: &ConstraintUnit) -> ConstraintSpec {
        self.constraints
            .iter()
            .filter(|rule| unit.as_str().starts_with(&rule.prefix))
            .max_by_key(|rule| rule.prefix.len())
            .map(|rule| ConstraintSpec::new(rule.capacity, rule.strategy))
            .unwrap_or(self.defaults)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
