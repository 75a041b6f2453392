//! Configuration loading for the Rampart CLI.

use anyhow::{Context, Result};
use rampart_core::indicators::AddressFormat;
use rampart_core::ExecutionConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Executor settings.
    #[serde(default)]
    pub executor: ExecutorSettings,

    /// Indicator extraction settings.
    #[serde(default)]
    pub indicators: IndicatorSettings,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl AppConfig {
    /// Loads configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// The executor configuration this app config describes.
    pub fn execution_config(&self) -> ExecutionConfig {
        ExecutionConfig {
            max_concurrency: self.executor.max_concurrency,
            connector_timeout: Duration::from_secs(self.executor.connector_timeout_secs),
        }
    }

    /// Extra address formats declared in the config.
    pub fn extra_formats(&self) -> Vec<AddressFormat> {
        self.indicators
            .extra_formats
            .iter()
            .map(|f| AddressFormat::new(f.name.clone(), f.pattern.clone()))
            .collect()
    }
}

/// Executor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorSettings {
    /// Worker pool size.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Per-call connector timeout in seconds.
    #[serde(default = "default_connector_timeout")]
    pub connector_timeout_secs: u64,
}

fn default_max_concurrency() -> usize {
    4
}

fn default_connector_timeout() -> u64 {
    30
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            connector_timeout_secs: default_connector_timeout(),
        }
    }
}

/// Indicator extraction settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndicatorSettings {
    /// Address formats registered in addition to the built-in catalog.
    #[serde(default)]
    pub extra_formats: Vec<ExtraFormat>,
}

/// One extra address format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtraFormat {
    /// Format name reported on extracted indicators.
    pub name: String,
    /// Candidate regex.
    pub pattern: String,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON-formatted logs.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.executor.max_concurrency, 4);
        assert_eq!(config.executor.connector_timeout_secs, 30);
        assert_eq!(config.logging.level, "info");
        assert!(config.indicators.extra_formats.is_empty());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
executor:
  max_concurrency: 8
indicators:
  extra_formats:
    - name: dash
      pattern: "\\bX[1-9A-HJ-NP-Za-km-z]{33}\\b"
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.executor.max_concurrency, 8);
        assert_eq!(config.executor.connector_timeout_secs, 30);
        assert_eq!(config.indicators.extra_formats.len(), 1);
        assert_eq!(config.extra_formats()[0].name, "dash");
    }

    #[test]
    fn test_execution_config_conversion() {
        let config = AppConfig::default();
        let execution = config.execution_config();
        assert_eq!(execution.max_concurrency, 4);
        assert_eq!(execution.connector_timeout, Duration::from_secs(30));
    }
}
