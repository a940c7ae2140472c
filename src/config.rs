//! Configuration management for the trajectory sentinel service

use crate::error::{EngineError, Result as EngineResult};
use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub nats: NatsConfig,
    #[serde(default)]
    pub model: ModelConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Request/reply subject for trajectory analysis
    pub analyze_subject: String,
    /// Subject for advisory zone context payloads
    pub zone_context_subject: String,
    /// Subject for subject status updates
    pub status_subject: String,
    /// Subject for outgoing anomaly alerts
    pub alert_subject: String,
    /// Subject consumed by the audit ledger service
    #[serde(default = "default_audit_subject")]
    pub audit_subject: String,
}

fn default_audit_subject() -> String {
    "audit.log".to_string()
}

/// Isolation forest configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ModelConfig {
    /// Number of isolation trees
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
    /// Upper bound on rows sampled per tree
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
    /// Expected outlier fraction of the training corpus, in (0, 0.5]
    #[serde(default = "default_contamination")]
    pub contamination: f64,
    /// Seed for tree construction; random when absent
    #[serde(default)]
    pub random_state: Option<u64>,
}

fn default_n_estimators() -> usize {
    100
}

fn default_max_samples() -> usize {
    256
}

fn default_contamination() -> f64 {
    0.2
}

impl ModelConfig {
    /// Reject parameters the isolation forest cannot work with.
    pub fn validate(&self) -> EngineResult<()> {
        if self.n_estimators == 0 {
            return Err(EngineError::InvalidParameter(
                "n_estimators must be at least 1".to_string(),
            ));
        }
        if self.max_samples == 0 {
            return Err(EngineError::InvalidParameter(
                "max_samples must be at least 1".to_string(),
            ));
        }
        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            return Err(EngineError::InvalidParameter(format!(
                "contamination must be in (0, 0.5], got {}",
                self.contamination
            )));
        }
        Ok(())
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            n_estimators: default_n_estimators(),
            max_samples: default_max_samples(),
            contamination: default_contamination(),
            random_state: None,
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of requests handled concurrently
    pub workers: usize,
    /// Interval between metrics summaries, in seconds
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_secs: u64,
}

fn default_metrics_interval() -> u64 {
    30
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path, with `SENTINEL__` environment overrides
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("SENTINEL").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        Self::finish(config)
    }

    /// Load configuration from an in-memory TOML document
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .context("Failed to build configuration")?;

        Self::finish(config)
    }

    fn finish(config: Config) -> Result<Self> {
        let app: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app.model
            .validate()
            .context("Invalid model configuration")?;

        Ok(app)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            nats: NatsConfig {
                url: "nats://localhost:4222".to_string(),
                analyze_subject: "sentinel.analyze".to_string(),
                zone_context_subject: "sentinel.zone_context".to_string(),
                status_subject: "sentinel.status".to_string(),
                alert_subject: "sentinel.alerts".to_string(),
                audit_subject: default_audit_subject(),
            },
            model: ModelConfig::default(),
            pipeline: PipelineConfig {
                workers: 4,
                metrics_interval_secs: default_metrics_interval(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [nats]
        url = "nats://broker:4222"
        analyze_subject = "sentinel.analyze"
        zone_context_subject = "sentinel.zone_context"
        status_subject = "sentinel.status"
        alert_subject = "sentinel.alerts"

        [model]
        contamination = 0.1
        random_state = 7

        [pipeline]
        workers = 8

        [logging]
        level = "debug"
        format = "json"
    "#;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.nats.url, "nats://localhost:4222");
        assert_eq!(config.nats.audit_subject, "audit.log");
        assert_eq!(config.model.contamination, 0.2);
        assert_eq!(config.model.n_estimators, 100);
        assert_eq!(config.model.max_samples, 256);
        assert!(config.model.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml() {
        let config = AppConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.nats.url, "nats://broker:4222");
        assert_eq!(config.nats.audit_subject, "audit.log");
        assert_eq!(config.model.contamination, 0.1);
        assert_eq!(config.model.random_state, Some(7));
        assert_eq!(config.model.n_estimators, 100);
        assert_eq!(config.pipeline.workers, 8);
        assert_eq!(config.pipeline.metrics_interval_secs, 30);
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_invalid_contamination_rejected() {
        let toml = SAMPLE.replace("contamination = 0.1", "contamination = 0.9");
        assert!(AppConfig::from_toml_str(&toml).is_err());

        let config = ModelConfig {
            contamination: 0.0,
            ..ModelConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(EngineError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_zero_estimators_rejected() {
        let config = ModelConfig {
            n_estimators: 0,
            ..ModelConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
