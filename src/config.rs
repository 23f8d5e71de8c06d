//! # Configuration Management Module
//!
//! ## Purpose
//! Centralized configuration for the statute pipeline, supporting TOML files
//! with environment-variable overrides, validation, and documented defaults
//! for every threshold the pipeline recognizes.
//!
//! ## Configuration Sources (in order of precedence)
//! 1. Environment variables (`STATUTE_PIPELINE_*`)
//! 2. Configuration file (TOML)
//! 3. Default values
//!
//! ## Usage
//! ```rust,no_run
//! use statute_pipeline::config::Config;
//!
//! let config = Config::from_file("config.toml").unwrap();
//! println!("dedup name threshold: {}", config.dedup.name_threshold);
//! ```

use crate::errors::{PipelineError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure containing all pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Duplicate resolution thresholds
    pub dedup: DedupConfig,
    /// Base grouping thresholds and oracle budget
    pub grouping: GroupingConfig,
    /// Section timeline thresholds and expiration rule
    pub timeline: TimelineConfig,
    /// Decision oracle gateway settings
    pub oracle: OracleConfig,
    /// Staged batch execution settings
    pub pipeline: PipelineConfig,
    /// Checkpoint storage settings
    pub storage: StorageConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

/// Duplicate resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Minimum name similarity for two statutes to be duplicate candidates
    pub name_threshold: f64,
    /// Minimum content-fingerprint similarity for duplicates
    pub content_threshold: f64,
}

/// Base grouping configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingConfig {
    /// Base-name similarity at or above which statutes join one candidate group
    pub merge_threshold: f64,
    /// Minimum oracle confidence for a lineage relationship to force a merge
    pub lineage_confidence_threshold: f64,
    /// Upper bound on oracle-classified candidate pairs per jurisdiction
    pub max_oracle_pairs: usize,
}

/// Section timeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Section-number similarity threshold for timeline matching
    pub number_threshold: f64,
    /// Section-definition similarity threshold
    pub definition_threshold: f64,
    /// Section body-text similarity threshold
    pub text_threshold: f64,
    /// Days after which a time-limited instrument's latest version expires
    pub expiration_window_days: i64,
    /// Extension point for re-promulgation semantics; when enabled, a renewal
    /// of an expired ordinance restarts its expiration clock. Off by default
    /// because upstream semantics are underspecified.
    pub reset_on_repromulgation: bool,
}

/// Decision oracle gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Remote oracle endpoint; when absent, the deterministic fallback adapter
    /// serves as the primary oracle
    pub endpoint: Option<String>,
    /// API key for the remote oracle
    pub api_key: Option<String>,
    /// Answers below this confidence are replaced by the fallback path
    pub confidence_threshold: f64,
    /// Cache time-to-live for oracle responses (seconds)
    pub cache_ttl_seconds: u64,
    /// Global ceiling on concurrent outstanding oracle calls
    pub max_concurrent_calls: usize,
    /// Per-call timeout; a timeout is treated as oracle-unavailable
    pub call_timeout_ms: u64,
    /// Consecutive failures before the circuit breaker opens
    pub breaker_failure_threshold: u32,
    /// Cooldown while the breaker is open (seconds)
    pub breaker_cooldown_seconds: u64,
}

/// Batch execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Worker-pool size for CPU-bound stages
    pub worker_pool_size: usize,
    /// Evaluation date for timeline status; defaults to today when absent
    pub evaluation_date: Option<NaiveDate>,
}

/// Checkpoint storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Sled database path
    pub db_path: PathBuf,
    /// Compress large text payloads before writing
    pub enable_compression: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Config {
    /// Load configuration from default location
    pub fn load() -> Result<Self> {
        Self::from_file("config.toml")
    }

    /// Load configuration from a specific file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| PipelineError::Config {
                message: format!("failed to read config file {:?}: {}", path, e),
            })?;
            toml::from_str(&content).map_err(|e| PipelineError::Config {
                message: format!("failed to parse config file {:?}: {}", path, e),
            })?
        } else {
            tracing::warn!("configuration file not found: {:?}, using defaults", path);
            Self::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(db_path) = std::env::var("STATUTE_PIPELINE_DB_PATH") {
            self.storage.db_path = PathBuf::from(db_path);
        }
        if let Ok(endpoint) = std::env::var("STATUTE_PIPELINE_ORACLE_ENDPOINT") {
            self.oracle.endpoint = Some(endpoint);
        }
        if let Ok(api_key) = std::env::var("STATUTE_PIPELINE_ORACLE_API_KEY") {
            self.oracle.api_key = Some(api_key);
        }
        if let Ok(level) = std::env::var("STATUTE_PIPELINE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(workers) = std::env::var("STATUTE_PIPELINE_WORKERS") {
            self.pipeline.worker_pool_size =
                workers.parse().map_err(|_| PipelineError::Config {
                    message: "invalid worker count in STATUTE_PIPELINE_WORKERS".to_string(),
                })?;
        }
        Ok(())
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        let unit_fields = [
            ("dedup.name_threshold", self.dedup.name_threshold),
            ("dedup.content_threshold", self.dedup.content_threshold),
            ("grouping.merge_threshold", self.grouping.merge_threshold),
            (
                "grouping.lineage_confidence_threshold",
                self.grouping.lineage_confidence_threshold,
            ),
            ("timeline.number_threshold", self.timeline.number_threshold),
            (
                "timeline.definition_threshold",
                self.timeline.definition_threshold,
            ),
            ("timeline.text_threshold", self.timeline.text_threshold),
            (
                "oracle.confidence_threshold",
                self.oracle.confidence_threshold,
            ),
        ];
        for (field, value) in unit_fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(PipelineError::ValidationFailed {
                    field: field.to_string(),
                    reason: format!("must be within [0, 1], got {}", value),
                });
            }
        }

        if self.pipeline.worker_pool_size == 0 {
            return Err(PipelineError::ValidationFailed {
                field: "pipeline.worker_pool_size".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.oracle.max_concurrent_calls == 0 {
            return Err(PipelineError::ValidationFailed {
                field: "oracle.max_concurrent_calls".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.oracle.call_timeout_ms == 0 {
            return Err(PipelineError::ValidationFailed {
                field: "oracle.call_timeout_ms".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.timeline.expiration_window_days <= 0 {
            return Err(PipelineError::ValidationFailed {
                field: "timeline.expiration_window_days".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    /// Get configuration as TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| PipelineError::Config {
            message: format!("failed to serialize config to TOML: {}", e),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dedup: DedupConfig::default(),
            grouping: GroupingConfig::default(),
            timeline: TimelineConfig::default(),
            oracle: OracleConfig::default(),
            pipeline: PipelineConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            name_threshold: 0.9,
            content_threshold: 0.85,
        }
    }
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            merge_threshold: 0.8,
            lineage_confidence_threshold: 0.65,
            max_oracle_pairs: 500,
        }
    }
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            number_threshold: 0.85,
            definition_threshold: 0.85,
            text_threshold: 0.80,
            // Six months, expressed in days to keep expiry a pure date computation
            expiration_window_days: 183,
            reset_on_repromulgation: false,
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            confidence_threshold: 0.6,
            cache_ttl_seconds: 3600,
            max_concurrent_calls: 8,
            call_timeout_ms: 10_000,
            breaker_failure_threshold: 5,
            breaker_cooldown_seconds: 60,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: 8,
            evaluation_date: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/statute_pipeline.db"),
            enable_compression: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
