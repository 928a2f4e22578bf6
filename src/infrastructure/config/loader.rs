use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid concurrency bounds: min_concurrent ({0}) must be >= 1 and <= max_concurrent ({1})")]
    InvalidConcurrencyBounds(usize, usize),

    #[error("Invalid initial_concurrent: {0}. Must be between {1} and {2}")]
    InvalidInitialConcurrency(usize, usize, usize),

    #[error("Invalid scale_step: {0}. Must be at least 1")]
    InvalidScaleStep(usize),

    #[error("Invalid threshold {name}: {value}. Must be between 0 and 100")]
    ThresholdOutOfRange { name: &'static str, value: f64 },

    #[error("Invalid watermarks for {0}: low ({1}) must be below high ({2})")]
    InvertedWatermarks(&'static str, f64, f64),

    #[error("Invalid alert thresholds for {0}: warning ({1}) must be below critical ({2})")]
    InvertedAlertThresholds(&'static str, f64, f64),

    #[error("Invalid sample_interval_ms: {0}. Must be positive")]
    InvalidSampleInterval(u64),

    #[error("Invalid retention_secs: {0}. Must be positive")]
    InvalidRetention(u64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidLogRotation(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration relative to the current directory.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .orchestra/config.yaml
    /// 3. .orchestra/local.yaml (optional local overrides)
    /// 4. Environment variables (ORCHESTRA_* prefix, `__` separates sections)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(".")
    }

    /// Same as [`ConfigLoader::load`], with `.orchestra/` resolved under `root`.
    pub fn load_from_dir(root: impl AsRef<Path>) -> Result<Config> {
        let base = root.as_ref().join(".orchestra");
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(base.join("config.yaml")))
            .merge(Yaml::file(base.join("local.yaml")))
            .merge(Env::prefixed("ORCHESTRA_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let allocator = &config.allocator;
        if allocator.min_concurrent == 0 || allocator.min_concurrent > allocator.max_concurrent {
            return Err(ConfigError::InvalidConcurrencyBounds(
                allocator.min_concurrent,
                allocator.max_concurrent,
            ));
        }

        let initial = config.queue.initial_concurrent;
        if initial < allocator.min_concurrent || initial > allocator.max_concurrent {
            return Err(ConfigError::InvalidInitialConcurrency(
                initial,
                allocator.min_concurrent,
                allocator.max_concurrent,
            ));
        }

        if allocator.scale_step == 0 {
            return Err(ConfigError::InvalidScaleStep(allocator.scale_step));
        }

        let monitoring = &config.monitoring;
        let percentages = [
            ("allocator.cpu_high", allocator.cpu_high),
            ("allocator.cpu_low", allocator.cpu_low),
            ("allocator.mem_high", allocator.mem_high),
            ("allocator.mem_low", allocator.mem_low),
            ("monitoring.cpu_warning", monitoring.cpu_warning),
            ("monitoring.cpu_critical", monitoring.cpu_critical),
            ("monitoring.memory_warning", monitoring.memory_warning),
            ("monitoring.memory_critical", monitoring.memory_critical),
            ("monitoring.cpu_soft", monitoring.cpu_soft),
            ("monitoring.memory_soft", monitoring.memory_soft),
        ];
        for (name, value) in percentages {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::ThresholdOutOfRange { name, value });
            }
        }

        if allocator.cpu_low >= allocator.cpu_high {
            return Err(ConfigError::InvertedWatermarks(
                "cpu",
                allocator.cpu_low,
                allocator.cpu_high,
            ));
        }
        if allocator.mem_low >= allocator.mem_high {
            return Err(ConfigError::InvertedWatermarks(
                "memory",
                allocator.mem_low,
                allocator.mem_high,
            ));
        }

        if monitoring.cpu_warning >= monitoring.cpu_critical {
            return Err(ConfigError::InvertedAlertThresholds(
                "cpu",
                monitoring.cpu_warning,
                monitoring.cpu_critical,
            ));
        }
        if monitoring.memory_warning >= monitoring.memory_critical {
            return Err(ConfigError::InvertedAlertThresholds(
                "memory",
                monitoring.memory_warning,
                monitoring.memory_critical,
            ));
        }

        if monitoring.sample_interval_ms == 0 {
            return Err(ConfigError::InvalidSampleInterval(monitoring.sample_interval_ms));
        }
        if monitoring.retention_secs == 0 {
            return Err(ConfigError::InvalidRetention(monitoring.retention_secs));
        }

        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(
                config.database.max_connections,
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidLogRotation(
                config.logging.rotation.clone(),
            ));
        }

        Ok(())
    }
}
