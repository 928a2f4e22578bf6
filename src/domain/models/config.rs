use serde::{Deserialize, Serialize};

/// Main configuration structure for Orchestra
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Task queue configuration
    #[serde(default)]
    pub queue: QueueConfig,

    /// Concurrency allocator configuration
    #[serde(default)]
    pub allocator: AllocatorConfig,

    /// Metrics sampling and alerting configuration
    #[serde(default)]
    pub monitoring: MonitoringConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Task queue configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct QueueConfig {
    /// Concurrency ceiling before the allocator makes its first adjustment
    #[serde(default = "default_initial_concurrent")]
    pub initial_concurrent: usize,

    /// Retry attempts for tasks that do not specify their own
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,

    /// Delay between retry attempts in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

const fn default_initial_concurrent() -> usize {
    4
}

const fn default_max_retries() -> u32 {
    0
}

const fn default_retry_delay_ms() -> u64 {
    1000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            initial_concurrent: default_initial_concurrent(),
            default_max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// Hysteresis controller settings for the concurrency ceiling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AllocatorConfig {
    #[serde(default = "default_min_concurrent")]
    pub min_concurrent: usize,

    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// CPU percentage at or above which the ceiling is lowered
    #[serde(default = "default_cpu_high")]
    pub cpu_high: f64,

    /// CPU percentage at or below which the ceiling may be raised
    #[serde(default = "default_cpu_low")]
    pub cpu_low: f64,

    #[serde(default = "default_mem_high")]
    pub mem_high: f64,

    #[serde(default = "default_mem_low")]
    pub mem_low: f64,

    #[serde(default = "default_scale_step")]
    pub scale_step: usize,

    /// Minimum time between two ceiling changes
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Queue length needed before the ceiling is raised
    #[serde(default = "default_queue_pressure_threshold")]
    pub queue_pressure_threshold: usize,
}

const fn default_min_concurrent() -> usize {
    1
}

const fn default_max_concurrent() -> usize {
    16
}

const fn default_cpu_high() -> f64 {
    80.0
}

const fn default_cpu_low() -> f64 {
    40.0
}

const fn default_mem_high() -> f64 {
    85.0
}

const fn default_mem_low() -> f64 {
    50.0
}

const fn default_scale_step() -> usize {
    1
}

const fn default_cooldown_ms() -> u64 {
    30_000
}

const fn default_queue_pressure_threshold() -> usize {
    5
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            min_concurrent: default_min_concurrent(),
            max_concurrent: default_max_concurrent(),
            cpu_high: default_cpu_high(),
            cpu_low: default_cpu_low(),
            mem_high: default_mem_high(),
            mem_low: default_mem_low(),
            scale_step: default_scale_step(),
            cooldown_ms: default_cooldown_ms(),
            queue_pressure_threshold: default_queue_pressure_threshold(),
        }
    }
}

/// Metrics sampling, retention and alert thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MonitoringConfig {
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,

    /// How long samples are kept in the rolling history
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// Window used by trend and predictive analysis
    #[serde(default = "default_trend_window_secs")]
    pub trend_window_secs: u64,

    #[serde(default = "default_cpu_warning")]
    pub cpu_warning: f64,

    #[serde(default = "default_cpu_critical")]
    pub cpu_critical: f64,

    #[serde(default = "default_cpu_warning")]
    pub memory_warning: f64,

    #[serde(default = "default_cpu_critical")]
    pub memory_critical: f64,

    /// Soft thresholds used by predictive analysis
    #[serde(default = "default_soft_threshold")]
    pub cpu_soft: f64,

    #[serde(default = "default_soft_threshold")]
    pub memory_soft: f64,

    #[serde(default = "default_queue_soft")]
    pub queue_soft: f64,
}

const fn default_sample_interval_ms() -> u64 {
    5000
}

const fn default_retention_secs() -> u64 {
    3600
}

const fn default_trend_window_secs() -> u64 {
    300
}

const fn default_cpu_warning() -> f64 {
    75.0
}

const fn default_cpu_critical() -> f64 {
    90.0
}

const fn default_soft_threshold() -> f64 {
    60.0
}

const fn default_queue_soft() -> f64 {
    20.0
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: default_sample_interval_ms(),
            retention_secs: default_retention_secs(),
            trend_window_secs: default_trend_window_secs(),
            cpu_warning: default_cpu_warning(),
            cpu_critical: default_cpu_critical(),
            memory_warning: default_cpu_warning(),
            memory_critical: default_cpu_critical(),
            cpu_soft: default_soft_threshold(),
            memory_soft: default_soft_threshold(),
            queue_soft: default_queue_soft(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Use the durable `SQLite` store when reachable
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

const fn default_true() -> bool {
    true
}

fn default_database_path() -> String {
    ".orchestra/orchestra.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Rotation for file output: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}
