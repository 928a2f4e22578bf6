//! Health sampling, alerting and allocation models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::node::NodeMetrics;

/// One periodic observation of system and queue state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub cpu_usage_percent: f64,
    pub memory_usage_percent: f64,
    pub queue_length: usize,
    pub processing: usize,
    #[serde(default)]
    pub per_node_metrics: Vec<NodeMetrics>,
}

impl MetricSample {
    pub fn new(cpu_usage_percent: f64, memory_usage_percent: f64) -> Self {
        Self {
            timestamp: Utc::now(),
            cpu_usage_percent,
            memory_usage_percent,
            queue_length: 0,
            processing: 0,
            per_node_metrics: Vec::new(),
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_queue(mut self, queue_length: usize, processing: usize) -> Self {
        self.queue_length = queue_length;
        self.processing = processing;
        self
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn value_of(&self, metric: MetricKind) -> f64 {
        match metric {
            MetricKind::CpuUsage => self.cpu_usage_percent,
            MetricKind::MemoryUsage => self.memory_usage_percent,
            MetricKind::QueueLength => self.queue_length as f64,
            MetricKind::Processing => self.processing as f64,
        }
    }
}

/// Metrics tracked in the rolling history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    CpuUsage,
    MemoryUsage,
    QueueLength,
    /// Tasks in flight; a throughput measure.
    Processing,
}

impl MetricKind {
    pub const ALL: [Self; 4] = [
        Self::CpuUsage,
        Self::MemoryUsage,
        Self::QueueLength,
        Self::Processing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CpuUsage => "cpu_usage",
            Self::MemoryUsage => "memory_usage",
            Self::QueueLength => "queue_length",
            Self::Processing => "processing",
        }
    }

    pub fn higher_is_better(&self) -> bool {
        matches!(self, Self::Processing)
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub severity: AlertSeverity,
    pub message: String,
    pub service: Option<String>,
    pub metric: Option<MetricKind>,
    pub value: f64,
    pub created_at: DateTime<Utc>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn new(severity: AlertSeverity, message: impl Into<String>, service: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            severity,
            message: message.into(),
            service,
            metric: None,
            value: 0.0,
            created_at: Utc::now(),
            resolved: false,
            resolved_at: None,
        }
    }

    pub fn for_metric(mut self, metric: MetricKind, value: f64) -> Self {
        self.metric = Some(metric);
        self.value = value;
        self
    }

    /// Two unresolved alerts with the same key are duplicates.
    pub fn dedup_key(&self) -> (&str, Option<&str>) {
        (self.message.as_str(), self.service.as_deref())
    }

    pub fn resolve(&mut self) -> bool {
        if self.resolved {
            return false;
        }
        self.resolved = true;
        self.resolved_at = Some(Utc::now());
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Stable,
    Degrading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    Monitor,
    Investigate,
    ScaleUp,
}

/// A metric that is both trending the wrong way and above its soft threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictiveSignal {
    pub metric: MetricKind,
    pub current_value: f64,
    pub soft_threshold: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub signals: Vec<PredictiveSignal>,
    pub confidence: f64,
    pub recommended_action: RecommendedAction,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleReason {
    HighPressure,
    QueuePressure,
}

impl std::fmt::Display for ScaleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HighPressure => write!(f, "high_pressure"),
            Self::QueuePressure => write!(f, "queue_pressure"),
        }
    }
}

/// Emitted whenever the allocator moves the concurrency ceiling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationUpdate {
    pub previous: usize,
    pub current: usize,
    pub reason: ScaleReason,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub queue_length: usize,
    pub processing: usize,
    pub timestamp: DateTime<Utc>,
}

/// Queue occupancy at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub queue_length: usize,
    pub processing: usize,
    pub max_concurrent: usize,
}

/// Combined queue and allocator view exposed to collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub queue_length: usize,
    pub processing: usize,
    pub max_concurrent: usize,
    pub min_concurrent: usize,
    pub last_scale_at: Option<DateTime<Utc>>,
    pub cpu_usage: Option<f64>,
    pub memory_usage: Option<f64>,
}
