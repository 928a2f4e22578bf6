pub mod arena;
pub mod config;
pub mod metrics;
pub mod node;
pub mod task;

pub use arena::{FinalResult, Match, MatchConfig, MatchStatus, Submission};
pub use config::{
    AllocatorConfig, Config, DatabaseConfig, LoggingConfig, MonitoringConfig, QueueConfig,
};
pub use metrics::{
    Alert, AlertSeverity, AllocationUpdate, MetricKind, MetricSample, Prediction,
    PredictiveSignal, QueueSnapshot, RecommendedAction, ScaleReason, SchedulerStatus, Trend,
};
pub use node::{HandlerRef, Node, NodeMetrics};
pub use task::{NewTask, Task, TaskResult, TaskStatus, DEFAULT_PRIORITY};
