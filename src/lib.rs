//! Orchestra - adaptive task orchestration core
//!
//! Orchestra runs typed tasks through a priority queue whose concurrency
//! ceiling is tuned by a resource allocator fed from periodic host samples.
//! It also tracks worker nodes, raises health alerts and resolves arena
//! matches where several nodes compete on a solution.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Models, errors and port traits
//! - **Service Layer** (`services`): Queue, allocator, metrics, registry and arena
//! - **Application Layer** (`application`): The `TaskManager` facade and the resource monitor
//! - **Infrastructure Layer** (`infrastructure`): Stores, config, logging and host metrics
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use orchestra::{Config, NewTask, TaskManager};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let manager = TaskManager::initialize(Config::default()).await?;
//!     let task = manager.create_task(NewTask::new("echo", "hello", serde_json::json!({}))).await?;
//!     println!("{}", task.id);
//!     Ok(())
//! }
//! ```

pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::{RecoveryReport, ResourceMonitor, TaskManager};
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    Alert, AlertSeverity, AllocationUpdate, Config, Match, MatchConfig, MatchStatus, MetricSample,
    NewTask, Node, SchedulerStatus, Task, TaskResult, TaskStatus,
};
pub use domain::ports::{executor_fn, ExecutionContext, MetricsSource, TaskExecutor, TaskStore};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{EventBus, TaskEvent, TaskEventKind, TaskHandle};
