//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines async trait interfaces that adapters must implement:
//! - TaskStore: durable or in-memory task persistence
//! - TaskExecutor: per-type work handlers
//! - SolutionJudge: arena result selection
//! - MetricsSource: host resource readings
//! - TaskSpawner: follow-up task creation
//!
//! These traits keep the scheduling core independent of specific
//! infrastructure implementations.

pub mod errors;
pub mod executor;
pub mod judge;
pub mod metrics_source;
pub mod task_spawner;
pub mod task_store;

pub use errors::DatabaseError;
pub use executor::{executor_fn, ExecutionContext, FnExecutor, TaskExecutor};
pub use judge::SolutionJudge;
pub use metrics_source::{MetricsSource, ResourceReading};
pub use task_spawner::TaskSpawner;
pub use task_store::{StoreMode, TaskStore};
