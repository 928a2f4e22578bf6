use crate::domain::models::Task;
use crate::domain::ports::errors::DatabaseError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Durability of a task store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// Tasks survive a restart
    Durable,
    /// Tasks live in process memory only
    Ephemeral,
}

impl std::fmt::Display for StoreMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Durable => write!(f, "durable"),
            Self::Ephemeral => write!(f, "ephemeral"),
        }
    }
}

/// Repository port for task persistence operations
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Which persistence strategy backs this store
    fn mode(&self) -> StoreMode;

    /// Insert a new task
    async fn insert(&self, task: &Task) -> Result<(), DatabaseError>;

    /// Overwrite an existing task
    async fn update(&self, task: &Task) -> Result<(), DatabaseError>;

    /// Get a task by ID
    async fn get(&self, id: Uuid) -> Result<Option<Task>, DatabaseError>;

    /// Most recently created tasks first
    async fn list_recent(&self, limit: usize) -> Result<Vec<Task>, DatabaseError>;

    /// Tasks that have not reached a terminal state, oldest first
    async fn list_unfinished(&self) -> Result<Vec<Task>, DatabaseError>;

    /// Delete terminal tasks completed before `cutoff`, returning how many were removed
    async fn delete_finished_before(&self, cutoff: DateTime<Utc>) -> Result<u64, DatabaseError>;
}
