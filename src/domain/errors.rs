//! Domain errors for the orchestration core.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors that can occur while scheduling work.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Bad task, node or match input. Rejected before enqueue, never retried.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("No executor registered for task type '{0}'")]
    UnknownExecutorType(String),

    #[error("Executor failed: {0}")]
    ExecutorRuntime(String),

    #[error("Allocator evaluation skipped: {0}")]
    AllocatorDegraded(String),

    #[error("Persistence unavailable: {0}")]
    PersistenceUnavailable(String),

    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Match not found: {0}")]
    MatchNotFound(Uuid),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("No handler available for node {0}")]
    NoHandlerAvailable(String),

    #[error("Node {node_id} is at capacity ({max_concurrent_tasks} concurrent tasks)")]
    NodeAtCapacity {
        node_id: String,
        max_concurrent_tasks: u32,
    },

    #[error("Match {match_id} is full ({max_players} players)")]
    MatchFull { match_id: Uuid, max_players: usize },

    #[error("Match {0} no longer accepts changes")]
    MatchClosed(Uuid),

    #[error("Node {node_id} is not a participant of match {match_id}")]
    NotParticipant { match_id: Uuid, node_id: String },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// Whether this error corresponds to an unknown identifier.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::TaskNotFound(_) | Self::MatchNotFound(_) | Self::NodeNotFound(_)
        )
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(err.to_string())
    }
}
