//! Task domain model.
//!
//! Tasks are discrete units of work dispatched by the queue to the executor
//! registered for their type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

/// Priority assigned when the caller does not provide one.
pub const DEFAULT_PRIORITY: i32 = 0;

/// Status of a task in the execution pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task has been created but not yet handed to the queue
    Pending,
    /// Task is waiting in the queue for a free concurrency slot
    Queued,
    /// Task is currently being executed
    Running,
    /// Task completed successfully
    Completed,
    /// Task failed during execution
    Failed,
    /// Task was cancelled
    Cancelled,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Check if the task may still be cancelled.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::Pending | Self::Queued | Self::Running)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> Vec<TaskStatus> {
        match self {
            Self::Pending => vec![Self::Queued, Self::Cancelled],
            Self::Queued => vec![Self::Running, Self::Cancelled],
            Self::Running => vec![Self::Completed, Self::Failed, Self::Cancelled],
            Self::Completed | Self::Failed | Self::Cancelled => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str(s).ok_or_else(|| DomainError::Validation(format!("unknown task status: {s}")))
    }
}

/// A unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub task_type: String,
    pub name: String,
    pub priority: i32,
    pub payload: Value,
    pub metadata: Value,
    pub status: TaskStatus,
    pub progress_percent: u8,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Task {
    pub fn new(task_type: impl Into<String>, name: impl Into<String>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_type: task_type.into(),
            name: name.into(),
            priority: DEFAULT_PRIORITY,
            payload,
            metadata: Value::Null,
            status: TaskStatus::Pending,
            progress_percent: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            retry_count: 0,
            max_retries: 0,
            retry_delay_ms: 0,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, retry_delay_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.retry_delay_ms = retry_delay_ms;
        self
    }

    /// Reject malformed input before the task reaches the queue.
    pub fn validate(&self) -> DomainResult<()> {
        if self.task_type.trim().is_empty() {
            return Err(DomainError::Validation("task type cannot be empty".into()));
        }
        if self.name.trim().is_empty() {
            return Err(DomainError::Validation("task name cannot be empty".into()));
        }
        if self.name.len() > 256 {
            return Err(DomainError::Validation(format!(
                "task name exceeds 256 characters ({})",
                self.name.len()
            )));
        }
        Ok(())
    }

    /// Move to `new_status`, stamping timestamps along the way.
    pub fn transition_to(&mut self, new_status: TaskStatus) -> DomainResult<()> {
        if !self.status.can_transition_to(new_status) {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: new_status.to_string(),
            });
        }

        let now = Utc::now();
        match new_status {
            TaskStatus::Running => self.started_at = Some(now),
            TaskStatus::Completed => {
                self.progress_percent = 100;
                self.completed_at = Some(now);
            }
            TaskStatus::Failed | TaskStatus::Cancelled => self.completed_at = Some(now),
            TaskStatus::Pending | TaskStatus::Queued => {}
        }
        self.status = new_status;
        Ok(())
    }

    /// Record progress; values are clamped to 100 and never move backwards.
    pub fn record_progress(&mut self, percent: u8) -> u8 {
        if self.status == TaskStatus::Running {
            self.progress_percent = self.progress_percent.max(percent.min(100));
        }
        self.progress_percent
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }
}

/// Outcome handed back to whoever submitted a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: Uuid,
    pub success: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub execution_time_ms: u64,
}

impl TaskResult {
    pub fn success(task_id: Uuid, result: Value, execution_time_ms: u64) -> Self {
        Self {
            task_id,
            success: true,
            result: Some(result),
            error: None,
            execution_time_ms,
        }
    }

    pub fn failure(task_id: Uuid, error: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            task_id,
            success: false,
            result: None,
            error: Some(error.into()),
            execution_time_ms,
        }
    }
}

/// Caller-facing request to create a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub task_type: String,
    pub name: String,
    pub payload: Value,
    pub priority: Option<i32>,
    pub metadata: Option<Value>,
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

impl NewTask {
    pub fn new(task_type: impl Into<String>, name: impl Into<String>, payload: Value) -> Self {
        Self {
            task_type: task_type.into(),
            name: name.into(),
            payload,
            ..Default::default()
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn retries(mut self, max_retries: u32, retry_delay_ms: u64) -> Self {
        self.max_retries = Some(max_retries);
        self.retry_delay_ms = Some(retry_delay_ms);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_transitions_are_monotonic() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Queued));
        assert!(TaskStatus::Queued.can_transition_to(TaskStatus::Running));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Completed));
        assert!(!TaskStatus::Running.can_transition_to(TaskStatus::Queued));
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Cancelled));
        assert!(!TaskStatus::Queued.can_transition_to(TaskStatus::Completed));
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(TaskStatus::from_str("COMPLETED"), Some(TaskStatus::Completed));
        assert_eq!(TaskStatus::from_str("canceled"), Some(TaskStatus::Cancelled));
        assert_eq!(TaskStatus::from_str("bogus"), None);
        assert!("queued".parse::<TaskStatus>().is_ok());
    }

    #[test]
    fn test_transition_stamps_timestamps() {
        let mut task = Task::new("echo", "say hi", json!("hi"));
        task.transition_to(TaskStatus::Queued).unwrap();
        task.transition_to(TaskStatus::Running).unwrap();
        assert!(task.started_at.is_some());

        task.transition_to(TaskStatus::Completed).unwrap();
        assert!(task.completed_at.is_some());
        assert_eq!(task.progress_percent, 100);

        let err = task.transition_to(TaskStatus::Failed).unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
    }

    #[test]
    fn test_progress_never_decreases() {
        let mut task = Task::new("echo", "progress", Value::Null);
        assert_eq!(task.record_progress(40), 0, "progress ignored before running");

        task.transition_to(TaskStatus::Queued).unwrap();
        task.transition_to(TaskStatus::Running).unwrap();
        assert_eq!(task.record_progress(40), 40);
        assert_eq!(task.record_progress(20), 40);
        assert_eq!(task.record_progress(250), 100);
    }

    #[test]
    fn test_validate_rejects_empty_type() {
        let task = Task::new("  ", "name", Value::Null);
        assert!(matches!(task.validate(), Err(DomainError::Validation(_))));

        let task = Task::new("echo", "", Value::Null);
        assert!(task.validate().is_err());

        let task = Task::new("echo", "ok", Value::Null);
        assert!(task.validate().is_ok());
    }

    #[test]
    fn test_retry_budget() {
        let mut task = Task::new("echo", "retry", Value::Null).with_retries(2, 0);
        assert!(task.can_retry());
        task.retry_count = 2;
        assert!(!task.can_retry());
    }
}
