//! EventBus service for typed event streaming.
//!
//! Each event category has its own broadcast channel so consumers subscribe
//! to a narrow stream (task lifecycle, allocation changes, metric samples,
//! alerts, aggregate scheduler status) instead of filtering one global feed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::models::{Alert, AllocationUpdate, MetricSample, SchedulerStatus};

/// Monotonically increasing sequence number assigned to lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(pub u64);

impl SequenceNumber {
    pub fn zero() -> Self {
        Self(0)
    }
}

impl std::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What happened to a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum TaskEventKind {
    Created,
    Queued,
    Started,
    Progress {
        percent: u8,
    },
    Retrying {
        attempt: u32,
        max_retries: u32,
        error: String,
    },
    Completed {
        result: Value,
        execution_time_ms: u64,
    },
    Failed {
        error: String,
        execution_time_ms: u64,
    },
    Cancelled,
}

impl TaskEventKind {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Failed { .. } | Self::Cancelled
        )
    }
}

/// Task lifecycle event envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub sequence: SequenceNumber,
    pub timestamp: DateTime<Utc>,
    pub task_id: Uuid,
    pub task_type: String,
    pub kind: TaskEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "alert", rename_all = "snake_case")]
pub enum AlertEvent {
    Raised(Alert),
    Resolved(Alert),
}

/// Configuration for EventBus.
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Capacity of each broadcast channel.
    pub channel_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

/// Fan-out hub for all event categories.
///
/// Publishing never blocks and never fails: events sent while nobody is
/// subscribed are dropped, and slow subscribers observe `Lagged`.
pub struct EventBus {
    tasks: broadcast::Sender<TaskEvent>,
    allocations: broadcast::Sender<AllocationUpdate>,
    samples: broadcast::Sender<MetricSample>,
    alerts: broadcast::Sender<AlertEvent>,
    status: broadcast::Sender<SchedulerStatus>,
    sequence: AtomicU64,
}

impl EventBus {
    pub fn new(config: EventBusConfig) -> Self {
        let capacity = config.channel_capacity.max(1);
        Self {
            tasks: broadcast::channel(capacity).0,
            allocations: broadcast::channel(capacity).0,
            samples: broadcast::channel(capacity).0,
            alerts: broadcast::channel(capacity).0,
            status: broadcast::channel(capacity).0,
            sequence: AtomicU64::new(0),
        }
    }

    /// Publish a lifecycle event, assigning the next sequence number.
    pub fn publish_task(&self, task_id: Uuid, task_type: &str, kind: TaskEventKind) -> SequenceNumber {
        let sequence = SequenceNumber(self.sequence.fetch_add(1, Ordering::SeqCst));
        let event = TaskEvent {
            sequence,
            timestamp: Utc::now(),
            task_id,
            task_type: task_type.to_string(),
            kind,
        };
        tracing::trace!(task_id = %task_id, sequence = %sequence, kind = ?event.kind, "task event");
        let _ = self.tasks.send(event);
        sequence
    }

    pub fn publish_allocation(&self, update: AllocationUpdate) {
        let _ = self.allocations.send(update);
    }

    pub fn publish_sample(&self, sample: MetricSample) {
        let _ = self.samples.send(sample);
    }

    pub fn publish_alert(&self, event: AlertEvent) {
        let _ = self.alerts.send(event);
    }

    pub fn publish_status(&self, status: SchedulerStatus) {
        let _ = self.status.send(status);
    }

    pub fn subscribe_tasks(&self) -> broadcast::Receiver<TaskEvent> {
        self.tasks.subscribe()
    }

    pub fn subscribe_allocations(&self) -> broadcast::Receiver<AllocationUpdate> {
        self.allocations.subscribe()
    }

    pub fn subscribe_samples(&self) -> broadcast::Receiver<MetricSample> {
        self.samples.subscribe()
    }

    pub fn subscribe_alerts(&self) -> broadcast::Receiver<AlertEvent> {
        self.alerts.subscribe()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<SchedulerStatus> {
        self.status.subscribe()
    }

    /// Get the next sequence number to be assigned.
    pub fn current_sequence(&self) -> SequenceNumber {
        SequenceNumber(self.sequence.load(Ordering::SeqCst))
    }

    /// Number of lifecycle subscribers.
    pub fn task_subscriber_count(&self) -> usize {
        self.tasks.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventBusConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::AlertSeverity;

    #[tokio::test]
    async fn test_task_events_are_sequenced() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_tasks();
        let id = Uuid::new_v4();

        bus.publish_task(id, "echo", TaskEventKind::Created);
        bus.publish_task(id, "echo", TaskEventKind::Queued);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.sequence, SequenceNumber(0));
        assert_eq!(second.sequence, SequenceNumber(1));
        assert_eq!(second.kind, TaskEventKind::Queued);
        assert_eq!(bus.current_sequence(), SequenceNumber(2));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_harmless() {
        let bus = EventBus::default();
        bus.publish_task(Uuid::new_v4(), "echo", TaskEventKind::Started);
        bus.publish_alert(AlertEvent::Raised(Alert::new(
            AlertSeverity::Info,
            "nobody listening",
            None,
        )));
        assert_eq!(bus.task_subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_categories_are_independent() {
        let bus = EventBus::default();
        let mut alerts = bus.subscribe_alerts();
        let mut tasks = bus.subscribe_tasks();

        bus.publish_alert(AlertEvent::Raised(Alert::new(
            AlertSeverity::Warning,
            "CPU usage high",
            None,
        )));

        assert!(matches!(alerts.recv().await.unwrap(), AlertEvent::Raised(_)));
        assert!(matches!(
            tasks.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[test]
    fn test_terminal_kinds() {
        assert!(TaskEventKind::Cancelled.is_terminal());
        assert!(!TaskEventKind::Progress { percent: 10 }.is_terminal());
    }
}
