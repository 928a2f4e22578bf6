//! Coordinator that wires the queue, allocator, metrics, registry and arena
//! together behind one facade.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::application::resource_monitor::{scheduler_status, ResourceMonitor};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Alert, Config, NewTask, SchedulerStatus, Task, TaskStatus, DEFAULT_PRIORITY,
};
use crate::domain::ports::{
    MetricsSource, SolutionJudge, StoreMode, TaskExecutor, TaskSpawner, TaskStore,
};
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::database::select_task_store;
use crate::services::{
    ArenaManager, EventBus, LatestSubmissionJudge, MetricsService, NodeRegistry,
    ResourceAllocator, TaskEventKind, TaskHandle, TaskQueue,
};

/// Outcome of [`TaskManager::recover`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    /// Pending or queued tasks put back on the queue
    pub requeued: usize,
    /// Tasks that were running when the previous process stopped
    pub interrupted: usize,
}

struct MonitoringHandles {
    shutdown: CancellationToken,
    monitor: JoinHandle<()>,
    allocator: JoinHandle<()>,
}

/// Entry point for callers.
///
/// Owns every collaborator explicitly; nothing is global. Construct with
/// [`TaskManager::initialize`] for the configured store, or
/// [`TaskManager::from_parts`] to inject one.
pub struct TaskManager {
    config: Config,
    events: Arc<EventBus>,
    store: Arc<dyn TaskStore>,
    queue: Arc<TaskQueue>,
    registry: Arc<NodeRegistry>,
    metrics: Arc<MetricsService>,
    allocator: Arc<ResourceAllocator>,
    arena: ArenaManager,
    monitoring: Mutex<Option<MonitoringHandles>>,
}

impl TaskManager {
    /// Validate `config`, choose the task store and build the manager.
    ///
    /// Unfinished tasks from a previous run are not touched until
    /// [`TaskManager::recover`] is called, so executors can be registered first.
    pub async fn initialize(config: Config) -> Result<Arc<Self>> {
        ConfigLoader::validate(&config).context("Invalid configuration")?;
        let store = select_task_store(&config.database).await;
        if store.mode() == StoreMode::Ephemeral && config.database.enabled {
            warn!("Tasks will not survive a restart");
        }
        Self::from_parts(config, store, Arc::new(LatestSubmissionJudge))
    }

    /// Build a manager around an existing store and judge.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_parts(
        config: Config,
        store: Arc<dyn TaskStore>,
        judge: Arc<dyn SolutionJudge>,
    ) -> Result<Arc<Self>> {
        let events = Arc::new(EventBus::default());
        let queue = TaskQueue::new(
            config.queue.initial_concurrent,
            Arc::clone(&store),
            Arc::clone(&events),
        );
        let allocator = Arc::new(
            ResourceAllocator::new(
                config.allocator.clone(),
                Arc::clone(&queue),
                Arc::clone(&events),
            )
            .context("Invalid allocator configuration")?,
        );
        let metrics = Arc::new(MetricsService::new(
            config.monitoring.clone(),
            Arc::clone(&events),
        ));
        let registry = Arc::new(NodeRegistry::new());

        info!(
            store = %store.mode(),
            initial_concurrent = config.queue.initial_concurrent,
            "Task manager initialized"
        );

        Ok(Arc::new_cyclic(|weak: &Weak<Self>| {
            let spawner: Weak<dyn TaskSpawner> = weak.clone();
            let arena = ArenaManager::new(Arc::clone(&registry), judge).with_spawner(spawner);
            Self {
                config,
                events,
                store,
                queue,
                registry,
                metrics,
                allocator,
                arena,
                monitoring: Mutex::new(None),
            }
        }))
    }

    fn build_task(&self, request: NewTask) -> DomainResult<Task> {
        let defaults = &self.config.queue;
        let task = Task::new(request.task_type, request.name, request.payload)
            .with_priority(request.priority.unwrap_or(DEFAULT_PRIORITY))
            .with_metadata(request.metadata.unwrap_or_else(|| json!({})))
            .with_retries(
                request.max_retries.unwrap_or(defaults.default_max_retries),
                request.retry_delay_ms.unwrap_or(defaults.retry_delay_ms),
            );
        task.validate()?;
        Ok(task)
    }

    /// Create a task and hand it to the queue.
    ///
    /// Returns the `pending` snapshot taken before enqueueing.
    pub async fn create_task(&self, request: NewTask) -> DomainResult<Task> {
        self.create_task_with_handle(request).await.map(|(task, _)| task)
    }

    /// Like [`TaskManager::create_task`], also returning a handle that
    /// resolves with the task's result.
    #[instrument(skip(self, request), fields(task_type = %request.task_type, name = %request.name), err)]
    pub async fn create_task_with_handle(&self, request: NewTask) -> DomainResult<(Task, TaskHandle)> {
        let task = self.build_task(request)?;

        if let Err(e) = self.store.insert(&task).await {
            warn!(task_id = %task.id, error = %e, "Failed to persist new task");
        }
        self.events
            .publish_task(task.id, &task.task_type, TaskEventKind::Created);
        info!(task_id = %task.id, priority = task.priority, "Task created");

        let snapshot = task.clone();
        let handle = self.queue.enqueue(task).await?;
        Ok((snapshot, handle))
    }

    /// Register the executor for a task type, replacing any previous one.
    pub async fn register_executor(&self, task_type: impl Into<String>, executor: Arc<dyn TaskExecutor>) -> bool {
        self.queue.register_executor(task_type, executor).await
    }

    /// Current state of a task, with live progress while it runs.
    pub async fn get_task(&self, id: Uuid) -> DomainResult<Task> {
        if let Some(task) = self.queue.get(id).await {
            return Ok(task);
        }
        self.store
            .get(id)
            .await
            .map_err(|e| DomainError::PersistenceUnavailable(e.to_string()))?
            .ok_or(DomainError::TaskNotFound(id))
    }

    /// Wait for a task that is still queued or running.
    pub async fn wait_for(&self, id: Uuid) -> DomainResult<TaskHandle> {
        if let Some(handle) = self.queue.subscribe_result(id).await {
            return Ok(handle);
        }
        let task = self.get_task(id).await?;
        Err(DomainError::InvalidStateTransition {
            from: task.status.to_string(),
            to: "awaited".to_string(),
        })
    }

    /// Most recently created tasks first.
    pub async fn get_recent_tasks(&self, limit: usize) -> Vec<Task> {
        let mut by_id: HashMap<Uuid, Task> = match self.store.list_recent(limit).await {
            Ok(tasks) => tasks.into_iter().map(|t| (t.id, t)).collect(),
            Err(e) => {
                warn!(error = %e, "Failed to list stored tasks; showing in-memory tasks only");
                HashMap::new()
            }
        };
        // Live copies are never older than what the store has.
        for task in self.queue.tasks().await {
            by_id.insert(task.id, task);
        }

        let mut tasks: Vec<Task> = by_id.into_values().collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks.truncate(limit);
        tasks
    }

    pub async fn cancel_task(&self, id: Uuid) -> bool {
        self.queue.cancel(id).await
    }

    /// Remove terminal tasks finished more than `older_than` ago.
    #[instrument(skip(self), err)]
    pub async fn cleanup(&self, older_than: Duration) -> DomainResult<u64> {
        let age = chrono::Duration::from_std(older_than)
            .map_err(|e| DomainError::Validation(format!("cleanup age out of range: {e}")))?;
        let cutoff = Utc::now() - age;

        let forgotten = self.queue.forget_finished_before(cutoff).await;
        self.queue.flush().await;
        let removed = self
            .store
            .delete_finished_before(cutoff)
            .await
            .map_err(|e| DomainError::PersistenceUnavailable(e.to_string()))?;

        info!(removed, forgotten, "Finished tasks cleaned up");
        Ok(removed)
    }

    pub async fn active_alerts(&self) -> Vec<Alert> {
        self.metrics.active_alerts().await
    }

    /// Resolve an alert by id; false when unknown or already resolved.
    pub async fn resolve_alert(&self, id: Uuid) -> bool {
        self.metrics.resolve_alert(id).await
    }

    pub async fn status(&self) -> SchedulerStatus {
        let latest = self.metrics.latest().await;
        scheduler_status(&self.queue, &self.allocator, latest.as_ref()).await
    }

    /// Resume work left unfinished by a previous process.
    ///
    /// Pending and queued tasks are queued again. Tasks that were running
    /// cannot be resumed safely and are failed with an explanatory error.
    /// A no-op for the ephemeral store.
    pub async fn recover(&self) -> DomainResult<RecoveryReport> {
        let mut report = RecoveryReport::default();
        if self.store.mode() != StoreMode::Durable {
            return Ok(report);
        }

        let unfinished = self
            .store
            .list_unfinished()
            .await
            .map_err(|e| DomainError::PersistenceUnavailable(e.to_string()))?;

        for mut task in unfinished {
            match task.status {
                TaskStatus::Pending | TaskStatus::Queued => {
                    let id = task.id;
                    match self.queue.enqueue(task).await {
                        Ok(_) => report.requeued += 1,
                        Err(e) => warn!(task_id = %id, error = %e, "Failed to requeue task"),
                    }
                }
                TaskStatus::Running => {
                    task.transition_to(TaskStatus::Failed)?;
                    task.error = Some("interrupted by restart".to_string());
                    self.store
                        .update(&task)
                        .await
                        .map_err(|e| DomainError::PersistenceUnavailable(e.to_string()))?;
                    self.events.publish_task(
                        task.id,
                        &task.task_type,
                        TaskEventKind::Failed {
                            error: "interrupted by restart".to_string(),
                            execution_time_ms: 0,
                        },
                    );
                    report.interrupted += 1;
                }
                _ => {}
            }
        }

        if report != RecoveryReport::default() {
            info!(
                requeued = report.requeued,
                interrupted = report.interrupted,
                "Recovered unfinished tasks"
            );
        }
        Ok(report)
    }

    /// Start periodic sampling and the allocator feedback loop.
    ///
    /// Returns false when monitoring is already running.
    pub async fn start_monitoring(&self, source: Arc<dyn MetricsSource>) -> bool {
        let mut monitoring = self.monitoring.lock().await;
        if monitoring.is_some() {
            return false;
        }

        let shutdown = CancellationToken::new();
        let allocator = Arc::clone(&self.allocator).spawn(shutdown.clone());
        let monitor = Arc::new(ResourceMonitor::new(
            source,
            Arc::clone(&self.metrics),
            Arc::clone(&self.queue),
            Arc::clone(&self.registry),
            Arc::clone(&self.allocator),
            Arc::clone(&self.events),
        ))
        .start(
            Duration::from_millis(self.config.monitoring.sample_interval_ms),
            shutdown.clone(),
        );

        *monitoring = Some(MonitoringHandles {
            shutdown,
            monitor,
            allocator,
        });
        true
    }

    /// Stop background loops and flush pending store writes.
    pub async fn shutdown(&self) {
        if let Some(handles) = self.monitoring.lock().await.take() {
            handles.shutdown.cancel();
            for (name, handle) in [("monitor", handles.monitor), ("allocator", handles.allocator)] {
                if let Err(e) = handle.await {
                    warn!(loop_name = name, error = %e, "Background loop ended abnormally");
                }
            }
        }
        self.queue.flush().await;
        info!("Task manager stopped");
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store_mode(&self) -> StoreMode {
        self.store.mode()
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<MetricsService> {
        &self.metrics
    }

    pub fn allocator(&self) -> &Arc<ResourceAllocator> {
        &self.allocator
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    pub fn arena(&self) -> &ArenaManager {
        &self.arena
    }
}

#[async_trait]
impl TaskSpawner for TaskManager {
    async fn spawn_task(&self, request: NewTask) -> DomainResult<Task> {
        self.create_task(request).await
    }
}
