//! Priority task queue with a runtime-adjustable concurrency ceiling.
//!
//! Pending work is ordered by priority (highest first) and then by enqueue
//! order. Up to `max_concurrent` tasks run at once; every completion frees a
//! slot and immediately dispatches the next eligible task.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde_json::Value;
use std::cmp::Ordering as CmpOrdering;
use std::any::Any;
use std::collections::{BinaryHeap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{QueueSnapshot, Task, TaskResult, TaskStatus};
use crate::domain::ports::{ExecutionContext, TaskExecutor, TaskStore};
use crate::services::event_bus::{EventBus, TaskEventKind};

/// Heap entry. Higher priority first, then lower sequence (earlier enqueue).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QueueEntry {
    priority: i32,
    sequence: u64,
    task_id: Uuid,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

struct LiveTask {
    task: Task,
    progress: Arc<AtomicU8>,
    cancellation: Option<CancellationToken>,
    started: Option<Instant>,
    waiters: Vec<oneshot::Sender<TaskResult>>,
}

impl LiveTask {
    fn new(task: Task) -> Self {
        Self {
            task,
            progress: Arc::new(AtomicU8::new(0)),
            cancellation: None,
            started: None,
            waiters: Vec::new(),
        }
    }

    fn snapshot(&self) -> Task {
        let mut task = self.task.clone();
        task.record_progress(self.progress.load(Ordering::SeqCst));
        task
    }

    #[allow(clippy::cast_possible_truncation)]
    fn elapsed_ms(&self) -> u64 {
        self.started
            .map_or(0, |started| started.elapsed().as_millis() as u64)
    }

    fn notify(&mut self, result: &TaskResult) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(result.clone());
        }
    }
}

struct QueueState {
    tasks: HashMap<Uuid, LiveTask>,
    pending: BinaryHeap<QueueEntry>,
    queued: usize,
    processing: usize,
    max_concurrent: usize,
    next_sequence: u64,
}

/// Work handed from the dispatcher to a spawned worker.
struct Dispatch {
    task: Task,
    cancellation: CancellationToken,
    progress: Arc<AtomicU8>,
}

enum StoreOp {
    Update(Box<Task>),
    Flush(oneshot::Sender<()>),
}

/// Resolves with the task's final result.
pub struct TaskHandle {
    task_id: Uuid,
    receiver: oneshot::Receiver<TaskResult>,
}

impl TaskHandle {
    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    /// Wait for the task to reach a terminal state.
    pub async fn wait(self) -> TaskResult {
        self.receiver.await.unwrap_or_else(|_| {
            TaskResult::failure(self.task_id, "task queue dropped before completion", 0)
        })
    }
}

/// Owns pending and running tasks and the executors that run them.
///
/// Store writes are funnelled through a single writer task so that the
/// persisted status always follows the in-memory transition order; a failed
/// write is logged and never stops dispatch.
pub struct TaskQueue {
    state: Mutex<QueueState>,
    executors: RwLock<HashMap<String, Arc<dyn TaskExecutor>>>,
    store_tx: mpsc::UnboundedSender<StoreOp>,
    events: Arc<EventBus>,
}

impl TaskQueue {
    /// Create the queue and start its store writer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(initial_concurrent: usize, store: Arc<dyn TaskStore>, events: Arc<EventBus>) -> Arc<Self> {
        let (store_tx, store_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_store_writer(store, store_rx));

        Arc::new(Self {
            state: Mutex::new(QueueState {
                tasks: HashMap::new(),
                pending: BinaryHeap::new(),
                queued: 0,
                processing: 0,
                max_concurrent: initial_concurrent.max(1),
                next_sequence: 0,
            }),
            executors: RwLock::new(HashMap::new()),
            store_tx,
            events,
        })
    }

    /// Register the executor for a task type. Returns true when it replaced
    /// an existing registration.
    pub async fn register_executor(&self, task_type: impl Into<String>, executor: Arc<dyn TaskExecutor>) -> bool {
        let task_type = task_type.into();
        let replaced = self
            .executors
            .write()
            .await
            .insert(task_type.clone(), executor)
            .is_some();
        info!(task_type = %task_type, replaced, "Executor registered");
        replaced
    }

    pub async fn has_executor(&self, task_type: &str) -> bool {
        self.executors.read().await.contains_key(task_type)
    }

    /// Admit a pending (or previously queued) task and dispatch if a slot is free.
    #[instrument(skip(self, task), fields(task_id = %task.id, task_type = %task.task_type, priority = task.priority), err)]
    pub async fn enqueue(self: &Arc<Self>, mut task: Task) -> DomainResult<TaskHandle> {
        match task.status {
            TaskStatus::Pending => task.transition_to(TaskStatus::Queued)?,
            TaskStatus::Queued => {}
            other => {
                return Err(DomainError::InvalidStateTransition {
                    from: other.to_string(),
                    to: TaskStatus::Queued.to_string(),
                })
            }
        }

        let (tx, rx) = oneshot::channel();
        let handle = TaskHandle {
            task_id: task.id,
            receiver: rx,
        };

        let dispatches = {
            let mut state = self.state.lock().await;
            if state.tasks.contains_key(&task.id) {
                return Err(DomainError::Validation(format!(
                    "task {} is already queued",
                    task.id
                )));
            }

            let entry = QueueEntry {
                priority: task.priority,
                sequence: state.next_sequence,
                task_id: task.id,
            };
            state.next_sequence += 1;
            state.pending.push(entry);
            state.queued += 1;

            self.persist(&task);
            self.events
                .publish_task(task.id, &task.task_type, TaskEventKind::Queued);
            debug!(queue_length = state.queued, "Task queued");

            let mut live = LiveTask::new(task);
            live.waiters.push(tx);
            state.tasks.insert(live.task.id, live);

            self.dispatch_ready(&mut state)
        };

        self.spawn_workers(dispatches);
        Ok(handle)
    }

    /// Attach another waiter to a live task.
    pub async fn subscribe_result(&self, task_id: Uuid) -> Option<TaskHandle> {
        let mut state = self.state.lock().await;
        let live = state.tasks.get_mut(&task_id)?;
        if live.task.status.is_terminal() {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        live.waiters.push(tx);
        Some(TaskHandle {
            task_id,
            receiver: rx,
        })
    }

    /// Cancel a pending, queued or running task.
    ///
    /// Running tasks release their slot immediately. Terminal and unknown
    /// tasks are left untouched and `false` is returned.
    #[instrument(skip(self))]
    pub async fn cancel(self: &Arc<Self>, task_id: Uuid) -> bool {
        let dispatches = {
            let mut state = self.state.lock().await;
            let Some(live) = state.tasks.get_mut(&task_id) else {
                return false;
            };

            let previous = live.task.status;
            live.task.record_progress(live.progress.load(Ordering::SeqCst));
            if !previous.is_cancellable() || live.task.transition_to(TaskStatus::Cancelled).is_err() {
                debug!(status = %previous, "Task not cancellable");
                return false;
            }

            if let Some(token) = live.cancellation.take() {
                token.cancel();
            }
            let result = TaskResult::failure(task_id, "task cancelled", live.elapsed_ms());
            live.task.error = Some("task cancelled".to_string());
            live.notify(&result);
            let task = live.task.clone();

            match previous {
                TaskStatus::Queued => state.queued = state.queued.saturating_sub(1),
                TaskStatus::Running => state.processing = state.processing.saturating_sub(1),
                _ => {}
            }

            self.persist(&task);
            self.events
                .publish_task(task_id, &task.task_type, TaskEventKind::Cancelled);
            info!(previous = %previous, "Task cancelled");

            self.dispatch_ready(&mut state)
        };

        self.spawn_workers(dispatches);
        true
    }

    /// Change the concurrency ceiling.
    ///
    /// Raising it dispatches newly eligible work at once. Lowering it never
    /// preempts running tasks; the queue simply waits for `processing` to drop.
    pub async fn set_max_concurrent(self: &Arc<Self>, max_concurrent: usize) -> DomainResult<()> {
        if max_concurrent == 0 {
            return Err(DomainError::Validation(
                "max_concurrent must be at least 1".to_string(),
            ));
        }

        let dispatches = {
            let mut state = self.state.lock().await;
            let previous = state.max_concurrent;
            state.max_concurrent = max_concurrent;
            debug!(previous, max_concurrent, "Concurrency ceiling changed");
            self.dispatch_ready(&mut state)
        };

        self.spawn_workers(dispatches);
        Ok(())
    }

    pub async fn max_concurrent(&self) -> usize {
        self.state.lock().await.max_concurrent
    }

    pub async fn status(&self) -> QueueSnapshot {
        let state = self.state.lock().await;
        QueueSnapshot {
            queue_length: state.queued,
            processing: state.processing,
            max_concurrent: state.max_concurrent,
        }
    }

    /// Live progress of a running task.
    pub async fn progress(&self, task_id: Uuid) -> Option<u8> {
        let state = self.state.lock().await;
        let live = state.tasks.get(&task_id)?;
        (live.task.status == TaskStatus::Running).then(|| live.progress.load(Ordering::SeqCst))
    }

    /// Current view of a task this queue has seen, with live progress.
    pub async fn get(&self, task_id: Uuid) -> Option<Task> {
        self.state.lock().await.tasks.get(&task_id).map(LiveTask::snapshot)
    }

    /// Every task this queue still tracks.
    pub async fn tasks(&self) -> Vec<Task> {
        self.state
            .lock()
            .await
            .tasks
            .values()
            .map(LiveTask::snapshot)
            .collect()
    }

    /// Drop terminal tasks finished before `cutoff` from memory.
    pub async fn forget_finished_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut state = self.state.lock().await;
        let before = state.tasks.len();
        state.tasks.retain(|_, live| {
            !(live.task.status.is_terminal()
                && live.task.completed_at.is_some_and(|at| at < cutoff))
        });
        before - state.tasks.len()
    }

    /// Wait until every store write issued so far has been applied.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.store_tx.send(StoreOp::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    fn persist(&self, task: &Task) {
        if self.store_tx.send(StoreOp::Update(Box::new(task.clone()))).is_err() {
            warn!(task_id = %task.id, "Store writer stopped; task state not persisted");
        }
    }

    /// Move queued tasks to running while slots are free.
    fn dispatch_ready(&self, state: &mut QueueState) -> Vec<Dispatch> {
        let mut dispatches = Vec::new();

        while state.processing < state.max_concurrent {
            let Some(entry) = state.pending.pop() else {
                break;
            };
            let Some(live) = state.tasks.get_mut(&entry.task_id) else {
                continue;
            };
            // Cancelled while waiting; the heap entry is stale.
            if live.task.status != TaskStatus::Queued {
                continue;
            }
            if let Err(e) = live.task.transition_to(TaskStatus::Running) {
                warn!(task_id = %entry.task_id, error = %e, "Skipping task that cannot start");
                continue;
            }

            let cancellation = CancellationToken::new();
            live.cancellation = Some(cancellation.clone());
            live.started = Some(Instant::now());
            let task = live.task.clone();
            let progress = Arc::clone(&live.progress);

            state.queued = state.queued.saturating_sub(1);
            state.processing += 1;

            self.persist(&task);
            self.events
                .publish_task(task.id, &task.task_type, TaskEventKind::Started);
            debug!(task_id = %task.id, processing = state.processing, "Task started");

            dispatches.push(Dispatch {
                task,
                cancellation,
                progress,
            });
        }

        debug_assert!(
            state.processing <= state.max_concurrent || dispatches.is_empty(),
            "dispatched beyond the concurrency ceiling"
        );
        dispatches
    }

    fn spawn_workers(self: &Arc<Self>, dispatches: Vec<Dispatch>) {
        for dispatch in dispatches {
            let queue = Arc::clone(self);
            tokio::spawn(async move { queue.run_task(dispatch).await });
        }
    }

    async fn run_task(self: Arc<Self>, dispatch: Dispatch) {
        let Dispatch {
            task,
            cancellation,
            progress,
        } = dispatch;

        let executor = self.executors.read().await.get(&task.task_type).cloned();
        let Some(executor) = executor else {
            let error = DomainError::UnknownExecutorType(task.task_type.clone());
            warn!(task_id = %task.id, error = %error, "No executor for task type");
            self.finish(task.id, Err(error.to_string())).await;
            return;
        };

        let mut attempt = 0;
        loop {
            let ctx = ExecutionContext::new(
                task.id,
                attempt,
                cancellation.clone(),
                progress_reporter(&task, &progress, &self.events),
            );

            let attempt_future = AssertUnwindSafe(executor.execute(task.payload.clone(), &task, ctx)).catch_unwind();
            let outcome = tokio::select! {
                biased;
                () = cancellation.cancelled() => return,
                outcome = attempt_future => outcome,
            };

            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(panic) => {
                    let error = DomainError::ExecutorRuntime(format!(
                        "executor panicked: {}",
                        panic_message(panic.as_ref())
                    ));
                    warn!(task_id = %task.id, error = %error, "Executor panicked");
                    self.finish(task.id, Err(error.to_string())).await;
                    return;
                }
            };

            match outcome {
                Ok(value) => {
                    self.finish(task.id, Ok(value)).await;
                    return;
                }
                Err(e) if attempt < task.max_retries => {
                    attempt += 1;
                    let error = format!("{e:#}");
                    if !self.record_retry(task.id, attempt, &error).await {
                        return;
                    }
                    tokio::select! {
                        biased;
                        () = cancellation.cancelled() => return,
                        () = tokio::time::sleep(Duration::from_millis(task.retry_delay_ms)) => {}
                    }
                }
                Err(e) => {
                    let error = DomainError::ExecutorRuntime(format!("{e:#}"));
                    self.finish(task.id, Err(error.to_string())).await;
                    return;
                }
            }
        }
    }

    /// Bump the retry counter of a running task. Returns false if the task
    /// stopped running in the meantime.
    async fn record_retry(&self, task_id: Uuid, attempt: u32, error: &str) -> bool {
        let mut state = self.state.lock().await;
        let Some(live) = state.tasks.get_mut(&task_id) else {
            return false;
        };
        if live.task.status != TaskStatus::Running {
            return false;
        }

        live.task.retry_count = attempt;
        live.task.error = Some(error.to_string());
        let task = live.task.clone();

        warn!(
            task_id = %task_id,
            attempt,
            max_retries = task.max_retries,
            error,
            "Task attempt failed, retrying"
        );
        self.persist(&task);
        self.events.publish_task(
            task_id,
            &task.task_type,
            TaskEventKind::Retrying {
                attempt,
                max_retries: task.max_retries,
                error: error.to_string(),
            },
        );
        true
    }

    /// Record the outcome of a running task, free its slot and dispatch more.
    async fn finish(self: &Arc<Self>, task_id: Uuid, outcome: Result<Value, String>) {
        let dispatches = {
            let mut state = self.state.lock().await;
            let Some(live) = state.tasks.get_mut(&task_id) else {
                return;
            };
            // Cancelled while the executor was still winding down.
            if live.task.status != TaskStatus::Running {
                return;
            }

            let execution_time_ms = live.elapsed_ms();
            live.task.record_progress(live.progress.load(Ordering::SeqCst));
            let (status, result, kind) = match outcome {
                Ok(value) => {
                    live.task.result = Some(value.clone());
                    live.task.error = None;
                    (
                        TaskStatus::Completed,
                        TaskResult::success(task_id, value.clone(), execution_time_ms),
                        TaskEventKind::Completed {
                            result: value,
                            execution_time_ms,
                        },
                    )
                }
                Err(error) => {
                    live.task.error = Some(error.clone());
                    (
                        TaskStatus::Failed,
                        TaskResult::failure(task_id, error.clone(), execution_time_ms),
                        TaskEventKind::Failed {
                            error,
                            execution_time_ms,
                        },
                    )
                }
            };

            if let Err(e) = live.task.transition_to(status) {
                warn!(task_id = %task_id, error = %e, "Unexpected terminal transition");
                return;
            }
            live.cancellation = None;
            live.notify(&result);
            let task = live.task.clone();
            state.processing = state.processing.saturating_sub(1);

            if result.success {
                info!(task_id = %task_id, execution_time_ms, "Task completed");
            } else {
                warn!(task_id = %task_id, execution_time_ms, error = ?result.error, "Task failed");
            }
            self.persist(&task);
            self.events.publish_task(task_id, &task.task_type, kind);

            self.dispatch_ready(&mut state)
        };

        self.spawn_workers(dispatches);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

fn progress_reporter(task: &Task, progress: &Arc<AtomicU8>, events: &Arc<EventBus>) -> impl Fn(u8) + Send + Sync + 'static {
    let progress = Arc::clone(progress);
    let events = Arc::clone(events);
    let task_id = task.id;
    let task_type = task.task_type.clone();

    move |percent: u8| {
        let percent = percent.min(100);
        let previous = progress.fetch_max(percent, Ordering::SeqCst);
        if percent > previous {
            events.publish_task(task_id, &task_type, TaskEventKind::Progress { percent });
        }
    }
}

async fn run_store_writer(store: Arc<dyn TaskStore>, mut rx: mpsc::UnboundedReceiver<StoreOp>) {
    while let Some(op) = rx.recv().await {
        match op {
            StoreOp::Update(task) => {
                if let Err(e) = store.update(&task).await {
                    warn!(task_id = %task.id, status = %task.status, error = %e, "Failed to persist task state");
                }
            }
            StoreOp::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Store writer stopped");
}
