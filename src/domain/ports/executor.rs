//! Executor port - the code that actually performs a task.

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::models::Task;

type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// Handed to an executor for each attempt.
///
/// Cancelling a task trips the token and the queue stops polling the attempt.
/// Executors that hand work to other tasks or processes should watch
/// [`ExecutionContext::cancelled`] to stop that work as well.
#[derive(Clone)]
pub struct ExecutionContext {
    pub task_id: Uuid,
    /// Zero for the first attempt, incremented on every retry
    pub attempt: u32,
    cancellation: CancellationToken,
    progress: ProgressFn,
}

impl ExecutionContext {
    pub fn new(
        task_id: Uuid,
        attempt: u32,
        cancellation: CancellationToken,
        progress: impl Fn(u8) + Send + Sync + 'static,
    ) -> Self {
        Self {
            task_id,
            attempt,
            cancellation,
            progress: Arc::new(progress),
        }
    }

    /// Context that is not wired to any queue; progress reports are dropped.
    pub fn detached(task_id: Uuid) -> Self {
        Self::new(task_id, 0, CancellationToken::new(), |_| {})
    }

    /// Report completion percentage (0-100). Lower values than previously
    /// reported are ignored by the queue.
    pub fn report_progress(&self, percent: u8) {
        (self.progress)(percent);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves once the task has been cancelled.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await;
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("task_id", &self.task_id)
            .field("attempt", &self.attempt)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Handler registered per task type.
///
/// Returning an error marks the attempt as failed; the queue retries while the
/// task has retry budget left.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(
        &self,
        payload: Value,
        task: &Task,
        ctx: ExecutionContext,
    ) -> anyhow::Result<Value>;
}

/// Adapts an async closure into a [`TaskExecutor`].
pub struct FnExecutor<F> {
    handler: F,
}

impl<F> FnExecutor<F> {
    pub const fn new(handler: F) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<F, Fut> TaskExecutor for FnExecutor<F>
where
    F: Fn(Value, Task, ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn execute(
        &self,
        payload: Value,
        task: &Task,
        ctx: ExecutionContext,
    ) -> anyhow::Result<Value> {
        (self.handler)(payload, task.clone(), ctx).await
    }
}

/// Shorthand for registering a closure as an executor.
pub fn executor_fn<F, Fut>(handler: F) -> Arc<dyn TaskExecutor>
where
    F: Fn(Value, Task, ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(FnExecutor::new(handler))
}
