//! CLI command implementations.

pub mod config;
pub mod run;
pub mod simulate;

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::ports::{executor_fn, TaskExecutor};

/// Executor that returns its payload after `delay`, reporting halfway progress.
///
/// A payload with `"fail": true` makes the attempt fail.
pub fn echo_executor(delay: Duration) -> Arc<dyn TaskExecutor> {
    executor_fn(move |payload, task, ctx| async move {
        ctx.report_progress(50);
        tokio::time::sleep(delay).await;
        if payload.get("fail").and_then(serde_json::Value::as_bool) == Some(true) {
            anyhow::bail!("echo asked to fail on attempt {}", ctx.attempt);
        }
        ctx.report_progress(100);
        Ok(json!({ "echo": payload, "task": task.name }))
    })
}
