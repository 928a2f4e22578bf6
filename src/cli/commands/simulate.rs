//! Implementation of the `orchestra simulate` command.

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::Cell;
use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::application::TaskManager;
use crate::cli::commands::echo_executor;
use crate::cli::output::{list_table, output, status_cell, truncate, CommandOutput};
use crate::domain::models::{
    AllocationUpdate, Config, MatchConfig, MetricSample, NewTask, Node, SchedulerStatus, TaskStatus,
};
use crate::infrastructure::database::MemoryTaskStore;
use crate::services::LatestSubmissionJudge;

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Number of synthetic tasks to run
    #[arg(short, long, default_value = "20")]
    pub tasks: usize,

    /// Simulated work per task in milliseconds
    #[arg(long, default_value = "25")]
    pub work_ms: u64,

    /// Make every Nth task fail
    #[arg(long)]
    pub fail_every: Option<usize>,

    /// Retries granted to each task
    #[arg(long, default_value = "1")]
    pub retries: u32,
}

#[derive(Debug, Serialize)]
pub struct TaskRow {
    pub id: Uuid,
    pub name: String,
    pub priority: i32,
    pub status: TaskStatus,
    pub retries: u32,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ArenaSummary {
    pub match_id: Uuid,
    pub winner: Option<String>,
    pub plan_task_id: Option<Uuid>,
    pub plan_status: Option<TaskStatus>,
}

#[derive(Debug, Serialize)]
pub struct SimulationOutput {
    pub tasks: Vec<TaskRow>,
    pub completed: usize,
    pub failed: usize,
    pub allocation: Option<AllocationUpdate>,
    pub arena: ArenaSummary,
    pub status: SchedulerStatus,
}

impl CommandOutput for SimulationOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "name", "priority", "status", "retries", "error"]);
        for row in &self.tasks {
            table.add_row(vec![
                Cell::new(&row.id.to_string()[..8]),
                Cell::new(truncate(&row.name, 24)),
                Cell::new(row.priority),
                status_cell(row.status),
                Cell::new(row.retries),
                Cell::new(truncate(row.error.as_deref().unwrap_or("-"), 40)),
            ]);
        }

        let mut lines = vec![
            format!("{} task(s):", self.tasks.len()),
            table.to_string(),
            String::new(),
            format!("Completed: {}  Failed: {}", self.completed, self.failed),
        ];
        if let Some(update) = &self.allocation {
            lines.push(format!(
                "Concurrency {} -> {} ({})",
                update.previous, update.current, update.reason
            ));
        }
        lines.push(format!(
            "Arena match {}: winner {}, plan task {}",
            &self.arena.match_id.to_string()[..8],
            self.arena.winner.as_deref().unwrap_or("-"),
            self.arena
                .plan_status
                .map_or_else(|| "-".to_string(), |s| s.to_string())
        ));
        lines.join("\n")
    }
}

pub async fn execute(args: SimulateArgs, config: Config, json_mode: bool) -> Result<()> {
    let manager = TaskManager::from_parts(
        config,
        Arc::new(MemoryTaskStore::new()),
        Arc::new(LatestSubmissionJudge),
    )?;
    let work = Duration::from_millis(args.work_ms);
    manager.register_executor("echo", echo_executor(work)).await;
    manager.register_executor("plan", echo_executor(work)).await;

    let mut handles = Vec::with_capacity(args.tasks);
    for i in 0..args.tasks {
        let fail = args.fail_every.is_some_and(|n| n > 0 && (i + 1) % n == 0);
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let priority = (i % 5) as i32;
        let (_, handle) = manager
            .create_task_with_handle(
                NewTask::new("echo", format!("synthetic-{i}"), json!({ "n": i, "fail": fail }))
                    .priority(priority)
                    .retries(args.retries, 10),
            )
            .await
            .context("Failed to create synthetic task")?;
        handles.push(handle);
    }

    // An idle host with a backlog is what makes the allocator widen the ceiling.
    let backlog = manager.queue().status().await;
    let sample = MetricSample::new(10.0, 20.0).with_queue(backlog.queue_length, backlog.processing);
    manager.metrics().record(sample.clone()).await;
    let allocation = manager.allocator().evaluate(&sample).await?;

    let ids: Vec<Uuid> = handles.iter().map(|h| h.task_id()).collect();
    join_all(handles.into_iter().map(|h| h.wait())).await;

    let mut tasks = Vec::with_capacity(ids.len());
    for id in ids {
        let task = manager.get_task(id).await?;
        tasks.push(TaskRow {
            id: task.id,
            name: task.name,
            priority: task.priority,
            status: task.status,
            retries: task.retry_count,
            error: task.error,
        });
    }
    let completed = tasks.iter().filter(|t| t.status == TaskStatus::Completed).count();
    let failed = tasks.iter().filter(|t| t.status == TaskStatus::Failed).count();

    let arena = run_arena(&manager).await?;
    let status = manager.status().await;
    manager.shutdown().await;

    output(
        &SimulationOutput {
            tasks,
            completed,
            failed,
            allocation,
            arena,
            status,
        },
        json_mode,
    );
    Ok(())
}

async fn run_arena(manager: &TaskManager) -> Result<ArenaSummary> {
    let registry = manager.registry();
    for id in ["alpha", "beta"] {
        registry.register_node(Node::new(id, ["plan"], 2)).await?;
    }

    let arena = manager.arena();
    let m = arena
        .create_match(MatchConfig::new(2, 2).with_plan_task("plan", 10))
        .await?;
    arena.join_match(m.id, "alpha").await?;
    arena.join_match(m.id, "beta").await?;
    arena.submit_solution(m.id, "alpha", "split the work by region").await?;
    let m = arena
        .submit_solution(m.id, "beta", "split the work by customer")
        .await
        .context("Arena match did not resolve")?;

    let plan_status = match m.plan_task_id {
        Some(plan_id) => {
            if let Ok(handle) = manager.wait_for(plan_id).await {
                handle.wait().await;
            }
            Some(manager.get_task(plan_id).await?.status)
        }
        None => None,
    };

    Ok(ArenaSummary {
        match_id: m.id,
        winner: m.final_result.map(|r| r.winner),
        plan_task_id: m.plan_task_id,
        plan_status,
    })
}
